//! Gemeinsame Identifikationstypen fuer den devicehub
//!
//! IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige ID einer Verbindung, vergeben beim Upgrade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Erstellt eine neue zufaellige ConnectionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Klassifizierung
// ---------------------------------------------------------------------------

/// Art eines klassifizierten Clients
///
/// Unklassifizierte Verbindungen werden als `Option<ClientTyp>::None`
/// dargestellt und nie in die Registry aufgenommen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientTyp {
    /// Unbeaufsichtigter Geraete-Agent
    Device,
    /// Menschlicher Beobachter (Web-Oberflaeche)
    Admin,
}

impl ClientTyp {
    pub fn als_str(&self) -> &'static str {
        match self {
            ClientTyp::Device => "device",
            ClientTyp::Admin => "admin",
        }
    }
}

impl std::fmt::Display for ClientTyp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

/// Statuswechsel einer zugelassenen Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerbindungsStatus {
    Open,
    Close,
    Error,
}

impl VerbindungsStatus {
    pub fn als_str(&self) -> &'static str {
        match self {
            VerbindungsStatus::Open => "open",
            VerbindungsStatus::Close => "close",
            VerbindungsStatus::Error => "error",
        }
    }

    /// Gibt true zurueck wenn der Status das Ende der Verbindung markiert
    pub fn ist_ende(&self) -> bool {
        !matches!(self, VerbindungsStatus::Open)
    }
}

impl std::fmt::Display for VerbindungsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_sind_eindeutig() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn connection_id_display_hat_praefix() {
        let id = ConnectionId::new();
        assert!(id.to_string().starts_with("conn:"));
    }

    #[test]
    fn client_typ_serialisiert_kleingeschrieben() {
        assert_eq!(
            serde_json::to_string(&ClientTyp::Device).unwrap(),
            "\"device\""
        );
        let typ: ClientTyp = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(typ, ClientTyp::Admin);
    }

    #[test]
    fn status_ende_erkennung() {
        assert!(!VerbindungsStatus::Open.ist_ende());
        assert!(VerbindungsStatus::Close.ist_ende());
        assert!(VerbindungsStatus::Error.ist_ende());
        assert_eq!(
            serde_json::to_string(&VerbindungsStatus::Error).unwrap(),
            "\"error\""
        );
    }
}
