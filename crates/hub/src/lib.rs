//! devicehub-hub – Connection Hub fuer Geraete- und Admin-Verbindungen
//!
//! Der Hub nimmt WebSocket-Upgrades an, klassifiziert sie ueber eine
//! Kette von Request-Listenern und verteilt Nachrichten und Statuswechsel
//! an registrierte Listener.
//!
//! ## Architektur
//!
//! ```text
//! ws_router (axum, Upgrade auf / und /ws)
//!     |
//!     v
//! ConnectionHub::authentifizieren  – Request-Listener, zusammengefuehrt
//!     |
//!     v
//! Transport-Task pro Verbindung
//!     |  Zustand: Verbindet -> Offen -> Schliessend -> Geschlossen
//!     |
//!     v
//! ConnectionHub
//!     +-- ClientRegistry    (offene Verbindungen)
//!     +-- ListenerBus       (Request-, Message-, Status-Listener)
//!     +-- MessageDispatcher (message_id vergeben, Fan-out)
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod listener;
pub mod registry;
pub mod server;

// Bequeme Re-Exporte
pub use auth::{Klassifizierung, UpgradeAnfrage};
pub use config::HubConfig;
pub use connection::{Connection, VerbindungsZustand};
pub use dispatcher::{MessageDispatcher, SendeBericht};
pub use error::{HubError, HubResult};
pub use hub::{ConnectionHub, HubBuilder, VerbindungsPlatz};
pub use listener::{MessageListener, RequestListener, StatusListener};
pub use registry::ClientRegistry;
pub use server::{starten, ws_router};

#[cfg(test)]
pub(crate) mod test_hilfen {
    use crate::auth::UpgradeAnfrage;
    use crate::config::HubConfig;
    use crate::connection::{Connection, VerbindungsZustand};
    use crate::hub::{ConnectionHub, HubBuilder};
    use axum::http::HeaderMap;
    use devicehub_core::ClientTyp;
    use devicehub_observability::HubMetrics;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// Verbindung im Zustand `Verbindet` mit einer Queue fuer 4 Frames
    pub fn test_verbindung(typ: ClientTyp) -> (Arc<Connection>, mpsc::Receiver<String>) {
        Connection::neu("127.0.0.1:4000".parse().unwrap(), "127.0.0.1", typ, None, 4)
    }

    /// Wie [`test_verbindung`], aber bereits `Offen`
    pub fn offene_verbindung(typ: ClientTyp) -> (Arc<Connection>, mpsc::Receiver<String>) {
        let (conn, rx) = test_verbindung(typ);
        conn.zustand_setzen(VerbindungsZustand::Offen);
        (conn, rx)
    }

    pub fn test_hub_builder() -> HubBuilder {
        ConnectionHub::builder(HubConfig::default(), HubMetrics::neu().unwrap())
    }

    pub fn anfrage(query: &[(&str, &str)]) -> Arc<UpgradeAnfrage> {
        let query = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(UpgradeAnfrage::neu(
            query,
            HeaderMap::new(),
            "10.0.0.7:5000".parse().unwrap(),
            false,
        ))
    }
}
