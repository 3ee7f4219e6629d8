//! Laufzeit-Konfiguration des Hubs (`[hub]` in der Server-Konfiguration)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Maximale Anzahl gleichzeitiger Verbindungen (inkl. laufender Upgrades)
    pub max_clients: usize,
    /// Kapazitaet der Ausgangs-Queue pro Verbindung (Frames)
    pub send_queue_groesse: usize,
    /// Intervall fuer WebSocket-Pings in Sekunden
    pub keepalive_sek: u64,
    /// Ohne eingehenden Frame in dieser Zeit endet die Verbindung mit `error`
    pub verbindungs_timeout_sek: u64,
    /// `x-forwarded-for` fuer die Client-IP auswerten (nur hinter Reverse-Proxy)
    pub forwarded_header_vertrauen: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_clients: 1024,
            send_queue_groesse: 256,
            keepalive_sek: 30,
            verbindungs_timeout_sek: 90,
            forwarded_header_vertrauen: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let cfg = HubConfig::default();
        assert_eq!(cfg.send_queue_groesse, 256);
        assert!(cfg.verbindungs_timeout_sek > cfg.keepalive_sek);
        assert!(!cfg.forwarded_header_vertrauen);
    }

    #[test]
    fn teilweise_konfiguration_fuellt_rest_auf() {
        let cfg: HubConfig = serde_json::from_str(r#"{"max_clients": 3}"#).unwrap();
        assert_eq!(cfg.max_clients, 3);
        assert_eq!(cfg.send_queue_groesse, 256);
    }
}
