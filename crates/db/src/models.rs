//! Datenmodelle der Geraete-Tabelle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistierter Geraete-Datensatz
///
/// Wird nach der Authentifizierung als `auxData` an der Verbindung
/// abgelegt und an Admins weitergereicht (`data.device` in Log-Nachrichten).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeraetRecord {
    pub device_id: i64,
    pub name: String,
    pub ip: String,
    pub create_time: DateTime<Utc>,
    pub connect_time: Option<DateTime<Utc>>,
}

/// Daten zum Anlegen eines neuen Geraets
#[derive(Debug, Clone)]
pub struct NeuesGeraet<'a> {
    pub name: &'a str,
    pub ip: &'a str,
}
