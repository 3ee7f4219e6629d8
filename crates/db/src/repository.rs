//! Repository-Trait und Datenbank-Konfiguration

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::models::{GeraetRecord, NeuesGeraet};

pub type DbResult<T> = Result<T, DbError>;

/// Konfiguration fuer die Datenbankverbindung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Verbindungs-URL (z.B. "sqlite://devicehub.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus aktiviert werden soll
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://devicehub.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

/// Repository fuer Geraete-Datensaetze
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Ein Geraet anhand seines Namens laden
    async fn get_by_name(&self, name: &str) -> DbResult<Option<GeraetRecord>>;

    /// Ein neues Geraet anlegen
    ///
    /// Schlaegt mit [`DbError::Eindeutigkeit`] fehl wenn der Name vergeben ist.
    async fn create(&self, data: NeuesGeraet<'_>) -> DbResult<GeraetRecord>;

    /// Setzt `connect_time` auf den aktuellen Zeitpunkt
    async fn update_connect_time(&self, device_id: i64) -> DbResult<()>;

    /// Alle Geraete, sortiert nach Name
    async fn list(&self) -> DbResult<Vec<GeraetRecord>>;

    /// Laedt oder legt ein Geraet an und aktualisiert `connect_time`
    ///
    /// Verbinden sich zwei Geraete gleichzeitig mit demselben Namen, verliert
    /// eines das INSERT und laedt danach den Datensatz des anderen.
    async fn get_or_create_and_touch(&self, name: &str, ip: &str) -> DbResult<GeraetRecord> {
        let geraet = match self.get_by_name(name).await? {
            Some(g) => g,
            None => match self.create(NeuesGeraet { name, ip }).await {
                Ok(g) => g,
                Err(e) if e.ist_eindeutigkeit() => self
                    .get_by_name(name)
                    .await?
                    .ok_or_else(|| DbError::intern(format!("Geraet '{name}' verschwunden")))?,
                Err(e) => return Err(e),
            },
        };

        self.update_connect_time(geraet.device_id).await?;

        self.get_by_name(name)
            .await?
            .ok_or_else(|| DbError::nicht_gefunden(format!("Geraet '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_konfiguration() {
        let cfg = DatabaseConfig::default();
        assert!(cfg.sqlite_wal);
        assert_eq!(cfg.max_verbindungen, 5);
        assert!(cfg.url.starts_with("sqlite://"));
    }
}
