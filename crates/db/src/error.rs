//! Fehlertypen fuer das Datenbank-Crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Geraet nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Geraetename bereits vergeben (UNIQUE-Constraint auf `devices.name`)
    #[error("Eindeutigkeitsverletzung: {0}")]
    Eindeutigkeit(String),

    #[error("SQLx-Fehler: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration fehlgeschlagen: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Gespeicherter Wert laesst sich nicht lesen
    #[error("Interner DB-Fehler: {0}")]
    Intern(String),
}

impl DbError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    pub fn ist_eindeutigkeit(&self) -> bool {
        matches!(self, Self::Eindeutigkeit(_))
    }
}
