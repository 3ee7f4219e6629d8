//! Fehlertypen des Wire-Protokolls

use thiserror::Error;

/// Fehler beim Parsen oder Verpacken einer Nachricht
#[derive(Debug, Error)]
pub enum ProtokollFehler {
    #[error("Ungueltiges JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Nachricht ist kein JSON-Objekt")]
    KeinObjekt,

    #[error("Nachricht hat kein `type`-Feld")]
    FehlenderTyp,

    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannterTyp(String),
}

pub type ProtokollResult<T> = std::result::Result<T, ProtokollFehler>;
