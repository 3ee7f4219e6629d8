//! devicehub-core – Gemeinsame Typen
//!
//! Dieses Crate stellt die Bausteine bereit, die vom Hub, den
//! Geschaeftsmodulen und dem Server gemeinsam genutzt werden.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{ClientTyp, ConnectionId, VerbindungsStatus};
