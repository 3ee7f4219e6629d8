//! devicehub-db – Persistente Geraete-Datensaetze
//!
//! Repository-Pattern ueber SQLite. Der Hub kennt nur den Trait
//! [`DeviceRepository`], die konkrete Implementierung liegt in
//! [`sqlite::SqliteDb`].

pub mod error;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::DbError;
pub use models::{GeraetRecord, NeuesGeraet};
pub use repository::{DatabaseConfig, DbResult, DeviceRepository};
pub use sqlite::SqliteDb;
