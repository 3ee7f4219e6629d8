//! SQLite-Backend-Implementierung des DeviceRepository

pub mod devices;
pub mod pool;

pub use pool::SqliteDb;
