//! devicehub-protocol – Wire-Protokoll zwischen Hub, Geraeten und Admins
//!
//! Alle Nachrichten sind JSON-Objekte mit einem `type`-Feld. Ausgehende
//! Nachrichten erhalten beim Senden ein zusaetzliches `message_id`-Feld.

pub mod error;
pub mod nachricht;
pub mod umschlag;

pub use error::{ProtokollFehler, ProtokollResult};
pub use nachricht::{GeraeteAenderung, HubNachricht, PROTOKOLL_VERSION};
pub use umschlag::{nachricht_id_erzeugen, umschlag_erstellen};
