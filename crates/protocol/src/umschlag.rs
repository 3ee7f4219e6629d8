//! Umschlag fuer ausgehende Nachrichten
//!
//! Jede ausgehende Nachricht ist ein JSON-Objekt mit einem zusaetzlichen
//! Top-Level-Feld `message_id`. Die ID wird pro Sendevorgang vergeben,
//! nicht pro Nachricht.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;

use crate::error::{ProtokollFehler, ProtokollResult};

/// Prozessweiter Zaehler, trennt IDs innerhalb derselben Millisekunde
static SEQUENZ: AtomicU64 = AtomicU64::new(0);

/// Erzeugt eine neue Nachrichten-ID
///
/// Format: `{unix_millis}_{sequenz}_{zufall_hex}`. Die Sequenz ist pro
/// Prozess streng monoton, zwei Aufrufe liefern daher nie dieselbe ID.
pub fn nachricht_id_erzeugen() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let sequenz = SEQUENZ.fetch_add(1, Ordering::Relaxed);
    let zufall: u32 = rand::random();
    format!("{millis}_{sequenz}_{zufall:08x}")
}

/// Serialisiert `nachricht` und setzt das Feld `message_id`
///
/// Eine vorhandene `message_id` wird ueberschrieben. Nachrichten die nicht
/// zu einem JSON-Objekt serialisieren werden abgelehnt.
pub fn umschlag_erstellen<N: Serialize + ?Sized>(
    nachricht: &N,
    message_id: &str,
) -> ProtokollResult<String> {
    let mut wert = serde_json::to_value(nachricht)?;
    let objekt = wert.as_object_mut().ok_or(ProtokollFehler::KeinObjekt)?;
    objekt.insert("message_id".to_string(), Value::String(message_id.to_string()));
    Ok(serde_json::to_string(&wert)?)
}
