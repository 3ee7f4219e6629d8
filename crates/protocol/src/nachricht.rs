//! Nachrichten zwischen Hub, Geraeten und Admin-Oberflaechen
//!
//! ## Design
//! - Tagged Enum ueber das `type`-Feld (snake_case)
//! - Unbekannte Typen werden explizit abgelehnt statt still ignoriert
//! - Das `data`-Feld bleibt ein freies JSON-Objekt, da Geraete und
//!   Oberflaeche eigene Formate darin transportieren

use devicehub_core::VerbindungsStatus;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtokollFehler, ProtokollResult};

/// Protokollversion die Geraeten im `hello` mitgeteilt wird
pub const PROTOKOLL_VERSION: u32 = 11090;

/// Alle Werte die im `type`-Feld erlaubt sind
const BEKANNTE_TYPEN: &[&str] = &["hello", "ping", "pong", "log", "device_change"];

// ---------------------------------------------------------------------------
// Nutzdaten
// ---------------------------------------------------------------------------

/// Nutzdaten einer `device_change`-Benachrichtigung an Admins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeraeteAenderung {
    pub status: VerbindungsStatus,
}

// ---------------------------------------------------------------------------
// HubNachricht
// ---------------------------------------------------------------------------

/// Alle Nachrichtentypen des Hubs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubNachricht {
    /// Begruessung (Hub → Geraet nach dem Oeffnen, Geraet → Hub optional)
    Hello {
        #[serde(default)]
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        debug: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u32>,
    },
    /// Anwendungs-Ping, `data` wird im Pong zurueckgespiegelt
    Ping {
        #[serde(default)]
        data: Value,
    },
    Pong {
        #[serde(default)]
        data: Value,
    },
    /// Log-Zeile eines Geraets, wird an alle Admins weitergeleitet
    ///
    /// Weitere Top-Level-Felder (`level`, `ts`, ...) landen in `extra` und
    /// bleiben bei der Weiterleitung erhalten.
    Log {
        #[serde(default)]
        data: Value,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    /// Statuswechsel eines Geraets (Hub → Admin)
    DeviceChange { data: GeraeteAenderung },
}

impl HubNachricht {
    /// Begruessung die ein Geraet direkt nach dem Oeffnen erhaelt
    pub fn hello_ok() -> Self {
        HubNachricht::Hello {
            data: Value::String("ok".to_string()),
            debug: Some(false),
            version: Some(PROTOKOLL_VERSION),
        }
    }

    /// Antwort auf einen Ping, spiegelt `data` unveraendert zurueck
    pub fn pong(data: Value) -> Self {
        HubNachricht::Pong { data }
    }

    pub fn geraete_aenderung(status: VerbindungsStatus) -> Self {
        HubNachricht::DeviceChange {
            data: GeraeteAenderung { status },
        }
    }

    /// Gibt den Wert des `type`-Feldes zurueck
    pub fn typ(&self) -> &'static str {
        match self {
            HubNachricht::Hello { .. } => "hello",
            HubNachricht::Ping { .. } => "ping",
            HubNachricht::Pong { .. } => "pong",
            HubNachricht::Log { .. } => "log",
            HubNachricht::DeviceChange { .. } => "device_change",
        }
    }

    /// Parst einen eingehenden Text-Frame
    ///
    /// Unterscheidet zwischen kaputtem JSON, fehlendem `type`, unbekanntem
    /// `type` und einem bekannten Typ mit ungueltigen Feldern.
    pub fn aus_json(text: &str) -> ProtokollResult<Self> {
        let wert: Value = serde_json::from_str(text)?;
        let objekt = wert.as_object().ok_or(ProtokollFehler::KeinObjekt)?;
        let typ = objekt
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtokollFehler::FehlenderTyp)?;
        if !BEKANNTE_TYPEN.contains(&typ) {
            return Err(ProtokollFehler::UnbekannterTyp(typ.to_string()));
        }
        Ok(serde_json::from_value(wert)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hello_ok_hat_erwartetes_format() {
        let wert = serde_json::to_value(HubNachricht::hello_ok()).unwrap();
        assert_eq!(
            wert,
            json!({"type": "hello", "data": "ok", "debug": false, "version": 11090})
        );
    }

    #[test]
    fn ping_mit_string_daten() {
        let msg = HubNachricht::aus_json(r#"{"type":"ping","data":"x"}"#).unwrap();
        assert_eq!(msg, HubNachricht::Ping { data: json!("x") });
    }

    #[test]
    fn ping_ohne_daten_ist_null() {
        let msg = HubNachricht::aus_json(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, HubNachricht::Ping { data: Value::Null });
    }

    #[test]
    fn eingehende_message_id_wird_ignoriert() {
        let msg =
            HubNachricht::aus_json(r#"{"type":"pong","data":1,"message_id":"1_2_3"}"#).unwrap();
        assert_eq!(msg, HubNachricht::Pong { data: json!(1) });
    }

    #[test]
    fn device_change_serialisierung() {
        let wert =
            serde_json::to_value(HubNachricht::geraete_aenderung(VerbindungsStatus::Open)).unwrap();
        assert_eq!(wert, json!({"type": "device_change", "data": {"status": "open"}}));
    }

    #[test]
    fn unbekannter_typ_wird_abgelehnt() {
        let err = HubNachricht::aus_json(r#"{"type":"reboot"}"#).unwrap_err();
        assert!(matches!(err, ProtokollFehler::UnbekannterTyp(t) if t == "reboot"));
    }

    #[test]
    fn fehlender_typ_wird_abgelehnt() {
        let err = HubNachricht::aus_json(r#"{"data":"x"}"#).unwrap_err();
        assert!(matches!(err, ProtokollFehler::FehlenderTyp));
    }

    #[test]
    fn kein_objekt_wird_abgelehnt() {
        let err = HubNachricht::aus_json("[1,2,3]").unwrap_err();
        assert!(matches!(err, ProtokollFehler::KeinObjekt));
    }

    #[test]
    fn kaputtes_json_wird_abgelehnt() {
        let err = HubNachricht::aus_json("{nicht json").unwrap_err();
        assert!(matches!(err, ProtokollFehler::Json(_)));
    }

    #[test]
    fn device_change_ohne_status_ist_ungueltig() {
        let err = HubNachricht::aus_json(r#"{"type":"device_change","data":{}}"#).unwrap_err();
        assert!(matches!(err, ProtokollFehler::Json(_)));
    }

    #[test]
    fn log_behaelt_zusaetzliche_felder() {
        let msg =
            HubNachricht::aus_json(r#"{"type":"log","data":{"zeile":"boot"},"level":"warn","ts":123}"#)
                .unwrap();
        let HubNachricht::Log { data, extra } = &msg else {
            panic!("Log erwartet, erhalten: {msg:?}");
        };
        assert_eq!(data, &json!({"zeile": "boot"}));
        assert_eq!(extra.get("level"), Some(&json!("warn")));
        assert_eq!(extra.get("ts"), Some(&json!(123)));
        assert!(!extra.contains_key("type"));

        let wert = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            wert,
            json!({"type": "log", "data": {"zeile": "boot"}, "level": "warn", "ts": 123})
        );
    }

    #[test]
    fn typ_entspricht_tag() {
        assert_eq!(HubNachricht::pong(Value::Null).typ(), "pong");
        assert_eq!(
            HubNachricht::geraete_aenderung(VerbindungsStatus::Close).typ(),
            "device_change"
        );
    }
}
