//! Authentifizierungskette – Klassifizierung eingehender Upgrade-Anfragen
//!
//! Jeder registrierte Request-Listener liefert eine [`Klassifizierung`].
//! Die Ergebnisse werden in Registrierungsreihenfolge zusammengefuehrt:
//! `typ` und `aux_data` werden unabhaengig voneinander nur dann
//! uebernommen, wenn der neue Wert "truthy" ist. Ein spaeterer Listener
//! ohne Ergebnis laesst eine fruehere Klassifizierung also stehen.

use axum::http::HeaderMap;
use devicehub_core::ClientTyp;
use serde_json::Value;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

// ---------------------------------------------------------------------------
// Klassifizierung
// ---------------------------------------------------------------------------

/// Ergebnis eines Request-Listeners
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Klassifizierung {
    pub typ: Option<ClientTyp>,
    pub aux_data: Option<Value>,
}

impl Klassifizierung {
    /// Keine Aussage ueber die Verbindung
    pub fn keine() -> Self {
        Self::default()
    }

    pub fn als(typ: ClientTyp) -> Self {
        Self {
            typ: Some(typ),
            aux_data: None,
        }
    }

    pub fn mit_daten(typ: ClientTyp, aux_data: Value) -> Self {
        Self {
            typ: Some(typ),
            aux_data: Some(aux_data),
        }
    }

    pub fn ist_klassifiziert(&self) -> bool {
        self.typ.is_some()
    }
}

/// Wahrheitswert eines JSON-Werts
///
/// `null`, `false`, `0` und `""` sind falsy, alles andere truthy
/// (auch leere Arrays und Objekte).
pub fn ist_truthy(wert: &Value) -> bool {
    match wert {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Fuehrt ein weiteres Listener-Ergebnis in die bisherige Klassifizierung ein
pub fn zusammenfuehren(bisher: Klassifizierung, neu: Klassifizierung) -> Klassifizierung {
    Klassifizierung {
        typ: neu.typ.or(bisher.typ),
        aux_data: match neu.aux_data {
            Some(wert) if ist_truthy(&wert) => Some(wert),
            _ => bisher.aux_data,
        },
    }
}

/// Fuehrt alle Listener-Ergebnisse in Registrierungsreihenfolge zusammen
pub fn klassifizierungen_zusammenfuehren(
    ergebnisse: impl IntoIterator<Item = Klassifizierung>,
) -> Klassifizierung {
    ergebnisse
        .into_iter()
        .fold(Klassifizierung::keine(), zusammenfuehren)
}

// ---------------------------------------------------------------------------
// UpgradeAnfrage
// ---------------------------------------------------------------------------

/// Metadaten einer Upgrade-Anfrage, wie sie Request-Listener sehen
#[derive(Debug, Clone)]
pub struct UpgradeAnfrage {
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub remote_addr: SocketAddr,
    /// Bereinigte Client-IP
    pub ip: String,
}

impl UpgradeAnfrage {
    pub fn neu(
        query: HashMap<String, String>,
        headers: HeaderMap,
        remote_addr: SocketAddr,
        forwarded_vertrauen: bool,
    ) -> Self {
        let ip = client_ip(&headers, remote_addr, forwarded_vertrauen);
        Self {
            query,
            headers,
            remote_addr,
            ip,
        }
    }

    /// Wert eines Query-Parameters, leere Werte zaehlen als nicht gesetzt
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Bearer-Token aus dem `token`-Query-Parameter
    pub fn token(&self) -> Option<&str> {
        self.param("token")
    }
}

/// Ermittelt die Client-IP einer Anfrage
///
/// Standard ist die Remote-Adresse der TCP-Verbindung. Nur wenn
/// `forwarded_vertrauen` gesetzt ist, gewinnt der erste Eintrag aus
/// `x-forwarded-for`. IPv4-gemappte IPv6-Adressen werden als IPv4
/// ausgegeben; nicht parsebare Header-Werte werden auf Ziffern und Punkte
/// reduziert.
pub fn client_ip(headers: &HeaderMap, remote_addr: SocketAddr, forwarded_vertrauen: bool) -> String {
    if forwarded_vertrauen {
        let erster = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(wert) = erster {
            return match wert.parse::<IpAddr>() {
                Ok(ip) => ip_normalisieren(ip),
                Err(_) => wert
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.')
                    .collect(),
            };
        }
    }
    ip_normalisieren(remote_addr.ip())
}

fn ip_normalisieren(ip: IpAddr) -> String {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => v4.to_string(),
            None => v6.to_string(),
        },
        IpAddr::V4(v4) => v4.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
