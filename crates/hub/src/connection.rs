//! Connection – eine zugelassene Duplex-Verbindung
//!
//! Die `Connection` ist das Handle, das Registry, Dispatcher und Listener
//! teilen. Der eigentliche WebSocket gehoert dem Verbindungs-Task in
//! `server.rs`, die `Connection` kennt nur die Ausgangs-Queue dorthin.
//!
//! ## State Machine
//! ```text
//! Verbindet -> Offen -> Schliessend -> Geschlossen
//! ```
//! - `Offen` wird ausschliesslich von der Registry gesetzt (beim Zulassen)
//! - `Schliessend` beim Entfernen aus der Registry, bevor die
//!   close/error-Listener laufen
//! - `Geschlossen` ist endgueltig

use chrono::{DateTime, Utc};
use devicehub_core::{ClientTyp, ConnectionId};
use parking_lot::Mutex;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::error::{HubError, HubResult};

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Bereitschaftszustand einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsZustand {
    /// Authentifiziert, aber noch nicht in der Registry
    Verbindet,
    /// In der Registry, Senden erlaubt
    Offen,
    /// Aus der Registry entfernt, Status-Listener laufen
    Schliessend,
    Geschlossen,
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Handle auf eine Verbindung
///
/// `typ` und `aux_data` stammen aus der Authentifizierung und sind ab der
/// Erstellung unveraenderlich.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    ip: String,
    typ: ClientTyp,
    aux_data: Option<Value>,
    verbunden_seit: DateTime<Utc>,
    pub(crate) zustand: Mutex<VerbindungsZustand>,
    sende_tx: mpsc::Sender<String>,
    schliessen_tx: watch::Sender<bool>,
}

impl Connection {
    /// Erstellt eine neue Verbindung im Zustand `Verbindet`
    ///
    /// Gibt zusaetzlich das Empfangsende der Ausgangs-Queue zurueck, das der
    /// Schreib-Task des Transports leert.
    pub fn neu(
        remote_addr: SocketAddr,
        ip: impl Into<String>,
        typ: ClientTyp,
        aux_data: Option<Value>,
        queue_groesse: usize,
    ) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (sende_tx, sende_rx) = mpsc::channel(queue_groesse.max(1));
        let (schliessen_tx, _) = watch::channel(false);

        let verbindung = Arc::new(Self {
            id: ConnectionId::new(),
            remote_addr,
            ip: ip.into(),
            typ,
            aux_data,
            verbunden_seit: Utc::now(),
            zustand: Mutex::new(VerbindungsZustand::Verbindet),
            sende_tx,
            schliessen_tx,
        });
        (verbindung, sende_rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Bereinigte Client-IP (siehe `UpgradeAnfrage::client_ip`)
    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn typ(&self) -> ClientTyp {
        self.typ
    }

    /// Klassifizierungsdaten (z.B. Geraete-Datensatz oder Admin-Identitaet)
    pub fn aux_data(&self) -> Option<&Value> {
        self.aux_data.as_ref()
    }

    pub fn verbunden_seit(&self) -> DateTime<Utc> {
        self.verbunden_seit
    }

    pub fn zustand(&self) -> VerbindungsZustand {
        *self.zustand.lock()
    }

    pub fn ist_offen(&self) -> bool {
        self.zustand() == VerbindungsZustand::Offen
    }

    /// Reiht einen fertig serialisierten Frame in die Ausgangs-Queue ein
    ///
    /// Zustandspruefung und Einreihen passieren unter demselben Lock, daher
    /// kann nach dem Verlassen von `Offen` nichts mehr eingereiht werden.
    /// Blockiert nie: eine volle Queue ist ein sofortiger Fehler.
    pub fn einreihen(&self, frame: String) -> HubResult<()> {
        let zustand = self.zustand.lock();
        if *zustand != VerbindungsZustand::Offen {
            return Err(HubError::NichtOffen(self.id));
        }

        match self.sende_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(verbindung = %self.id, "Sende-Queue voll – Nachricht verworfen");
                Err(HubError::QueueVoll(self.id))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(verbindung = %self.id, "Sende-Queue geschlossen (Transport beendet)");
                Err(HubError::TransportGeschlossen(self.id))
            }
        }
    }

    /// Fordert den Transport-Task auf, die Verbindung zu beenden
    ///
    /// Die Verbindung durchlaeuft danach den normalen close-Pfad
    /// (Entfernen aus der Registry, Status `close`).
    pub fn schliessen(&self) {
        self.schliessen_tx.send_replace(true);
    }

    /// Empfaenger fuer die Schliessen-Aufforderung
    pub fn schliessen_signal(&self) -> watch::Receiver<bool> {
        self.schliessen_tx.subscribe()
    }

    pub(crate) fn zustand_setzen(&self, neu: VerbindungsZustand) {
        *self.zustand.lock() = neu;
    }
}

impl std::fmt::Display for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} {})", self.id, self.typ, self.remote_addr)
    }
}
