//! Message-Dispatcher – Stempeln, Serialisieren und Einreihen
//!
//! Jeder Schreibvorgang bekommt eine eigene `message_id`, auch beim
//! Broadcast. Fehler einzelner Empfaenger werden im [`SendeBericht`]
//! gesammelt und brechen den Fan-out nie ab.

use devicehub_core::ConnectionId;
use devicehub_observability::HubMetrics;
use devicehub_protocol::{nachricht_id_erzeugen, umschlag_erstellen};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::connection::Connection;
use crate::error::{HubError, HubResult};

/// Ergebnis eines Fan-outs
#[derive(Debug, Default)]
pub struct SendeBericht {
    /// Verbindungen, fuer die die Nachricht eingereiht wurde
    pub erfolgreich: Vec<ConnectionId>,
    /// Verbindungen, bei denen das Einreihen fehlschlug
    pub fehlgeschlagen: Vec<(ConnectionId, HubError)>,
}

impl SendeBericht {
    pub fn versucht(&self) -> usize {
        self.erfolgreich.len() + self.fehlgeschlagen.len()
    }

    pub fn ist_vollstaendig(&self) -> bool {
        self.fehlgeschlagen.is_empty()
    }
}

#[derive(Clone)]
pub struct MessageDispatcher {
    metriken: HubMetrics,
}

impl MessageDispatcher {
    pub fn neu(metriken: HubMetrics) -> Self {
        Self { metriken }
    }

    /// Sendet eine Nachricht an genau eine Verbindung
    ///
    /// Gibt die vergebene `message_id` zurueck.
    pub fn senden_an<N: Serialize + ?Sized>(
        &self,
        verbindung: &Connection,
        nachricht: &N,
    ) -> HubResult<String> {
        if !verbindung.ist_offen() {
            return Err(HubError::NichtOffen(verbindung.id()));
        }
        let message_id = nachricht_id_erzeugen();
        let frame = umschlag_erstellen(nachricht, &message_id)?;
        self.frame_einreihen(verbindung, frame)?;
        Ok(message_id)
    }

    /// Sendet eine Nachricht unabhaengig an jede Verbindung der Liste
    pub fn an_mehrere<'a, N, I>(&self, verbindungen: I, nachricht: &N) -> SendeBericht
    where
        N: Serialize + ?Sized,
        I: IntoIterator<Item = &'a Arc<Connection>>,
    {
        let mut bericht = SendeBericht::default();

        // Einmal in einen Wert umwandeln, pro Empfaenger nur noch stempeln
        let wert = match serde_json::to_value(nachricht) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(fehler = %e, "Nachricht nicht serialisierbar – Fan-out abgebrochen");
                return bericht;
            }
        };

        for verbindung in verbindungen {
            match self.wert_senden(verbindung, &wert) {
                Ok(_) => bericht.erfolgreich.push(verbindung.id()),
                Err(e) => {
                    if e.ist_transport_fehler() {
                        tracing::warn!(verbindung = %verbindung.id(), fehler = %e, "Fan-out an Verbindung fehlgeschlagen");
                    } else {
                        tracing::debug!(verbindung = %verbindung.id(), fehler = %e, "Fan-out uebersprungen");
                    }
                    bericht.fehlgeschlagen.push((verbindung.id(), e));
                }
            }
        }

        bericht
    }

    fn wert_senden(&self, verbindung: &Connection, wert: &Value) -> HubResult<String> {
        let message_id = nachricht_id_erzeugen();
        let frame = umschlag_erstellen(wert, &message_id)?;
        self.frame_einreihen(verbindung, frame)?;
        Ok(message_id)
    }

    fn frame_einreihen(&self, verbindung: &Connection, frame: String) -> HubResult<()> {
        match verbindung.einreihen(frame) {
            Ok(()) => {
                self.metriken.messages_sent_total.inc();
                Ok(())
            }
            Err(e) => {
                self.metriken.send_failures_total.inc();
                Err(e)
            }
        }
    }
}
