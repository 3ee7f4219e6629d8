//! Listener-Bus – Request-, Message- und Status-Listener
//!
//! Die drei Listener-Listen werden ueber den [`HubBuilder`](crate::HubBuilder)
//! befuellt und sind nach `bauen()` eingefroren. Jeder Listener laeuft
//! isoliert: ein Fehler oder Panic wird geloggt, gezaehlt und haelt die
//! nachfolgenden Listener nicht auf.

use devicehub_core::VerbindungsStatus;
use devicehub_observability::HubMetrics;
use devicehub_protocol::HubNachricht;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::auth::{klassifizierungen_zusammenfuehren, Klassifizierung, UpgradeAnfrage};
use crate::connection::Connection;
use crate::hub::ConnectionHub;

/// Asynchroner Listener, der eine Upgrade-Anfrage klassifiziert
pub type RequestListener = Box<
    dyn Fn(Arc<UpgradeAnfrage>) -> BoxFuture<'static, anyhow::Result<Klassifizierung>>
        + Send
        + Sync,
>;

/// Listener fuer eingehende Nachrichten einer offenen Verbindung
pub type MessageListener =
    Box<dyn Fn(&ConnectionHub, &Arc<Connection>, &HubNachricht) -> anyhow::Result<()> + Send + Sync>;

/// Listener fuer Statuswechsel (open, close, error)
pub type StatusListener = Box<
    dyn Fn(&ConnectionHub, &Arc<Connection>, VerbindungsStatus) -> anyhow::Result<()> + Send + Sync,
>;

// ---------------------------------------------------------------------------
// ListenerBus
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ListenerBus {
    pub(crate) request: Vec<RequestListener>,
    pub(crate) message: Vec<MessageListener>,
    pub(crate) status: Vec<StatusListener>,
}

impl ListenerBus {
    /// Fuehrt alle Request-Listener nacheinander aus und fuehrt die
    /// Ergebnisse zusammen
    ///
    /// Ein fehlgeschlagener Listener zaehlt als "keine Klassifizierung".
    pub(crate) async fn anfrage_klassifizieren(
        &self,
        anfrage: Arc<UpgradeAnfrage>,
        metriken: &HubMetrics,
    ) -> Klassifizierung {
        let mut ergebnisse = Vec::with_capacity(self.request.len());

        for (index, listener) in self.request.iter().enumerate() {
            let ergebnis = AssertUnwindSafe(listener(Arc::clone(&anfrage)))
                .catch_unwind()
                .await;
            match ergebnis {
                Ok(Ok(k)) => ergebnisse.push(k),
                Ok(Err(e)) => {
                    tracing::warn!(
                        listener = index,
                        peer = %anfrage.remote_addr,
                        fehler = %e,
                        "Request-Listener fehlgeschlagen"
                    );
                    metriken.listener_fehlgeschlagen("request");
                    ergebnisse.push(Klassifizierung::keine());
                }
                Err(_) => {
                    tracing::error!(listener = index, peer = %anfrage.remote_addr, "Request-Listener Panic");
                    metriken.listener_fehlgeschlagen("request");
                    ergebnisse.push(Klassifizierung::keine());
                }
            }
        }

        klassifizierungen_zusammenfuehren(ergebnisse)
    }

    pub(crate) fn nachricht_melden(
        &self,
        hub: &ConnectionHub,
        verbindung: &Arc<Connection>,
        nachricht: &HubNachricht,
    ) {
        for (index, listener) in self.message.iter().enumerate() {
            let ergebnis =
                std::panic::catch_unwind(AssertUnwindSafe(|| listener(hub, verbindung, nachricht)));
            fehler_protokollieren(hub, "message", index, verbindung, ergebnis);
        }
    }

    pub(crate) fn status_melden(
        &self,
        hub: &ConnectionHub,
        verbindung: &Arc<Connection>,
        status: VerbindungsStatus,
    ) {
        for (index, listener) in self.status.iter().enumerate() {
            let ergebnis =
                std::panic::catch_unwind(AssertUnwindSafe(|| listener(hub, verbindung, status)));
            fehler_protokollieren(hub, "status", index, verbindung, ergebnis);
        }
    }

    pub fn anzahl(&self) -> (usize, usize, usize) {
        (self.request.len(), self.message.len(), self.status.len())
    }
}

fn fehler_protokollieren(
    hub: &ConnectionHub,
    art: &'static str,
    index: usize,
    verbindung: &Connection,
    ergebnis: std::thread::Result<anyhow::Result<()>>,
) {
    match ergebnis {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(
                art,
                listener = index,
                verbindung = %verbindung.id(),
                fehler = %e,
                "Listener fehlgeschlagen"
            );
            hub.metriken().listener_fehlgeschlagen(art);
        }
        Err(_) => {
            tracing::error!(art, listener = index, verbindung = %verbindung.id(), "Listener Panic");
            hub.metriken().listener_fehlgeschlagen(art);
        }
    }
}
