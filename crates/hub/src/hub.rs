//! ConnectionHub – Orchestrierung von Registry, Listener-Bus und Dispatcher
//!
//! ## Lebenszyklus einer Verbindung
//! ```text
//! Upgrade-Anfrage -> authentifizieren() -> { zulassen() | abgelehnt }
//! zulassen()  -> Registry (Offen) -> Status-Listener "open"
//! eingang()   -> Message-Listener (nur solange Offen)
//! trennen()   -> aus Registry entfernen -> Status-Listener "close"/"error"
//!             -> Geschlossen
//! ```

use devicehub_core::{ClientTyp, ConnectionId, VerbindungsStatus};
use devicehub_observability::HubMetrics;
use devicehub_protocol::HubNachricht;
use futures_util::FutureExt;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Klassifizierung, UpgradeAnfrage};
use crate::config::HubConfig;
use crate::connection::{Connection, VerbindungsZustand};
use crate::dispatcher::{MessageDispatcher, SendeBericht};
use crate::error::HubResult;
use crate::listener::ListenerBus;
use crate::registry::ClientRegistry;

// ---------------------------------------------------------------------------
// HubBuilder
// ---------------------------------------------------------------------------

/// Sammelt Listener vor dem Start des Hubs
///
/// Nach [`HubBuilder::bauen`] koennen keine Listener mehr hinzugefuegt werden.
pub struct HubBuilder {
    config: HubConfig,
    metriken: HubMetrics,
    listener: ListenerBus,
}

impl HubBuilder {
    /// Haengt einen Request-Listener an die Authentifizierungskette an
    pub fn auf_anfrage<F, Fut>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(Arc<UpgradeAnfrage>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Klassifizierung>> + Send + 'static,
    {
        self.listener
            .request
            .push(Box::new(move |anfrage| listener(anfrage).boxed()));
        self
    }

    /// Haengt einen Listener fuer eingehende Nachrichten an
    pub fn auf_nachricht<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&ConnectionHub, &Arc<Connection>, &HubNachricht) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.listener.message.push(Box::new(listener));
        self
    }

    /// Haengt einen Listener fuer Statuswechsel an
    pub fn auf_status<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&ConnectionHub, &Arc<Connection>, VerbindungsStatus) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.listener.status.push(Box::new(listener));
        self
    }

    pub fn bauen(self) -> Arc<ConnectionHub> {
        let (anfragen, nachrichten, status) = self.listener.anzahl();
        tracing::debug!(anfragen, nachrichten, status, "Listener registriert");

        Arc::new(ConnectionHub {
            registry: ClientRegistry::neu(),
            dispatcher: MessageDispatcher::neu(self.metriken.clone()),
            listener: self.listener,
            metriken: self.metriken,
            plaetze: Arc::new(AtomicUsize::new(0)),
            config: self.config,
        })
    }
}

// ---------------------------------------------------------------------------
// Verbindungsplaetze
// ---------------------------------------------------------------------------

/// Reservierter Platz fuer eine Verbindung (laufendes Upgrade oder offen)
///
/// Wird beim Drop wieder freigegeben.
#[derive(Debug)]
pub struct VerbindungsPlatz {
    plaetze: Arc<AtomicUsize>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.plaetze.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// ConnectionHub
// ---------------------------------------------------------------------------

/// Der Connection Hub
///
/// Wird einmal pro Prozess von der Composition-Root gebaut und per `Arc`
/// geteilt. Listener erhalten bei jedem Aufruf eine Referenz darauf.
pub struct ConnectionHub {
    registry: ClientRegistry,
    listener: ListenerBus,
    dispatcher: MessageDispatcher,
    metriken: HubMetrics,
    plaetze: Arc<AtomicUsize>,
    config: HubConfig,
}

impl ConnectionHub {
    pub fn builder(config: HubConfig, metriken: HubMetrics) -> HubBuilder {
        HubBuilder {
            config,
            metriken,
            listener: ListenerBus::default(),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn metriken(&self) -> &HubMetrics {
        &self.metriken
    }

    // -----------------------------------------------------------------------
    // Upgrade und Lebenszyklus
    // -----------------------------------------------------------------------

    /// Reserviert einen Verbindungsplatz, `None` wenn `max_clients` erreicht
    pub fn platz_reservieren(&self) -> Option<VerbindungsPlatz> {
        let max = self.config.max_clients;
        self.plaetze
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |belegt| {
                (belegt < max).then_some(belegt + 1)
            })
            .ok()
            .map(|_| VerbindungsPlatz {
                plaetze: Arc::clone(&self.plaetze),
            })
    }

    /// Fuehrt die Authentifizierungskette fuer eine Upgrade-Anfrage aus
    pub async fn authentifizieren(&self, anfrage: Arc<UpgradeAnfrage>) -> Klassifizierung {
        let klassifizierung = self
            .listener
            .anfrage_klassifizieren(Arc::clone(&anfrage), &self.metriken)
            .await;

        match klassifizierung.typ {
            Some(typ) => {
                tracing::debug!(peer = %anfrage.remote_addr, typ = %typ, "Anfrage klassifiziert")
            }
            None => tracing::info!(peer = %anfrage.remote_addr, "Anfrage nicht klassifiziert"),
        }
        klassifizierung
    }

    /// Nimmt eine Verbindung in die Registry auf und meldet `open`
    pub fn zulassen(&self, verbindung: &Arc<Connection>) -> HubResult<()> {
        self.registry.zulassen(verbindung)?;
        self.metriken.client_verbunden(verbindung.typ().als_str());
        tracing::info!(
            verbindung = %verbindung.id(),
            typ = %verbindung.typ(),
            ip = %verbindung.ip(),
            "Verbindung zugelassen"
        );

        self.listener
            .status_melden(self, verbindung, VerbindungsStatus::Open);
        Ok(())
    }

    /// Verarbeitet einen eingehenden Text-Frame
    ///
    /// Nach dem Verlassen von `Offen` werden Frames ignoriert. Fehlerhafte
    /// Nachrichten werden geloggt und verworfen, die Verbindung bleibt offen.
    pub fn eingang(&self, verbindung: &Arc<Connection>, text: &str) {
        if !verbindung.ist_offen() {
            tracing::debug!(verbindung = %verbindung.id(), "Frame nach dem Schliessen ignoriert");
            return;
        }

        match HubNachricht::aus_json(text) {
            Ok(nachricht) => {
                tracing::trace!(verbindung = %verbindung.id(), typ = nachricht.typ(), "Nachricht empfangen");
                self.listener.nachricht_melden(self, verbindung, &nachricht);
            }
            Err(e) => {
                tracing::warn!(verbindung = %verbindung.id(), fehler = %e, "Fehlerhafte Nachricht verworfen");
                self.metriken.malformed_messages_total.inc();
            }
        }
    }

    /// Entfernt eine Verbindung und meldet `close` bzw. `error`
    ///
    /// Gibt `false` zurueck wenn die Verbindung nicht (mehr) in der Registry
    /// war, dann feuern auch keine Listener.
    pub fn trennen(&self, id: ConnectionId, status: VerbindungsStatus) -> bool {
        let Some(verbindung) = self.registry.entfernen(id) else {
            return false;
        };
        self.metriken.client_getrennt(verbindung.typ().als_str());
        tracing::info!(
            verbindung = %id,
            typ = %verbindung.typ(),
            status = %status,
            "Verbindung getrennt"
        );

        self.listener.status_melden(self, &verbindung, status);
        verbindung.zustand_setzen(VerbindungsZustand::Geschlossen);
        true
    }

    /// Fordert alle offenen Verbindungen zum Schliessen auf
    pub fn alle_schliessen(&self) {
        for verbindung in self.registry.alle() {
            verbindung.schliessen();
        }
    }

    /// Wartet bis keine Verbindung mehr offen ist oder `frist` abgelaufen ist
    pub async fn warten_bis_leer(&self, frist: Duration) -> bool {
        let ende = tokio::time::Instant::now() + frist;
        while self.registry.anzahl() > 0 {
            if tokio::time::Instant::now() >= ende {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        true
    }

    // -----------------------------------------------------------------------
    // Registry-Abfragen
    // -----------------------------------------------------------------------

    pub fn clients(&self) -> Vec<Arc<Connection>> {
        self.registry.alle()
    }

    pub fn clients_wo(&self, typ: ClientTyp) -> Vec<Arc<Connection>> {
        self.registry.wo(typ)
    }

    pub fn verbindung(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.registry.get(id)
    }

    pub fn anzahl(&self) -> usize {
        self.registry.anzahl()
    }

    pub fn anzahl_wo(&self, typ: ClientTyp) -> usize {
        self.registry.anzahl_wo(typ)
    }

    // -----------------------------------------------------------------------
    // Senden
    // -----------------------------------------------------------------------

    /// Sendet an eine Verbindung, gibt die vergebene `message_id` zurueck
    pub fn senden_an<N: Serialize + ?Sized>(
        &self,
        verbindung: &Connection,
        nachricht: &N,
    ) -> HubResult<String> {
        self.dispatcher.senden_an(verbindung, nachricht)
    }

    /// Sendet an eine beliebige Liste von Verbindungen
    pub fn senden_an_mehrere<N: Serialize + ?Sized>(
        &self,
        verbindungen: &[Arc<Connection>],
        nachricht: &N,
    ) -> SendeBericht {
        self.dispatcher.an_mehrere(verbindungen, nachricht)
    }

    /// Sendet an alle offenen Verbindungen
    pub fn an_alle_senden<N: Serialize + ?Sized>(&self, nachricht: &N) -> SendeBericht {
        self.dispatcher.an_mehrere(&self.registry.alle(), nachricht)
    }

    /// Sendet an alle offenen Verbindungen, fuer die `filter` zutrifft
    pub fn an_alle_wo<N, F>(&self, filter: F, nachricht: &N) -> SendeBericht
    where
        N: Serialize + ?Sized,
        F: Fn(&Connection) -> bool,
    {
        let ziele: Vec<Arc<Connection>> = self
            .registry
            .alle()
            .into_iter()
            .filter(|c| filter(c.as_ref()))
            .collect();
        self.dispatcher.an_mehrere(&ziele, nachricht)
    }

    /// Sendet an alle offenen Verbindungen eines Typs
    pub fn an_typ_senden<N: Serialize + ?Sized>(&self, typ: ClientTyp, nachricht: &N) -> SendeBericht {
        self.dispatcher.an_mehrere(&self.registry.wo(typ), nachricht)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_hilfen::{anfrage, test_hub_builder, test_verbindung};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn letzter_klassifizierender_listener_gewinnt() {
        let mut builder = test_hub_builder();
        builder
            .auf_anfrage(|_| async { Ok(Klassifizierung::als(ClientTyp::Device)) })
            .auf_anfrage(|a: Arc<UpgradeAnfrage>| async move {
                Ok(match a.token() {
                    Some("gueltig") => Klassifizierung::mit_daten(ClientTyp::Admin, json!({"name": "ops"})),
                    _ => Klassifizierung::keine(),
                })
            });
        let hub = builder.bauen();

        let mit_token = hub.authentifizieren(anfrage(&[("token", "gueltig")])).await;
        assert_eq!(mit_token.typ, Some(ClientTyp::Admin));
        assert_eq!(mit_token.aux_data, Some(json!({"name": "ops"})));

        let ohne_token = hub.authentifizieren(anfrage(&[])).await;
        assert_eq!(ohne_token.typ, Some(ClientTyp::Device));
        assert!(ohne_token.aux_data.is_none());
    }

    #[tokio::test]
    async fn ohne_listener_abgelehnt() {
        let hub = test_hub_builder().bauen();
        assert!(!hub.authentifizieren(anfrage(&[])).await.ist_klassifiziert());
    }

    #[tokio::test]
    async fn fehlschlagender_request_listener_zaehlt_als_keine() {
        let mut builder = test_hub_builder();
        builder
            .auf_anfrage(|_| async { Ok(Klassifizierung::als(ClientTyp::Device)) })
            .auf_anfrage(|_| async { Err(anyhow::anyhow!("Verifier nicht erreichbar")) });
        let hub = builder.bauen();

        let k = hub.authentifizieren(anfrage(&[])).await;
        assert_eq!(k.typ, Some(ClientTyp::Device));
        assert_eq!(
            hub.metriken()
                .listener_failures_total
                .with_label_values(&["request"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn panic_im_request_listener_isoliert() {
        let mut builder = test_hub_builder();
        builder
            .auf_anfrage(|_| async { Ok(Klassifizierung::als(ClientTyp::Admin)) })
            .auf_anfrage(|_| async {
                if true {
                    panic!("kaputt");
                }
                Ok(Klassifizierung::keine())
            });
        let hub = builder.bauen();

        assert_eq!(hub.authentifizieren(anfrage(&[])).await.typ, Some(ClientTyp::Admin));
    }

    #[test]
    fn lebenszyklus_ereignisse_in_reihenfolge() {
        let ereignisse = Arc::new(Mutex::new(Vec::<String>::new()));
        let mut builder = test_hub_builder();
        {
            let e = Arc::clone(&ereignisse);
            builder.auf_status(move |_, _, status| {
                e.lock().push(format!("status:{status}"));
                Ok(())
            });
        }
        {
            let e = Arc::clone(&ereignisse);
            builder.auf_nachricht(move |_, _, n| {
                e.lock().push(format!("nachricht:{}", n.typ()));
                Ok(())
            });
        }
        let hub = builder.bauen();
        let (conn, _rx) = test_verbindung(ClientTyp::Device);

        // Vor dem Zulassen keine Nachrichten
        hub.eingang(&conn, r#"{"type":"ping"}"#);
        hub.zulassen(&conn).unwrap();
        hub.eingang(&conn, r#"{"type":"ping"}"#);
        assert!(hub.trennen(conn.id(), VerbindungsStatus::Close));
        // Nach dem Trennen keine Nachrichten mehr
        hub.eingang(&conn, r#"{"type":"ping"}"#);
        assert!(!hub.trennen(conn.id(), VerbindungsStatus::Error));

        assert_eq!(
            *ereignisse.lock(),
            vec!["status:open", "nachricht:ping", "status:close"]
        );
        assert_eq!(conn.zustand(), VerbindungsZustand::Geschlossen);
    }

    #[test]
    fn registry_leer_bevor_close_listener_laufen() {
        let gesehen = Arc::new(Mutex::new(None));
        let mut builder = test_hub_builder();
        {
            let gesehen = Arc::clone(&gesehen);
            builder.auf_status(move |hub, conn, status| {
                if status.ist_ende() {
                    *gesehen.lock() = Some((hub.verbindung(conn.id()).is_some(), conn.zustand()));
                }
                Ok(())
            });
        }
        let hub = builder.bauen();
        let (conn, _rx) = test_verbindung(ClientTyp::Device);
        hub.zulassen(&conn).unwrap();
        hub.trennen(conn.id(), VerbindungsStatus::Error);

        assert_eq!(
            *gesehen.lock(),
            Some((false, VerbindungsZustand::Schliessend))
        );
    }

    #[test]
    fn fehlerhafte_nachricht_wird_verworfen() {
        let aufrufe = Arc::new(AtomicUsize::new(0));
        let mut builder = test_hub_builder();
        {
            let aufrufe = Arc::clone(&aufrufe);
            builder.auf_nachricht(move |_, _, _| {
                aufrufe.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        let hub = builder.bauen();
        let (conn, _rx) = test_verbindung(ClientTyp::Device);
        hub.zulassen(&conn).unwrap();

        hub.eingang(&conn, "kein json");
        hub.eingang(&conn, r#"{"type":"unbekannt"}"#);
        hub.eingang(&conn, r#"{"type":"log","data":{}}"#);

        assert_eq!(aufrufe.load(Ordering::SeqCst), 1);
        assert_eq!(hub.metriken().malformed_messages_total.get(), 2);
        assert!(conn.ist_offen());
    }

    #[test]
    fn fehlschlagender_listener_haelt_nachfolger_nicht_auf() {
        let zweiter = Arc::new(AtomicUsize::new(0));
        let mut builder = test_hub_builder();
        builder.auf_status(|_, _, _| Err(anyhow::anyhow!("erster kaputt")));
        builder.auf_status(|_, _, _| panic!("zweiter kaputt"));
        {
            let zweiter = Arc::clone(&zweiter);
            builder.auf_status(move |_, _, _| {
                zweiter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }
        let hub = builder.bauen();
        let (conn, _rx) = test_verbindung(ClientTyp::Admin);

        hub.zulassen(&conn).unwrap();
        hub.trennen(conn.id(), VerbindungsStatus::Close);

        assert_eq!(zweiter.load(Ordering::SeqCst), 2);
        assert_eq!(
            hub.metriken()
                .listener_failures_total
                .with_label_values(&["status"])
                .get(),
            4
        );
    }

    #[test]
    fn listener_kann_antworten() {
        let mut builder = test_hub_builder();
        builder.auf_nachricht(|hub, conn, n| {
            if let HubNachricht::Ping { data } = n {
                hub.senden_an(conn, &HubNachricht::pong(data.clone()))?;
            }
            Ok(())
        });
        let hub = builder.bauen();
        let (conn, mut rx) = test_verbindung(ClientTyp::Device);
        hub.zulassen(&conn).unwrap();

        hub.eingang(&conn, r#"{"type":"ping","data":"x"}"#);

        let frame: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "pong");
        assert_eq!(frame["data"], "x");
        assert!(!frame["message_id"].as_str().unwrap().is_empty());
    }

    #[test]
    fn broadcast_an_typ_und_filter() {
        let hub = test_hub_builder().bauen();
        let (device, mut rx_device) = test_verbindung(ClientTyp::Device);
        let (admin, mut rx_admin) = test_verbindung(ClientTyp::Admin);
        hub.zulassen(&device).unwrap();
        hub.zulassen(&admin).unwrap();

        let bericht = hub.an_typ_senden(ClientTyp::Admin, &HubNachricht::hello_ok());
        assert_eq!(bericht.erfolgreich, vec![admin.id()]);
        assert!(rx_device.try_recv().is_err());
        assert!(rx_admin.try_recv().is_ok());

        let bericht = hub.an_alle_wo(|c| c.ip() == "127.0.0.1", &HubNachricht::hello_ok());
        assert_eq!(bericht.versucht(), 2);

        let bericht = hub.an_alle_senden(&HubNachricht::hello_ok());
        assert!(bericht.ist_vollstaendig());
        assert_eq!(bericht.versucht(), 2);
    }

    #[test]
    fn broadcast_mit_einem_defekten_transport() {
        let hub = test_hub_builder().bauen();
        let mut empfaenger = Vec::new();
        let mut defekt = None;
        for i in 0..5 {
            let (conn, rx) = test_verbindung(ClientTyp::Admin);
            hub.zulassen(&conn).unwrap();
            if i == 2 {
                defekt = Some(conn.id());
                drop(rx);
            } else {
                empfaenger.push(rx);
            }
        }

        let bericht = hub.an_alle_senden(&HubNachricht::hello_ok());

        assert_eq!(bericht.versucht(), 5);
        assert_eq!(bericht.erfolgreich.len(), 4);
        assert_eq!(bericht.fehlgeschlagen.len(), 1);
        assert_eq!(Some(bericht.fehlgeschlagen[0].0), defekt);
        for mut rx in empfaenger {
            assert!(rx.try_recv().is_ok());
        }
    }

    #[test]
    fn plaetze_werden_begrenzt_und_freigegeben() {
        let hub = ConnectionHub::builder(
            HubConfig {
                max_clients: 2,
                ..HubConfig::default()
            },
            HubMetrics::neu().unwrap(),
        )
        .bauen();

        let a = hub.platz_reservieren().expect("erster Platz");
        let _b = hub.platz_reservieren().expect("zweiter Platz");
        assert!(hub.platz_reservieren().is_none());

        drop(a);
        assert!(hub.platz_reservieren().is_some());
    }

    #[test]
    fn gleichzeitiges_trennen_waehrend_broadcast() {
        let hub = test_hub_builder().bauen();
        let mut verbindungen = Vec::new();
        for _ in 0..50 {
            let (conn, rx) = test_verbindung(ClientTyp::Admin);
            hub.zulassen(&conn).unwrap();
            verbindungen.push((conn, rx));
        }

        let ids: Vec<ConnectionId> = verbindungen.iter().map(|(c, _)| c.id()).collect();

        std::thread::scope(|s| {
            s.spawn(|| {
                for id in &ids {
                    hub.trennen(*id, VerbindungsStatus::Close);
                }
            });
            s.spawn(|| {
                for _ in 0..20 {
                    let bericht = hub.an_alle_senden(&HubNachricht::hello_ok());
                    for (_, fehler) in &bericht.fehlgeschlagen {
                        assert!(matches!(
                            fehler,
                            crate::HubError::NichtOffen(_) | crate::HubError::QueueVoll(_)
                        ));
                    }
                }
            });
        });

        assert_eq!(hub.anzahl(), 0);
        for (conn, _rx) in verbindungen {
            assert_eq!(conn.zustand(), VerbindungsZustand::Geschlossen);
            assert!(conn.einreihen("x".into()).is_err());
        }
    }
}
