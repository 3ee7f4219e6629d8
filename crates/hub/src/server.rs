//! WebSocket-Server – Upgrade-Endpunkt und Transport-Task pro Verbindung
//!
//! Pro zugelassener Verbindung laufen zwei Tasks:
//! - der Lese-Loop (im Upgrade-Future), der eingehende Frames an den Hub
//!   weitergibt und ueber das Ende der Verbindung entscheidet
//! - der Schreib-Task, der die Ausgangs-Queue leert und Keepalive-Pings sendet

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use devicehub_core::{ClientTyp, ConnectionId, VerbindungsStatus};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::auth::UpgradeAnfrage;
use crate::connection::Connection;
use crate::hub::{ConnectionHub, VerbindungsPlatz};

#[derive(Clone)]
struct WsState {
    hub: Arc<ConnectionHub>,
    shutdown_rx: watch::Receiver<bool>,
}

/// Router mit dem WebSocket-Endpunkt auf `/` und `/ws`
pub fn ws_router(hub: Arc<ConnectionHub>, shutdown_rx: watch::Receiver<bool>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(WsState { hub, shutdown_rx })
}

/// Startet den HTTP-Server fuer `app` auf `listener`
///
/// Der Router muss `ConnectInfo<SocketAddr>` bereitstellen koennen, daher
/// wird er hier mit `into_make_service_with_connect_info` gestartet.
/// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt.
pub async fn starten(
    listener: TcpListener,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let adresse = listener.local_addr()?;
    tracing::info!(adresse = %adresse, "Hub-Server gestartet");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        while !*shutdown_rx.borrow() {
            if shutdown_rx.changed().await.is_err() {
                break;
            }
        }
        tracing::info!("Hub-Server: Shutdown-Signal empfangen");
    })
    .await?;

    tracing::info!("Hub-Server gestoppt");
    Ok(())
}

// ---------------------------------------------------------------------------
// Upgrade
// ---------------------------------------------------------------------------

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<WsState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let hub = &state.hub;

    if *state.shutdown_rx.borrow() {
        hub.metriken().upgrade_abgelehnt("shutdown");
        return ablehnen(StatusCode::SERVICE_UNAVAILABLE, "server shutting down");
    }

    let Some(platz) = hub.platz_reservieren() else {
        tracing::warn!(
            peer = %remote_addr,
            max = hub.config().max_clients,
            "Server voll – Upgrade abgelehnt"
        );
        hub.metriken().upgrade_abgelehnt("limit");
        return ablehnen(StatusCode::SERVICE_UNAVAILABLE, "connection limit reached");
    };

    let anfrage = Arc::new(UpgradeAnfrage::neu(
        query,
        headers,
        remote_addr,
        hub.config().forwarded_header_vertrauen,
    ));
    let klassifizierung = hub.authentifizieren(Arc::clone(&anfrage)).await;

    let Some(typ) = klassifizierung.typ else {
        hub.metriken().upgrade_abgelehnt("unklassifiziert");
        return ablehnen(StatusCode::UNAUTHORIZED, "unauthorized");
    };

    let hub = Arc::clone(&state.hub);
    let shutdown_rx = state.shutdown_rx.clone();
    let aux_data = klassifizierung.aux_data;
    ws.on_upgrade(move |socket| {
        verbindung_verarbeiten(socket, hub, shutdown_rx, anfrage, typ, aux_data, platz)
    })
    .into_response()
}

fn ablehnen(status: StatusCode, grund: &str) -> Response {
    (status, Json(json!({ "error": grund }))).into_response()
}

// ---------------------------------------------------------------------------
// Transport-Task
// ---------------------------------------------------------------------------

async fn verbindung_verarbeiten(
    socket: WebSocket,
    hub: Arc<ConnectionHub>,
    shutdown_rx: watch::Receiver<bool>,
    anfrage: Arc<UpgradeAnfrage>,
    typ: ClientTyp,
    aux_data: Option<Value>,
    _platz: VerbindungsPlatz,
) {
    let (verbindung, queue_rx) = Connection::neu(
        anfrage.remote_addr,
        anfrage.ip.clone(),
        typ,
        aux_data,
        hub.config().send_queue_groesse,
    );
    let (sender, mut receiver) = socket.split();

    let (ende_tx, ende_rx) = watch::channel(false);
    let keepalive = Duration::from_secs(hub.config().keepalive_sek);
    let schreiber = tokio::spawn(schreiben(sender, queue_rx, ende_rx, keepalive, verbindung.id()));

    if let Err(e) = hub.zulassen(&verbindung) {
        tracing::error!(verbindung = %verbindung.id(), fehler = %e, "Zulassen fehlgeschlagen");
        ende_tx.send_replace(true);
        let _ = schreiber.await;
        return;
    }

    let status = lesen(&hub, &verbindung, &mut receiver, shutdown_rx).await;
    hub.trennen(verbindung.id(), status);

    ende_tx.send_replace(true);
    if let Err(e) = schreiber.await {
        tracing::error!(verbindung = %verbindung.id(), fehler = %e, "Schreib-Task abgebrochen");
    }
}

/// Liest Frames bis die Verbindung endet und liefert den End-Status
async fn lesen(
    hub: &ConnectionHub,
    verbindung: &Arc<Connection>,
    receiver: &mut SplitStream<WebSocket>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> VerbindungsStatus {
    let timeout = Duration::from_secs(hub.config().verbindungs_timeout_sek);
    let mut schliessen_rx = verbindung.schliessen_signal();
    let mut shutdown_aktiv = true;
    let mut letzte_aktivitaet = Instant::now();

    if *shutdown_rx.borrow() {
        return VerbindungsStatus::Close;
    }

    loop {
        tokio::select! {
            frame = receiver.next() => {
                letzte_aktivitaet = Instant::now();
                match frame {
                    Some(Ok(Message::Text(text))) => hub.eingang(verbindung, &text),
                    Some(Ok(Message::Binary(daten))) => match String::from_utf8(daten) {
                        Ok(text) => hub.eingang(verbindung, &text),
                        Err(_) => {
                            tracing::warn!(verbindung = %verbindung.id(), "Binaer-Frame ist kein UTF-8 – verworfen");
                            hub.metriken().malformed_messages_total.inc();
                        }
                    },
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(verbindung = %verbindung.id(), "Verbindung vom Client geschlossen");
                        return VerbindungsStatus::Close;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(verbindung = %verbindung.id(), fehler = %e, "Transport-Fehler");
                        return VerbindungsStatus::Error;
                    }
                }
            }

            _ = tokio::time::sleep_until(letzte_aktivitaet + timeout), if !timeout.is_zero() => {
                tracing::warn!(
                    verbindung = %verbindung.id(),
                    timeout_sek = timeout.as_secs(),
                    "Verbindungs-Timeout"
                );
                return VerbindungsStatus::Error;
            }

            ergebnis = schliessen_rx.changed() => {
                if ergebnis.is_err() || *schliessen_rx.borrow() {
                    tracing::debug!(verbindung = %verbindung.id(), "Verbindung serverseitig geschlossen");
                    return VerbindungsStatus::Close;
                }
            }

            ergebnis = shutdown_rx.changed(), if shutdown_aktiv => {
                match ergebnis {
                    Ok(()) if *shutdown_rx.borrow() => return VerbindungsStatus::Close,
                    Ok(()) => {}
                    Err(_) => shutdown_aktiv = false,
                }
            }
        }
    }
}

/// Leert die Ausgangs-Queue in den Socket
///
/// Nach dem Ende-Signal werden bereits eingereihte Frames noch gesendet,
/// danach folgt ein Close-Frame.
async fn schreiben(
    mut sender: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<String>,
    mut ende_rx: watch::Receiver<bool>,
    keepalive: Duration,
    id: ConnectionId,
) {
    let mut ticker = (!keepalive.is_zero()).then(|| {
        let mut ticker = tokio::time::interval_at(Instant::now() + keepalive, keepalive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        tokio::select! {
            frame = queue.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sender.send(Message::Text(frame)).await {
                    tracing::debug!(verbindung = %id, fehler = %e, "Senden fehlgeschlagen");
                    return;
                }
            }
            _ = naechster_tick(&mut ticker) => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
            }
            _ = ende_rx.changed() => break,
        }
    }

    queue.close();
    while let Ok(frame) = queue.try_recv() {
        if sender.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }
    let _ = sender.send(Message::Close(None)).await;
    let _ = sender.close().await;
}

async fn naechster_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
