//! Prometheus-kompatible Metriken fuer den devicehub
//!
//! Registrierte Metriken:
//! - `devicehub_connected_clients{typ}` – Gauge: offene Verbindungen je Client-Typ
//! - `devicehub_rejected_upgrades_total{grund}` – Counter: abgelehnte Upgrades
//! - `devicehub_messages_sent_total` – Counter: erfolgreich eingereihte Nachrichten
//! - `devicehub_send_failures_total` – Counter: fehlgeschlagene Sendeversuche
//! - `devicehub_malformed_messages_total` – Counter: verworfene Eingangsnachrichten
//! - `devicehub_listener_failures_total{art}` – Counter: fehlgeschlagene Listener
//! - `devicehub_http_request_duration_seconds{method,path}` – Histogram: HTTP-Antwortzeit

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Alle Prometheus-Metriken des Hubs
///
/// Jede Instanz hat ihre eigene Registry, damit mehrere Hubs (z.B. in
/// Tests) nebeneinander existieren koennen.
#[derive(Clone)]
pub struct HubMetrics {
    pub registry: Arc<Registry>,

    pub connected_clients: IntGaugeVec,
    pub rejected_upgrades_total: IntCounterVec,
    pub messages_sent_total: IntCounter,
    pub send_failures_total: IntCounter,
    pub malformed_messages_total: IntCounter,
    pub listener_failures_total: IntCounterVec,

    pub http_request_duration_seconds: HistogramVec,
}

impl HubMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let connected_clients = IntGaugeVec::new(
            Opts::new(
                "devicehub_connected_clients",
                "Anzahl offener Verbindungen je Client-Typ",
            ),
            &["typ"],
        )?;
        registry.register(Box::new(connected_clients.clone()))?;

        let rejected_upgrades_total = IntCounterVec::new(
            Opts::new(
                "devicehub_rejected_upgrades_total",
                "Abgelehnte Upgrade-Anfragen",
            ),
            &["grund"],
        )?;
        registry.register(Box::new(rejected_upgrades_total.clone()))?;

        let messages_sent_total = IntCounter::with_opts(Opts::new(
            "devicehub_messages_sent_total",
            "Erfolgreich eingereihte ausgehende Nachrichten",
        ))?;
        registry.register(Box::new(messages_sent_total.clone()))?;

        let send_failures_total = IntCounter::with_opts(Opts::new(
            "devicehub_send_failures_total",
            "Fehlgeschlagene Sendeversuche",
        ))?;
        registry.register(Box::new(send_failures_total.clone()))?;

        let malformed_messages_total = IntCounter::with_opts(Opts::new(
            "devicehub_malformed_messages_total",
            "Verworfene fehlerhafte Eingangsnachrichten",
        ))?;
        registry.register(Box::new(malformed_messages_total.clone()))?;

        let listener_failures_total = IntCounterVec::new(
            Opts::new(
                "devicehub_listener_failures_total",
                "Fehlgeschlagene Listener-Aufrufe",
            ),
            &["art"],
        )?;
        registry.register(Box::new(listener_failures_total.clone()))?;

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "devicehub_http_request_duration_seconds",
                "HTTP-Antwortzeit in Sekunden",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["method", "path"],
        )?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            connected_clients,
            rejected_upgrades_total,
            messages_sent_total,
            send_failures_total,
            malformed_messages_total,
            listener_failures_total,
            http_request_duration_seconds,
        })
    }

    pub fn client_verbunden(&self, typ: &str) {
        self.connected_clients.with_label_values(&[typ]).inc();
    }

    pub fn client_getrennt(&self, typ: &str) {
        self.connected_clients.with_label_values(&[typ]).dec();
    }

    pub fn upgrade_abgelehnt(&self, grund: &str) {
        self.rejected_upgrades_total.with_label_values(&[grund]).inc();
    }

    pub fn listener_fehlgeschlagen(&self, art: &str) {
        self.listener_failures_total.with_label_values(&[art]).inc();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: HubMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<HubMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(fehler = %err, "Metriken-Export fehlgeschlagen");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mehrere_instanzen_moeglich() {
        let a = HubMetrics::neu().unwrap();
        let b = HubMetrics::neu().unwrap();
        a.messages_sent_total.inc();
        assert_eq!(a.messages_sent_total.get(), 1);
        assert_eq!(b.messages_sent_total.get(), 0);
    }

    #[test]
    fn clients_je_typ_zaehlen() {
        let metriken = HubMetrics::neu().unwrap();
        metriken.client_verbunden("device");
        metriken.client_verbunden("device");
        metriken.client_verbunden("admin");
        metriken.client_getrennt("device");

        assert_eq!(metriken.connected_clients.with_label_values(&["device"]).get(), 1);
        assert_eq!(metriken.connected_clients.with_label_values(&["admin"]).get(), 1);
    }

    #[test]
    fn abgelehnte_upgrades_mit_grund() {
        let metriken = HubMetrics::neu().unwrap();
        metriken.upgrade_abgelehnt("unklassifiziert");
        metriken.upgrade_abgelehnt("limit");
        metriken.upgrade_abgelehnt("limit");
        assert_eq!(
            metriken.rejected_upgrades_total.with_label_values(&["limit"]).get(),
            2
        );
    }

    #[test]
    fn export_prometheus_format() {
        let metriken = HubMetrics::neu().unwrap();
        metriken.client_verbunden("admin");
        metriken.listener_fehlgeschlagen("message");
        metriken.malformed_messages_total.inc();

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("devicehub_connected_clients{typ=\"admin\"} 1"));
        assert!(output.contains("devicehub_listener_failures_total{art=\"message\"} 1"));
        assert!(output.contains("devicehub_malformed_messages_total 1"));
        assert!(output.contains("# HELP"));
    }
}
