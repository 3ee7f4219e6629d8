//! devicehub-server – Bibliotheks-Root
//!
//! Composition-Root: baut Datenbank, Admin-Tokens und den Connection Hub
//! auf, registriert die Geraete- und Admin-Listener und stellt den
//! oeffentlichen Einstiegspunkt fuer Integrationstests bereit.

pub mod admin;
pub mod api;
pub mod config;
pub mod devices;

use anyhow::{Context, Result};
use axum::Router;
use config::ServerConfig;
use devicehub_auth::{AdminTokenStore, CredentialVerifier};
use devicehub_db::{DeviceRepository, SqliteDb};
use devicehub_hub::{ws_router, ConnectionHub};
use devicehub_observability::{health_router, observability_server_starten, HealthState, HubMetrics};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::admin::AdminManager;
use crate::api::{api_router, ApiState};
use crate::devices::GeraeteManager;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
    hub: Arc<ConnectionHub>,
    tokens: Arc<AdminTokenStore>,
    db: SqliteDb,
    metriken: HubMetrics,
    health: HealthState,
}

impl Server {
    /// Oeffnet die konfigurierte Datenbank und baut den Server auf
    pub async fn aufbauen(config: ServerConfig) -> Result<Self> {
        let db = SqliteDb::oeffnen(&config.datenbank)
            .await
            .with_context(|| format!("Datenbank '{}' nicht verfuegbar", config.datenbank.url))?;

        let tokens = AdminTokenStore::neu();
        tokens.laden(&config.admin.tokens).await;
        if config.admin.tokens.is_empty() {
            tracing::warn!("Keine Admin-Tokens konfiguriert – Admin-Verbindungen sind nicht moeglich");
        }

        Self::mit_komponenten(config, db, tokens)
    }

    /// Baut den Server aus bereits vorhandenen Komponenten
    pub fn mit_komponenten(
        config: ServerConfig,
        db: SqliteDb,
        tokens: Arc<AdminTokenStore>,
    ) -> Result<Self> {
        let metriken = HubMetrics::neu()?;
        let health = HealthState::neu();
        health.db_status_setzen(true);

        let repo: Arc<dyn DeviceRepository> = Arc::new(db.clone());
        let verifier: Arc<dyn CredentialVerifier> = tokens.clone();

        // Reihenfolge der Registrierung = Reihenfolge der Authentifizierungskette
        let mut builder = ConnectionHub::builder(config.hub.clone(), metriken.clone());
        GeraeteManager::neu(repo).registrieren(&mut builder);
        AdminManager::neu(verifier).registrieren(&mut builder);
        let hub = builder.bauen();

        Ok(Self {
            config,
            hub,
            tokens,
            db,
            metriken,
            health,
        })
    }

    pub fn hub(&self) -> &Arc<ConnectionHub> {
        &self.hub
    }

    pub fn tokens(&self) -> &Arc<AdminTokenStore> {
        &self.tokens
    }

    pub fn metriken(&self) -> &HubMetrics {
        &self.metriken
    }

    /// WebSocket-Upgrade, REST-API und Health auf einem Router
    pub fn router(&self, shutdown_rx: watch::Receiver<bool>) -> Router {
        let api = api_router(
            ApiState {
                hub: Arc::clone(&self.hub),
                verifier: self.tokens.clone(),
            },
            self.metriken.clone(),
            &self.config.netzwerk.cors_origins,
        );

        Router::new()
            .merge(ws_router(Arc::clone(&self.hub), shutdown_rx))
            .merge(api)
            .merge(health_router(self.health.clone()))
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. HTTP-Listener binden (WebSocket + REST)
    /// 2. Observability-Server starten (falls aktiviert)
    /// 3. Auf Ctrl-C warten
    /// 4. Verbindungen schliessen, Listener stoppen, Datenbank schliessen
    pub async fn starten(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let listener = TcpListener::bind(self.config.bind_adresse())
            .await
            .with_context(|| format!("Bind auf {} fehlgeschlagen", self.config.bind_adresse()))?;
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %self.config.bind_adresse(),
            max_clients = self.config.hub.max_clients,
            "Server startet"
        );

        let app = self.router(shutdown_rx.clone());
        let hub_task = tokio::spawn(devicehub_hub::starten(listener, app, shutdown_rx.clone()));

        let obs_task = if self.config.observability.aktiviert {
            let addr: SocketAddr = self
                .config
                .observability_bind_adresse()
                .parse()
                .context("Ungueltige Observability-Adresse")?;
            Some(tokio::spawn(observability_server_starten(
                addr,
                self.metriken.clone(),
                self.health.clone(),
                shutdown_rx.clone(),
            )))
        } else {
            None
        };

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        self.herunterfahren(&shutdown_tx).await;

        hub_task.await.context("Hub-Server-Task abgebrochen")??;
        if let Some(task) = obs_task {
            if let Err(e) = task.await.context("Observability-Task abgebrochen")? {
                tracing::error!(fehler = %e, "Observability-Server beendet mit Fehler");
            }
        }
        self.db.schliessen().await;
        tracing::info!("Server beendet");
        Ok(())
    }

    /// Schliesst alle Verbindungen mit Status `close`
    ///
    /// Wartet hoechstens `server.shutdown_frist_sek` darauf, dass die
    /// Registry leer ist.
    pub async fn herunterfahren(&self, shutdown_tx: &watch::Sender<bool>) {
        self.health.herunterfahren_markieren();
        shutdown_tx.send_replace(true);

        let frist = Duration::from_secs(self.config.server.shutdown_frist_sek);
        if !self.hub.warten_bis_leer(frist).await {
            tracing::warn!(
                offen = self.hub.anzahl(),
                "Nicht alle Verbindungen innerhalb der Frist geschlossen"
            );
        }
    }
}
