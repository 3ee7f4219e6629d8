//! Geraete-Manager – Klassifizierung und Protokoll der Geraete-Verbindungen
//!
//! - Request-Listener: Anfragen ohne `token` werden als `device`
//!   klassifiziert, der Datensatz wird angelegt bzw. aktualisiert
//! - Status-Listener: begruesst neue Geraete mit `hello`
//! - Message-Listener: beantwortet `ping` mit `pong`

use devicehub_core::{ClientTyp, VerbindungsStatus};
use devicehub_db::DeviceRepository;
use devicehub_hub::{Connection, ConnectionHub, HubBuilder, Klassifizierung, UpgradeAnfrage};
use devicehub_protocol::HubNachricht;
use serde::Serialize;
use std::sync::Arc;

/// Eintrag der Online-Liste
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OnlineGeraet {
    pub ip: String,
    pub device_name: String,
}

pub struct GeraeteManager {
    repo: Arc<dyn DeviceRepository>,
}

impl GeraeteManager {
    pub fn neu(repo: Arc<dyn DeviceRepository>) -> Arc<Self> {
        Arc::new(Self { repo })
    }

    /// Registriert die drei Listener am Hub-Builder
    pub fn registrieren(self: &Arc<Self>, builder: &mut HubBuilder) {
        let manager = Arc::clone(self);
        builder
            .auf_anfrage(move |anfrage| {
                let manager = Arc::clone(&manager);
                async move { manager.klassifizieren(&anfrage).await }
            })
            .auf_status(status_geaendert)
            .auf_nachricht(nachricht_empfangen);
    }

    /// Klassifiziert eine Upgrade-Anfrage als Geraet
    ///
    /// Anfragen mit `token` gehoeren dem Admin-Manager. Der Geraetename ist
    /// der `name`-Parameter oder, falls nicht gesetzt, die Client-IP.
    pub async fn klassifizieren(&self, anfrage: &UpgradeAnfrage) -> anyhow::Result<Klassifizierung> {
        if anfrage.token().is_some() {
            return Ok(Klassifizierung::keine());
        }

        let name = anfrage.param("name").unwrap_or(&anfrage.ip);
        let geraet = self.repo.get_or_create_and_touch(name, &anfrage.ip).await?;
        tracing::info!(
            geraet = %geraet.name,
            device_id = geraet.device_id,
            ip = %anfrage.ip,
            "Geraet authentifiziert"
        );

        Ok(Klassifizierung::mit_daten(
            ClientTyp::Device,
            serde_json::to_value(&geraet)?,
        ))
    }
}

fn status_geaendert(
    hub: &ConnectionHub,
    verbindung: &Arc<Connection>,
    status: VerbindungsStatus,
) -> anyhow::Result<()> {
    if verbindung.typ() == ClientTyp::Device && status == VerbindungsStatus::Open {
        hub.senden_an(verbindung, &HubNachricht::hello_ok())?;
    }
    Ok(())
}

fn nachricht_empfangen(
    hub: &ConnectionHub,
    verbindung: &Arc<Connection>,
    nachricht: &HubNachricht,
) -> anyhow::Result<()> {
    if verbindung.typ() != ClientTyp::Device {
        return Ok(());
    }

    match nachricht {
        HubNachricht::Ping { data } => {
            hub.senden_an(verbindung, &HubNachricht::pong(data.clone()))?;
        }
        HubNachricht::Hello { data, .. } => {
            tracing::info!(
                verbindung = %verbindung.id(),
                geraet = geraetename(verbindung).unwrap_or_default(),
                data = %data,
                "Hello vom Geraet"
            );
        }
        _ => {}
    }
    Ok(())
}

fn geraetename(verbindung: &Connection) -> Option<&str> {
    verbindung.aux_data()?.get("name")?.as_str()
}

// ---------------------------------------------------------------------------
// Verwaltung
// ---------------------------------------------------------------------------

/// IP und Name aller verbundenen Geraete
pub fn online_geraete(hub: &ConnectionHub) -> Vec<OnlineGeraet> {
    hub.clients_wo(ClientTyp::Device)
        .iter()
        .map(|c| OnlineGeraet {
            ip: c.ip().to_string(),
            device_name: geraetename(c).unwrap_or_default().to_string(),
        })
        .collect()
}

/// Trennt alle Geraete mit der gegebenen IP, liefert die Anzahl
pub fn geraet_trennen_nach_ip(hub: &ConnectionHub, ip: &str) -> usize {
    geraete_trennen(hub, |c| c.ip() == ip)
}

/// Trennt alle Geraete mit dem gegebenen Namen, liefert die Anzahl
pub fn geraet_trennen_nach_name(hub: &ConnectionHub, name: &str) -> usize {
    geraete_trennen(hub, |c| geraetename(c) == Some(name))
}

fn geraete_trennen(hub: &ConnectionHub, filter: impl Fn(&Connection) -> bool) -> usize {
    let mut anzahl = 0;
    for verbindung in hub.clients_wo(ClientTyp::Device) {
        if filter(&verbindung) {
            tracing::info!(verbindung = %verbindung.id(), ip = %verbindung.ip(), "Geraet wird getrennt");
            verbindung.schliessen();
            anzahl += 1;
        }
    }
    anzahl
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use devicehub_db::SqliteDb;
    use devicehub_hub::HubConfig;
    use devicehub_observability::HubMetrics;
    use std::collections::HashMap;

    async fn manager() -> Arc<GeraeteManager> {
        let db = SqliteDb::in_memory().await.unwrap();
        GeraeteManager::neu(Arc::new(db))
    }

    fn anfrage(query: &[(&str, &str)]) -> UpgradeAnfrage {
        let query: HashMap<String, String> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        UpgradeAnfrage::neu(query, HeaderMap::new(), "192.168.1.20:40000".parse().unwrap(), false)
    }

    #[tokio::test]
    async fn anfrage_mit_token_wird_ignoriert() {
        let m = manager().await;
        let k = m.klassifizieren(&anfrage(&[("token", "x")])).await.unwrap();
        assert!(!k.ist_klassifiziert());
    }

    #[tokio::test]
    async fn name_faellt_auf_ip_zurueck() {
        let m = manager().await;
        let k = m.klassifizieren(&anfrage(&[])).await.unwrap();
        assert_eq!(k.typ, Some(ClientTyp::Device));
        let aux = k.aux_data.unwrap();
        assert_eq!(aux["name"], "192.168.1.20");
        assert_eq!(aux["ip"], "192.168.1.20");
        assert!(!aux["connect_time"].is_null());
    }

    #[tokio::test]
    async fn wiederholte_verbindung_nutzt_denselben_datensatz() {
        let m = manager().await;
        let erste = m.klassifizieren(&anfrage(&[("name", "sensor-1")])).await.unwrap();
        let zweite = m.klassifizieren(&anfrage(&[("name", "sensor-1")])).await.unwrap();

        let erste = erste.aux_data.unwrap();
        let zweite = zweite.aux_data.unwrap();
        assert_eq!(erste["device_id"], zweite["device_id"]);
        assert_eq!(zweite["name"], "sensor-1");
    }

    #[test]
    fn online_liste_und_trennen() {
        let hub = ConnectionHub::builder(HubConfig::default(), HubMetrics::neu().unwrap()).bauen();
        let mut queues = Vec::new();
        for (name, ip) in [("a", "10.0.0.1"), ("b", "10.0.0.2"), ("c", "10.0.0.1")] {
            let (conn, rx) = Connection::neu(
                "10.0.0.1:1000".parse().unwrap(),
                ip,
                ClientTyp::Device,
                Some(serde_json::json!({ "name": name })),
                4,
            );
            hub.zulassen(&conn).unwrap();
            queues.push((conn, rx));
        }

        let mut online = online_geraete(&hub);
        online.sort_by(|a, b| a.device_name.cmp(&b.device_name));
        assert_eq!(
            online,
            vec![
                OnlineGeraet { ip: "10.0.0.1".into(), device_name: "a".into() },
                OnlineGeraet { ip: "10.0.0.2".into(), device_name: "b".into() },
                OnlineGeraet { ip: "10.0.0.1".into(), device_name: "c".into() },
            ]
        );

        assert_eq!(geraet_trennen_nach_ip(&hub, "10.0.0.1"), 2);
        assert_eq!(geraet_trennen_nach_name(&hub, "b"), 1);
        assert_eq!(geraet_trennen_nach_name(&hub, "unbekannt"), 0);
        for (conn, _) in &queues {
            assert!(*conn.schliessen_signal().borrow());
        }
    }
}
