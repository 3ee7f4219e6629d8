//! Admin-Manager – Admin-Verbindungen und Weiterleitung an Admins
//!
//! Admins verbinden sich mit `?token=...`. Sie erhalten jeden
//! Statuswechsel eines Geraets als `device_change` und jede `log`-Nachricht
//! eines Geraets, angereichert um dessen Datensatz.

use devicehub_auth::CredentialVerifier;
use devicehub_core::{ClientTyp, VerbindungsStatus};
use devicehub_hub::{Connection, ConnectionHub, HubBuilder, Klassifizierung, UpgradeAnfrage};
use devicehub_protocol::HubNachricht;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct AdminManager {
    verifier: Arc<dyn CredentialVerifier>,
}

impl AdminManager {
    pub fn neu(verifier: Arc<dyn CredentialVerifier>) -> Arc<Self> {
        Arc::new(Self { verifier })
    }

    /// Registriert die drei Listener am Hub-Builder
    pub fn registrieren(self: &Arc<Self>, builder: &mut HubBuilder) {
        let manager = Arc::clone(self);
        builder
            .auf_anfrage(move |anfrage| {
                let manager = Arc::clone(&manager);
                async move { Ok(manager.klassifizieren(&anfrage).await) }
            })
            .auf_status(geraetestatus_weiterleiten)
            .auf_nachricht(log_weiterleiten);
    }

    /// Klassifiziert eine Anfrage mit gueltigem Token als `admin`
    ///
    /// Ein ungueltiges Token ist keine Fehlersituation des Listeners,
    /// sondern schlicht keine Klassifizierung.
    pub async fn klassifizieren(&self, anfrage: &UpgradeAnfrage) -> Klassifizierung {
        let Some(token) = anfrage.token() else {
            return Klassifizierung::keine();
        };

        match self.verifier.verifizieren(token).await {
            Ok(identitaet) => {
                tracing::info!(admin = %identitaet.name, peer = %anfrage.remote_addr, "Admin authentifiziert");
                match serde_json::to_value(&identitaet) {
                    Ok(wert) => Klassifizierung::mit_daten(ClientTyp::Admin, wert),
                    Err(e) => {
                        tracing::warn!(fehler = %e, "Admin-Identitaet nicht serialisierbar");
                        Klassifizierung::als(ClientTyp::Admin)
                    }
                }
            }
            Err(e) => {
                tracing::info!(peer = %anfrage.remote_addr, fehler = %e, "Admin-Token abgelehnt");
                Klassifizierung::keine()
            }
        }
    }
}

fn geraetestatus_weiterleiten(
    hub: &ConnectionHub,
    verbindung: &Arc<Connection>,
    status: VerbindungsStatus,
) -> anyhow::Result<()> {
    if verbindung.typ() != ClientTyp::Device {
        return Ok(());
    }

    let bericht = hub.an_typ_senden(ClientTyp::Admin, &HubNachricht::geraete_aenderung(status));
    if !bericht.ist_vollstaendig() {
        tracing::debug!(
            verbindung = %verbindung.id(),
            fehlgeschlagen = bericht.fehlgeschlagen.len(),
            "device_change nicht an alle Admins zugestellt"
        );
    }
    Ok(())
}

fn log_weiterleiten(
    hub: &ConnectionHub,
    verbindung: &Arc<Connection>,
    nachricht: &HubNachricht,
) -> anyhow::Result<()> {
    let HubNachricht::Log { data, extra } = nachricht else {
        return Ok(());
    };
    if verbindung.typ() != ClientTyp::Device {
        return Ok(());
    }

    let geraet = verbindung.aux_data().cloned().unwrap_or(Value::Null);
    let weiterleitung = HubNachricht::Log {
        data: mit_geraet(data.clone(), geraet),
        extra: extra.clone(),
    };
    hub.an_typ_senden(ClientTyp::Admin, &weiterleitung);
    Ok(())
}

/// Haengt den Geraete-Datensatz als `device` an die Log-Daten
///
/// Nicht-Objekte werden als `{ "message": <data>, "device": ... }`
/// verpackt.
fn mit_geraet(data: Value, geraet: Value) -> Value {
    match data {
        Value::Object(mut felder) => {
            felder.insert("device".into(), geraet);
            Value::Object(felder)
        }
        andere => json!({ "message": andere, "device": geraet }),
    }
}
