//! Credential-Verifier – Schnittstelle zwischen Admin-Manager und Token-Pruefung

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthResult;

/// Identitaet eines erfolgreich gepruefen Admins
///
/// Wird als `auxData` an der Admin-Verbindung abgelegt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminIdentitaet {
    pub token_id: Uuid,
    pub name: String,
}

/// Prueft ein Bearer-Token und liefert die zugehoerige Identitaet
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verifizieren(&self, token: &str) -> AuthResult<AdminIdentitaet>;
}
