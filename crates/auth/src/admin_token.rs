//! Admin-Token-Verwaltung
//!
//! Langlebige Bearer-Tokens fuer die Admin-Oberflaeche und die REST-API.
//! Gespeichert wird nur der Argon2id-Hash, der Klartext wird genau einmal
//! bei der Erstellung zurueckgegeben. Tokens aus der Konfiguration werden
//! beim Start ueber [`AdminTokenStore::laden`] uebernommen.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::password::{passwort_hashen_mit_kosten, passwort_verifizieren, HashKosten};
use crate::verifier::{AdminIdentitaet, CredentialVerifier};

/// Token-Eintrag wie er in der Konfiguration steht (`[[admin.tokens]]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminTokenEintrag {
    pub name: String,
    /// Argon2id PHC-String
    pub hash: String,
}

/// Ein Admin-Token im Speicher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminTokenRecord {
    pub id: Uuid,
    /// Anzeigename (z.B. "ops-dashboard")
    pub name: String,
    pub token_hash: String,
    pub erstellt_am: DateTime<Utc>,
    pub widerrufen: bool,
}

impl AdminTokenRecord {
    pub fn identitaet(&self) -> AdminIdentitaet {
        AdminIdentitaet {
            token_id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Ergebnis der Token-Erstellung (Token-Wert nur einmal sichtbar!)
#[derive(Debug)]
pub struct ErstellterAdminToken {
    pub record: AdminTokenRecord,
    pub token_wert: String,
}

/// In-Memory Store fuer Admin-Tokens
#[derive(Debug)]
pub struct AdminTokenStore {
    tokens: tokio::sync::RwLock<Vec<AdminTokenRecord>>,
    kosten: HashKosten,
}

impl Default for AdminTokenStore {
    fn default() -> Self {
        Self::mit_kosten(HashKosten::default())
    }
}

impl AdminTokenStore {
    pub fn neu() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self::default())
    }

    /// Store mit abweichenden Hash-Kosten fuer neu erstellte Tokens
    pub fn mit_kosten(kosten: HashKosten) -> Self {
        Self {
            tokens: tokio::sync::RwLock::new(Vec::new()),
            kosten,
        }
    }

    /// Erstellt ein neues Admin-Token
    pub async fn erstellen(&self, name: impl Into<String>) -> AuthResult<ErstellterAdminToken> {
        let token_wert = admin_token_generieren();
        let token_hash = passwort_hashen_mit_kosten(&token_wert, self.kosten)?;

        let record = AdminTokenRecord {
            id: Uuid::new_v4(),
            name: name.into(),
            token_hash,
            erstellt_am: Utc::now(),
            widerrufen: false,
        };

        self.tokens.write().await.push(record.clone());
        tracing::info!(token_id = %record.id, name = %record.name, "Admin-Token erstellt");

        Ok(ErstellterAdminToken { record, token_wert })
    }

    /// Validiert einen Token-Wert gegen alle nicht widerrufenen Tokens
    ///
    /// Die Argon2-Pruefung laeuft auf dem Blocking-Pool, damit die
    /// Authentifizierung anderer Verbindungen nicht blockiert wird.
    pub async fn validieren(&self, token_wert: &str) -> AuthResult<AdminTokenRecord> {
        if token_wert.is_empty() {
            return Err(AuthError::TokenUngueltig);
        }

        let kandidaten: Vec<AdminTokenRecord> = self
            .tokens
            .read()
            .await
            .iter()
            .filter(|t| !t.widerrufen)
            .cloned()
            .collect();
        let wert = token_wert.to_string();

        tokio::task::spawn_blocking(move || {
            for record in kandidaten {
                match passwort_verifizieren(&wert, &record.token_hash) {
                    Ok(true) => return Ok(record),
                    Ok(false) => continue,
                    Err(e) => {
                        tracing::warn!(name = %record.name, fehler = %e, "Fehler bei Token-Verifikation");
                        continue;
                    }
                }
            }
            Err(AuthError::TokenUngueltig)
        })
        .await
        .map_err(|e| AuthError::intern(format!("Token-Pruefung abgebrochen: {e}")))?
    }

    /// Widerruft ein Token anhand seiner ID
    pub async fn widerrufen(&self, token_id: Uuid) -> AuthResult<()> {
        let mut tokens = self.tokens.write().await;
        match tokens.iter_mut().find(|t| t.id == token_id) {
            None => Err(AuthError::TokenNichtGefunden(token_id.to_string())),
            Some(token) => {
                token.widerrufen = true;
                tracing::info!(token_id = %token_id, "Admin-Token widerrufen");
                Ok(())
            }
        }
    }

    /// Ersetzt alle Tokens durch die Eintraege aus der Konfiguration
    pub async fn laden(&self, eintraege: &[AdminTokenEintrag]) {
        let jetzt = Utc::now();
        let mut tokens = self.tokens.write().await;
        *tokens = eintraege
            .iter()
            .map(|e| AdminTokenRecord {
                id: Uuid::new_v4(),
                name: e.name.clone(),
                token_hash: e.hash.clone(),
                erstellt_am: jetzt,
                widerrufen: false,
            })
            .collect();
        tracing::info!(anzahl = tokens.len(), "Admin-Tokens geladen");
    }

    pub async fn liste(&self) -> Vec<AdminTokenRecord> {
        self.tokens.read().await.clone()
    }
}

#[async_trait]
impl CredentialVerifier for AdminTokenStore {
    async fn verifizieren(&self, token: &str) -> AuthResult<AdminIdentitaet> {
        self.validieren(token).await.map(|r| r.identitaet())
    }
}

/// Generiert ein kryptografisch sicheres Admin-Token
///
/// Format: "dh_" + 43 Zeichen URL-sicheres Base64 (256 Bit Entropie)
pub fn admin_token_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let encoded = base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes);
    format!("dh_{encoded}")
}
