//! devicehub-auth – Admin-Authentifizierung
//!
//! Dieses Crate implementiert:
//! - Token-Hashing mit Argon2id
//! - Admin-Token-Verwaltung (erstellen, validieren, widerrufen, laden)
//! - Den [`CredentialVerifier`]-Trait, ueber den der Admin-Manager
//!   Bearer-Tokens prueft

pub mod admin_token;
pub mod error;
pub mod password;
pub mod verifier;

// Bequeme Re-Exporte
pub use admin_token::{AdminTokenEintrag, AdminTokenRecord, AdminTokenStore, ErstellterAdminToken};
pub use error::{AuthError, AuthResult};
pub use password::{passwort_hashen, passwort_hashen_mit_kosten, passwort_verifizieren, HashKosten};
pub use verifier::{AdminIdentitaet, CredentialVerifier};
