//! Fehlertypen fuer die Admin-Authentifizierung

use thiserror::Error;

/// Alle moeglichen Fehler bei der Token-Pruefung
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token-Hashing fehlgeschlagen: {0}")]
    PasswortHashing(String),

    #[error("Admin-Token ungueltig")]
    TokenUngueltig,

    #[error("Admin-Token nicht gefunden: {0}")]
    TokenNichtGefunden(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

/// Result-Alias fuer die Admin-Authentifizierung
pub type AuthResult<T> = Result<T, AuthError>;
