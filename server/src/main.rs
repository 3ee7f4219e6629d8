//! devicehub Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.
//!
//! `devicehub-server token-hash <name>` erzeugt ein neues Admin-Token und
//! gibt den Konfigurationseintrag fuer `[[admin.tokens]]` aus.

use anyhow::Result;
use devicehub_auth::{admin_token::admin_token_generieren, passwort_hashen};
use devicehub_observability::logging_initialisieren;
use devicehub_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    let argumente: Vec<String> = std::env::args().skip(1).collect();
    if let [befehl, name] = argumente.as_slice() {
        if befehl == "token-hash" {
            return token_ausgeben(name);
        }
    }

    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("DEVICEHUB_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = ServerConfig::laden(&config_pfad)?;
    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "devicehub Server wird initialisiert"
    );

    let server = Server::aufbauen(config).await?;
    server.starten().await?;

    Ok(())
}

fn token_ausgeben(name: &str) -> Result<()> {
    let token = admin_token_generieren();
    let hash = passwort_hashen(&token)?;

    println!("# Token (nur jetzt sichtbar): {token}");
    println!("[[admin.tokens]]");
    println!("name = {}", toml::Value::String(name.to_string()));
    println!("hash = {}", toml::Value::String(hash));
    Ok(())
}
