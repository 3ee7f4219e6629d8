//! Fehlertypen fuer den Connection Hub

use devicehub_core::ConnectionId;
use devicehub_protocol::ProtokollFehler;
use thiserror::Error;

use crate::connection::VerbindungsZustand;

/// Fehlertyp fuer den Connection Hub
#[derive(Debug, Error)]
pub enum HubError {
    /// Verbindung ist nicht (mehr) im Zustand `Offen`
    #[error("Verbindung {0} ist nicht offen")]
    NichtOffen(ConnectionId),

    /// Ausgangs-Queue der Verbindung ist voll (langsamer Empfaenger)
    #[error("Sende-Queue von {0} ist voll")]
    QueueVoll(ConnectionId),

    /// Schreib-Task der Verbindung existiert nicht mehr
    #[error("Transport von {0} ist geschlossen")]
    TransportGeschlossen(ConnectionId),

    /// Nachricht konnte nicht serialisiert werden
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtokollFehler),

    /// Zustandsuebergang nicht erlaubt (z.B. doppeltes Zulassen)
    #[error("Ungueltiger Zustand fuer {id}: {zustand:?}")]
    UngueltigerZustand {
        id: ConnectionId,
        zustand: VerbindungsZustand,
    },
}

impl HubError {
    /// Gibt true zurueck wenn der Fehler beim Schreiben auf den Transport entstand
    pub fn ist_transport_fehler(&self) -> bool {
        matches!(self, Self::QueueVoll(_) | Self::TransportGeschlossen(_))
    }
}

/// Result-Typ fuer den Connection Hub
pub type HubResult<T> = Result<T, HubError>;
