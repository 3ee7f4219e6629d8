//! Client-Registry – die Menge aller offenen, klassifizierten Verbindungen
//!
//! Eine Verbindung ist genau dann in der Registry, wenn ihr Zustand `Offen`
//! ist. Mitgliedschaft und Zustand werden unter dem Registry-Lock gemeinsam
//! geaendert (Lock-Reihenfolge: Registry, dann Verbindung). Iteration
//! liefert immer einen Snapshot, Senden passiert ausserhalb des Locks.

use devicehub_core::{ClientTyp, ConnectionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::connection::{Connection, VerbindungsZustand};
use crate::error::{HubError, HubResult};

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ClientRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Nimmt eine authentifizierte Verbindung auf und setzt sie auf `Offen`
    ///
    /// Nur Verbindungen im Zustand `Verbindet` koennen zugelassen werden.
    pub fn zulassen(&self, verbindung: &Arc<Connection>) -> HubResult<()> {
        let mut clients = self.clients.lock();
        let mut zustand = verbindung.zustand.lock();
        if *zustand != VerbindungsZustand::Verbindet {
            return Err(HubError::UngueltigerZustand {
                id: verbindung.id(),
                zustand: *zustand,
            });
        }
        *zustand = VerbindungsZustand::Offen;
        clients.insert(verbindung.id(), Arc::clone(verbindung));
        Ok(())
    }

    /// Entfernt eine Verbindung und setzt sie auf `Schliessend`
    ///
    /// Idempotent: unbekannte oder bereits entfernte IDs liefern `None`.
    pub fn entfernen(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        let mut clients = self.clients.lock();
        let verbindung = clients.remove(&id)?;
        *verbindung.zustand.lock() = VerbindungsZustand::Schliessend;
        Some(verbindung)
    }

    /// Snapshot aller offenen Verbindungen
    pub fn alle(&self) -> Vec<Arc<Connection>> {
        self.clients.lock().values().cloned().collect()
    }

    /// Snapshot aller offenen Verbindungen eines Typs
    pub fn wo(&self, typ: ClientTyp) -> Vec<Arc<Connection>> {
        self.clients
            .lock()
            .values()
            .filter(|c| c.typ() == typ)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.clients.lock().get(&id).cloned()
    }

    pub fn anzahl(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn anzahl_wo(&self, typ: ClientTyp) -> usize {
        self.clients.lock().values().filter(|c| c.typ() == typ).count()
    }
}
