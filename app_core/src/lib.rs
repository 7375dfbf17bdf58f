// contains core functionality

pub mod bracket;
mod errors;
mod ledger;
mod match_;
mod participant;
mod ports;
mod progression;
mod standings;
mod station;
mod tenant;
mod tournament;
pub mod utils;
mod waitlist;

pub use errors::*;
pub use ledger::*;
pub use match_::*;
pub use participant::*;
pub use ports::*;
pub use progression::*;
pub use standings::*;
pub use station::*;
pub use tenant::*;
pub use tournament::*;
pub use waitlist::*;

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Core provides the authoritative tournament API:
/// - tournament registry (create, update, start, reset, complete, delete)
/// - participant roster (seeds, check-in, signup, waitlist)
/// - bracket generation and match progression
/// - station coordination and the per-tournament change ledger
///
/// Core holds connections to all required ports (database, client registry).
/// Every mutating operation resolves the effective tenant first, takes the
/// per-tournament write lock, commits one transactional write batch, and
/// publishes the resulting events after commit.
pub struct Core {
    pub database: Arc<dyn DatabasePort>,
    pub client_registry: Arc<dyn ClientRegistryPort>,
    locks: DashMap<Uuid, Arc<tokio::sync::Mutex<()>>>,
}

impl Core {
    /// Per-tournament write lock. Created lazily on first mutation.
    pub(crate) fn tournament_lock(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the lock entry of a deleted tournament.
    pub(crate) fn forget_lock(&self, id: Uuid) {
        self.locks.remove(&id);
    }
}

pub type CoreHandle = Arc<Core>;

pub struct NoDB {}
pub struct NoCR {}

pub struct DynDB(Arc<dyn DatabasePort>);
pub struct DynCR(Arc<dyn ClientRegistryPort>);

pub struct CoreBuilder<DB, CR> {
    state_db: DB,
    state_cr: CR,
}

impl CoreBuilder<NoDB, NoCR> {
    pub fn new() -> Self {
        CoreBuilder {
            state_db: NoDB {},
            state_cr: NoCR {},
        }
    }
}

impl Default for CoreBuilder<NoDB, NoCR> {
    fn default() -> Self {
        Self::new()
    }
}

impl<DB, CR> CoreBuilder<DB, CR> {
    pub fn set_db(self, database: Arc<dyn DatabasePort>) -> CoreBuilder<DynDB, CR> {
        CoreBuilder {
            state_db: DynDB(database),
            state_cr: self.state_cr,
        }
    }

    pub fn set_cr(self, client_registry: Arc<dyn ClientRegistryPort>) -> CoreBuilder<DB, DynCR> {
        CoreBuilder {
            state_db: self.state_db,
            state_cr: DynCR(client_registry),
        }
    }
}

impl CoreBuilder<DynDB, DynCR> {
    pub fn build(self) -> Core {
        Core {
            database: self.state_db.0,
            client_registry: self.state_cr.0,
            locks: DashMap::new(),
        }
    }
}
