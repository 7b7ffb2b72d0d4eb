//! Per-request session registry
//!
//! The registry lives in the request's [`Depot`], so it is dropped with the
//! request. It makes repeated `SessionStore::get` calls for one name return
//! the same session. Each entry remembers the store that loaded it, so a
//! store only ever returns and saves its own sessions.

use salvo_core::Depot;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::session::Session;
use crate::store::Loaded;

/// Depot key the registry is stored under
pub const REGISTRY_KEY: &str = "salvo.kv_session.registry";

/// Identity of a `SessionStore`, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreId(u64);

impl StoreId {
    pub(crate) fn next() -> Self {
        static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct Entry {
    owner: StoreId,
    loaded: Loaded,
}

/// Sessions loaded during one request, by owning store and name
#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: Vec<Entry>,
}

impl SessionRegistry {
    /// Get a session registered by `owner` and the error it was loaded with
    pub fn get(&self, owner: StoreId, name: &str) -> Option<&Loaded> {
        self.entries
            .iter()
            .find(|entry| entry.owner == owner && entry.loaded.session().name() == name)
            .map(|entry| &entry.loaded)
    }

    /// Get the first registered session named `name`, whichever store loaded it
    pub fn find(&self, name: &str) -> Option<&Loaded> {
        self.entries
            .iter()
            .find(|entry| entry.loaded.session().name() == name)
            .map(|entry| &entry.loaded)
    }

    /// Register a session for `owner`, replacing its previous entry of the same name
    pub fn insert(&mut self, owner: StoreId, loaded: Loaded) {
        let name = loaded.session().name();
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.owner == owner && entry.loaded.session().name() == name)
        {
            Some(entry) => entry.loaded = loaded,
            None => self.entries.push(Entry { owner, loaded }),
        }
    }

    /// Iterate over every registered session
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.entries.iter().map(|entry| entry.loaded.session())
    }

    /// Iterate over the sessions registered by `owner`
    pub fn owned_by(&self, owner: StoreId) -> impl Iterator<Item = &Session> {
        self.entries
            .iter()
            .filter(move |entry| entry.owner == owner)
            .map(|entry| entry.loaded.session())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The registry of the current request, if any session was registered
    pub fn from_depot(depot: &Depot) -> Option<&SessionRegistry> {
        depot.get::<SessionRegistry>(REGISTRY_KEY).ok()
    }

    /// Look up a session `owner` registered in the current request
    pub fn lookup(depot: &Depot, owner: StoreId, name: &str) -> Option<Loaded> {
        Self::from_depot(depot)?.get(owner, name).cloned()
    }

    /// Register a session for `owner` in the current request
    pub fn register(depot: &mut Depot, owner: StoreId, loaded: Loaded) {
        if let Ok(registry) = depot.get_mut::<SessionRegistry>(REGISTRY_KEY) {
            registry.insert(owner, loaded);
            return;
        }
        let mut registry = SessionRegistry::default();
        registry.insert(owner, loaded);
        depot.insert(REGISTRY_KEY, registry);
    }

    /// The sessions `owner` registered in the current request
    pub(crate) fn sessions_of(depot: &Depot, owner: StoreId) -> Vec<Session> {
        Self::from_depot(depot)
            .map(|registry| registry.owned_by(owner).cloned().collect())
            .unwrap_or_default()
    }
}
