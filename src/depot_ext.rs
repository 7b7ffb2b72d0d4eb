//! Extension trait for Depot to easily access sessions

use salvo_core::Depot;

use crate::registry::SessionRegistry;
use crate::session::Session;

/// Extension trait for Salvo's Depot to provide easy session access
pub trait SessionDepotExt {
    /// Get the session registered under `name` in this request
    ///
    /// The returned handle shares state with the registered session, so
    /// changes are seen by the middleware when it saves. When several stores
    /// registered a session with this name, the first one registered is
    /// returned; use `SessionStore::get` to pick a specific store.
    fn session(&self, name: &str) -> Option<Session>;
}

impl SessionDepotExt for Depot {
    fn session(&self, name: &str) -> Option<Session> {
        SessionRegistry::from_depot(self)?
            .find(name)
            .map(|loaded| loaded.session().clone())
    }
}
