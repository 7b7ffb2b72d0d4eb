//! Session middleware handler for Salvo

use salvo_core::prelude::*;
use std::sync::Arc;

use crate::backend::Backend;
use crate::registry::SessionRegistry;
use crate::store::SessionStore;

/// Session middleware for Salvo
///
/// Before the route runs, the session named `name` is loaded through
/// [`SessionStore::get`] and registered in the depot. After the route,
/// every session this handler's store registered and that was modified is
/// saved. Sessions registered by other stores are left to their own handlers.
///
/// Rejected cookies don't fail the request: the route gets a fresh session.
pub struct SessionHandler<B: Backend> {
    store: Arc<SessionStore<B>>,
    name: String,
}

impl<B: Backend> SessionHandler<B> {
    /// Create a new session handler for the session `name`
    pub fn new<S: Into<String>>(store: SessionStore<B>, name: S) -> Self {
        Self::from_shared(Arc::new(store), name)
    }

    /// Create a handler over a store shared with the rest of the application
    pub fn from_shared<S: Into<String>>(store: Arc<SessionStore<B>>, name: S) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<SessionStore<B>> {
        &self.store
    }
}

impl<B: Backend> Clone for SessionHandler<B> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            name: self.name.clone(),
        }
    }
}

#[async_trait]
impl<B: Backend> Handler for SessionHandler<B> {
    async fn handle(&self, req: &mut Request, depot: &mut Depot, res: &mut Response, ctrl: &mut FlowCtrl) {
        let loaded = self.store.get(req, depot, &self.name).await;
        if let Some(e) = loaded.error() {
            tracing::warn!(session = %self.name, error = %e, "Failed to load session");
        }

        // Continue with the request
        ctrl.call_next(req, depot, res).await;

        // After request processing, persist what the route changed in this store's sessions
        let modified: Vec<_> = SessionRegistry::sessions_of(depot, self.store.id())
            .into_iter()
            .filter(|session| session.is_modified())
            .collect();

        for session in &modified {
            if let Err(e) = self.store.save(res, session).await {
                tracing::error!(session = %session.name(), error = %e, "Failed to save session");
            }
        }
    }
}
