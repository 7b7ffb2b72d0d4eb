//! # salvo-kv-session
//!
//! Key-value backed session store for the Salvo web framework.
//!
//! A session's data lives in a backend record keyed by
//! `(namespace, collection, "session_" + id)`. The client only holds a
//! cookie whose value is a signed (and optionally encrypted) envelope
//! around the session ID.
//!
//! ## Features
//!
//! - **Random session IDs**: 256 bits from a CSPRNG, base32 encoded
//! - **Tamper-proof cookies**: HMAC-SHA256 signatures, optional AES-GCM encryption,
//!   key rotation with multiple key pairs
//! - **Versioned payloads**: session data stored as a versioned JSON document
//! - **Pluggable backends**: Redis, Memory, or custom backends
//! - **Middleware**: load before the route, save after it when modified
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use salvo::prelude::*;
//! use salvo_kv_session::{MemoryBackend, SessionDepotExt, SessionHandler, SessionStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = SessionStore::new(
//!         StoreConfig::new("app", "sessions"),
//!         MemoryBackend::new(),
//!         &[b"a-hash-key-of-at-least-32-bytes!".as_slice()],
//!     )
//!     .unwrap();
//!
//!     let router = Router::new()
//!         .hoop(SessionHandler::new(store, "sid"))
//!         .get(index);
//!
//!     let acceptor = TcpListener::new("127.0.0.1:5800").bind().await;
//!     Server::new(acceptor).serve(router).await;
//! }
//!
//! #[handler]
//! async fn index(depot: &mut Depot) -> String {
//!     let session = depot.session("sid").unwrap();
//!     let views: i32 = session.get("views").unwrap_or(0);
//!     session.set("views", views + 1).unwrap();
//!     format!("{} views", views + 1)
//! }
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod registry;
pub mod securecookie;
pub mod session;
pub mod store;

pub use backend::{Backend, MemoryBackend, RecordKey};
pub use config::{Options, SameSite, StoreConfig};
pub use error::{CookieError, SessionError};
pub use handler::SessionHandler;
pub use registry::{SessionRegistry, StoreId};
pub use securecookie::{CookieCodec, CookieCodecs};
pub use session::{generate_session_id, Session, SessionValues};
pub use store::{Loaded, SessionStore};

#[cfg(feature = "redis-store")]
pub use backend::RedisBackend;

/// Extension trait for Depot to easily access sessions
pub mod depot_ext;
pub use depot_ext::SessionDepotExt;
