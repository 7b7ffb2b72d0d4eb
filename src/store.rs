//! Session store binding sessions to a key-value backend
//!
//! Loading: cookie → verified session ID → record `session_<id>` → values.
//! Saving: values → record write → signed cookie on the response. The record
//! is written before the cookie is emitted, so a failed write never hands the
//! client a cookie for data that doesn't exist.
//!
//! The cookie wraps `"<id>|<expires-at>"`, where `expires-at` is the unix time
//! after which the envelope is refused (0 for never). It is derived from the
//! session's own max age when the cookie is issued, so a session whose max age
//! differs from the store default is judged by its own lifetime.

use chrono::Utc;
use salvo_core::http::cookie::{self, Cookie};
use salvo_core::{Depot, Request, Response};

use crate::backend::{Backend, RecordKey};
use crate::codec::{decode_values, encode_values};
use crate::config::{Options, SameSite, StoreConfig};
use crate::error::{CookieError, SessionError};
use crate::registry::{SessionRegistry, StoreId};
use crate::securecookie::CookieCodecs;
use crate::session::{Session, SessionValues};

#[cfg(feature = "redis-store")]
use crate::backend::RedisBackend;

/// A session together with the error encountered while loading it.
///
/// The session is always usable: when loading fails it is a fresh session
/// with no ID and no data.
#[derive(Debug, Clone)]
#[must_use]
pub struct Loaded {
    session: Session,
    error: Option<SessionError>,
}

impl Loaded {
    pub(crate) fn new(session: Session, error: Option<SessionError>) -> Self {
        Self { session, error }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    /// Discard the error and keep the session
    pub fn into_session(self) -> Session {
        self.session
    }

    pub fn into_parts(self) -> (Session, Option<SessionError>) {
        (self.session, self.error)
    }

    /// The session, or the loading error if there was one
    pub fn into_result(self) -> Result<Session, SessionError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.session),
        }
    }
}

/// Stores sessions in a key-value backend and references them from signed cookies
///
/// # Example
///
/// ```rust,ignore
/// use salvo_kv_session::{MemoryBackend, SessionStore, StoreConfig};
///
/// let store = SessionStore::new(
///     StoreConfig::new("app", "sessions"),
///     MemoryBackend::new(),
///     &[b"hash-key-of-32-or-64-bytes".as_slice()],
/// )?;
///
/// let session = store.new_session(&req, "sid").await.into_session();
/// session.set("user", "alice")?;
/// store.save(&mut res, &session).await?;
/// ```
pub struct SessionStore<B: Backend> {
    id: StoreId,
    backend: B,
    codecs: CookieCodecs,
    config: StoreConfig,
}

impl<B: Backend> SessionStore<B> {
    /// Create a store over a connected backend.
    ///
    /// `key_pairs` is a flat list of hash and block keys:
    /// `[hash1, block1, hash2, block2, ...]`. The first pair signs new cookies;
    /// all pairs are tried when verifying, so old pairs can be kept around
    /// during key rotation.
    pub fn new(config: StoreConfig, backend: B, key_pairs: &[&[u8]]) -> Result<Self, SessionError> {
        if !backend.is_connected() {
            return Err(SessionError::Connection);
        }
        // Envelope expiry is carried in the wrapped value instead
        let mut codecs = CookieCodecs::from_pairs(key_pairs)?;
        codecs.set_max_age(0);
        Ok(Self {
            id: StoreId::next(),
            backend,
            codecs,
            config,
        })
    }

    /// Identity under which this store registers sessions in a request
    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Default cookie options copied onto new sessions
    pub fn options(&self) -> &Options {
        &self.config.options
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Set the default max age of new sessions.
    ///
    /// Sessions already issued keep the lifetime their cookie was issued with.
    pub fn set_max_age(&mut self, max_age: i64) {
        self.config.options.max_age = max_age;
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_connected()
    }

    /// Close the backend connection. Every later operation fails with
    /// [`SessionError::Connection`].
    pub async fn close(&self) {
        self.backend.close().await;
        tracing::debug!(namespace = %self.config.namespace, "session store closed");
    }

    /// Return the session for `name` this store registered in the request,
    /// loading and registering it on first use.
    pub async fn get(&self, req: &Request, depot: &mut Depot, name: &str) -> Loaded {
        if let Some(loaded) = SessionRegistry::lookup(depot, self.id, name) {
            return loaded;
        }
        let loaded = self.new_session(req, name).await;
        SessionRegistry::register(depot, self.id, loaded.clone());
        loaded
    }

    /// Build a session for `name` from the request cookie, without registering it
    pub async fn new_session(&self, req: &Request, name: &str) -> Loaded {
        let session = Session::new(name, self.config.options.clone());
        let error = self.restore(req, &session).await.err();
        Loaded::new(session, error)
    }

    async fn restore(&self, req: &Request, session: &Session) -> Result<(), SessionError> {
        self.ensure_connected()?;

        let Some(cookie) = req.cookie(session.name()) else {
            return Ok(());
        };
        // Cookie values may arrive URL encoded
        let value = match urlencoding::decode(cookie.value()) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => cookie.value().to_string(),
        };
        let id = unwrap_id(&self.codecs.decode(session.name(), &value)?)?;

        match self.load(&id).await? {
            Some(values) => {
                session.restore(id, values);
                tracing::debug!(session = %session.name(), "session restored");
            }
            None => {
                session.mark_expired();
                tracing::debug!(session = %session.name(), "session record not found");
            }
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<SessionValues>, SessionError> {
        let key = self.record_key(id)?;
        match self.backend.get(&key, &self.config.bin_name).await? {
            Some(payload) => Ok(Some(decode_values(&payload)?)),
            None => Ok(None),
        }
    }

    /// Persist the session and add its cookie to the response.
    ///
    /// A session without an ID gets one here. A session whose max age is
    /// negative is deleted instead, and an expired cookie is emitted.
    ///
    /// The session stops counting as modified once its state is taken for
    /// writing; if the save fails it is flagged as modified again.
    pub async fn save(&self, res: &mut Response, session: &Session) -> Result<(), SessionError> {
        self.ensure_connected()?;

        let (values, options) = session.begin_save();
        let result = if options.is_deletion() {
            self.delete(res, session, &options).await
        } else {
            self.write(res, session, &values, &options).await
        };
        if result.is_err() {
            session.mark_modified();
        }
        result
    }

    async fn write(
        &self,
        res: &mut Response,
        session: &Session,
        values: &SessionValues,
        options: &Options,
    ) -> Result<(), SessionError> {
        let id = session.ensure_id();
        let payload = encode_values(values)?;
        let key = self.record_key(&id)?;
        self.backend
            .put(&key, &self.config.bin_name, &payload, options.record_ttl())
            .await?;

        let encoded = self
            .codecs
            .encode(session.name(), &wrap_id(&id, options.max_age))?;
        res.add_cookie(session_cookie(session.name(), encoded, options));
        tracing::debug!(session = %session.name(), "session saved");
        Ok(())
    }

    /// Save every session this store registered in the current request
    pub async fn save_all(&self, depot: &Depot, res: &mut Response) -> Result<(), SessionError> {
        for session in &SessionRegistry::sessions_of(depot, self.id) {
            self.save(res, session).await?;
        }
        Ok(())
    }

    async fn delete(
        &self,
        res: &mut Response,
        session: &Session,
        options: &Options,
    ) -> Result<(), SessionError> {
        if let Some(id) = session.id() {
            let key = self.record_key(&id)?;
            self.backend.delete(&key).await?;
        }
        session.forget_id();
        res.add_cookie(session_cookie(session.name(), String::new(), options));
        tracing::debug!(session = %session.name(), "session deleted");
        Ok(())
    }

    fn record_key(&self, id: &str) -> Result<RecordKey, SessionError> {
        RecordKey::new(
            &self.config.namespace,
            &self.config.collection,
            &self.config.record_key(id),
        )
    }

    fn ensure_connected(&self) -> Result<(), SessionError> {
        if self.backend.is_connected() {
            Ok(())
        } else {
            Err(SessionError::Connection)
        }
    }
}

#[cfg(feature = "redis-store")]
impl SessionStore<RedisBackend> {
    /// Connect to Redis at `url` and create a store over it
    pub async fn open_redis(
        config: StoreConfig,
        url: &str,
        key_pairs: &[&[u8]],
    ) -> Result<Self, SessionError> {
        let backend = RedisBackend::from_url(url).await?;
        Self::new(config, backend, key_pairs)
    }
}

/// Cookie value for `id`, expiring `max_age` seconds from now when positive
fn wrap_id(id: &str, max_age: i64) -> String {
    let expires_at = if max_age > 0 {
        Utc::now().timestamp().saturating_add(max_age)
    } else {
        0
    };
    format!("{}|{}", id, expires_at)
}

/// Session ID from a verified cookie value, unless its expiry has passed
fn unwrap_id(value: &str) -> Result<String, CookieError> {
    let (id, expires_at) = value
        .rsplit_once('|')
        .ok_or_else(|| CookieError::Decode("missing expiry".to_string()))?;
    let expires_at: i64 = expires_at
        .parse()
        .map_err(|_| CookieError::Decode("invalid expiry".to_string()))?;
    if expires_at != 0 && expires_at < Utc::now().timestamp() {
        return Err(CookieError::Expired);
    }
    Ok(id.to_string())
}

/// Build the session cookie from the session's options
fn session_cookie(name: &str, value: String, options: &Options) -> Cookie<'static> {
    let mut cookie_builder = Cookie::build((name.to_string(), value))
        .path(options.path.clone())
        .http_only(options.http_only)
        .secure(options.secure);

    if let Some(domain) = options.domain.clone() {
        cookie_builder = cookie_builder.domain(domain);
    }

    // Zero means a browser-session cookie, negative expires it now
    if options.max_age > 0 {
        cookie_builder = cookie_builder.max_age(cookie::time::Duration::seconds(options.max_age));
    } else if options.max_age < 0 {
        cookie_builder = cookie_builder.max_age(cookie::time::Duration::ZERO);
    }

    cookie_builder = match options.same_site {
        SameSite::Strict => cookie_builder.same_site(cookie::SameSite::Strict),
        SameSite::Lax => cookie_builder.same_site(cookie::SameSite::Lax),
        SameSite::None => cookie_builder.same_site(cookie::SameSite::None),
    };

    cookie_builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::securecookie::{generate_random_key, CookieCodec};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const HASH_KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn memory_store() -> SessionStore<MemoryBackend> {
        SessionStore::new(
            StoreConfig::new("app", "sessions"),
            MemoryBackend::new(),
            &[HASH_KEY],
        )
        .unwrap()
    }

    fn store_in(namespace: &str, hash_key: &[u8]) -> SessionStore<MemoryBackend> {
        SessionStore::new(
            StoreConfig::new(namespace, "sessions"),
            MemoryBackend::new(),
            &[hash_key],
        )
        .unwrap()
    }

    fn request_with_cookie(name: &str, value: &str) -> Request {
        let mut req = Request::new();
        req.cookies_mut()
            .add(Cookie::new(name.to_string(), value.to_string()));
        req
    }

    fn response_cookie(res: &Response, name: &str) -> Cookie<'static> {
        res.cookie(name).expect("response sets the session cookie").clone()
    }

    /// Counts every backend call that would reach the network
    #[derive(Clone, Default)]
    struct CountingBackend {
        inner: MemoryBackend,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Backend for CountingBackend {
        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        async fn get(&self, key: &RecordKey, bin: &str) -> Result<Option<Vec<u8>>, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key, bin).await
        }

        async fn put(
            &self,
            key: &RecordKey,
            bin: &str,
            payload: &[u8],
            ttl_secs: Option<u64>,
        ) -> Result<(), SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, bin, payload, ttl_secs).await
        }

        async fn delete(&self, key: &RecordKey) -> Result<(), SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(key).await
        }

        async fn close(&self) {
            self.inner.close().await;
        }
    }

    /// Edits a session while a write is in flight, or refuses writes
    #[derive(Clone, Default)]
    struct InterferingBackend {
        inner: MemoryBackend,
        edit_during_put: Arc<Mutex<Option<Session>>>,
        fail_puts: bool,
    }

    #[async_trait]
    impl Backend for InterferingBackend {
        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        async fn get(&self, key: &RecordKey, bin: &str) -> Result<Option<Vec<u8>>, SessionError> {
            self.inner.get(key, bin).await
        }

        async fn put(
            &self,
            key: &RecordKey,
            bin: &str,
            payload: &[u8],
            ttl_secs: Option<u64>,
        ) -> Result<(), SessionError> {
            if self.fail_puts {
                return Err(SessionError::Backend("write refused".to_string()));
            }
            let pending = self.edit_during_put.lock().clone();
            if let Some(session) = pending {
                session.set("late", true)?;
            }
            self.inner.put(key, bin, payload, ttl_secs).await
        }

        async fn delete(&self, key: &RecordKey) -> Result<(), SessionError> {
            self.inner.delete(key).await
        }

        async fn close(&self) {
            self.inner.close().await;
        }
    }

    #[tokio::test]
    async fn test_no_cookie_gives_fresh_session() {
        let store = memory_store();
        let loaded = store.new_session(&Request::new(), "sid").await;

        assert!(loaded.error().is_none());
        let session = loaded.into_session();
        assert!(session.is_new());
        assert!(session.is_empty());
        assert!(session.id().is_none());
        assert!(!session.is_expired());
        assert_eq!(session.options(), *store.options());
    }

    #[tokio::test]
    async fn test_save_and_restore() {
        let key = generate_random_key(32);
        let store = SessionStore::new(
            StoreConfig::new("app", "sessions"),
            MemoryBackend::new(),
            &[key.as_slice()],
        )
        .unwrap();

        let session = store
            .new_session(&Request::new(), "sid")
            .await
            .into_result()
            .unwrap();
        assert!(session.is_new());
        session.set("user", "alice").unwrap();

        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();
        let cookie = response_cookie(&res, "sid");
        assert_ne!(Some(cookie.value().to_string()), session.id());

        let req = request_with_cookie("sid", cookie.value());
        let restored = store
            .new_session(&req, "sid")
            .await
            .into_result()
            .unwrap();
        assert!(!restored.is_new());
        assert_eq!(restored.id(), session.id());
        assert_eq!(restored.get::<String>("user"), Some("alice".to_string()));
        assert_eq!(restored.values(), session.values());
    }

    #[tokio::test]
    async fn test_record_layout() {
        let store = memory_store();
        let session = store.new_session(&Request::new(), "sid").await.into_session();
        session.set("views", 1).unwrap();
        store.save(&mut Response::new(), &session).await.unwrap();

        let id = session.id().unwrap();
        let key = RecordKey::new("app", "sessions", &format!("session_{}", id)).unwrap();
        let payload = store.backend().get(&key, "data").await.unwrap().unwrap();
        assert_eq!(decode_values(&payload).unwrap(), session.values());
    }

    #[tokio::test]
    async fn test_tampered_cookie() {
        let store = memory_store();
        let session = store.new_session(&Request::new(), "sid").await.into_session();
        session.set("user", "alice").unwrap();
        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();

        let mut bytes = response_cookie(&res, "sid").value().as_bytes().to_vec();
        let mid = bytes.len() / 2;
        bytes[mid] = if bytes[mid] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        let (session, error) = store
            .new_session(&request_with_cookie("sid", &tampered), "sid")
            .await
            .into_parts();
        assert!(matches!(error, Some(SessionError::Cookie(_))));
        assert!(session.is_new());
        assert!(session.is_empty());
        assert!(session.id().is_none());
    }

    #[tokio::test]
    async fn test_cookie_from_other_keys_is_rejected() {
        let other = SessionStore::new(
            StoreConfig::new("app", "sessions"),
            MemoryBackend::new(),
            &[b"some-other-hash-key".as_slice()],
        )
        .unwrap();
        let session = other.new_session(&Request::new(), "sid").await.into_session();
        let mut res = Response::new();
        other.save(&mut res, &session).await.unwrap();

        let store = memory_store();
        let req = request_with_cookie("sid", response_cookie(&res, "sid").value());
        let loaded = store.new_session(&req, "sid").await;
        assert_eq!(
            loaded.error(),
            Some(&SessionError::Cookie(CookieError::MacInvalid))
        );
    }

    #[tokio::test]
    async fn test_id_stable_across_saves() {
        let store = memory_store();
        let session = store.new_session(&Request::new(), "sid").await.into_session();

        store.save(&mut Response::new(), &session).await.unwrap();
        let id = session.id().unwrap();
        session.set("step", 2).unwrap();
        store.save(&mut Response::new(), &session).await.unwrap();

        assert_eq!(session.id(), Some(id));
        assert_eq!(store.backend().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_is_expired_fresh_session() {
        let store = memory_store();
        let session = store.new_session(&Request::new(), "sid").await.into_session();
        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();

        let id = session.id().unwrap();
        let key = RecordKey::new("app", "sessions", &format!("session_{}", id)).unwrap();
        store.backend().delete(&key).await.unwrap();

        let req = request_with_cookie("sid", response_cookie(&res, "sid").value());
        let loaded = store.new_session(&req, "sid").await;
        assert!(loaded.error().is_none());
        let session = loaded.into_session();
        assert!(session.is_new());
        assert!(session.is_expired());
        assert!(session.id().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_reported() {
        let store = memory_store();
        let session = store.new_session(&Request::new(), "sid").await.into_session();
        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();

        let id = session.id().unwrap();
        let key = RecordKey::new("app", "sessions", &format!("session_{}", id)).unwrap();
        store
            .backend()
            .put(&key, "data", b"not a payload", None)
            .await
            .unwrap();

        let req = request_with_cookie("sid", response_cookie(&res, "sid").value());
        let (session, error) = store.new_session(&req, "sid").await.into_parts();
        assert!(matches!(error, Some(SessionError::Serialization(_))));
        assert!(session.is_new());
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn test_cookie_attributes() {
        let options = Options::default()
            .with_path("/app")
            .with_domain("example.com")
            .with_max_age(3600)
            .with_secure(true)
            .with_same_site(SameSite::Strict);
        let store = SessionStore::new(
            StoreConfig::new("app", "sessions").with_options(options),
            MemoryBackend::new(),
            &[HASH_KEY],
        )
        .unwrap();

        let session = store.new_session(&Request::new(), "sid").await.into_session();
        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();

        let cookie = response_cookie(&res, "sid");
        assert_eq!(cookie.path(), Some("/app"));
        assert_eq!(cookie.domain(), Some("example.com"));
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::seconds(3600)));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(cookie::SameSite::Strict));
    }

    #[tokio::test]
    async fn test_default_cookie_max_age() {
        let store = memory_store();
        let session = store.new_session(&Request::new(), "sid").await.into_session();
        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();

        let cookie = response_cookie(&res, "sid");
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(
            cookie.max_age(),
            Some(cookie::time::Duration::seconds(2_592_000))
        );
    }

    #[tokio::test]
    async fn test_destroy_deletes_record() {
        let store = memory_store();
        let session = store.new_session(&Request::new(), "sid").await.into_session();
        session.set("user", "alice").unwrap();
        store.save(&mut Response::new(), &session).await.unwrap();
        assert_eq!(store.backend().len(), 1);

        session.destroy();
        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();

        assert!(store.backend().is_empty());
        assert!(session.id().is_none());
        let cookie = response_cookie(&res, "sid");
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::ZERO));
    }

    #[tokio::test]
    async fn test_set_max_age() {
        let mut store = memory_store();
        store.set_max_age(60);
        assert_eq!(store.options().max_age, 60);

        let session = store.new_session(&Request::new(), "sid").await.into_session();
        assert_eq!(session.options().max_age, 60);
    }

    #[tokio::test]
    async fn test_get_returns_registered_session() {
        let store = memory_store();
        let req = Request::new();
        let mut depot = Depot::new();

        let first = store.get(&req, &mut depot, "sid").await.into_session();
        first.set("user", "alice").unwrap();
        let second = store.get(&req, &mut depot, "sid").await.into_session();
        assert!(first.ptr_eq(&second));
        assert_eq!(second.get::<String>("user"), Some("alice".to_string()));

        let other = store.get(&req, &mut depot, "other").await.into_session();
        assert!(!first.ptr_eq(&other));
    }

    #[tokio::test]
    async fn test_get_caches_cookie_error() {
        let store = memory_store();
        let req = request_with_cookie("sid", "garbage");
        let mut depot = Depot::new();

        let first = store.get(&req, &mut depot, "sid").await;
        assert!(matches!(first.error(), Some(SessionError::Cookie(_))));
        let second = store.get(&req, &mut depot, "sid").await;
        assert!(matches!(second.error(), Some(SessionError::Cookie(_))));
        assert!(first.session().ptr_eq(second.session()));
    }

    #[tokio::test]
    async fn test_save_all() {
        let store = memory_store();
        let req = Request::new();
        let mut depot = Depot::new();
        let a = store.get(&req, &mut depot, "a").await.into_session();
        let b = store.get(&req, &mut depot, "b").await.into_session();

        let mut res = Response::new();
        store.save_all(&depot, &mut res).await.unwrap();
        assert!(a.id().is_some());
        assert!(b.id().is_some());
        assert!(res.cookie("a").is_some());
        assert!(res.cookie("b").is_some());
        assert_eq!(store.backend().len(), 2);
    }

    #[tokio::test]
    async fn test_disconnected_backend_rejected_at_construction() {
        let backend = MemoryBackend::new();
        backend.close().await;
        let result = SessionStore::new(StoreConfig::default(), backend, &[HASH_KEY]);
        assert!(matches!(result, Err(SessionError::Connection)));
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected_at_construction() {
        let result = SessionStore::new(
            StoreConfig::default(),
            MemoryBackend::new(),
            &[HASH_KEY, b"bad block key".as_slice()],
        );
        assert!(matches!(
            result,
            Err(SessionError::Cookie(CookieError::InvalidKey(_)))
        ));
    }

    #[tokio::test]
    async fn test_closed_store_makes_no_backend_calls() {
        let backend = CountingBackend::default();
        let calls = Arc::clone(&backend.calls);
        let store = SessionStore::new(StoreConfig::default(), backend, &[HASH_KEY]).unwrap();

        // Produce a valid cookie while still connected
        let session = store.new_session(&Request::new(), "sid").await.into_session();
        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();
        let cookie_value = response_cookie(&res, "sid").value().to_string();

        store.close().await;
        assert!(!store.is_connected());
        calls.store(0, Ordering::SeqCst);

        let loaded = store.new_session(&Request::new(), "sid").await;
        assert_eq!(loaded.error(), Some(&SessionError::Connection));

        let req = request_with_cookie("sid", &cookie_value);
        let loaded = store.new_session(&req, "sid").await;
        assert_eq!(loaded.error(), Some(&SessionError::Connection));
        assert!(loaded.session().is_new());

        let mut depot = Depot::new();
        let loaded = store.get(&req, &mut depot, "sid").await;
        assert_eq!(loaded.error(), Some(&SessionError::Connection));

        let mut res = Response::new();
        assert_eq!(
            store.save(&mut res, &session).await,
            Err(SessionError::Connection)
        );
        assert!(res.cookie("sid").is_none());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_invalid_namespace_fails_save_without_cookie() {
        let store = SessionStore::new(
            StoreConfig::new("", "sessions"),
            MemoryBackend::new(),
            &[HASH_KEY],
        )
        .unwrap();
        let session = store.new_session(&Request::new(), "sid").await.into_session();
        let mut res = Response::new();

        let result = store.save(&mut res, &session).await;
        assert!(matches!(result, Err(SessionError::Backend(_))));
        assert!(res.cookie("sid").is_none());
    }

    #[tokio::test]
    async fn test_sessions_stay_with_their_store() {
        let a = store_in("a", HASH_KEY);
        let b_key = generate_random_key(32);
        let b = store_in("b", &b_key);
        let req = Request::new();
        let mut depot = Depot::new();

        let cart = b.get(&req, &mut depot, "cart").await.into_session();
        cart.set("item", 2).unwrap();

        let mut res = Response::new();
        a.save_all(&depot, &mut res).await.unwrap();
        assert!(a.backend().is_empty());
        assert!(res.cookie("cart").is_none());
        assert!(cart.is_modified());

        b.save_all(&depot, &mut res).await.unwrap();
        assert_eq!(b.backend().len(), 1);
        assert!(a.backend().is_empty());

        let reload = request_with_cookie("cart", response_cookie(&res, "cart").value());
        let restored = b.new_session(&reload, "cart").await.into_result().unwrap();
        assert!(!restored.is_new());
        assert_eq!(restored.get::<i32>("item"), Some(2));

        let from_a = a.get(&req, &mut depot, "cart").await.into_session();
        assert!(!from_a.ptr_eq(&cart));
        assert!(from_a.is_empty());
        let again = b.get(&req, &mut depot, "cart").await.into_session();
        assert!(again.ptr_eq(&cart));
    }

    #[tokio::test]
    async fn test_huge_max_age_saves_without_expiry() {
        let options = Options::default().with_max_age_duration(Duration::MAX);
        let store = SessionStore::new(
            StoreConfig::new("app", "sessions").with_options(options),
            MemoryBackend::new(),
            &[HASH_KEY],
        )
        .unwrap();

        let session = store.new_session(&Request::new(), "sid").await.into_session();
        session.set("user", "alice").unwrap();
        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();
        assert_eq!(store.backend().len(), 1);

        let req = request_with_cookie("sid", response_cookie(&res, "sid").value());
        let restored = store.new_session(&req, "sid").await.into_result().unwrap();
        assert_eq!(restored.get::<String>("user"), Some("alice".to_string()));
    }

    #[tokio::test]
    async fn test_envelope_follows_session_max_age() {
        let mut store = memory_store();
        store.set_max_age(60);
        let session = store.new_session(&Request::new(), "sid").await.into_session();
        session.set_max_age(3600);
        session.set("user", "alice").unwrap();
        let mut res = Response::new();
        store.save(&mut res, &session).await.unwrap();
        let id = session.id().unwrap();

        let codec = CookieCodec::new(HASH_KEY, None).unwrap();
        let value = codec.decode("sid", response_cookie(&res, "sid").value()).unwrap();
        let (wrapped_id, expires_at) = value.rsplit_once('|').unwrap();
        assert_eq!(wrapped_id, id);
        assert!(expires_at.parse::<i64>().unwrap() >= Utc::now().timestamp() + 3590);

        // Issued two minutes ago: older than the store default, within the session's max age
        let issued_at = Utc::now().timestamp() - 120;
        let cookie = codec
            .encode_at("sid", &format!("{}|{}", id, issued_at + 3600), issued_at)
            .unwrap();
        let restored = store
            .new_session(&request_with_cookie("sid", &cookie), "sid")
            .await
            .into_result()
            .unwrap();
        assert_eq!(restored.get::<String>("user"), Some("alice".to_string()));

        let cookie = codec
            .encode_at("sid", &format!("{}|{}", id, issued_at + 60), issued_at)
            .unwrap();
        let loaded = store
            .new_session(&request_with_cookie("sid", &cookie), "sid")
            .await;
        assert_eq!(
            loaded.error(),
            Some(&SessionError::Cookie(CookieError::Expired))
        );
        assert!(loaded.session().is_new());
    }

    #[tokio::test]
    async fn test_cookie_without_expiry_is_rejected() {
        let store = memory_store();
        let codec = CookieCodec::new(HASH_KEY, None).unwrap();
        let cookie = codec.encode("sid", "SOMESESSIONID").unwrap();

        let loaded = store
            .new_session(&request_with_cookie("sid", &cookie), "sid")
            .await;
        assert!(matches!(
            loaded.error(),
            Some(SessionError::Cookie(CookieError::Decode(_)))
        ));
    }

    #[tokio::test]
    async fn test_change_during_save_stays_modified() {
        let backend = InterferingBackend::default();
        let edit = Arc::clone(&backend.edit_during_put);
        let store = SessionStore::new(StoreConfig::default(), backend, &[HASH_KEY]).unwrap();

        let session = store.new_session(&Request::new(), "sid").await.into_session();
        session.set("user", "alice").unwrap();
        *edit.lock() = Some(session.clone());

        store.save(&mut Response::new(), &session).await.unwrap();
        assert!(session.is_modified());
        assert_eq!(session.get::<bool>("late"), Some(true));

        let key = store.record_key(&session.id().unwrap()).unwrap();
        let payload = store.backend().get(&key, "data").await.unwrap().unwrap();
        assert!(!decode_values(&payload).unwrap().contains("late"));
    }

    #[tokio::test]
    async fn test_failed_save_stays_modified() {
        let backend = InterferingBackend {
            fail_puts: true,
            ..Default::default()
        };
        let store = SessionStore::new(StoreConfig::default(), backend, &[HASH_KEY]).unwrap();

        let session = store.new_session(&Request::new(), "sid").await.into_session();
        session.set("user", "alice").unwrap();
        let mut res = Response::new();

        let result = store.save(&mut res, &session).await;
        assert!(matches!(result, Err(SessionError::Backend(_))));
        assert!(session.is_modified());
        assert!(res.cookie("sid").is_none());
    }
}
