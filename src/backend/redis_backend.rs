//! Redis key-value backend
//!
//! Records are stored as Redis hashes:
//! - Key: `namespace:collection:user_key`
//! - Field: the bin name, holding the payload bytes
//! - TTL: `EXPIRE` on the whole hash, set in the same transaction as the write

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;

use super::{Backend, RecordKey};
use crate::error::SessionError;

/// Longest TTL Redis accepts: it stores expiry times in milliseconds
const MAX_EXPIRE_SECS: u64 = (i64::MAX / 1000) as u64;

/// Seconds for `EXPIRE`, or `None` to keep the record until deleted
fn expire_secs(ttl_secs: Option<u64>) -> Option<i64> {
    ttl_secs
        .filter(|ttl| *ttl <= MAX_EXPIRE_SECS)
        .and_then(|ttl| i64::try_from(ttl).ok())
}

/// Redis backend
///
/// # Example
///
/// ```rust,ignore
/// use salvo_kv_session::RedisBackend;
///
/// let backend = RedisBackend::from_url("redis://127.0.0.1/").await?;
/// ```
pub struct RedisBackend {
    conn: Arc<RwLock<Option<ConnectionManager>>>,
}

impl RedisBackend {
    /// Connect with the given client and verify the connection with `PING`
    pub async fn new(client: redis::Client) -> Result<Self, SessionError> {
        let mut conn = ConnectionManager::new(client).await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(Self::from_connection_manager(conn))
    }

    /// Connect from a connection string
    pub async fn from_url(url: &str) -> Result<Self, SessionError> {
        let client = redis::Client::open(url).map_err(|e| {
            SessionError::Backend(format!("Failed to create Redis client: {}", e))
        })?;
        Self::new(client).await
    }

    /// Create a backend from an existing connection manager
    pub fn from_connection_manager(conn: ConnectionManager) -> Self {
        Self {
            conn: Arc::new(RwLock::new(Some(conn))),
        }
    }

    /// Clone the connection manager, or fail if the backend was closed
    fn connection(&self) -> Result<ConnectionManager, SessionError> {
        self.conn.read().clone().ok_or(SessionError::Connection)
    }
}

impl Clone for RedisBackend {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

#[async_trait]
impl Backend for RedisBackend {
    fn is_connected(&self) -> bool {
        self.conn.read().is_some()
    }

    async fn get(&self, key: &RecordKey, bin: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let mut conn = self.connection()?;
        let payload: Option<Vec<u8>> = conn.hget(key.to_string(), bin).await?;
        Ok(payload)
    }

    async fn put(
        &self,
        key: &RecordKey,
        bin: &str,
        payload: &[u8],
        ttl_secs: Option<u64>,
    ) -> Result<(), SessionError> {
        let mut conn = self.connection()?;
        let redis_key = key.to_string();

        let mut pipe = redis::pipe();
        pipe.atomic().hset(&redis_key, bin, payload).ignore();
        match expire_secs(ttl_secs) {
            Some(ttl) => {
                pipe.expire(&redis_key, ttl).ignore();
            }
            None => {
                pipe.persist(&redis_key).ignore();
            }
        }

        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), SessionError> {
        let mut conn = self.connection()?;
        conn.del::<_, ()>(key.to_string()).await?;
        Ok(())
    }

    async fn close(&self) {
        self.conn.write().take();
    }
}
