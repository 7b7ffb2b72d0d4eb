//! Key-value backend trait and record keys

use async_trait::async_trait;
use std::fmt;

use crate::error::SessionError;

/// Longest namespace name a backend accepts
pub const MAX_NAMESPACE_LEN: usize = 31;

/// Longest collection name a backend accepts
pub const MAX_COLLECTION_LEN: usize = 63;

/// Composite key of a stored record: namespace, collection and user key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordKey {
    namespace: String,
    collection: String,
    user_key: String,
}

impl RecordKey {
    /// Build and validate a record key
    pub fn new(namespace: &str, collection: &str, user_key: &str) -> Result<Self, SessionError> {
        if namespace.is_empty() || namespace.len() > MAX_NAMESPACE_LEN {
            return Err(SessionError::Backend(format!(
                "invalid key: namespace must be 1 to {} bytes",
                MAX_NAMESPACE_LEN
            )));
        }
        if collection.len() > MAX_COLLECTION_LEN {
            return Err(SessionError::Backend(format!(
                "invalid key: collection must be at most {} bytes",
                MAX_COLLECTION_LEN
            )));
        }
        if user_key.is_empty() {
            return Err(SessionError::Backend(
                "invalid key: user key is empty".to_string(),
            ));
        }
        Ok(Self {
            namespace: namespace.to_string(),
            collection: collection.to_string(),
            user_key: user_key.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn user_key(&self) -> &str {
        &self.user_key
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.namespace, self.collection, self.user_key)
    }
}

/// Trait for key-value storage backends
///
/// A record is addressed by a [`RecordKey`] and holds named fields ("bins").
/// Sessions use a single bin for their serialized payload.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Whether the backend connection is established and not closed
    fn is_connected(&self) -> bool;

    /// Read one bin of a record
    ///
    /// Returns None if the record or the bin doesn't exist
    async fn get(&self, key: &RecordKey, bin: &str) -> Result<Option<Vec<u8>>, SessionError>;

    /// Write one bin of a record in a single atomic operation, overwriting
    /// any previous value. A TTL of None keeps the record until deleted.
    async fn put(
        &self,
        key: &RecordKey,
        bin: &str,
        payload: &[u8],
        ttl_secs: Option<u64>,
    ) -> Result<(), SessionError>;

    /// Delete a record; deleting a missing record is not an error
    async fn delete(&self, key: &RecordKey) -> Result<(), SessionError>;

    /// Close the connection. Later calls report disconnected.
    async fn close(&self);
}
