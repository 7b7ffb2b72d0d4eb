//! In-memory key-value backend
//!
//! This is primarily for development and testing.
//! For production, use RedisBackend or another persistent backend.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{Backend, RecordKey};
use crate::error::SessionError;

struct StoredRecord {
    bins: HashMap<String, Vec<u8>>,
    expires_at: Option<Instant>,
}

impl StoredRecord {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// In-memory backend
///
/// Warning: This backend is not suitable for production use because:
/// - Records are lost on server restart
/// - Records are not shared across multiple server instances
/// - Memory usage grows until expired records are cleaned up
pub struct MemoryBackend {
    records: Arc<RwLock<HashMap<RecordKey, StoredRecord>>>,
    connected: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Create a new, connected memory backend
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Clean up expired records
    pub fn cleanup_expired(&self) {
        let now = Instant::now();
        self.records.write().retain(|_, stored| stored.is_live(now));
    }

    /// Number of live records
    pub fn len(&self) -> usize {
        self.cleanup_expired();
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryBackend {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
            connected: Arc::clone(&self.connected),
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get(&self, key: &RecordKey, bin: &str) -> Result<Option<Vec<u8>>, SessionError> {
        let records = self.records.read();
        match records.get(key) {
            Some(stored) if stored.is_live(Instant::now()) => Ok(stored.bins.get(bin).cloned()),
            _ => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &RecordKey,
        bin: &str,
        payload: &[u8],
        ttl_secs: Option<u64>,
    ) -> Result<(), SessionError> {
        let now = Instant::now();
        // A deadline past what `Instant` can hold means no expiry
        let expires_at = ttl_secs.and_then(|secs| now.checked_add(Duration::from_secs(secs)));

        let mut records = self.records.write();
        let stored = records.entry(key.clone()).or_insert_with(|| StoredRecord {
            bins: HashMap::new(),
            expires_at,
        });
        if !stored.is_live(now) {
            stored.bins.clear();
        }
        stored.bins.insert(bin.to_string(), payload.to_vec());
        stored.expires_at = expires_at;
        Ok(())
    }

    async fn delete(&self, key: &RecordKey) -> Result<(), SessionError> {
        self.records.write().remove(key);
        Ok(())
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}
