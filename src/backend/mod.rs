//! Key-value backend implementations

mod memory;
mod traits;

pub use memory::MemoryBackend;
pub use traits::{Backend, RecordKey, MAX_COLLECTION_LEN, MAX_NAMESPACE_LEN};

#[cfg(feature = "redis-store")]
mod redis_backend;

#[cfg(feature = "redis-store")]
pub use redis_backend::RedisBackend;
