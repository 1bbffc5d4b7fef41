//! Staging store contract and its implementations.
//!
//! The drain pipeline only ever uses these three calls. Anything smarter
//! (eviction, replication, persistence) is the backend's business.

pub mod memory;
pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;

pub use memory::MemoryStagingStore;
pub use self::redis::RedisStagingStore;

#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Store `value` under `key`. `ttl_secs == 0` means no expiry.
    async fn put(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<(), StoreError>;

    /// Every live key with its payload, at the moment of the call.
    async fn get_all(&self) -> Result<HashMap<String, Vec<u8>>, StoreError>;

    /// Remove exactly these keys. Missing keys are not an error.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError>;
}
