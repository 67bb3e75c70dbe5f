#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;

mod fallback;
mod memory;
mod remote;

pub use fallback::FallbackStore;
pub use memory::MemoryStore;
pub use remote::RemoteStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(String),
    #[error("store returned status {0}")]
    Status(u16),
}

/// Shared TTL key/value store. Values are opaque strings; entries expire on
/// their own and are never mutated in place.
#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Set-if-absent with TTL. Returns `true` when the entry was newly
    /// created. This is the serialisation point for replay prevention.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}
