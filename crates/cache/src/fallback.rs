#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::{MemoryStore, RemoteStore, StoreError, TtlStore};

/// Shared store with graceful degradation: operations go to the remote store
/// until the first failure, after which the process latches onto the local
/// store. The latch is one-way for the lifetime of the process; the
/// per-request path never waits on reconnection.
pub struct FallbackStore {
    remote: RemoteStore,
    local: MemoryStore,
    degraded: AtomicBool,
    label: &'static str,
}

impl FallbackStore {
    #[must_use]
    pub fn new(remote: RemoteStore, local: MemoryStore, label: &'static str) -> Self {
        Self {
            remote,
            local,
            degraded: AtomicBool::new(false),
            label,
        }
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    fn degrade(&self, error: &StoreError) {
        if self
            .degraded
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::warn!(
                store = self.label,
                %error,
                "shared store unavailable, falling back to process-local cache"
            );
        }
    }
}

#[async_trait]
impl TtlStore for FallbackStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if !self.is_degraded() {
            match self.remote.get(key).await {
                Ok(value) => return Ok(value),
                Err(error) => self.degrade(&error),
            }
        }
        self.local.get(key).await
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        if !self.is_degraded() {
            match self.remote.put(key, value, ttl).await {
                Ok(()) => return Ok(()),
                Err(error) => self.degrade(&error),
            }
        }
        self.local.put(key, value, ttl).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        if !self.is_degraded() {
            match self.remote.put_if_absent(key, value, ttl).await {
                Ok(created) => return Ok(created),
                Err(error) => self.degrade(&error),
            }
        }
        self.local.put_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        if !self.is_degraded() {
            match self.remote.delete(key).await {
                Ok(()) => return Ok(()),
                Err(error) => self.degrade(&error),
            }
        }
        self.local.delete(key).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        if !self.is_degraded() {
            match self.remote.clear().await {
                Ok(()) => return Ok(()),
                Err(error) => self.degrade(&error),
            }
        }
        self.local.clear().await
    }
}
