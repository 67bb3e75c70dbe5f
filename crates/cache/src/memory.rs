#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::{StoreError, TtlStore};

const DEFAULT_CAPACITY: usize = 4096;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process TTL store: a mutex-guarded map with an expiry sweep on write.
/// Correct but not shared across processes; used as the degraded fallback.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl MemoryStore {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn insert(&self, key: &str, value: &str, ttl: Duration, only_if_absent: bool) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();

        if only_if_absent {
            if let Some(existing) = entries.get(key) {
                if existing.expires_at > now {
                    return false;
                }
            }
        }

        if entries.len() >= self.capacity {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        if entries.len() >= self.capacity {
            let evict = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(key, _)| key.clone());
            if let Some(evict) = evict {
                entries.remove(&evict);
            }
        }

        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: now + ttl,
            },
        );
        true
    }
}

#[async_trait]
impl TtlStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock();
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                return Ok(Some(entry.value.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.insert(key, value, ttl, false);
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        Ok(self.insert(key, value, ttl, true))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.lock().clear();
        Ok(())
    }
}
