#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use lws_cache::{StoreError, TtlStore};

const KEY_PREFIX: &str = "jti:";

/// Single-use registry for access-token ids. Entries live exactly as long as
/// the token they belong to and are never mutated.
pub struct JtiStore {
    store: Arc<dyn TtlStore>,
}

impl JtiStore {
    #[must_use]
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self { store }
    }

    pub async fn is_used(&self, jti: &str) -> Result<bool, StoreError> {
        let value = self.store.get(&format!("{KEY_PREFIX}{jti}")).await?;
        Ok(value.is_some())
    }

    /// Mark a token id as used. Returns `true` when this call created the
    /// mark; `false` means another request got there first. The underlying
    /// set-if-absent is the serialisation point between racing requests.
    pub async fn mark_used(&self, jti: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.store
            .put_if_absent(&format!("{KEY_PREFIX}{jti}"), "1", ttl.max(Duration::from_secs(1)))
            .await
    }
}
