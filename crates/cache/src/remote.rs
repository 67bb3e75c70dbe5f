#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::{StoreError, TtlStore};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Client for the shared cache service. The service exposes a minimal TTL
/// key/value protocol:
///
/// - `GET    /entry?key=K`                  -> 200 body, or 404
/// - `PUT    /entry?key=K&ttl_s=N` body     -> 204
/// - `PUT    /entry?key=K&ttl_s=N&nx=true`  -> 201 created, or 409 exists
/// - `DELETE /entry?key=K`                  -> 204
/// - `DELETE /entries`                      -> 204
pub struct RemoteStore {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteStore {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
        }
    }

    fn entry_url(&self) -> String {
        format!("{}/entry", self.base_url)
    }
}

#[async_trait]
impl TtlStore for RemoteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let response = self
            .client
            .get(self.entry_url())
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .text()
                    .await
                    .map_err(|error| StoreError::Transport(error.to_string()))?;
                Ok(Some(body))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(StoreError::Status(status.as_u16())),
        }
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let ttl_s = ttl.as_secs().to_string();
        let response = self
            .client
            .put(self.entry_url())
            .query(&[("key", key), ("ttl_s", ttl_s.as_str())])
            .body(value.to_owned())
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Status(response.status().as_u16()))
        }
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let ttl_s = ttl.as_secs().to_string();
        let response = self
            .client
            .put(self.entry_url())
            .query(&[("key", key), ("ttl_s", ttl_s.as_str()), ("nx", "true")])
            .body(value.to_owned())
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        match response.status() {
            StatusCode::CREATED => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(StoreError::Status(status.as_u16())),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.entry_url())
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(StoreError::Status(response.status().as_u16()))
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(format!("{}/entries", self.base_url))
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Status(response.status().as_u16()))
        }
    }
}
