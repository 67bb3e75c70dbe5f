#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use lws_cache::TtlStore;
use serde::Deserialize;

use crate::{Jwk, Jwks, ResolverError};

pub const MAX_JWKS_SIZE: usize = 1 << 20;

const CACHE_PREFIX: &str = "jwks:";

/// Which discovery document advertises the `jwks_uri`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discovery {
    /// `/.well-known/openid-configuration` — OpenID subject-token issuers.
    OpenId,
    /// `/.well-known/lws-configuration` — LWS authorization servers.
    Lws,
}

impl Discovery {
    #[must_use]
    fn well_known_path(self) -> &'static str {
        match self {
            Self::OpenId => "/.well-known/openid-configuration",
            Self::Lws => "/.well-known/lws-configuration",
        }
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    jwks_uri: String,
}

/// Discovers and caches the signing keys of an issuer. Cached per issuer in
/// the shared document cache; a poisoned cache still cannot forge signatures.
pub struct JwksClient {
    client: reqwest::Client,
    cache: Arc<dyn TtlStore>,
    ttl: Duration,
}

impl JwksClient {
    #[must_use]
    pub fn new(cache: Arc<dyn TtlStore>, fetch_timeout: Duration, ttl: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, cache, ttl }
    }

    /// Fetch the issuer's JWKS, going through discovery on cache miss.
    pub async fn keys(&self, issuer: &str, discovery: Discovery) -> Result<Jwks, ResolverError> {
        let issuer_key = lws_core::normalize_uri(issuer)
            .map_err(|_| ResolverError::InvalidUri(issuer.to_owned()))?;
        let cache_key = format!("{CACHE_PREFIX}{issuer_key}");

        if let Ok(Some(cached)) = self.cache.get(&cache_key).await {
            if let Ok(jwks) = serde_json::from_str::<Jwks>(&cached) {
                return Ok(jwks);
            }
        }

        let discovery_url = format!(
            "{}{}",
            issuer.trim_end_matches('/'),
            discovery.well_known_path()
        );
        let discovered: DiscoveryDocument = self.fetch_json(&discovery_url).await?;
        let jwks: Jwks = self.fetch_json(&discovered.jwks_uri).await?;

        if let Ok(serialized) = serde_json::to_string(&jwks) {
            if let Err(error) = self.cache.put(&cache_key, &serialized, self.ttl).await {
                tracing::debug!(%error, "failed to cache JWKS");
            }
        }

        Ok(jwks)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ResolverError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| ResolverError::from_request(&error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::FetchFailed(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|error| ResolverError::from_request(&error))?;
        if body.len() > MAX_JWKS_SIZE {
            return Err(ResolverError::DocumentTooLarge(body.len()));
        }

        serde_json::from_slice(&body)
            .map_err(|error| ResolverError::InvalidDocument(error.to_string()))
    }
}

/// Pick a key out of a JWKS. A `kid` is required unless the set holds exactly
/// one key.
#[must_use]
pub fn find_key<'a>(jwks: &'a Jwks, kid: Option<&str>) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => jwks
            .keys
            .iter()
            .find(|key| key.kid.as_deref() == Some(kid)),
        None => {
            if jwks.keys.len() == 1 {
                jwks.keys.first()
            } else {
                None
            }
        }
    }
}
