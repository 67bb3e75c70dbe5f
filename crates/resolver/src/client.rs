#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use lws_cache::TtlStore;
use reqwest::header::{HeaderValue, ACCEPT, CACHE_CONTROL};
use url::{Host, Url};

use crate::{CidDocument, Jwk, ResolverError};

const ACCEPT_CID: &str = "application/ld+json, application/json";
const MIN_DOCUMENT_TTL: Duration = Duration::from_secs(60);
const CACHE_PREFIX: &str = "ciddoc:";

#[derive(Debug, Clone)]
pub struct CidResolverConfig {
    pub https_only: bool,
    pub max_bytes: usize,
    pub fetch_timeout: Duration,
    pub default_ttl: Duration,
}

impl Default for CidResolverConfig {
    fn default() -> Self {
        Self {
            https_only: true,
            max_bytes: 10 * 1024,
            fetch_timeout: Duration::from_secs(5),
            default_ttl: Duration::from_secs(3600),
        }
    }
}

/// Fetches and caches Controlled Identifier Documents. The cache bounds the
/// cost of repeated resolution; it is never trusted for more than that.
pub struct CidResolver {
    config: CidResolverConfig,
    client: reqwest::Client,
    cache: Arc<dyn TtlStore>,
}

impl CidResolver {
    #[must_use]
    pub fn new(config: CidResolverConfig, cache: Arc<dyn TtlStore>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            config,
            client,
            cache,
        }
    }

    pub async fn resolve(&self, uri: &str) -> Result<CidDocument, ResolverError> {
        let normalized = self.validate_identifier(uri)?;
        let cache_key = format!("{CACHE_PREFIX}{normalized}");

        if let Ok(Some(cached)) = self.cache.get(&cache_key).await {
            if let Ok(document) = serde_json::from_str::<CidDocument>(&cached) {
                return Ok(document);
            }
        }

        let response = self
            .client
            .get(uri)
            .header(ACCEPT, HeaderValue::from_static(ACCEPT_CID))
            .send()
            .await
            .map_err(|error| ResolverError::from_request(&error))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolverError::FetchFailed(status.as_u16()));
        }

        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_max_age);

        let body = response
            .bytes()
            .await
            .map_err(|error| ResolverError::from_request(&error))?;
        if body.len() > self.config.max_bytes {
            return Err(ResolverError::DocumentTooLarge(body.len()));
        }

        let document: CidDocument = serde_json::from_slice(&body)
            .map_err(|error| ResolverError::InvalidDocument(error.to_string()))?;
        document.validate(uri)?;

        let ttl = document_ttl(max_age, self.config.default_ttl);
        if let Ok(serialized) = serde_json::to_string(&document) {
            if let Err(error) = self.cache.put(&cache_key, &serialized, ttl).await {
                tracing::debug!(%error, "failed to cache identifier document");
            }
        }

        Ok(document)
    }

    /// Resolve an identifier and extract the verification key named by `kid`.
    pub async fn verification_key(&self, uri: &str, kid: &str) -> Result<Jwk, ResolverError> {
        let document = self.resolve(uri).await?;
        document
            .verification_method(kid)
            .map(|method| method.public_key_jwk.clone())
            .ok_or_else(|| ResolverError::NoVerificationMethod(kid.to_owned()))
    }

    fn validate_identifier(&self, uri: &str) -> Result<String, ResolverError> {
        let url = Url::parse(uri).map_err(|_| ResolverError::InvalidUri(uri.to_owned()))?;
        match url.scheme() {
            "https" => {}
            "http" => {
                if self.config.https_only && !is_loopback(&url) {
                    return Err(ResolverError::HttpsRequired(uri.to_owned()));
                }
            }
            _ => return Err(ResolverError::InvalidUri(uri.to_owned())),
        }

        lws_core::normalize_uri(uri).map_err(|_| ResolverError::InvalidUri(uri.to_owned()))
    }
}

// Loopback hosts stay reachable over plain http for development setups.
fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

fn document_ttl(max_age: Option<u64>, default_ttl: Duration) -> Duration {
    let ttl = match max_age {
        Some(max_age) => Duration::from_secs(max_age).min(default_ttl),
        None => default_ttl,
    };
    ttl.max(MIN_DOCUMENT_TTL)
}

fn parse_max_age(header: &str) -> Option<u64> {
    header.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|value| value.parse().ok())
    })
}
