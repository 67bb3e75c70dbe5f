#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::str::FromStr;

use lws_core::MAX_ACCESS_TOKEN_LIFETIME_SECS;
use url::Url;

/// Configuration shared by the three processes. Every option maps to one
/// `LWS_*` environment variable; unset options take the documented defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    /// Storage realm URI: the audience authority of the resource server.
    pub realm_uri: String,
    pub authorization_server_uri: String,
    /// Inline JWKS JSON, or a path to a JWKS file (authorization server).
    pub signing_keys: Option<String>,
    pub access_token_max_lifetime_secs: u64,
    pub clock_skew_tolerance_secs: u64,
    pub cid_https_only: bool,
    pub cid_max_bytes: usize,
    pub cid_fetch_timeout_ms: u64,
    pub cid_default_ttl_secs: u64,
    pub jti_store_endpoint: Option<String>,
    pub document_cache_endpoint: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_values(ConfigValues {
            listen_addr: std::env::var("LWS_LISTEN_ADDR").ok(),
            realm_uri: std::env::var("LWS_REALM_URI").ok(),
            authorization_server_uri: std::env::var("LWS_AUTHORIZATION_SERVER_URI").ok(),
            signing_keys: std::env::var("LWS_SIGNING_KEYS").ok(),
            access_token_max_lifetime_secs: std::env::var("LWS_ACCESS_TOKEN_MAX_LIFETIME_S").ok(),
            clock_skew_tolerance_secs: std::env::var("LWS_CLOCK_SKEW_TOLERANCE_S").ok(),
            cid_https_only: std::env::var("LWS_CID_HTTPS_ONLY").ok(),
            cid_max_bytes: std::env::var("LWS_CID_MAX_BYTES").ok(),
            cid_fetch_timeout_ms: std::env::var("LWS_CID_FETCH_TIMEOUT_MS").ok(),
            cid_default_ttl_secs: std::env::var("LWS_CID_DEFAULT_TTL_S").ok(),
            jti_store_endpoint: std::env::var("LWS_JTI_STORE_ENDPOINT").ok(),
            document_cache_endpoint: std::env::var("LWS_DOCUMENT_CACHE_ENDPOINT").ok(),
        })
    }

    pub(crate) fn from_values(values: ConfigValues) -> anyhow::Result<Self> {
        let listen_addr =
            SocketAddr::from_str(values.listen_addr.as_deref().unwrap_or("127.0.0.1:3000"))?;

        let realm_uri = values
            .realm_uri
            .ok_or_else(|| anyhow::anyhow!("LWS_REALM_URI must be set"))?;
        validate_http_url(&realm_uri, "realm")?;

        let authorization_server_uri = values
            .authorization_server_uri
            .ok_or_else(|| anyhow::anyhow!("LWS_AUTHORIZATION_SERVER_URI must be set"))?;
        validate_http_url(&authorization_server_uri, "authorization server")?;

        // The lifetime option can only tighten the 300 s cap, never widen it.
        let access_token_max_lifetime_secs = parse_or(
            values.access_token_max_lifetime_secs,
            MAX_ACCESS_TOKEN_LIFETIME_SECS,
        )?
        .min(MAX_ACCESS_TOKEN_LIFETIME_SECS);

        Ok(Self {
            listen_addr,
            realm_uri,
            authorization_server_uri,
            signing_keys: values.signing_keys,
            access_token_max_lifetime_secs,
            clock_skew_tolerance_secs: parse_or(values.clock_skew_tolerance_secs, 60)?,
            cid_https_only: parse_bool_or(values.cid_https_only, true)?,
            cid_max_bytes: parse_or(values.cid_max_bytes, 10_240)?,
            cid_fetch_timeout_ms: parse_or(values.cid_fetch_timeout_ms, 5_000)?,
            cid_default_ttl_secs: parse_or(values.cid_default_ttl_secs, 3_600)?,
            jti_store_endpoint: values.jti_store_endpoint.filter(|value| !value.is_empty()),
            document_cache_endpoint: values
                .document_cache_endpoint
                .filter(|value| !value.is_empty()),
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct ConfigValues {
    pub listen_addr: Option<String>,
    pub realm_uri: Option<String>,
    pub authorization_server_uri: Option<String>,
    pub signing_keys: Option<String>,
    pub access_token_max_lifetime_secs: Option<String>,
    pub clock_skew_tolerance_secs: Option<String>,
    pub cid_https_only: Option<String>,
    pub cid_max_bytes: Option<String>,
    pub cid_fetch_timeout_ms: Option<String>,
    pub cid_default_ttl_secs: Option<String>,
    pub jti_store_endpoint: Option<String>,
    pub document_cache_endpoint: Option<String>,
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|error| anyhow::anyhow!("invalid numeric option {raw:?}: {error}")),
        None => Ok(default),
    }
}

fn parse_bool_or(value: Option<String>, default: bool) -> anyhow::Result<bool> {
    match value.as_deref() {
        None => Ok(default),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(anyhow::anyhow!("invalid boolean option {other:?}")),
    }
}

fn validate_http_url(raw: &str, label: &str) -> anyhow::Result<()> {
    let parsed =
        Url::parse(raw).map_err(|error| anyhow::anyhow!("invalid {label} URL {raw:?}: {error}"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(anyhow::anyhow!(
            "invalid {label} URL {raw:?}: must use http or https"
        ));
    }
    Ok(())
}
