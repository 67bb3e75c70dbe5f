#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use lws_api::{
    authorization_router, resolver_router, resource_router, AuthorizationState, ResolverState,
    ResourceState,
};
use lws_auth::validator::{OpenIdValidator, SelfIssuedValidator, ValidatorRegistry};
use lws_auth::{
    AccessTokenValidator, AccessValidatorConfig, ExchangeConfig, JtiStore, RealmKeys,
    TokenExchange,
};
use lws_cache::{FallbackStore, MemoryStore, RemoteStore, TtlStore};
use lws_resolver::{CidResolver, CidResolverConfig, JwksClient};
use lws_storage::MemoryStorage;

mod config;

pub use config::Config;

pub async fn run_authorization_server(config: Config) -> anyhow::Result<()> {
    let signing_keys = config
        .signing_keys
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("LWS_SIGNING_KEYS must be set"))?;
    let keys = Arc::new(load_signing_keys(signing_keys)?);

    let cache = shared_store(config.document_cache_endpoint.as_deref(), "document-cache");
    let registry = build_registry(&config, Arc::clone(&cache));
    let exchange = Arc::new(TokenExchange::new(
        registry,
        Arc::clone(&keys),
        ExchangeConfig {
            realm: config.authorization_server_uri.clone(),
            default_token_lifetime_secs: config.access_token_max_lifetime_secs,
        },
    ));

    let state = AuthorizationState::new(exchange, keys, config.authorization_server_uri.clone());
    serve(config, authorization_router(state), "authorization server").await
}

pub async fn run_resource_server(config: Config) -> anyhow::Result<()> {
    let cache = shared_store(config.document_cache_endpoint.as_deref(), "document-cache");
    let jwks = Arc::new(JwksClient::new(
        cache,
        Duration::from_millis(config.cid_fetch_timeout_ms),
        Duration::from_secs(config.cid_default_ttl_secs),
    ));
    let jti_store = JtiStore::new(shared_store(
        config.jti_store_endpoint.as_deref(),
        "jti-store",
    ));

    let validator = Arc::new(AccessTokenValidator::new(
        jwks,
        jti_store,
        AccessValidatorConfig {
            authorization_server_uri: config.authorization_server_uri.clone(),
            clock_skew_secs: config.clock_skew_tolerance_secs,
        },
    ));
    let state = ResourceState::new(
        validator,
        Arc::new(MemoryStorage::default()),
        config.realm_uri.clone(),
        config.authorization_server_uri.clone(),
    );
    serve(config, resource_router(state), "resource server").await
}

pub async fn run_resolver(config: Config) -> anyhow::Result<()> {
    let cache = shared_store(config.document_cache_endpoint.as_deref(), "document-cache");
    let resolver = Arc::new(CidResolver::new(cid_resolver_config(&config), cache));
    let state = ResolverState::new(resolver);
    serve(config, resolver_router(state), "resolver").await
}

fn build_registry(config: &Config, cache: Arc<dyn TtlStore>) -> ValidatorRegistry {
    let jwks = Arc::new(JwksClient::new(
        Arc::clone(&cache),
        Duration::from_millis(config.cid_fetch_timeout_ms),
        Duration::from_secs(config.cid_default_ttl_secs),
    ));
    let resolver = Arc::new(CidResolver::new(cid_resolver_config(config), cache));

    let mut registry = ValidatorRegistry::new();
    registry.register(Arc::new(OpenIdValidator::new(
        jwks,
        config.clock_skew_tolerance_secs,
    )));
    registry.register(Arc::new(SelfIssuedValidator::new(
        resolver,
        config.clock_skew_tolerance_secs,
    )));
    registry
}

fn cid_resolver_config(config: &Config) -> CidResolverConfig {
    CidResolverConfig {
        https_only: config.cid_https_only,
        max_bytes: config.cid_max_bytes,
        fetch_timeout: Duration::from_millis(config.cid_fetch_timeout_ms),
        default_ttl: Duration::from_secs(config.cid_default_ttl_secs),
    }
}

/// Shared store selection: a configured endpoint gets the remote client with
/// the in-process fallback; no endpoint means plain process-local caching.
fn shared_store(endpoint: Option<&str>, label: &'static str) -> Arc<dyn TtlStore> {
    match endpoint {
        Some(endpoint) => Arc::new(FallbackStore::new(
            RemoteStore::new(endpoint),
            MemoryStore::default(),
            label,
        )),
        None => Arc::new(MemoryStore::default()),
    }
}

/// `LWS_SIGNING_KEYS` holds either the JWKS document itself or a path to it.
fn load_signing_keys(raw: &str) -> anyhow::Result<RealmKeys> {
    let json = if raw.trim_start().starts_with('{') {
        raw.to_owned()
    } else {
        std::fs::read_to_string(raw)
            .map_err(|error| anyhow::anyhow!("failed to read signing keys from {raw:?}: {error}"))?
    };
    Ok(RealmKeys::from_jwks_json(&json)?)
}

async fn serve(config: Config, router: axum::Router, name: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "{name} listening");
    axum::serve(listener, router).await?;
    Ok(())
}
