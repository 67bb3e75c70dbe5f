#![forbid(unsafe_code)]

use std::sync::Arc;

use lws_core::{
    AuthSuite, GRANT_TYPE_TOKEN_EXCHANGE, MAX_ACCESS_TOKEN_LIFETIME_SECS,
    TOKEN_TYPE_ACCESS_TOKEN,
};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::jwt::unix_now;
use crate::keys::RealmKeys;
use crate::validator::ValidatorRegistry;

const MAX_ERROR_DESCRIPTION_LEN: usize = 160;

/// Form-encoded body of an RFC 8693 token-exchange request.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRequest {
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub subject_token: String,
    #[serde(default)]
    pub subject_token_type: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub requested_token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// OAuth error surface of the `/token` endpoint.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    InvalidGrant(String),
    #[error("{0}")]
    ServerError(String),
}

impl ExchangeError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidGrant(_) => "invalid_grant",
            Self::ServerError(_) => "server_error",
        }
    }
}

/// Claim set of an issued LWS access token. `aud` is always a single string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub client_id: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub auth_suite: AuthSuite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_token_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// The authorization-server realm URI, used as `iss`.
    pub realm: String,
    /// The realm's configured token lifespan; capped at 300 s regardless.
    pub default_token_lifetime_secs: u64,
}

/// Mints LWS access tokens from validated subject tokens. Stateless given a
/// realm and a signing key; `jti` collisions are ruled out by UUIDv4.
pub struct TokenExchange {
    registry: ValidatorRegistry,
    keys: Arc<RealmKeys>,
    config: ExchangeConfig,
}

impl TokenExchange {
    #[must_use]
    pub fn new(registry: ValidatorRegistry, keys: Arc<RealmKeys>, config: ExchangeConfig) -> Self {
        Self {
            registry,
            keys,
            config,
        }
    }

    #[must_use]
    pub fn supported_token_types(&self) -> Vec<&'static str> {
        self.registry.supported_token_types()
    }

    pub async fn exchange(
        &self,
        request: ExchangeRequest,
    ) -> Result<ExchangeResponse, ExchangeError> {
        if request.grant_type != GRANT_TYPE_TOKEN_EXCHANGE {
            return Err(ExchangeError::InvalidRequest(format!(
                "grant_type must be {GRANT_TYPE_TOKEN_EXCHANGE}"
            )));
        }
        if let Some(requested) = request.requested_token_type.as_deref() {
            if requested != TOKEN_TYPE_ACCESS_TOKEN {
                return Err(ExchangeError::InvalidRequest(
                    "only access tokens can be issued".to_owned(),
                ));
            }
        }
        if request.subject_token.is_empty() {
            return Err(ExchangeError::InvalidRequest(
                "subject_token is required".to_owned(),
            ));
        }

        let resource = request
            .resource
            .as_deref()
            .filter(|resource| !resource.is_empty())
            .ok_or_else(|| ExchangeError::InvalidRequest("resource is required".to_owned()))?;
        let is_absolute = Url::parse(resource)
            .map(|url| url.host_str().is_some())
            .unwrap_or(false);
        if !is_absolute {
            return Err(ExchangeError::InvalidRequest(
                "resource must be an absolute URI".to_owned(),
            ));
        }

        let validator = self
            .registry
            .get(&request.subject_token_type)
            .ok_or_else(|| {
                ExchangeError::InvalidRequest(format!(
                    "Unsupported subject_token_type: {}",
                    request.subject_token_type
                ))
            })?;

        let principal = validator
            .validate(&request.subject_token, &self.config.realm)
            .await
            .map_err(|error| ExchangeError::InvalidGrant(truncate(&error.to_string())))?;

        let lifetime = self
            .config
            .default_token_lifetime_secs
            .min(MAX_ACCESS_TOKEN_LIFETIME_SECS);
        let iat = unix_now();
        let claims = AccessTokenClaims {
            iss: self.config.realm.clone(),
            sub: principal.subject,
            client_id: principal.client_id,
            aud: resource.to_owned(),
            iat,
            exp: iat + lifetime as i64,
            jti: Uuid::new_v4().to_string(),
            auth_suite: principal.auth_suite,
            subject_token_id: principal.subject_token_id,
            scope: request.scope.clone(),
        };

        let access_token = self.keys.sign(&claims).map_err(|error| {
            tracing::error!(%error, "failed to sign access token");
            ExchangeError::ServerError("Failed to generate access token".to_owned())
        })?;

        tracing::debug!(
            jti = %claims.jti,
            sub = %claims.sub,
            auth_suite = %claims.auth_suite,
            "issued access token"
        );

        Ok(ExchangeResponse {
            access_token,
            token_type: "Bearer".to_owned(),
            expires_in: lifetime,
            scope: request.scope,
        })
    }
}

fn truncate(description: &str) -> String {
    if description.len() <= MAX_ERROR_DESCRIPTION_LEN {
        return description.to_owned();
    }
    let mut cut = MAX_ERROR_DESCRIPTION_LEN;
    while !description.is_char_boundary(cut) {
        cut -= 1;
    }
    description[..cut].to_owned()
}
