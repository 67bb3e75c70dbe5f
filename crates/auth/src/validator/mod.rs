#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use lws_core::Principal;
use serde::Deserialize;

use crate::jwt::{parse_compact, unix_now, RawJwt};
use crate::ValidationError;

mod openid;
mod self_issued;

pub use openid::OpenIdValidator;
pub use self_issued::{SelfIssuedValidator, SsiCidValidator, SsiDidKeyValidator};

/// One authentication suite: a token-type URI plus a validation procedure
/// that turns a credential into a [`Principal`].
#[async_trait]
pub trait SubjectTokenValidator: Send + Sync {
    fn token_type(&self) -> &'static str;

    async fn validate(&self, token: &str, realm: &str) -> Result<Principal, ValidationError>;
}

/// Registry of validators keyed by token-type URI. Dispatch happens at the
/// edge of the exchange handler; there is no inheritance between suites.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: Vec<Arc<dyn SubjectTokenValidator>>,
}

impl ValidatorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, validator: Arc<dyn SubjectTokenValidator>) {
        self.validators.push(validator);
    }

    #[must_use]
    pub fn get(&self, token_type: &str) -> Option<Arc<dyn SubjectTokenValidator>> {
        self.validators
            .iter()
            .find(|validator| validator.token_type() == token_type)
            .cloned()
    }

    #[must_use]
    pub fn supported_token_types(&self) -> Vec<&'static str> {
        self.validators
            .iter()
            .map(|validator| validator.token_type())
            .collect()
    }
}

/// Claims of an incoming subject token, shapes not yet trusted. `aud` accepts
/// both the string and the array form.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SubjectClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub azp: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub aud: Option<AudienceClaim>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum AudienceClaim {
    One(String),
    Many(Vec<String>),
}

impl AudienceClaim {
    /// The subject-token audience policy: the claim must contain the
    /// authorization-server realm, compared in normalised form.
    pub fn contains(&self, realm: &str) -> bool {
        let realm = normalize_or_raw(realm);
        match self {
            Self::One(value) => normalize_or_raw(value) == realm,
            Self::Many(values) => values.iter().any(|value| normalize_or_raw(value) == realm),
        }
    }
}

fn normalize_or_raw(uri: &str) -> String {
    lws_core::normalize_uri(uri).unwrap_or_else(|_| uri.to_owned())
}

/// Checks shared by every suite, run before any key lookup or crypto:
/// compact-JWT shape, the `alg=none` rejection (inside [`parse_compact`]),
/// and the temporal claims under the configured skew.
pub(crate) fn precheck(
    token: &str,
    skew_secs: u64,
) -> Result<(RawJwt, SubjectClaims), ValidationError> {
    let raw = parse_compact(token)?;
    let claims: SubjectClaims = serde_json::from_value(raw.claims.clone())
        .map_err(|_| ValidationError::Malformed("unexpected claim types"))?;

    let iat = claims.iat.ok_or(ValidationError::MissingClaim("iat"))?;
    let exp = claims.exp.ok_or(ValidationError::MissingClaim("exp"))?;

    let now = unix_now();
    let skew = skew_secs as i64;
    if exp <= now - skew {
        return Err(ValidationError::TokenExpired);
    }
    if iat > now + skew {
        return Err(ValidationError::InvalidIat);
    }

    Ok((raw, claims))
}

pub(crate) fn require(
    value: Option<String>,
    claim: &'static str,
) -> Result<String, ValidationError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::MissingClaim(claim)),
    }
}
