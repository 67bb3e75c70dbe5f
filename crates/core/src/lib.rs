#![forbid(unsafe_code)]

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod uri;

pub use uri::{audience_contains, normalize_uri, UriError};

pub const GRANT_TYPE_TOKEN_EXCHANGE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const TOKEN_TYPE_ID_TOKEN: &str = "urn:ietf:params:oauth:token-type:id_token";
pub const TOKEN_TYPE_JWT: &str = "urn:ietf:params:oauth:token-type:jwt";
pub const TOKEN_TYPE_ACCESS_TOKEN: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Hard cap on access-token lifetime, enforced at issuance and again at
/// validation.
pub const MAX_ACCESS_TOKEN_LIFETIME_SECS: u64 = 300;

pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthSuite {
    #[serde(rename = "openid")]
    OpenId,
    #[serde(rename = "ssi-cid")]
    SsiCid,
    #[serde(rename = "ssi-did-key")]
    SsiDidKey,
}

impl AuthSuite {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenId => "openid",
            Self::SsiCid => "ssi-cid",
            Self::SsiDidKey => "ssi-did-key",
        }
    }
}

impl Display for AuthSuite {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthSuite {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openid" => Ok(Self::OpenId),
            "ssi-cid" => Ok(Self::SsiCid),
            "ssi-did-key" => Ok(Self::SsiDidKey),
            other => Err(CoreError::UnknownAuthSuite(other.to_owned())),
        }
    }
}

/// Normalised identity emitted by every subject-token validator and consumed
/// by the exchange handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub issuer: String,
    pub client_id: String,
    pub auth_suite: AuthSuite,
    /// The subject token's `jti`. Self-issued tokens always carry one;
    /// OpenID tokens may not.
    pub subject_token_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
    Update,
    Append,
    Delete,
}

impl Action {
    #[must_use]
    pub fn from_method(method: &str) -> Option<Self> {
        match method {
            "GET" | "HEAD" | "OPTIONS" => Some(Self::Read),
            "POST" => Some(Self::Create),
            "PUT" => Some(Self::Update),
            "PATCH" => Some(Self::Append),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Output of a successful access-token validation, handed to the storage
/// collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub principal_subject: String,
    pub client_id: String,
    pub action: Action,
    pub resource_path: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown authentication suite: {0}")]
    UnknownAuthSuite(String),
}
