#![forbid(unsafe_code)]

mod access;
mod exchange;
mod jti;
mod jwt;
mod keys;
#[cfg(test)]
mod test_support;
pub mod validator;

pub use access::{AccessTokenError, AccessTokenValidator, AccessValidatorConfig};
pub use exchange::{
    AccessTokenClaims, ExchangeConfig, ExchangeError, ExchangeRequest, ExchangeResponse,
    TokenExchange,
};
pub use jti::JtiStore;
pub use keys::{RealmKeyError, RealmKeys};
pub use validator::{SubjectTokenValidator, ValidatorRegistry};

/// Failure taxonomy shared by every subject-token validator. The exchange
/// handler maps these onto the OAuth error surface.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("malformed token: {0}")]
    Malformed(&'static str),
    #[error("token algorithm is not allowed")]
    DisallowedAlg,
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("audience does not contain the realm")]
    InvalidAudience,
    #[error("token has expired")]
    TokenExpired,
    #[error("token issued in the future")]
    InvalidIat,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("verification key not found: {0}")]
    KeyNotFound(String),
    #[error("self-issued token subject, issuer and client_id must match")]
    SelfIssuedMismatch,
    #[error("token algorithm does not match the key type")]
    AlgKeyMismatch,
}
