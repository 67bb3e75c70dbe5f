#![forbid(unsafe_code)]

mod cid;
mod client;
mod did_key;
mod jwk;
mod jwks;

pub use cid::{CidDocument, ServiceEndpoint, VerificationMethod};
pub use client::{CidResolver, CidResolverConfig};
pub use did_key::{encode_did_key, resolve_did_key};
pub use jwk::{Jwk, Jwks};
pub use jwks::{find_key, Discovery, JwksClient, MAX_JWKS_SIZE};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolverError {
    #[error("invalid identifier URI: {0}")]
    InvalidUri(String),
    #[error("identifier must use https: {0}")]
    HttpsRequired(String),
    #[error("document exceeds size limit: {0} bytes")]
    DocumentTooLarge(usize),
    #[error("request to upstream timed out")]
    Timeout,
    #[error("upstream returned status {0}")]
    FetchFailed(u16),
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("unsupported key type: multicodec 0x{0:x}")]
    UnsupportedKeyType(u64),
    #[error("unsupported key format: {0}")]
    UnsupportedKeyFormat(&'static str),
    #[error("no verification method for kid {0:?}")]
    NoVerificationMethod(String),
}

impl ResolverError {
    pub(crate) fn from_request(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Unreachable(error.to_string())
        }
    }
}
