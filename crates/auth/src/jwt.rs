#![forbid(unsafe_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey};
use k256::ecdsa::signature::Verifier as _;
use lws_resolver::Jwk;
use serde::Deserialize;

use crate::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RawHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// A compact JWT split into its parts, claims not yet trusted.
#[derive(Debug, Clone)]
pub(crate) struct RawJwt {
    pub header: RawHeader,
    pub claims: serde_json::Value,
    pub signing_input: String,
    pub signature: String,
}

/// Parse a compact JWT. Rejects `alg=none` before anything else looks at the
/// token; case and surrounding whitespace in the header value do not bypass
/// the check.
pub(crate) fn parse_compact(token: &str) -> Result<RawJwt, ValidationError> {
    let mut segments = token.split('.');
    let (header_b64, claims_b64, signature) =
        match (segments.next(), segments.next(), segments.next()) {
            (Some(header), Some(claims), Some(signature)) if segments.next().is_none() => {
                (header, claims, signature)
            }
            _ => return Err(ValidationError::Malformed("expected three segments")),
        };

    let header_bytes = URL_SAFE_NO_PAD
        .decode(header_b64.as_bytes())
        .map_err(|_| ValidationError::Malformed("header is not base64url"))?;
    let header: RawHeader = serde_json::from_slice(&header_bytes)
        .map_err(|_| ValidationError::Malformed("header is not JSON"))?;

    if header.alg.trim().eq_ignore_ascii_case("none") || header.alg.trim().is_empty() {
        return Err(ValidationError::DisallowedAlg);
    }

    let claims_bytes = URL_SAFE_NO_PAD
        .decode(claims_b64.as_bytes())
        .map_err(|_| ValidationError::Malformed("payload is not base64url"))?;
    let claims: serde_json::Value = serde_json::from_slice(&claims_bytes)
        .map_err(|_| ValidationError::Malformed("payload is not JSON"))?;

    Ok(RawJwt {
        header,
        claims,
        signing_input: format!("{header_b64}.{claims_b64}"),
        signature: signature.to_owned(),
    })
}

/// A verification key paired with the only algorithm it may be used with.
pub(crate) enum VerifierKey {
    Builtin(Box<DecodingKey>, Algorithm),
    Secp256k1(Box<k256::ecdsa::VerifyingKey>),
}

impl std::fmt::Debug for VerifierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifierKey::Builtin(_, alg) => f.debug_tuple("Builtin").field(alg).finish(),
            VerifierKey::Secp256k1(_) => f.debug_tuple("Secp256k1").finish(),
        }
    }
}

/// Build a verifier from a JWK, enforcing that the declared `alg` is
/// consistent with the key type.
pub(crate) fn verifier_for(jwk: &Jwk, alg: &str) -> Result<VerifierKey, ValidationError> {
    match (jwk.kty.as_str(), jwk.crv.as_deref()) {
        ("OKP", Some("Ed25519")) => {
            if alg != "EdDSA" {
                return Err(ValidationError::AlgKeyMismatch);
            }
            let x = jwk
                .x
                .as_deref()
                .ok_or_else(|| ValidationError::KeyNotFound("JWK is missing x".to_owned()))?;
            let key = DecodingKey::from_ed_components(x)
                .map_err(|_| ValidationError::KeyNotFound("invalid Ed25519 JWK".to_owned()))?;
            Ok(VerifierKey::Builtin(Box::new(key), Algorithm::EdDSA))
        }
        ("EC", Some("P-256")) => {
            if alg != "ES256" {
                return Err(ValidationError::AlgKeyMismatch);
            }
            let (x, y) = ec_components(jwk)?;
            let key = DecodingKey::from_ec_components(x, y)
                .map_err(|_| ValidationError::KeyNotFound("invalid P-256 JWK".to_owned()))?;
            Ok(VerifierKey::Builtin(Box::new(key), Algorithm::ES256))
        }
        ("EC", Some("secp256k1")) => {
            if alg != "ES256K" {
                return Err(ValidationError::AlgKeyMismatch);
            }
            let (x, y) = ec_components(jwk)?;
            let key = secp256k1_key(x, y)?;
            Ok(VerifierKey::Secp256k1(Box::new(key)))
        }
        ("RSA", _) => {
            let algorithm = match alg {
                "RS256" => Algorithm::RS256,
                "RS384" => Algorithm::RS384,
                "RS512" => Algorithm::RS512,
                _ => return Err(ValidationError::AlgKeyMismatch),
            };
            let n = jwk
                .n
                .as_deref()
                .ok_or_else(|| ValidationError::KeyNotFound("JWK is missing n".to_owned()))?;
            let e = jwk
                .e
                .as_deref()
                .ok_or_else(|| ValidationError::KeyNotFound("JWK is missing e".to_owned()))?;
            let key = DecodingKey::from_rsa_components(n, e)
                .map_err(|_| ValidationError::KeyNotFound("invalid RSA JWK".to_owned()))?;
            Ok(VerifierKey::Builtin(Box::new(key), algorithm))
        }
        _ => Err(ValidationError::AlgKeyMismatch),
    }
}

/// Verify the token signature. Every failure collapses to
/// `INVALID_SIGNATURE`; the caller has already checked alg/key consistency.
pub(crate) fn verify_signature(raw: &RawJwt, key: &VerifierKey) -> Result<(), ValidationError> {
    match key {
        VerifierKey::Builtin(key, algorithm) => {
            match jsonwebtoken::crypto::verify(
                &raw.signature,
                raw.signing_input.as_bytes(),
                key,
                *algorithm,
            ) {
                Ok(true) => Ok(()),
                _ => Err(ValidationError::InvalidSignature),
            }
        }
        VerifierKey::Secp256k1(key) => {
            let signature = URL_SAFE_NO_PAD
                .decode(raw.signature.as_bytes())
                .map_err(|_| ValidationError::InvalidSignature)?;
            let signature = k256::ecdsa::Signature::from_slice(&signature)
                .map_err(|_| ValidationError::InvalidSignature)?;
            key.verify(raw.signing_input.as_bytes(), &signature)
                .map_err(|_| ValidationError::InvalidSignature)
        }
    }
}

fn ec_components(jwk: &Jwk) -> Result<(&str, &str), ValidationError> {
    match (jwk.x.as_deref(), jwk.y.as_deref()) {
        (Some(x), Some(y)) => Ok((x, y)),
        _ => Err(ValidationError::KeyNotFound(
            "JWK is missing EC coordinates".to_owned(),
        )),
    }
}

fn secp256k1_key(x: &str, y: &str) -> Result<k256::ecdsa::VerifyingKey, ValidationError> {
    let x = URL_SAFE_NO_PAD
        .decode(x.as_bytes())
        .map_err(|_| ValidationError::KeyNotFound("invalid secp256k1 JWK".to_owned()))?;
    let y = URL_SAFE_NO_PAD
        .decode(y.as_bytes())
        .map_err(|_| ValidationError::KeyNotFound("invalid secp256k1 JWK".to_owned()))?;
    if x.len() != 32 || y.len() != 32 {
        return Err(ValidationError::KeyNotFound(
            "invalid secp256k1 JWK".to_owned(),
        ));
    }

    let mut sec1 = [0_u8; 65];
    sec1[0] = 0x04;
    sec1[1..33].copy_from_slice(&x);
    sec1[33..65].copy_from_slice(&y);
    k256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|_| ValidationError::KeyNotFound("point not on secp256k1 curve".to_owned()))
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
