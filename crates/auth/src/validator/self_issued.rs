#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use lws_core::{AuthSuite, Principal, TOKEN_TYPE_JWT};
use lws_resolver::{resolve_did_key, CidResolver, ResolverError};

use crate::jwt::{parse_compact, verifier_for, verify_signature};
use crate::validator::{precheck, require, SubjectClaims, SubjectTokenValidator};
use crate::ValidationError;

/// Self-issued tokens bound to a Controlled Identifier Document: the `sub`
/// is an https identifier, and the verification key is looked up in the
/// resolved document by the header `kid`.
pub struct SsiCidValidator {
    resolver: Arc<CidResolver>,
    clock_skew_secs: u64,
}

/// Self-issued tokens whose key is embedded in the `did:key` subject itself.
pub struct SsiDidKeyValidator {
    clock_skew_secs: u64,
}

/// Registry entry for the shared `jwt` token-type URI: routes on the shape
/// of the (unverified) `sub` claim, then hands off to the suite validator.
pub struct SelfIssuedValidator {
    cid: SsiCidValidator,
    did_key: SsiDidKeyValidator,
}

impl SsiCidValidator {
    #[must_use]
    pub fn new(resolver: Arc<CidResolver>, clock_skew_secs: u64) -> Self {
        Self {
            resolver,
            clock_skew_secs,
        }
    }
}

impl SsiDidKeyValidator {
    #[must_use]
    pub fn new(clock_skew_secs: u64) -> Self {
        Self { clock_skew_secs }
    }
}

impl SelfIssuedValidator {
    #[must_use]
    pub fn new(resolver: Arc<CidResolver>, clock_skew_secs: u64) -> Self {
        Self {
            cid: SsiCidValidator::new(resolver, clock_skew_secs),
            did_key: SsiDidKeyValidator::new(clock_skew_secs),
        }
    }
}

#[async_trait]
impl SubjectTokenValidator for SsiCidValidator {
    fn token_type(&self) -> &'static str {
        TOKEN_TYPE_JWT
    }

    async fn validate(&self, token: &str, realm: &str) -> Result<Principal, ValidationError> {
        let (raw, claims) = precheck(token, self.clock_skew_secs)?;
        let (sub, jti) = self_issued_claims(claims, realm)?;

        if !sub.starts_with("https://") && !sub.starts_with("http://") {
            return Err(ValidationError::InvalidIssuer);
        }

        let kid = raw
            .header
            .kid
            .as_deref()
            .ok_or_else(|| ValidationError::KeyNotFound("missing kid in JWT header".to_owned()))?;
        let jwk = self
            .resolver
            .verification_key(&sub, kid)
            .await
            .map_err(map_resolver_error)?;

        let key = verifier_for(&jwk, &raw.header.alg)?;
        verify_signature(&raw, &key)?;

        Ok(self_issued_principal(sub, jti, AuthSuite::SsiCid))
    }
}

#[async_trait]
impl SubjectTokenValidator for SsiDidKeyValidator {
    fn token_type(&self) -> &'static str {
        TOKEN_TYPE_JWT
    }

    async fn validate(&self, token: &str, realm: &str) -> Result<Principal, ValidationError> {
        let (raw, claims) = precheck(token, self.clock_skew_secs)?;
        let (sub, jti) = self_issued_claims(claims, realm)?;

        if !sub.starts_with("did:key:") {
            return Err(ValidationError::InvalidIssuer);
        }

        let jwk = resolve_did_key(&sub).map_err(map_resolver_error)?;
        let key = verifier_for(&jwk, &raw.header.alg)?;
        verify_signature(&raw, &key)?;

        Ok(self_issued_principal(sub, jti, AuthSuite::SsiDidKey))
    }
}

#[async_trait]
impl SubjectTokenValidator for SelfIssuedValidator {
    fn token_type(&self) -> &'static str {
        TOKEN_TYPE_JWT
    }

    async fn validate(&self, token: &str, realm: &str) -> Result<Principal, ValidationError> {
        let raw = parse_compact(token)?;
        let sub = raw
            .claims
            .get("sub")
            .and_then(serde_json::Value::as_str)
            .ok_or(ValidationError::MissingClaim("sub"))?;

        if sub.starts_with("did:key:") {
            self.did_key.validate(token, realm).await
        } else if sub.starts_with("https://") || sub.starts_with("http://") {
            self.cid.validate(token, realm).await
        } else {
            Err(ValidationError::Malformed(
                "sub is neither an https identifier nor a did:key",
            ))
        }
    }
}

/// The self-issued invariant: `sub`, `iss` and `client_id` are the same
/// identifier, `jti` is mandatory, and the audience must contain the realm.
fn self_issued_claims(
    claims: SubjectClaims,
    realm: &str,
) -> Result<(String, String), ValidationError> {
    let sub = require(claims.sub, "sub")?;
    let iss = require(claims.iss, "iss")?;
    let client_id = require(claims.client_id, "client_id")?;
    let jti = require(claims.jti, "jti")?;
    let aud = claims.aud.ok_or(ValidationError::MissingClaim("aud"))?;

    if sub != iss || sub != client_id {
        return Err(ValidationError::SelfIssuedMismatch);
    }
    if !aud.contains(realm) {
        return Err(ValidationError::InvalidAudience);
    }

    Ok((sub, jti))
}

fn self_issued_principal(sub: String, jti: String, suite: AuthSuite) -> Principal {
    Principal {
        subject: sub.clone(),
        issuer: sub.clone(),
        client_id: sub,
        auth_suite: suite,
        subject_token_id: Some(jti),
    }
}

fn map_resolver_error(error: ResolverError) -> ValidationError {
    ValidationError::KeyNotFound(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lws_cache::MemoryStore;
    use lws_core::AuthSuite;
    use lws_resolver::{CidResolver, CidResolverConfig};

    use super::{SelfIssuedValidator, SsiCidValidator, SsiDidKeyValidator};
    use crate::test_support::{mock_cid_host, unix_now, Ed25519KeyPair};
    use crate::validator::SubjectTokenValidator;
    use crate::ValidationError;

    const REALM: &str = "https://as.example/realms/lws";

    fn cid_resolver() -> Arc<CidResolver> {
        Arc::new(CidResolver::new(
            CidResolverConfig::default(),
            Arc::new(MemoryStore::default()),
        ))
    }

    fn self_issued_claims(identifier: &str) -> serde_json::Value {
        serde_json::json!({
            "sub": identifier,
            "iss": identifier,
            "client_id": identifier,
            "aud": REALM,
            "iat": unix_now(),
            "exp": unix_now() + 120,
            "jti": "subject-jti-1",
        })
    }

    #[tokio::test]
    async fn did_key_token_round_trips() {
        let key = Ed25519KeyPair::new();
        let did = key.did();
        let token = key.sign(None, &self_issued_claims(&did));

        let principal = SsiDidKeyValidator::new(60)
            .validate(&token, REALM)
            .await
            .expect("validate did:key token");

        assert_eq!(principal.subject, did);
        assert_eq!(principal.issuer, did);
        assert_eq!(principal.client_id, did);
        assert_eq!(principal.auth_suite, AuthSuite::SsiDidKey);
        assert_eq!(principal.subject_token_id.as_deref(), Some("subject-jti-1"));
    }

    #[tokio::test]
    async fn self_issued_identity_must_match() {
        let key = Ed25519KeyPair::new();
        let did = key.did();

        let mut claims = self_issued_claims(&did);
        claims["client_id"] = serde_json::json!("https://b.example");
        let token = key.sign(None, &claims);

        let error = SsiDidKeyValidator::new(60)
            .validate(&token, REALM)
            .await
            .expect_err("client_id mismatch");
        assert_eq!(error, ValidationError::SelfIssuedMismatch);
    }

    #[tokio::test]
    async fn missing_jti_is_rejected() {
        let key = Ed25519KeyPair::new();
        let did = key.did();

        let mut claims = self_issued_claims(&did);
        claims.as_object_mut().expect("object").remove("jti");
        let token = key.sign(None, &claims);

        let error = SsiDidKeyValidator::new(60)
            .validate(&token, REALM)
            .await
            .expect_err("missing jti");
        assert_eq!(error, ValidationError::MissingClaim("jti"));
    }

    #[tokio::test]
    async fn token_signed_by_a_different_key_fails() {
        let key = Ed25519KeyPair::new();
        let impostor = Ed25519KeyPair::new();
        // Claims name the honest identity; the signature comes from another
        // key entirely.
        let token = impostor.sign(None, &self_issued_claims(&key.did()));

        let error = SsiDidKeyValidator::new(60)
            .validate(&token, REALM)
            .await
            .expect_err("foreign signature");
        assert_eq!(error, ValidationError::InvalidSignature);
    }

    #[tokio::test]
    async fn declared_alg_must_match_the_key_type() {
        let key = Ed25519KeyPair::new();
        let did = key.did();
        let token = key.sign_with_alg("ES256", &self_issued_claims(&did));

        let error = SsiDidKeyValidator::new(60)
            .validate(&token, REALM)
            .await
            .expect_err("alg/key mismatch");
        assert_eq!(error, ValidationError::AlgKeyMismatch);
    }

    #[tokio::test]
    async fn audience_must_contain_the_realm() {
        let key = Ed25519KeyPair::new();
        let did = key.did();

        let mut claims = self_issued_claims(&did);
        claims["aud"] = serde_json::json!(["https://somewhere-else.example"]);
        let token = key.sign(None, &claims);

        let error = SsiDidKeyValidator::new(60)
            .validate(&token, REALM)
            .await
            .expect_err("wrong audience");
        assert_eq!(error, ValidationError::InvalidAudience);
    }

    #[tokio::test]
    async fn cid_token_round_trips() {
        let key = Ed25519KeyPair::new();
        let host = mock_cid_host(key.jwk("key-1"), "key-1").await;
        let identifier = format!("{}/profile", host.url);

        let token = key.sign(Some("key-1"), &self_issued_claims(&identifier));
        let principal = SsiCidValidator::new(cid_resolver(), 60)
            .validate(&token, REALM)
            .await
            .expect("validate cid token");

        assert_eq!(principal.subject, identifier);
        assert_eq!(principal.auth_suite, AuthSuite::SsiCid);
    }

    #[tokio::test]
    async fn cid_token_requires_a_kid_header() {
        let key = Ed25519KeyPair::new();
        let host = mock_cid_host(key.jwk("key-1"), "key-1").await;
        let identifier = format!("{}/profile", host.url);

        let token = key.sign(None, &self_issued_claims(&identifier));
        let error = SsiCidValidator::new(cid_resolver(), 60)
            .validate(&token, REALM)
            .await
            .expect_err("missing kid");
        assert!(matches!(error, ValidationError::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn unknown_kid_is_not_found() {
        let key = Ed25519KeyPair::new();
        let host = mock_cid_host(key.jwk("key-1"), "key-1").await;
        let identifier = format!("{}/profile", host.url);

        let token = key.sign(Some("key-9"), &self_issued_claims(&identifier));
        let error = SsiCidValidator::new(cid_resolver(), 60)
            .validate(&token, REALM)
            .await
            .expect_err("unknown kid");
        assert!(matches!(error, ValidationError::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn shared_urn_dispatches_on_subject_shape() {
        let key = Ed25519KeyPair::new();
        let did = key.did();
        let validator = SelfIssuedValidator::new(cid_resolver(), 60);

        let token = key.sign(None, &self_issued_claims(&did));
        let principal = validator
            .validate(&token, REALM)
            .await
            .expect("did:key route");
        assert_eq!(principal.auth_suite, AuthSuite::SsiDidKey);

        let token = key.sign(None, &self_issued_claims("urn:example:nope"));
        let error = validator
            .validate(&token, REALM)
            .await
            .expect_err("unroutable subject");
        assert!(matches!(error, ValidationError::Malformed(_)));
    }
}
