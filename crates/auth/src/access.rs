#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use lws_core::{
    audience_contains, normalize_uri, Action, ValidatedRequest, MAX_ACCESS_TOKEN_LIFETIME_SECS,
};
use lws_resolver::{find_key, Discovery, JwksClient};
use serde::Deserialize;
use url::Url;

use crate::jti::JtiStore;
use crate::jwt::{parse_compact, unix_now, verifier_for, verify_signature};

/// Failure surface of resource-side access-token validation. The middleware
/// lowercases the kind into the challenge's `error` parameter.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AccessTokenError {
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("token lifetime exceeds the cap")]
    LifetimeExceeded,
    #[error("token has expired")]
    TokenExpired,
    #[error("token issued in the future")]
    InvalidIat,
    #[error("audience does not contain the resource")]
    InvalidAudience,
    #[error("token has already been used")]
    TokenReplay,
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("upstream dependency failed: {0}")]
    Upstream(String),
}

impl AccessTokenError {
    /// Stable code for the `error` parameter of the challenge header.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "invalid_token",
            Self::InvalidSignature => "invalid_signature",
            Self::MissingClaim(_) => "missing_claim",
            Self::InvalidIssuer => "invalid_issuer",
            Self::LifetimeExceeded => "lifetime_exceeded",
            Self::TokenExpired => "token_expired",
            Self::InvalidIat => "invalid_iat",
            Self::InvalidAudience => "invalid_audience",
            Self::TokenReplay => "token_replay",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::Upstream(_) => "server_error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccessValidatorConfig {
    /// Issuer the token must carry; also where signing keys are discovered.
    pub authorization_server_uri: String,
    pub clock_skew_secs: u64,
}

/// Claims as found in the wire token; every field is re-checked explicitly.
#[derive(Debug, Deserialize)]
struct RawAccessClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    jti: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
}

/// Validates an access token against a concrete request. The steps run in a
/// fixed order; the replay mark is the last side effect before dispatch.
pub struct AccessTokenValidator {
    jwks: Arc<JwksClient>,
    jti_store: JtiStore,
    config: AccessValidatorConfig,
}

impl AccessTokenValidator {
    #[must_use]
    pub fn new(jwks: Arc<JwksClient>, jti_store: JtiStore, config: AccessValidatorConfig) -> Self {
        Self {
            jwks,
            jti_store,
            config,
        }
    }

    pub async fn validate(
        &self,
        token: &str,
        method: &str,
        resource: &str,
    ) -> Result<ValidatedRequest, AccessTokenError> {
        // 1. Parse; a malformed compact form or alg=none never gets further.
        let raw = parse_compact(token).map_err(|_| AccessTokenError::InvalidToken)?;

        // 2. Verify the signature against the realm's discovered keys.
        let jwks = self
            .jwks
            .keys(&self.config.authorization_server_uri, Discovery::Lws)
            .await
            .map_err(|error| AccessTokenError::Upstream(error.to_string()))?;
        let jwk = find_key(&jwks, raw.header.kid.as_deref())
            .ok_or(AccessTokenError::InvalidSignature)?;
        let key =
            verifier_for(jwk, &raw.header.alg).map_err(|_| AccessTokenError::InvalidSignature)?;
        verify_signature(&raw, &key).map_err(|_| AccessTokenError::InvalidSignature)?;

        // 3. Required claims.
        let claims: RawAccessClaims = serde_json::from_value(raw.claims)
            .map_err(|_| AccessTokenError::InvalidToken)?;
        let sub = claims.sub.ok_or(AccessTokenError::MissingClaim("sub"))?;
        let iss = claims.iss.ok_or(AccessTokenError::MissingClaim("iss"))?;
        let aud = claims.aud.ok_or(AccessTokenError::MissingClaim("aud"))?;
        let exp = claims.exp.ok_or(AccessTokenError::MissingClaim("exp"))?;
        let iat = claims.iat.ok_or(AccessTokenError::MissingClaim("iat"))?;
        let jti = claims.jti.ok_or(AccessTokenError::MissingClaim("jti"))?;

        // 4. Issuer binding.
        let expected_iss = normalize_uri(&self.config.authorization_server_uri)
            .map_err(|_| AccessTokenError::InvalidIssuer)?;
        if normalize_uri(&iss).map_err(|_| AccessTokenError::InvalidIssuer)? != expected_iss {
            return Err(AccessTokenError::InvalidIssuer);
        }

        // 5. Lifetime cap, re-enforced independently of issuance.
        if exp - iat > MAX_ACCESS_TOKEN_LIFETIME_SECS as i64 {
            return Err(AccessTokenError::LifetimeExceeded);
        }

        // 6. Temporal checks under skew.
        let now = unix_now();
        let skew = self.config.clock_skew_secs as i64;
        if exp < now - skew {
            return Err(AccessTokenError::TokenExpired);
        }
        if iat > now + skew {
            return Err(AccessTokenError::InvalidIat);
        }

        // 7. Audience containment.
        if !audience_contains(&aud, resource).map_err(|_| AccessTokenError::InvalidAudience)? {
            return Err(AccessTokenError::InvalidAudience);
        }

        // 8. Replay. The set-if-absent either creates the mark or proves a
        // second use; ties go to exactly one winner.
        let remaining = Duration::from_secs((exp - now).max(1) as u64);
        let newly_marked = self
            .jti_store
            .mark_used(&jti, remaining)
            .await
            .map_err(|error| AccessTokenError::Upstream(error.to_string()))?;
        if !newly_marked {
            tracing::info!(%jti, %sub, "access token replay rejected");
            return Err(AccessTokenError::TokenReplay);
        }

        // 9. Method to action. All actions are allowed once containment
        // holds; finer policy is deliberately out of this layer.
        let action = Action::from_method(method).ok_or(AccessTokenError::MethodNotAllowed)?;

        let resource_path = Url::parse(resource)
            .map(|url| url.path().to_owned())
            .map_err(|_| AccessTokenError::InvalidAudience)?;

        Ok(ValidatedRequest {
            principal_subject: sub,
            client_id: claims.client_id.unwrap_or_default(),
            action,
            resource_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use lws_cache::MemoryStore;
    use lws_core::Action;
    use lws_resolver::JwksClient;

    use super::{AccessTokenError, AccessTokenValidator, AccessValidatorConfig};
    use crate::jti::JtiStore;
    use crate::jwt::unix_now;
    use crate::keys::RealmKeys;
    use crate::test_support::{mock_issuer, TestServer};

    const RESOURCE: &str = "http://localhost:3001/storage/file.txt";

    fn realm_keys() -> RealmKeys {
        use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
        use p256::elliptic_curve::rand_core::OsRng;

        let secret = p256::SecretKey::random(&mut OsRng);
        let json = serde_json::json!({
            "keys": [{
                "kty": "EC",
                "crv": "P-256",
                "d": URL_SAFE_NO_PAD.encode(secret.to_bytes()),
                "kid": "realm-key-1",
                "alg": "ES256",
            }]
        })
        .to_string();
        RealmKeys::from_jwks_json(&json).expect("realm keys")
    }

    struct Fixture {
        issuer: TestServer,
        keys: RealmKeys,
    }

    impl Fixture {
        async fn new() -> Self {
            let keys = realm_keys();
            let issuer = mock_issuer(keys.public_jwks().keys.clone()).await;
            Self { issuer, keys }
        }

        fn validator(&self) -> AccessTokenValidator {
            AccessTokenValidator::new(
                Arc::new(JwksClient::new(
                    Arc::new(MemoryStore::default()),
                    Duration::from_secs(5),
                    Duration::from_secs(3600),
                )),
                JtiStore::new(Arc::new(MemoryStore::default())),
                AccessValidatorConfig {
                    authorization_server_uri: self.issuer.url.clone(),
                    clock_skew_secs: 60,
                },
            )
        }

        fn claims(&self, jti: &str) -> serde_json::Value {
            serde_json::json!({
                "iss": self.issuer.url,
                "sub": "https://alice.example/profile",
                "client_id": "https://alice.example/profile",
                "aud": "http://localhost:3001/storage",
                "iat": unix_now(),
                "exp": unix_now() + 300,
                "jti": jti,
                "auth_suite": "ssi-cid",
            })
        }

        fn token(&self, claims: &serde_json::Value) -> String {
            self.keys.sign(claims).expect("sign access token")
        }
    }

    #[tokio::test]
    async fn valid_token_yields_a_validated_request() {
        let fixture = Fixture::new().await;
        let token = fixture.token(&fixture.claims("jti-1"));

        let validated = fixture
            .validator()
            .validate(&token, "GET", RESOURCE)
            .await
            .expect("validate");

        assert_eq!(validated.principal_subject, "https://alice.example/profile");
        assert_eq!(validated.client_id, "https://alice.example/profile");
        assert_eq!(validated.action, Action::Read);
        assert_eq!(validated.resource_path, "/storage/file.txt");
    }

    #[tokio::test]
    async fn second_use_of_the_same_token_is_replay() {
        let fixture = Fixture::new().await;
        let token = fixture.token(&fixture.claims("jti-replay"));
        let validator = fixture.validator();

        validator
            .validate(&token, "GET", RESOURCE)
            .await
            .expect("first use");
        let error = validator
            .validate(&token, "GET", RESOURCE)
            .await
            .expect_err("second use");
        assert_eq!(error, AccessTokenError::TokenReplay);
    }

    #[tokio::test]
    async fn lifetime_over_the_cap_is_rejected() {
        let fixture = Fixture::new().await;

        let mut claims = fixture.claims("jti-lifetime");
        claims["iat"] = serde_json::json!(unix_now());
        claims["exp"] = serde_json::json!(unix_now() + 400);
        let token = fixture.token(&claims);

        let error = fixture
            .validator()
            .validate(&token, "GET", RESOURCE)
            .await
            .expect_err("lifetime over cap");
        assert_eq!(error, AccessTokenError::LifetimeExceeded);
    }

    #[tokio::test]
    async fn lifetime_exactly_at_the_cap_is_accepted() {
        let fixture = Fixture::new().await;

        let mut claims = fixture.claims("jti-exact");
        let iat = unix_now();
        claims["iat"] = serde_json::json!(iat);
        claims["exp"] = serde_json::json!(iat + 300);
        let token = fixture.token(&claims);

        fixture
            .validator()
            .validate(&token, "GET", RESOURCE)
            .await
            .expect("lifetime at cap");
    }

    #[tokio::test]
    async fn expiry_respects_the_skew_window() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator();

        let mut claims = fixture.claims("jti-skew-ok");
        claims["iat"] = serde_json::json!(unix_now() - 300);
        claims["exp"] = serde_json::json!(unix_now() - 30);
        let token = fixture.token(&claims);
        validator
            .validate(&token, "GET", RESOURCE)
            .await
            .expect("expired within skew");

        let mut claims = fixture.claims("jti-skew-fail");
        claims["iat"] = serde_json::json!(unix_now() - 400);
        claims["exp"] = serde_json::json!(unix_now() - 120);
        let token = fixture.token(&claims);
        let error = validator
            .validate(&token, "GET", RESOURCE)
            .await
            .expect_err("expired beyond skew");
        assert_eq!(error, AccessTokenError::TokenExpired);
    }

    #[tokio::test]
    async fn issuer_must_match_the_configured_realm() {
        let fixture = Fixture::new().await;

        let mut claims = fixture.claims("jti-iss");
        claims["iss"] = serde_json::json!("https://evil.example");
        let token = fixture.token(&claims);

        let error = fixture
            .validator()
            .validate(&token, "GET", RESOURCE)
            .await
            .expect_err("foreign issuer");
        assert_eq!(error, AccessTokenError::InvalidIssuer);
    }

    #[tokio::test]
    async fn audience_containment_is_enforced() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator();

        // Descendant paths are allowed.
        let token = fixture.token(&fixture.claims("jti-aud-1"));
        validator
            .validate(&token, "GET", "http://localhost:3001/storage/subfolder/a")
            .await
            .expect("descendant resource");

        // A different origin is not.
        let token = fixture.token(&fixture.claims("jti-aud-2"));
        let error = validator
            .validate(&token, "GET", "http://other:3001/storage")
            .await
            .expect_err("foreign origin");
        assert_eq!(error, AccessTokenError::InvalidAudience);

        // Path escapes collapse and fail the prefix rule.
        let token = fixture.token(&fixture.claims("jti-aud-3"));
        let error = validator
            .validate(&token, "GET", "http://localhost:3001/storage/..")
            .await
            .expect_err("path escape");
        assert_eq!(error, AccessTokenError::InvalidAudience);
    }

    #[tokio::test]
    async fn missing_claims_are_named() {
        let fixture = Fixture::new().await;

        let mut claims = fixture.claims("jti-missing");
        claims.as_object_mut().expect("object").remove("aud");
        let token = fixture.token(&claims);

        let error = fixture
            .validator()
            .validate(&token, "GET", RESOURCE)
            .await
            .expect_err("missing aud");
        assert_eq!(error, AccessTokenError::MissingClaim("aud"));
    }

    #[tokio::test]
    async fn foreign_signatures_are_rejected() {
        let fixture = Fixture::new().await;
        let other_keys = realm_keys();
        let token = other_keys
            .sign(&fixture.claims("jti-forged"))
            .expect("sign with foreign key");

        let error = fixture
            .validator()
            .validate(&token, "GET", RESOURCE)
            .await
            .expect_err("foreign signature");
        assert_eq!(error, AccessTokenError::InvalidSignature);
    }

    #[tokio::test]
    async fn garbage_tokens_are_invalid() {
        let fixture = Fixture::new().await;

        let error = fixture
            .validator()
            .validate("not-a-jwt", "GET", RESOURCE)
            .await
            .expect_err("garbage");
        assert_eq!(error, AccessTokenError::InvalidToken);
    }

    #[tokio::test]
    async fn unmapped_methods_are_rejected_after_the_replay_mark() {
        let fixture = Fixture::new().await;
        let token = fixture.token(&fixture.claims("jti-method"));

        let error = fixture
            .validator()
            .validate(&token, "TRACE", RESOURCE)
            .await
            .expect_err("unmapped method");
        assert_eq!(error, AccessTokenError::MethodNotAllowed);
    }

    #[tokio::test]
    async fn methods_map_to_actions() {
        let fixture = Fixture::new().await;
        let validator = fixture.validator();

        for (index, (method, action)) in [
            ("PUT", Action::Update),
            ("POST", Action::Create),
            ("PATCH", Action::Append),
            ("DELETE", Action::Delete),
            ("HEAD", Action::Read),
        ]
        .into_iter()
        .enumerate()
        {
            let token = fixture.token(&fixture.claims(&format!("jti-action-{index}")));
            let validated = validator
                .validate(&token, method, RESOURCE)
                .await
                .expect(method);
            assert_eq!(validated.action, action, "{method}");
        }
    }
}
