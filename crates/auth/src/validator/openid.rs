#![forbid(unsafe_code)]

use std::sync::Arc;

use async_trait::async_trait;
use lws_core::{AuthSuite, Principal, TOKEN_TYPE_ID_TOKEN};
use lws_resolver::{find_key, Discovery, JwksClient};
use url::Url;

use crate::jwt::{verifier_for, verify_signature};
use crate::validator::{precheck, require, SubjectTokenValidator};
use crate::ValidationError;

/// OpenID Connect ID tokens. The issuer's keys come from OIDC discovery; the
/// client binding is the `azp` claim.
pub struct OpenIdValidator {
    jwks: Arc<JwksClient>,
    clock_skew_secs: u64,
}

impl OpenIdValidator {
    #[must_use]
    pub fn new(jwks: Arc<JwksClient>, clock_skew_secs: u64) -> Self {
        Self {
            jwks,
            clock_skew_secs,
        }
    }
}

#[async_trait]
impl SubjectTokenValidator for OpenIdValidator {
    fn token_type(&self) -> &'static str {
        TOKEN_TYPE_ID_TOKEN
    }

    async fn validate(&self, token: &str, realm: &str) -> Result<Principal, ValidationError> {
        let (raw, claims) = precheck(token, self.clock_skew_secs)?;

        let sub = require(claims.sub, "sub")?;
        let iss = require(claims.iss, "iss")?;
        let azp = require(claims.azp, "azp")?;
        let aud = claims.aud.ok_or(ValidationError::MissingClaim("aud"))?;

        if !aud.contains(realm) {
            return Err(ValidationError::InvalidAudience);
        }

        // Discovery needs a resolvable issuer URL before we go near the
        // network.
        if Url::parse(&iss).is_err() {
            return Err(ValidationError::InvalidIssuer);
        }

        let jwks = self
            .jwks
            .keys(&iss, Discovery::OpenId)
            .await
            .map_err(|error| ValidationError::KeyNotFound(error.to_string()))?;
        let jwk = find_key(&jwks, raw.header.kid.as_deref()).ok_or_else(|| {
            ValidationError::KeyNotFound(format!(
                "no JWKS entry for kid {:?}",
                raw.header.kid.as_deref().unwrap_or("<none>")
            ))
        })?;

        let key = verifier_for(jwk, &raw.header.alg)?;
        verify_signature(&raw, &key)?;

        Ok(Principal {
            subject: sub,
            issuer: iss,
            client_id: azp,
            auth_suite: AuthSuite::OpenId,
            subject_token_id: claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use lws_cache::MemoryStore;
    use lws_core::AuthSuite;
    use lws_resolver::JwksClient;

    use super::OpenIdValidator;
    use crate::test_support::{mock_issuer, unix_now, Es256KeyPair};
    use crate::validator::SubjectTokenValidator;
    use crate::ValidationError;

    fn validator() -> OpenIdValidator {
        OpenIdValidator::new(
            Arc::new(JwksClient::new(
                Arc::new(MemoryStore::default()),
                Duration::from_secs(5),
                Duration::from_secs(3600),
            )),
            60,
        )
    }

    fn id_token_claims(issuer: &str, realm: &str) -> serde_json::Value {
        serde_json::json!({
            "sub": "alice",
            "iss": issuer,
            "azp": "https://client.example",
            "aud": [realm, "https://client.example"],
            "iat": unix_now(),
            "exp": unix_now() + 300,
            "jti": "id-token-1",
        })
    }

    #[tokio::test]
    async fn valid_id_token_becomes_a_principal() {
        let key = Es256KeyPair::new("op-key-1");
        let issuer = mock_issuer(vec![key.jwk()]).await;
        let realm = "https://as.example/realms/lws";

        let token = key.sign(&id_token_claims(&issuer.url, realm));
        let principal = validator()
            .validate(&token, realm)
            .await
            .expect("validate id token");

        assert_eq!(principal.subject, "alice");
        assert_eq!(principal.issuer, issuer.url);
        assert_eq!(principal.client_id, "https://client.example");
        assert_eq!(principal.auth_suite, AuthSuite::OpenId);
        assert_eq!(principal.subject_token_id.as_deref(), Some("id-token-1"));
    }

    #[tokio::test]
    async fn audience_must_contain_the_realm() {
        let key = Es256KeyPair::new("op-key-1");
        let issuer = mock_issuer(vec![key.jwk()]).await;

        let mut claims = id_token_claims(&issuer.url, "https://as.example");
        claims["aud"] = serde_json::json!(["https://client.example"]);
        let token = key.sign(&claims);

        let error = validator()
            .validate(&token, "https://as.example")
            .await
            .expect_err("audience without realm");
        assert_eq!(error, ValidationError::InvalidAudience);
    }

    #[tokio::test]
    async fn string_audience_is_accepted() {
        let key = Es256KeyPair::new("op-key-1");
        let issuer = mock_issuer(vec![key.jwk()]).await;
        let realm = "https://as.example";

        let mut claims = id_token_claims(&issuer.url, realm);
        claims["aud"] = serde_json::json!(realm);
        let token = key.sign(&claims);

        validator()
            .validate(&token, realm)
            .await
            .expect("string audience");
    }

    #[tokio::test]
    async fn missing_azp_is_rejected() {
        let key = Es256KeyPair::new("op-key-1");
        let issuer = mock_issuer(vec![key.jwk()]).await;
        let realm = "https://as.example";

        let mut claims = id_token_claims(&issuer.url, realm);
        claims.as_object_mut().expect("object").remove("azp");
        let token = key.sign(&claims);

        let error = validator()
            .validate(&token, realm)
            .await
            .expect_err("missing azp");
        assert_eq!(error, ValidationError::MissingClaim("azp"));
    }

    #[tokio::test]
    async fn expired_token_is_rejected_before_any_fetch() {
        let key = Es256KeyPair::new("op-key-1");
        let realm = "https://as.example";

        // No issuer server is running: the temporal check must fire first.
        let mut claims = id_token_claims("http://127.0.0.1:1", realm);
        claims["exp"] = serde_json::json!(unix_now() - 90);
        let token = key.sign(&claims);

        let error = validator()
            .validate(&token, realm)
            .await
            .expect_err("expired token");
        assert_eq!(error, ValidationError::TokenExpired);
    }

    #[tokio::test]
    async fn clock_skew_tolerates_recent_expiry() {
        let key = Es256KeyPair::new("op-key-1");
        let issuer = mock_issuer(vec![key.jwk()]).await;
        let realm = "https://as.example";

        let mut claims = id_token_claims(&issuer.url, realm);
        claims["exp"] = serde_json::json!(unix_now() - 30);
        let token = key.sign(&claims);

        validator()
            .validate(&token, realm)
            .await
            .expect("within skew");
    }

    #[tokio::test]
    async fn future_iat_is_rejected() {
        let key = Es256KeyPair::new("op-key-1");
        let realm = "https://as.example";

        let mut claims = id_token_claims("http://127.0.0.1:1", realm);
        claims["iat"] = serde_json::json!(unix_now() + 3600);
        let token = key.sign(&claims);

        let error = validator()
            .validate(&token, realm)
            .await
            .expect_err("future iat");
        assert_eq!(error, ValidationError::InvalidIat);
    }

    #[tokio::test]
    async fn foreign_signature_is_rejected() {
        let trusted = Es256KeyPair::new("op-key-1");
        let attacker = Es256KeyPair::new("op-key-1");
        let issuer = mock_issuer(vec![trusted.jwk()]).await;
        let realm = "https://as.example";

        let token = attacker.sign(&id_token_claims(&issuer.url, realm));
        let error = validator()
            .validate(&token, realm)
            .await
            .expect_err("foreign key");
        assert_eq!(error, ValidationError::InvalidSignature);
    }

    #[tokio::test]
    async fn kid_is_optional_with_a_single_key() {
        let key = Es256KeyPair::new("op-key-1");
        let issuer = mock_issuer(vec![key.jwk()]).await;
        let realm = "https://as.example";

        let token = key.sign_without_kid(&id_token_claims(&issuer.url, realm));
        validator()
            .validate(&token, realm)
            .await
            .expect("single key without kid");
    }

    #[tokio::test]
    async fn unknown_kid_is_rejected() {
        let key = Es256KeyPair::new("op-key-1");
        let other = Es256KeyPair::new("op-key-2");
        let issuer = mock_issuer(vec![key.jwk()]).await;
        let realm = "https://as.example";

        let token = other.sign(&id_token_claims(&issuer.url, realm));
        let error = validator()
            .validate(&token, realm)
            .await
            .expect_err("unknown kid");
        assert!(matches!(error, ValidationError::KeyNotFound(_)));
    }
}
