#![forbid(unsafe_code)]

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::Signer as _;
use lws_resolver::{Jwk, Jwks};
use p256::ecdsa::signature::Signer as _;
use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use tokio::sync::oneshot;

pub(crate) use crate::jwt::unix_now;

pub(crate) struct Es256KeyPair {
    signing: p256::ecdsa::SigningKey,
    kid: String,
}

impl Es256KeyPair {
    pub fn new(kid: &str) -> Self {
        Self {
            signing: p256::ecdsa::SigningKey::random(&mut OsRng),
            kid: kid.to_owned(),
        }
    }

    pub fn jwk(&self) -> Jwk {
        let point = self.signing.verifying_key().to_encoded_point(false);
        let bytes = point.as_bytes();
        Jwk {
            kty: "EC".to_owned(),
            crv: Some("P-256".to_owned()),
            x: Some(URL_SAFE_NO_PAD.encode(&bytes[1..33])),
            y: Some(URL_SAFE_NO_PAD.encode(&bytes[33..65])),
            n: None,
            e: None,
            kid: Some(self.kid.clone()),
            alg: Some("ES256".to_owned()),
            use_: Some("sig".to_owned()),
        }
    }

    pub fn sign(&self, claims: &serde_json::Value) -> String {
        let header = serde_json::json!({"alg": "ES256", "typ": "JWT", "kid": self.kid});
        self.sign_with_header(&header, claims)
    }

    pub fn sign_without_kid(&self, claims: &serde_json::Value) -> String {
        let header = serde_json::json!({"alg": "ES256", "typ": "JWT"});
        self.sign_with_header(&header, claims)
    }

    fn sign_with_header(&self, header: &serde_json::Value, claims: &serde_json::Value) -> String {
        let signing_input = signing_input(header, claims);
        let signature: p256::ecdsa::Signature = self.signing.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }
}

pub(crate) struct Ed25519KeyPair {
    signing: ed25519_dalek::SigningKey,
}

impl Ed25519KeyPair {
    pub fn new() -> Self {
        Self {
            signing: ed25519_dalek::SigningKey::generate(&mut OsRng),
        }
    }

    pub fn did(&self) -> String {
        let mut multicodec = vec![0xed, 0x01];
        multicodec.extend_from_slice(self.signing.verifying_key().as_bytes());
        format!("did:key:z{}", bs58::encode(multicodec).into_string())
    }

    pub fn jwk(&self, kid: &str) -> Jwk {
        Jwk {
            kty: "OKP".to_owned(),
            crv: Some("Ed25519".to_owned()),
            x: Some(URL_SAFE_NO_PAD.encode(self.signing.verifying_key().as_bytes())),
            y: None,
            n: None,
            e: None,
            kid: Some(kid.to_owned()),
            alg: Some("EdDSA".to_owned()),
            use_: Some("sig".to_owned()),
        }
    }

    pub fn sign(&self, kid: Option<&str>, claims: &serde_json::Value) -> String {
        let mut header = serde_json::json!({"alg": "EdDSA", "typ": "JWT"});
        if let Some(kid) = kid {
            header["kid"] = serde_json::json!(kid);
        }
        self.sign_with_header(&header, claims)
    }

    pub fn sign_with_alg(&self, alg: &str, claims: &serde_json::Value) -> String {
        let header = serde_json::json!({"alg": alg, "typ": "JWT"});
        self.sign_with_header(&header, claims)
    }

    fn sign_with_header(&self, header: &serde_json::Value, claims: &serde_json::Value) -> String {
        let signing_input = signing_input(header, claims);
        let signature = self.signing.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }
}

fn signing_input(header: &serde_json::Value, claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).expect("serialize header"));
    let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).expect("serialize claims"));
    format!("{header}.{claims}")
}

pub(crate) struct TestServer {
    pub url: String,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

pub(crate) async fn spawn_server(make_app: impl FnOnce(&str) -> Router) -> TestServer {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let url = format!("http://{addr}");
    let app = make_app(&url);

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    TestServer {
        url,
        stop: Some(tx),
    }
}

/// An issuer that answers OIDC and LWS discovery plus `/jwks` with a fixed
/// key set.
pub(crate) async fn mock_issuer(keys: Vec<Jwk>) -> TestServer {
    spawn_server(move |url| {
        let jwks = Arc::new(Jwks { keys });
        let base_url = url.to_owned();
        let discovery = {
            let base_url = base_url.clone();
            move || {
                let base_url = base_url.clone();
                async move {
                    Json(serde_json::json!({
                        "issuer": base_url,
                        "jwks_uri": format!("{base_url}/jwks"),
                    }))
                }
            }
        };
        Router::new()
            .route("/.well-known/openid-configuration", get(discovery.clone()))
            .route("/.well-known/lws-configuration", get(discovery))
            .route(
                "/jwks",
                get(move || {
                    let jwks = Arc::clone(&jwks);
                    async move { Json((*jwks).clone()) }
                }),
            )
    })
    .await
}

/// A host serving one CID document at `/profile` with a single verification
/// method.
pub(crate) async fn mock_cid_host(jwk: Jwk, kid: &str) -> TestServer {
    let kid = kid.to_owned();
    spawn_server(move |url| {
        let id = format!("{url}/profile");
        let document = serde_json::json!({
            "@context": ["https://www.w3.org/ns/cid/v1"],
            "id": id,
            "authentication": [{
                "id": format!("{id}#{kid}"),
                "type": "JsonWebKey",
                "controller": id,
                "publicKeyJwk": jwk,
            }],
        });
        Router::new().route(
            "/profile",
            get(move || {
                let document = document.clone();
                async move { Json(document) }
            }),
        )
    })
    .await
}
