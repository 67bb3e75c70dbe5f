#![forbid(unsafe_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use lws_resolver::{Jwk, Jwks};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::EncodePrivateKey;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum RealmKeyError {
    #[error("failed to parse signing JWKS: {0}")]
    Parse(String),
    #[error("signing JWKS contains no usable private key")]
    NoSigningKey,
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    #[error("failed to sign token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Deserialize)]
struct SigningJwks {
    keys: Vec<SigningJwk>,
}

#[derive(Debug, Deserialize)]
struct SigningJwk {
    kty: String,
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    d: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    alg: Option<String>,
}

/// The realm's signing key material: one current ES256 private key plus the
/// public JWKS served at `/jwks`. Private components never leave this type.
pub struct RealmKeys {
    kid: String,
    encoding_key: EncodingKey,
    public: Jwks,
}

impl std::fmt::Debug for RealmKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealmKeys")
            .field("kid", &self.kid)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl RealmKeys {
    /// Load from a JWKS document carrying at least one EC/P-256 key with a
    /// private `d` component. The first such key becomes the current signing
    /// key; its public half is derived from `d` rather than trusted from the
    /// document.
    pub fn from_jwks_json(json: &str) -> Result<Self, RealmKeyError> {
        let jwks: SigningJwks =
            serde_json::from_str(json).map_err(|error| RealmKeyError::Parse(error.to_string()))?;

        let mut kid = None;
        let mut encoding_key = None;
        let mut public_keys = Vec::new();

        for key in &jwks.keys {
            match &key.d {
                Some(d) if encoding_key.is_none() => {
                    if key.kty != "EC" || key.crv.as_deref() != Some("P-256") {
                        return Err(RealmKeyError::InvalidKey(
                            "signing key must be EC/P-256".to_owned(),
                        ));
                    }

                    let secret = secret_from_d(d)?;
                    let der = secret
                        .to_pkcs8_der()
                        .map_err(|error| RealmKeyError::InvalidKey(error.to_string()))?;
                    encoding_key = Some(EncodingKey::from_ec_der(der.as_bytes()));

                    let key_id = key
                        .kid
                        .clone()
                        .ok_or_else(|| RealmKeyError::InvalidKey("missing kid".to_owned()))?;
                    public_keys.push(public_jwk(&secret, &key_id));
                    kid = Some(key_id);
                }
                _ => {
                    // Public-only entries (e.g. retired keys) are served
                    // as-is so already-issued tokens keep validating.
                    if let (Some(x), Some(kid)) = (&key.x, &key.kid) {
                        public_keys.push(Jwk {
                            kty: key.kty.clone(),
                            crv: key.crv.clone(),
                            x: Some(x.clone()),
                            y: key.y.clone(),
                            n: None,
                            e: None,
                            kid: Some(kid.clone()),
                            alg: key.alg.clone(),
                            use_: Some("sig".to_owned()),
                        });
                    }
                }
            }
        }

        match (kid, encoding_key) {
            (Some(kid), Some(encoding_key)) => Ok(Self {
                kid,
                encoding_key,
                public: Jwks { keys: public_keys },
            }),
            _ => Err(RealmKeyError::NoSigningKey),
        }
    }

    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    #[must_use]
    pub fn public_jwks(&self) -> &Jwks {
        &self.public
    }

    /// Sign a claim set as an ES256 compact JWT with the current key id.
    pub fn sign<T: serde::Serialize>(&self, claims: &T) -> Result<String, RealmKeyError> {
        let header = Header {
            alg: Algorithm::ES256,
            kid: Some(self.kid.clone()),
            typ: Some("JWT".to_owned()),
            ..Header::default()
        };
        Ok(jsonwebtoken::encode(&header, claims, &self.encoding_key)?)
    }
}

fn secret_from_d(d: &str) -> Result<p256::SecretKey, RealmKeyError> {
    let d_bytes = URL_SAFE_NO_PAD
        .decode(d.as_bytes())
        .map_err(|error| RealmKeyError::InvalidKey(error.to_string()))?;
    p256::SecretKey::from_slice(&d_bytes)
        .map_err(|error| RealmKeyError::InvalidKey(error.to_string()))
}

fn public_jwk(secret: &p256::SecretKey, kid: &str) -> Jwk {
    let point = secret.public_key().to_encoded_point(false);
    let bytes = point.as_bytes();

    Jwk {
        kty: "EC".to_owned(),
        crv: Some("P-256".to_owned()),
        x: Some(URL_SAFE_NO_PAD.encode(&bytes[1..33])),
        y: Some(URL_SAFE_NO_PAD.encode(&bytes[33..65])),
        n: None,
        e: None,
        kid: Some(kid.to_owned()),
        alg: Some("ES256".to_owned()),
        use_: Some("sig".to_owned()),
    }
}
