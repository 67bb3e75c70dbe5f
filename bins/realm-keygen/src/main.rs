#![forbid(unsafe_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand_core::OsRng;

/// Emits a fresh ES256 signing JWKS for a realm on stdout. Feed the output
/// to the authorization server via `LWS_SIGNING_KEYS`.
fn main() -> anyhow::Result<()> {
    let secret = p256::SecretKey::random(&mut OsRng);
    let point = secret.public_key().to_encoded_point(false);
    let bytes = point.as_bytes();

    let jwks = serde_json::json!({
        "keys": [{
            "kty": "EC",
            "crv": "P-256",
            "d": URL_SAFE_NO_PAD.encode(secret.to_bytes()),
            "x": URL_SAFE_NO_PAD.encode(&bytes[1..33]),
            "y": URL_SAFE_NO_PAD.encode(&bytes[33..65]),
            "kid": uuid::Uuid::new_v4().to_string(),
            "alg": "ES256",
            "use": "sig",
        }]
    });

    println!("{}", serde_json::to_string_pretty(&jwks)?);
    Ok(())
}
