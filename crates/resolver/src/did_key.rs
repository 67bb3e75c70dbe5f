#![forbid(unsafe_code)]

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use crate::{Jwk, ResolverError};

const DID_KEY_PREFIX: &str = "did:key:";
const BASE58BTC_PREFIX: char = 'z';
const MAX_BASE58_LEN: usize = 256;

const ED25519_MULTICODEC: u64 = 0xED;
const P256_MULTICODEC: u64 = 0x1200;
const SECP256K1_MULTICODEC: u64 = 0xE7;

/// Decode a `did:key` identifier into public JWK form. Pure function: no
/// network, no cache.
pub fn resolve_did_key(did: &str) -> Result<Jwk, ResolverError> {
    let payload = did
        .strip_prefix(DID_KEY_PREFIX)
        .ok_or_else(|| ResolverError::InvalidUri(did.to_owned()))?;
    let payload = payload
        .strip_prefix(BASE58BTC_PREFIX)
        .ok_or(ResolverError::UnsupportedKeyFormat(
            "multibase prefix must be base58btc",
        ))?;
    if payload.is_empty() {
        return Err(ResolverError::InvalidUri(did.to_owned()));
    }
    if payload.len() > MAX_BASE58_LEN {
        return Err(ResolverError::InvalidUri(did.to_owned()));
    }

    let bytes = bs58::decode(payload)
        .into_vec()
        .map_err(|_| ResolverError::UnsupportedKeyFormat("base58 decode failed"))?;
    let (codec, consumed) = varint_decode(&bytes)?;
    let key_bytes = &bytes[consumed..];

    match codec {
        ED25519_MULTICODEC => ed25519_jwk(key_bytes),
        P256_MULTICODEC => p256_jwk(key_bytes),
        SECP256K1_MULTICODEC => secp256k1_jwk(key_bytes),
        other => Err(ResolverError::UnsupportedKeyType(other)),
    }
}

/// Re-encode a JWK produced by [`resolve_did_key`] back into its `did:key`
/// form. Decoding then encoding a supported key yields the original input.
pub fn encode_did_key(jwk: &Jwk) -> Result<String, ResolverError> {
    let (codec, key_bytes) = match (jwk.kty.as_str(), jwk.crv.as_deref()) {
        ("OKP", Some("Ed25519")) => {
            let x = decode_field(jwk.x.as_deref())?;
            (ED25519_MULTICODEC, x)
        }
        ("EC", Some("P-256")) => (P256_MULTICODEC, uncompressed_point(jwk)?),
        ("EC", Some("secp256k1")) => (SECP256K1_MULTICODEC, uncompressed_point(jwk)?),
        _ => {
            return Err(ResolverError::UnsupportedKeyFormat(
                "JWK is not a did:key-compatible key",
            ))
        }
    };

    let varint = varint_encode(codec);
    let mut multicodec = Vec::with_capacity(varint.len() + key_bytes.len());
    multicodec.extend_from_slice(&varint);
    multicodec.extend_from_slice(&key_bytes);

    let encoded = bs58::encode(multicodec).into_string();
    Ok(format!("{DID_KEY_PREFIX}{BASE58BTC_PREFIX}{encoded}"))
}

fn ed25519_jwk(key_bytes: &[u8]) -> Result<Jwk, ResolverError> {
    if key_bytes.len() != 32 {
        return Err(ResolverError::UnsupportedKeyFormat(
            "Ed25519 key must be 32 bytes",
        ));
    }

    Ok(Jwk {
        kty: "OKP".to_owned(),
        crv: Some("Ed25519".to_owned()),
        x: Some(URL_SAFE_NO_PAD.encode(key_bytes)),
        y: None,
        n: None,
        e: None,
        kid: None,
        alg: Some("EdDSA".to_owned()),
        use_: Some("sig".to_owned()),
    })
}

fn p256_jwk(key_bytes: &[u8]) -> Result<Jwk, ResolverError> {
    let (x, y) = split_uncompressed(key_bytes)?;
    p256::PublicKey::from_sec1_bytes(key_bytes)
        .map_err(|_| ResolverError::UnsupportedKeyFormat("point not on P-256 curve"))?;

    Ok(ec_jwk("P-256", "ES256", x, y))
}

fn secp256k1_jwk(key_bytes: &[u8]) -> Result<Jwk, ResolverError> {
    let (x, y) = split_uncompressed(key_bytes)?;
    k256::PublicKey::from_sec1_bytes(key_bytes)
        .map_err(|_| ResolverError::UnsupportedKeyFormat("point not on secp256k1 curve"))?;

    Ok(ec_jwk("secp256k1", "ES256K", x, y))
}

fn ec_jwk(crv: &str, alg: &str, x: &[u8], y: &[u8]) -> Jwk {
    Jwk {
        kty: "EC".to_owned(),
        crv: Some(crv.to_owned()),
        x: Some(URL_SAFE_NO_PAD.encode(x)),
        y: Some(URL_SAFE_NO_PAD.encode(y)),
        n: None,
        e: None,
        kid: None,
        alg: Some(alg.to_owned()),
        use_: Some("sig".to_owned()),
    }
}

// Compressed points are valid multicodec payloads but are not accepted here.
fn split_uncompressed(key_bytes: &[u8]) -> Result<(&[u8], &[u8]), ResolverError> {
    if key_bytes.len() == 33 && (key_bytes[0] == 0x02 || key_bytes[0] == 0x03) {
        return Err(ResolverError::UnsupportedKeyFormat(
            "compressed EC points are not supported",
        ));
    }
    if key_bytes.len() != 65 || key_bytes[0] != 0x04 {
        return Err(ResolverError::UnsupportedKeyFormat(
            "EC key must be an uncompressed SEC1 point",
        ));
    }
    Ok((&key_bytes[1..33], &key_bytes[33..65]))
}

fn decode_field(field: Option<&str>) -> Result<Vec<u8>, ResolverError> {
    let field = field.ok_or(ResolverError::UnsupportedKeyFormat("missing coordinate"))?;
    URL_SAFE_NO_PAD
        .decode(field.as_bytes())
        .map_err(|_| ResolverError::UnsupportedKeyFormat("coordinate is not base64url"))
}

fn uncompressed_point(jwk: &Jwk) -> Result<Vec<u8>, ResolverError> {
    let x = decode_field(jwk.x.as_deref())?;
    let y = decode_field(jwk.y.as_deref())?;
    if x.len() != 32 || y.len() != 32 {
        return Err(ResolverError::UnsupportedKeyFormat(
            "EC coordinates must be 32 bytes",
        ));
    }

    let mut point = Vec::with_capacity(65);
    point.push(0x04);
    point.extend_from_slice(&x);
    point.extend_from_slice(&y);
    Ok(point)
}

fn varint_encode(mut value: u64) -> Vec<u8> {
    if value == 0 {
        return vec![0];
    }

    let mut out = Vec::new();
    while value > 0 {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }

    out
}

fn varint_decode(bytes: &[u8]) -> Result<(u64, usize), ResolverError> {
    let mut value = 0_u64;
    let mut shift = 0_u32;

    for (index, byte) in bytes.iter().copied().enumerate() {
        if index >= 10 {
            return Err(ResolverError::UnsupportedKeyFormat("varint too long"));
        }

        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, index + 1));
        }

        shift += 7;
    }

    Err(ResolverError::UnsupportedKeyFormat("varint truncated"))
}
