//! Payload signing over the JSON-only portion of a multipart mapping.
//!
//! The codec never depends on a concrete scheme: the decoder only calls a
//! [`PayloadVerifier`] when the caller asks for verification.  [`HmacSha256`]
//! is the built-in scheme.
//!
//! # HmacSha256
//!
//! - Signed message: every JSON field except [`SIGNATURE_KEY`], serialized as
//!   one JSON object with keys in sorted order.
//! - MAC: HMAC-SHA256 keyed with the secret.
//! - Encoding: lowercase hex string stored under [`SIGNATURE_KEY`].

use std::collections::BTreeMap;

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value as JsonValue};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256Core = Hmac<Sha256>;

/// Reserved JSON field carrying the signature.
pub const SIGNATURE_KEY: &str = "signature";

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("cannot serialize signed fields: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unusable signing key: {0}")]
    Key(#[from] InvalidLength),
}

pub trait PayloadVerifier: Send + Sync {
    /// Check `fields` (JSON fields only) against `secret`.
    fn verify(&self, fields: &Map<String, JsonValue>, secret: &[u8]) -> bool;
}

pub trait PayloadSigner: Send + Sync {
    /// Produce the value to store under [`SIGNATURE_KEY`].
    fn sign(&self, fields: &Map<String, JsonValue>, secret: &[u8]) -> Result<JsonValue, SignatureError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HmacSha256;

impl HmacSha256 {
    fn mac(fields: &Map<String, JsonValue>, secret: &[u8]) -> Result<HmacSha256Core, SignatureError> {
        let canonical: BTreeMap<&String, &JsonValue> = fields
            .iter()
            .filter(|(k, _)| k.as_str() != SIGNATURE_KEY)
            .collect();
        let message = serde_json::to_vec(&canonical)?;
        let mut mac = <HmacSha256Core as Mac>::new_from_slice(secret)?;
        mac.update(&message);
        Ok(mac)
    }
}

impl PayloadSigner for HmacSha256 {
    fn sign(&self, fields: &Map<String, JsonValue>, secret: &[u8]) -> Result<JsonValue, SignatureError> {
        let tag = Self::mac(fields, secret)?.finalize().into_bytes();
        Ok(JsonValue::String(hex::encode(tag)))
    }
}

impl PayloadVerifier for HmacSha256 {
    fn verify(&self, fields: &Map<String, JsonValue>, secret: &[u8]) -> bool {
        let Some(claimed) = fields.get(SIGNATURE_KEY).and_then(JsonValue::as_str) else {
            return false;
        };
        let Ok(claimed) = hex::decode(claimed) else {
            return false;
        };
        match Self::mac(fields, secret) {
            Ok(mac) => mac.verify_slice(&claimed).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: JsonValue) -> Map<String, JsonValue> {
        match v {
            JsonValue::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn sign_then_verify() {
        let mut f = fields(json!({ "name": "doc1", "n": [1, 2] }));
        let sig = HmacSha256.sign(&f, b"secret").unwrap();
        f.insert(SIGNATURE_KEY.into(), sig);
        assert!(HmacSha256.verify(&f, b"secret"));
        assert!(!HmacSha256.verify(&f, b"other"));
    }

    #[test]
    fn tampering_is_detected() {
        let mut f = fields(json!({ "name": "doc1" }));
        let sig = HmacSha256.sign(&f, b"k").unwrap();
        f.insert(SIGNATURE_KEY.into(), sig);
        f.insert("name".into(), json!("doc2"));
        assert!(!HmacSha256.verify(&f, b"k"));
    }

    #[test]
    fn missing_or_garbled_signature_fails() {
        let mut f = fields(json!({ "a": 1 }));
        assert!(!HmacSha256.verify(&f, b"k"));
        f.insert(SIGNATURE_KEY.into(), json!("zz"));
        assert!(!HmacSha256.verify(&f, b"k"));
        f.insert(SIGNATURE_KEY.into(), json!(42));
        assert!(!HmacSha256.verify(&f, b"k"));
    }

    #[test]
    fn truncated_signature_is_rejected() {
        let mut f = fields(json!({ "a": 1 }));
        let sig = HmacSha256.sign(&f, b"k").unwrap();
        let short = sig.as_str().map(|s| s[..32].to_owned()).unwrap();
        f.insert(SIGNATURE_KEY.into(), json!(short));
        assert!(!HmacSha256.verify(&f, b"k"));
        f.insert(SIGNATURE_KEY.into(), json!(""));
        assert!(!HmacSha256.verify(&f, b"k"));
    }

    #[test]
    fn matches_rfc4231_case_2() {
        // HMAC-SHA256(key = "Jefe", data = "what do ya want for nothing?")
        let mut mac = <HmacSha256Core as Mac>::new_from_slice(b"Jefe").unwrap();
        mac.update(b"what do ya want for nothing?");
        assert_eq!(
            hex::encode(mac.finalize().into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }
}
