//! Multipart decoder.
//!
//! Walks the buffer entry by entry from offset 0 and stops only when the
//! offset equals the buffer length.  Framing errors are fatal for the whole
//! decode; a JSON entry whose payload does not parse is skipped, logged and
//! reported through [`Multipart::rejected`] while decoding carries on.
//!
//! When the same key appears more than once on the wire the last entry wins.

use std::collections::btree_map::{self, BTreeMap};

use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use crate::blob::Blob;
use crate::entry::{EntryError, EntryIter, EntryType};
use crate::signature::PayloadVerifier;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error(transparent)]
    Malformed(#[from] EntryError),
    #[error("payload signature does not match")]
    SignatureMismatch,
}

/// A JSON entry that was skipped because its payload is not valid JSON.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("field {key:?} at offset {offset}: {reason}")]
pub struct FieldError {
    pub key:    String,
    pub offset: usize,
    pub reason: String,
}

/// One decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(JsonValue),
    Binary(Blob),
}

impl FieldValue {
    pub fn kind(&self) -> EntryType {
        match self {
            FieldValue::Json(_)   => EntryType::Json,
            FieldValue::Binary(_) => EntryType::Binary,
        }
    }

    pub fn as_json(&self) -> Option<&JsonValue> {
        match self {
            FieldValue::Json(v) => Some(v),
            FieldValue::Binary(_) => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            FieldValue::Binary(b) => Some(b),
            FieldValue::Json(_) => None,
        }
    }
}

impl From<JsonValue> for FieldValue {
    fn from(v: JsonValue) -> Self { FieldValue::Json(v) }
}

impl From<Blob> for FieldValue {
    fn from(b: Blob) -> Self { FieldValue::Binary(b) }
}

/// The key → value mapping recovered from a multipart blob.
#[derive(Debug, Clone, Default)]
pub struct Multipart {
    fields:   BTreeMap<String, FieldValue>,
    rejected: Vec<FieldError>,
}

impl Multipart {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn json(&self, key: &str) -> Option<&JsonValue> {
        self.get(key).and_then(FieldValue::as_json)
    }

    pub fn binary(&self, key: &str) -> Option<&Blob> {
        self.get(key).and_then(FieldValue::as_blob)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize { self.fields.len() }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// JSON entries that could not be parsed and were left out.
    pub fn rejected(&self) -> &[FieldError] {
        &self.rejected
    }

    /// The JSON-only subset of the mapping; binary fields are excluded.
    pub fn json_fields(&self) -> Map<String, JsonValue> {
        self.fields
            .iter()
            .filter_map(|(k, v)| v.as_json().map(|j| (k.clone(), j.clone())))
            .collect()
    }

    pub fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }
}

impl PartialEq for Multipart {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl IntoIterator for Multipart {
    type Item = (String, FieldValue);
    type IntoIter = btree_map::IntoIter<String, FieldValue>;
    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

/// Decoder with optional signature verification.
#[derive(Clone, Copy, Default)]
pub struct Decoder<'a> {
    verification: Option<(&'a dyn PayloadVerifier, &'a [u8])>,
}

impl<'a> Decoder<'a> {
    pub fn new() -> Self {
        Self { verification: None }
    }

    /// Fail the decode with [`DecodeError::SignatureMismatch`] unless
    /// `verifier` accepts the JSON fields under `secret`.
    pub fn verified(verifier: &'a dyn PayloadVerifier, secret: &'a [u8]) -> Self {
        Self { verification: Some((verifier, secret)) }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Multipart, DecodeError> {
        let mut out = Multipart::default();

        for item in EntryIter::new(bytes) {
            let (offset, entry) = item?;
            let value = match entry.kind {
                EntryType::Json => match serde_json::from_slice::<JsonValue>(entry.payload) {
                    Ok(v) => FieldValue::Json(v),
                    Err(e) => {
                        tracing::warn!(key = entry.key, offset, error = %e, "skipping invalid JSON field");
                        out.rejected.push(FieldError {
                            key:    entry.key.to_owned(),
                            offset,
                            reason: e.to_string(),
                        });
                        continue;
                    }
                },
                EntryType::Binary => FieldValue::Binary(Blob::from(entry.payload)),
            };
            if out.fields.insert(entry.key.to_owned(), value).is_some() {
                tracing::warn!(key = entry.key, offset, "duplicate key; later entry wins");
            }
        }

        if let Some((verifier, secret)) = self.verification {
            if !verifier.verify(&out.json_fields(), secret) {
                return Err(DecodeError::SignatureMismatch);
            }
        }
        Ok(out)
    }
}

/// Decode without signature verification.
pub fn decode(bytes: &[u8]) -> Result<Multipart, DecodeError> {
    Decoder::new().decode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::MultipartBuilder;
    use crate::entry::encode_entry;
    use crate::signature::HmacSha256;
    use serde_json::json;

    #[test]
    fn empty_input_is_empty_mapping() {
        let m = decode(&[]).unwrap();
        assert!(m.is_empty());
        assert!(m.rejected().is_empty());
    }

    #[test]
    fn separates_json_and_binary() {
        let bytes = MultipartBuilder::new()
            .with_json("meta", &json!({ "a": [1, 2] }))
            .unwrap()
            .with_binary("raw", &Blob::from([9u8, 9]))
            .unwrap()
            .into_bytes();
        let m = decode(&bytes).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m.json("meta"), Some(&json!({ "a": [1, 2] })));
        assert_eq!(m.binary("raw").map(|b| b.to_vec()), Some(vec![9, 9]));
        assert!(m.json("raw").is_none());
        assert_eq!(m.json_fields().len(), 1);
    }

    #[test]
    fn bad_json_does_not_abort() {
        let mut bytes = encode_entry("bad", EntryType::Json, b"{not json").unwrap();
        bytes.extend(encode_entry("good", EntryType::Json, b"true").unwrap());

        let m = decode(&bytes).unwrap();
        assert_eq!(m.json("good"), Some(&json!(true)));
        assert!(m.get("bad").is_none());
        assert_eq!(m.rejected().len(), 1);
        assert_eq!(m.rejected()[0].key, "bad");
        assert_eq!(m.rejected()[0].offset, 0);
    }

    #[test]
    fn floats_survive_exactly() {
        let floats: [f64; 5] = [1.947700395895162e-169, -1.490143767845386e129, 6.162599865641032e196, 0.1, 5e-324];
        let mut b = MultipartBuilder::new();
        for (i, f) in floats.iter().enumerate() {
            b.add_json(&format!("f{i}"), f).unwrap();
        }
        let m = decode(&b.into_bytes()).unwrap();
        for (i, f) in floats.iter().enumerate() {
            let back = m.json(&format!("f{i}")).and_then(JsonValue::as_f64);
            assert_eq!(back.map(f64::to_bits), Some(f.to_bits()), "f{i} = {f:e}");
        }
    }

    #[test]
    fn last_duplicate_wins() {
        let mut bytes = encode_entry("k", EntryType::Json, b"1").unwrap();
        bytes.extend(encode_entry("k", EntryType::Binary, b"\x02").unwrap());
        let m = decode(&bytes).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m.binary("k").map(|b| b.to_vec()), Some(vec![2]));
    }

    #[test]
    fn trailing_garbage_is_malformed() {
        let mut bytes = encode_entry("k", EntryType::Json, b"1").unwrap();
        bytes.push(3);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(ref e) if e.is_malformed_stream()));
    }

    #[test]
    fn verification_checks_json_subset_only() {
        let mut b = MultipartBuilder::new();
        b.add_json("name", &"doc1").unwrap();
        b.add_binary("data", &Blob::from([1u8, 2, 3])).unwrap();
        b.sign(&HmacSha256, b"s3cret").unwrap();
        let bytes = b.into_bytes();

        let m = Decoder::verified(&HmacSha256, b"s3cret").decode(&bytes).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(
            Decoder::verified(&HmacSha256, b"wrong").decode(&bytes).unwrap_err(),
            DecodeError::SignatureMismatch
        );
        // Unverified decoding ignores the signature entirely.
        assert!(decode(&bytes).is_ok());
    }
}
