//! Multipart encoder.
//!
//! ```
//! use multiblob::{Blob, MultipartBuilder};
//! use serde_json::json;
//!
//! let mut builder = MultipartBuilder::new();
//! builder.add_json("name", &json!("doc1"))?;
//! builder.add_binary("data", &Blob::from([1u8, 2, 3, 4, 5]))?;
//! let packed = builder.build();
//!
//! let decoded = multiblob::decode(&packed)?;
//! assert_eq!(decoded.json("name"), Some(&json!("doc1")));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use crate::blob::Blob;
use crate::entry::{Entry, EntryError, EntryType};
use crate::signature::{PayloadSigner, SignatureError, SIGNATURE_KEY};

/// Content type stamped on the blob returned by [`MultipartBuilder::build`].
pub const MULTIPART_CONTENT_TYPE: &str = "application/x-multiblob";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error("duplicate key: {0:?}")]
    DuplicateKey(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Accumulates entries in call order and materializes them as one blob.
///
/// Each `add_*` call encodes its entry immediately, so a field's bytes are
/// captured at call time.  A failed call leaves the builder unchanged.
#[derive(Debug, Default, Clone)]
pub struct MultipartBuilder {
    buf:  Vec<u8>,
    keys: HashSet<String>,
    // JSON fields kept for `sign`
    json: Map<String, JsonValue>,
}

impl MultipartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a builder holding a single JSON field.
    pub fn json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Self, BuildError> {
        Self::new().with_json(key, value)
    }

    /// Shorthand for a builder holding a single binary field.
    pub fn binary(key: &str, blob: &Blob) -> Result<Self, BuildError> {
        Self::new().with_binary(key, blob)
    }

    pub fn with_json<T: Serialize + ?Sized>(mut self, key: &str, value: &T) -> Result<Self, BuildError> {
        self.add_json(key, value)?;
        Ok(self)
    }

    pub fn with_binary(mut self, key: &str, blob: &Blob) -> Result<Self, BuildError> {
        self.add_binary(key, blob)?;
        Ok(self)
    }

    /// Serialize `value` to JSON text and append it as a JSON entry.
    pub fn add_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<&mut Self, BuildError> {
        let value = serde_json::to_value(value)?;
        let text = serde_json::to_vec(&value)?;
        self.push(key, EntryType::Json, &text)?;
        self.json.insert(key.to_owned(), value);
        Ok(self)
    }

    /// Append the blob's raw bytes as a binary entry.
    pub fn add_binary(&mut self, key: &str, blob: &Blob) -> Result<&mut Self, BuildError> {
        self.push(key, EntryType::Binary, blob.as_bytes())?;
        Ok(self)
    }

    /// Sign every JSON field added so far and append the result under
    /// [`SIGNATURE_KEY`].  Fields added afterwards are not covered.
    pub fn sign(&mut self, signer: &dyn PayloadSigner, secret: &[u8]) -> Result<&mut Self, BuildError> {
        let signature = signer.sign(&self.json, secret)?;
        self.add_json(SIGNATURE_KEY, &signature)
    }

    fn push(&mut self, key: &str, kind: EntryType, payload: &[u8]) -> Result<(), BuildError> {
        if self.keys.contains(key) {
            return Err(BuildError::DuplicateKey(key.to_owned()));
        }
        Entry::new(key, kind, payload).encode_into(&mut self.buf)?;
        self.keys.insert(key.to_owned());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Size in bytes of the blob `build` would return.
    pub fn byte_len(&self) -> usize {
        self.buf.len()
    }

    /// Materialize all entries in call order.  Repeated calls on an
    /// unchanged builder return byte-identical blobs.
    pub fn build(&self) -> Blob {
        Blob::with_content_type(self.buf.clone(), MULTIPART_CONTENT_TYPE)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
