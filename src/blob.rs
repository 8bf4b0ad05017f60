//! Immutable, shareable binary objects.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// An immutable byte sequence with an optional content-type tag.
///
/// Cloning a `Blob` shares the underlying bytes; nothing is copied.  Equality
/// compares bytes only; the content type is advisory and does not survive
/// the multipart wire format.
#[derive(Clone)]
pub struct Blob {
    bytes:        Arc<[u8]>,
    content_type: Option<Arc<str>>,
}

impl Blob {
    pub fn new(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self { bytes: bytes.into(), content_type: None }
    }

    pub fn with_content_type(bytes: impl Into<Arc<[u8]>>, content_type: &str) -> Self {
        Self { bytes: bytes.into(), content_type: Some(content_type.into()) }
    }

    pub fn empty() -> Self {
        Self::new(Vec::<u8>::new())
    }

    pub fn len(&self) -> usize { self.bytes.len() }

    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    pub fn as_bytes(&self) -> &[u8] { &self.bytes }

    pub fn content_type(&self) -> Option<&str> { self.content_type.as_deref() }

    /// True when both handles share the same allocation.
    pub fn ptr_eq(&self, other: &Blob) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    pub fn to_vec(&self) -> Vec<u8> { self.bytes.to_vec() }
}

impl Deref for Blob {
    type Target = [u8];
    fn deref(&self) -> &[u8] { &self.bytes }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] { &self.bytes }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.bytes[..] == other.bytes[..]
    }
}

impl Eq for Blob {}

impl From<Vec<u8>> for Blob {
    fn from(v: Vec<u8>) -> Self { Blob::new(v) }
}

impl From<&[u8]> for Blob {
    fn from(v: &[u8]) -> Self { Blob::new(v) }
}

impl<const N: usize> From<[u8; N]> for Blob {
    fn from(v: [u8; N]) -> Self { Blob::new(v.to_vec()) }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Blob");
        d.field("len", &self.bytes.len());
        if let Some(ct) = &self.content_type {
            d.field("content_type", ct);
        }
        let head = &self.bytes[..self.bytes.len().min(16)];
        d.field("head", &hex::encode(head));
        d.finish()
    }
}
