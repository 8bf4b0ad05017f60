//! Id strategies for placeholder tokens.
//!
//! [`ContentHashIds`] gives byte-identical blobs the same id, so they share
//! one side-table slot.  [`RandomIds`] skips hashing and never deduplicates.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::blob::Blob;

/// Bytes fed to the hasher per update: 64 KiB.
pub const DEFAULT_HASH_CHUNK_SIZE: usize = 64 * 1024;

pub trait IdGenerator: Send + Sync {
    /// Produce an id for `blob`.  The id must be non-empty, printable and
    /// must not contain `}`.
    fn generate(&self, blob: &Blob) -> String;
}

/// SHA-256 content address, lowercase hex.
///
/// The blob is fed to a single incremental hasher in `chunk_size` slices, so
/// the id is exactly the SHA-256 of the full byte sequence and does not
/// depend on the chunk size.  The content type is not hashed.
#[derive(Debug, Clone, Copy)]
pub struct ContentHashIds {
    chunk_size: usize,
}

impl ContentHashIds {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_HASH_CHUNK_SIZE)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self { chunk_size: chunk_size.max(1) }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn digest(&self, bytes: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for chunk in bytes.chunks(self.chunk_size) {
            hasher.update(chunk);
        }
        hasher.finalize().into()
    }
}

impl Default for ContentHashIds {
    fn default() -> Self { Self::new() }
}

impl IdGenerator for ContentHashIds {
    fn generate(&self, blob: &Blob) -> String {
        hex::encode(self.digest(blob.as_bytes()))
    }
}

/// Fresh random v4 UUID per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate(&self, _blob: &Blob) -> String {
        Uuid::new_v4().to_string()
    }
}

impl<F> IdGenerator for F
where
    F: Fn(&Blob) -> String + Send + Sync,
{
    fn generate(&self, blob: &Blob) -> String {
        self(blob)
    }
}
