//! Ephemeral URL registry.
//!
//! A host environment can hand out short-lived URL strings that stand for an
//! in-memory blob.  The tree extractor dereferences such strings (and then
//! revokes them); the includer mints fresh ones.  [`MemoryRegistry`] is a
//! process-local implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::blob::Blob;

/// Scheme prefix shared by every ephemeral URL.
pub const URL_SCHEME: &str = "blob:";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no blob registered for {0}")]
    NotFound(String),
    #[error("fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },
}

/// True if `s` looks like an ephemeral URL.
pub fn is_ephemeral_url(s: &str) -> bool {
    s.starts_with(URL_SCHEME)
}

#[async_trait]
pub trait BlobRegistry: Send + Sync {
    /// Register `blob` and return a URL that resolves to it.
    fn create_url(&self, blob: &Blob) -> String;

    /// Resolve `url` to the blob it references.  May suspend.
    async fn fetch(&self, url: &str) -> Result<Blob, RegistryError>;

    /// Forget `url`.  Revoking an unknown URL is a no-op.
    fn revoke(&self, url: &str);
}

/// In-process registry minting `blob:<origin>/<uuid>` URLs.
#[derive(Debug)]
pub struct MemoryRegistry {
    origin:  String,
    entries: Mutex<HashMap<String, Blob>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::with_origin("multiblob")
    }

    pub fn with_origin(origin: &str) -> Self {
        Self { origin: origin.to_owned(), entries: Mutex::new(HashMap::new()) }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.lock().contains_key(url)
    }
}

impl Default for MemoryRegistry {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl BlobRegistry for MemoryRegistry {
    fn create_url(&self, blob: &Blob) -> String {
        let url = format!("{URL_SCHEME}{}/{}", self.origin, Uuid::new_v4());
        self.entries.lock().insert(url.clone(), blob.clone());
        url
    }

    async fn fetch(&self, url: &str) -> Result<Blob, RegistryError> {
        self.entries
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(url.to_owned()))
    }

    fn revoke(&self, url: &str) {
        if self.entries.lock().remove(url).is_some() {
            tracing::debug!(url, "revoked ephemeral URL");
        }
    }
}
