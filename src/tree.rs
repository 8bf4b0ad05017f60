//! Blob extraction and inclusion over [`Value`] trees.
//!
//! [`Extractor`] replaces every binary object (and, with a registry
//! attached, every ephemeral URL string) with a placeholder token and moves
//! the blob into a side table.  [`Includer`] performs the inverse.
//!
//! Both rewrites are copy-on-write: a container is rebuilt only when one of
//! its descendants changed, otherwise the original `Arc` is returned as is.
//!
//! Extraction is all-or-nothing: discovered blobs are staged and merged into
//! the caller's table only after the whole tree succeeded, and fetched URLs
//! are revoked at that point, once per distinct URL.  A failed extraction
//! revokes nothing, so the same URL may appear any number of times in a tree.
//!
//! Inclusion revokes the URLs it minted if a later placeholder fails, so a
//! failed call leaves the registry as it found it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture, FutureExt};
use thiserror::Error;

use crate::blob::Blob;
use crate::ids::IdGenerator;
use crate::placeholder::{Origin, Placeholder};
use crate::registry::{is_ephemeral_url, BlobRegistry, RegistryError};
use crate::value::Value;

/// Placeholder token → blob.
pub type BlobTable = HashMap<String, Blob>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("could not dereference {url}: {source}")]
    Dereference {
        url:    String,
        #[source]
        source: RegistryError,
    },
    #[error("placeholder {0} is not in the side table")]
    MissingPlaceholder(String),
    #[error("placeholder {0} needs a registry to mint a URL")]
    NoRegistry(String),
}

// ── Extraction ───────────────────────────────────────────────────────────────

/// Result of rewriting one node: `value` is `None` when nothing changed.
/// `urls` lists the ephemeral URLs fetched below this node.
struct Rewrite {
    value: Option<Value>,
    blobs: Vec<(String, Blob)>,
    urls:  Vec<String>,
}

impl Rewrite {
    fn unchanged() -> Self {
        Self { value: None, blobs: Vec::new(), urls: Vec::new() }
    }

    fn replaced(token: String, blob: Blob) -> Self {
        Self { value: Some(Value::String(token.clone())), blobs: vec![(token, blob)], urls: Vec::new() }
    }
}

pub struct Extractor<'a> {
    ids:      &'a dyn IdGenerator,
    registry: Option<&'a dyn BlobRegistry>,
}

impl<'a> Extractor<'a> {
    pub fn new(ids: &'a dyn IdGenerator) -> Self {
        Self { ids, registry: None }
    }

    /// Also dereference strings that start with the ephemeral URL scheme.
    /// Without a registry such strings are left alone.
    pub fn with_registry(mut self, registry: &'a dyn BlobRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Rewrite `value`, adding every removed blob to `table`.
    ///
    /// If nothing in the tree changed the returned value shares its root
    /// with `value`.
    pub async fn extract(&self, value: &Value, table: &mut BlobTable) -> Result<Value, TreeError> {
        let rewrite = self.walk(value).await?;
        if let Some(registry) = self.registry {
            let fetched: BTreeSet<&str> = rewrite.urls.iter().map(String::as_str).collect();
            for url in fetched {
                registry.revoke(url);
            }
        }
        let count = rewrite.blobs.len();
        table.extend(rewrite.blobs);
        if count > 0 {
            tracing::debug!(blobs = count, table_size = table.len(), "extracted blobs");
        }
        Ok(rewrite.value.unwrap_or_else(|| value.clone()))
    }

    fn token_for(&self, origin: Origin, blob: &Blob) -> String {
        Placeholder { origin, id: self.ids.generate(blob) }.token()
    }

    fn walk<'b>(&'b self, value: &'b Value) -> BoxFuture<'b, Result<Rewrite, TreeError>> {
        async move {
            match value {
                Value::Blob(blob) => {
                    Ok(Rewrite::replaced(self.token_for(Origin::Inline, blob), blob.clone()))
                }
                Value::String(s) => match self.registry {
                    Some(registry) if is_ephemeral_url(s) => {
                        let blob = registry.fetch(s).await.map_err(|source| {
                            TreeError::Dereference { url: s.clone(), source }
                        })?;
                        let mut rewrite = Rewrite::replaced(self.token_for(Origin::Url, &blob), blob);
                        rewrite.urls.push(s.clone());
                        Ok(rewrite)
                    }
                    _ => Ok(Rewrite::unchanged()),
                },
                Value::Array(items) => {
                    let children = try_join_all(items.iter().map(|v| self.walk(v))).await?;
                    Ok(rebuild_array(items, children))
                }
                Value::Object(map) => {
                    let children = try_join_all(map.values().map(|v| self.walk(v))).await?;
                    Ok(rebuild_object(map, children))
                }
                Value::Null | Value::Bool(_) | Value::Number(_) => Ok(Rewrite::unchanged()),
            }
        }
        .boxed()
    }
}

fn rebuild_array(items: &Arc<Vec<Value>>, children: Vec<Rewrite>) -> Rewrite {
    let mut blobs = Vec::new();
    let mut urls = Vec::new();
    let mut changed = false;
    let mut values = Vec::with_capacity(children.len());
    for (orig, child) in items.iter().zip(children) {
        blobs.extend(child.blobs);
        urls.extend(child.urls);
        changed |= child.value.is_some();
        values.push(child.value.unwrap_or_else(|| orig.clone()));
    }
    let value = changed.then(|| Value::Array(Arc::new(values)));
    Rewrite { value, blobs, urls }
}

fn rebuild_object(map: &Arc<BTreeMap<String, Value>>, children: Vec<Rewrite>) -> Rewrite {
    let mut blobs = Vec::new();
    let mut urls = Vec::new();
    let mut out: Option<BTreeMap<String, Value>> = None;
    for (key, child) in map.keys().zip(children) {
        blobs.extend(child.blobs);
        urls.extend(child.urls);
        if let Some(v) = child.value {
            out.get_or_insert_with(|| (**map).clone()).insert(key.clone(), v);
        }
    }
    Rewrite { value: out.map(|m| Value::Object(Arc::new(m))), blobs, urls }
}

// ── Inclusion ────────────────────────────────────────────────────────────────

/// What to do with a placeholder that has no side-table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingPlaceholder {
    /// Fail with [`TreeError::MissingPlaceholder`].
    #[default]
    Fail,
    /// Leave the token string in place and log a warning.
    Keep,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeOptions {
    pub on_missing: MissingPlaceholder,
}

pub struct Includer<'a> {
    table:    &'a BlobTable,
    registry: Option<&'a dyn BlobRegistry>,
    options:  IncludeOptions,
}

impl<'a> Includer<'a> {
    pub fn new(table: &'a BlobTable) -> Self {
        Self { table, registry: None, options: IncludeOptions::default() }
    }

    /// Registry used to mint URLs for `{blobUrl:…}` tokens.
    pub fn with_registry(mut self, registry: &'a dyn BlobRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_options(mut self, options: IncludeOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace every placeholder in `value` with the blob (or a fresh URL
    /// for it) from the side table.
    pub fn include(&self, value: &Value) -> Result<Value, TreeError> {
        let mut minted = Vec::new();
        match self.walk(value, &mut minted) {
            Ok(v) => Ok(v.unwrap_or_else(|| value.clone())),
            Err(e) => {
                if let Some(registry) = self.registry {
                    for url in &minted {
                        registry.revoke(url);
                    }
                }
                Err(e)
            }
        }
    }

    fn walk(&self, value: &Value, minted: &mut Vec<String>) -> Result<Option<Value>, TreeError> {
        match value {
            Value::String(s) => self.resolve(s, minted),
            Value::Array(items) => {
                let mut out: Option<Vec<Value>> = None;
                for (i, item) in items.iter().enumerate() {
                    match self.walk(item, minted)? {
                        Some(v) => out.get_or_insert_with(|| items[..i].to_vec()).push(v),
                        None => {
                            if let Some(o) = out.as_mut() {
                                o.push(item.clone());
                            }
                        }
                    }
                }
                Ok(out.map(|v| Value::Array(Arc::new(v))))
            }
            Value::Object(map) => {
                let mut out: Option<BTreeMap<String, Value>> = None;
                for (key, item) in map.iter() {
                    if let Some(v) = self.walk(item, minted)? {
                        out.get_or_insert_with(|| (**map).clone()).insert(key.clone(), v);
                    }
                }
                Ok(out.map(|m| Value::Object(Arc::new(m))))
            }
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::Blob(_) => Ok(None),
        }
    }

    fn resolve(&self, s: &str, minted: &mut Vec<String>) -> Result<Option<Value>, TreeError> {
        let Some(placeholder) = Placeholder::parse(s) else {
            return Ok(None);
        };
        let Some(blob) = self.table.get(s) else {
            return match self.options.on_missing {
                MissingPlaceholder::Fail => Err(TreeError::MissingPlaceholder(s.to_owned())),
                MissingPlaceholder::Keep => {
                    tracing::warn!(token = s, "placeholder not in side table; leaving it in place");
                    Ok(None)
                }
            };
        };
        match placeholder.origin {
            Origin::Inline => Ok(Some(Value::Blob(blob.clone()))),
            Origin::Url => {
                let registry = self.registry.ok_or_else(|| TreeError::NoRegistry(s.to_owned()))?;
                let url = registry.create_url(blob);
                minted.push(url.clone());
                Ok(Some(Value::String(url)))
            }
        }
    }
}

/// Extract with the given id strategy and no registry.
pub async fn extract_blobs(
    value: &Value,
    table: &mut BlobTable,
    ids:   &dyn IdGenerator,
) -> Result<Value, TreeError> {
    Extractor::new(ids).extract(value, table).await
}

/// Include with strict lookup and no registry.
pub fn include_blobs(value: &Value, table: &BlobTable) -> Result<Value, TreeError> {
    Includer::new(table).include(value)
}
