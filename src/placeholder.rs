//! Placeholder tokens standing in for extracted binary objects.
//!
//! Grammar:
//!
//! ```text
//! token = "{blob:" id "}" | "{blobUrl:" id "}"
//! id    = one or more printable characters other than "}"
//! ```
//!
//! `{blob:…}` marks a binary object that was inline in the tree;
//! `{blobUrl:…}` marks one that was referenced by an ephemeral URL.  Side
//! tables are keyed by the full token string.

use std::fmt;

const BLOB_PREFIX: &str = "{blob:";
const BLOB_URL_PREFIX: &str = "{blobUrl:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// The tree held the binary object itself.
    Inline,
    /// The tree held an ephemeral URL that was dereferenced.
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placeholder {
    pub origin: Origin,
    pub id:     String,
}

impl Placeholder {
    pub fn inline(id: impl Into<String>) -> Self {
        Self { origin: Origin::Inline, id: id.into() }
    }

    pub fn url(id: impl Into<String>) -> Self {
        Self { origin: Origin::Url, id: id.into() }
    }

    /// Parse a complete token.  Returns `None` for anything else, including
    /// strings that merely start with a token prefix.
    pub fn parse(s: &str) -> Option<Self> {
        let (origin, rest) = if let Some(rest) = s.strip_prefix(BLOB_URL_PREFIX) {
            (Origin::Url, rest)
        } else if let Some(rest) = s.strip_prefix(BLOB_PREFIX) {
            (Origin::Inline, rest)
        } else {
            return None;
        };
        let id = rest.strip_suffix('}')?;
        if !is_valid_id(id) {
            return None;
        }
        Some(Self { origin, id: id.to_owned() })
    }

    pub fn token(&self) -> String {
        self.to_string()
    }
}

/// Ids must be non-empty, printable, and free of `}`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c != '}' && !c.is_control())
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.origin {
            Origin::Inline => BLOB_PREFIX,
            Origin::Url    => BLOB_URL_PREFIX,
        };
        write!(f, "{prefix}{}}}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_both_kinds() {
        assert_eq!(Placeholder::inline("abc").token(), "{blob:abc}");
        assert_eq!(Placeholder::url("abc").token(), "{blobUrl:abc}");
    }

    #[test]
    fn parse_is_inverse_of_format() {
        for p in [Placeholder::inline("x-1"), Placeholder::url("550e8400-e29b")] {
            assert_eq!(Placeholder::parse(&p.token()), Some(p));
        }
    }

    #[test]
    fn rejects_near_misses() {
        for s in ["{blob:}", "{blob:abc", "{blob:a}b}", "blob:abc", "{blobX:abc}", "{blob:a\nb}", ""] {
            assert_eq!(Placeholder::parse(s), None, "{s:?}");
        }
    }
}
