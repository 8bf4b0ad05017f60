//! Tagged multipart binary container plus blob/JSON tree substitution.
//!
//! - [`MultipartBuilder`] packs JSON and binary fields into one blob;
//!   [`decode`] / [`Decoder`] unpack it.
//! - [`Extractor`] moves binary objects out of a [`Value`] tree into a
//!   [`BlobTable`], leaving placeholder tokens; [`Includer`] puts them back.

pub mod primitive;
pub mod entry;
pub mod blob;
pub mod builder;
pub mod decoder;
pub mod signature;
pub mod value;
pub mod placeholder;
pub mod ids;
pub mod registry;
pub mod tree;

pub use blob::Blob;
pub use entry::{EntryError, EntryType};
pub use builder::{BuildError, MultipartBuilder};
pub use decoder::{decode, DecodeError, Decoder, FieldError, FieldValue, Multipart};
pub use signature::{HmacSha256, PayloadSigner, PayloadVerifier, SignatureError};
pub use value::Value;
pub use placeholder::Placeholder;
pub use ids::{ContentHashIds, IdGenerator, RandomIds};
pub use registry::{BlobRegistry, MemoryRegistry};
pub use tree::{extract_blobs, include_blobs, BlobTable, Extractor, IncludeOptions, Includer, MissingPlaceholder, TreeError};
