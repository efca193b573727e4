//! Read-only indices over one chatlog snapshot.
//!
//! [`MetadataIndex`] is an inverted index over the topic/sentiment/fact-key/
//! density labels, built in one pass and persisted as a single JSON document.
//! [`SemanticIndex`] is a brute-force cosine-similarity index over per-message
//! embeddings, persisted as a raw f32 matrix plus a JSON manifest.

pub mod metadata;
pub mod semantic;

pub use metadata::MetadataIndex;
pub use semantic::{SemanticIndex, SemanticPaths};
