//! # ReelQA Corpus
//!
//! Read-only view of the ingested film corpus.
//!
//! The ingestion pipeline (scraping, cleaning, chunking) lives elsewhere; this crate only
//! describes the rows it leaves behind and the two lookups the retrieval core performs:
//!
//! ```text
//! vector_id ──> ChunkRef { chunk_id, doc_id }
//!                               │
//!                               └──> DocumentRecord { title, source, section, offsets, text }
//! ```

mod error;
mod store;
mod types;

pub use error::{CorpusError, Result};
pub use store::{JsonMetadataStore, MetadataSnapshot, MetadataStore};
pub use types::{sections, Chunk, ChunkRef, DocumentRecord};
