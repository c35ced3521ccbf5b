use serde::{Deserialize, Serialize};

/// Section names produced by the ingestion step.
///
/// Wikipedia articles are split into `lead_section`, the three plot phases, `production`
/// and `reception`; IMDb pages contribute `synopsis`, `summaries`, `trivia`, the two goof
/// lists and the combined `awards_finance` block.
pub mod sections {
    pub const LEAD: &str = "lead_section";
    pub const PLOT_SETUP: &str = "plot_setup";
    pub const PLOT_BUILD_UP: &str = "plot_build_up";
    pub const PLOT_ENDING: &str = "plot_ending";
    pub const PRODUCTION: &str = "production";
    pub const RECEPTION: &str = "reception";
    pub const SYNOPSIS: &str = "synopsis";
    pub const SUMMARIES: &str = "summaries";
    pub const TRIVIA: &str = "trivia";
    pub const GOOFS_CONTINUITY: &str = "goofs_continuity";
    pub const GOOFS_FACTUAL: &str = "goofs_factual";
    pub const AWARDS_FINANCE: &str = "awards_finance";

    pub const ALL: [&str; 12] = [
        LEAD,
        PLOT_SETUP,
        PLOT_BUILD_UP,
        PLOT_ENDING,
        PRODUCTION,
        RECEPTION,
        SYNOPSIS,
        SUMMARIES,
        TRIVIA,
        GOOFS_CONTINUITY,
        GOOFS_FACTUAL,
        AWARDS_FINANCE,
    ];
}

/// A retrievable passage of a film document, joined from both metadata surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Parent document id (e.g. `DOC_000042`)
    pub doc_id: String,

    /// Chunk id assigned at ingestion
    pub chunk_id: String,

    /// Row of this chunk in the vector index
    pub vector_id: i64,

    /// Film title
    pub title: String,

    /// Passage text
    pub text: String,

    /// Origin of the passage (`wiki`, `imdb`)
    pub source: String,

    /// Section name, see [`sections`]
    pub section: String,

    /// Start offset in the source document (chars)
    pub start_char: usize,

    /// End offset in the source document (chars, exclusive)
    pub end_char: usize,
}

impl Chunk {
    /// Join a vector-id row with its document record.
    #[must_use]
    pub fn from_parts(chunk_ref: &ChunkRef, record: &DocumentRecord) -> Self {
        Self {
            doc_id: chunk_ref.doc_id.clone(),
            chunk_id: chunk_ref.chunk_id.clone(),
            vector_id: chunk_ref.vector_id,
            title: record.title.clone(),
            text: record.text.clone(),
            source: record.source.clone(),
            section: record.section.clone(),
            start_char: record.start_char,
            end_char: record.end_char,
        }
    }

    /// A chunk is valid when it covers a non-empty character range.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.start_char < self.end_char
    }

    /// Number of characters covered in the source document
    #[must_use]
    pub const fn span_len(&self) -> usize {
        self.end_char.saturating_sub(self.start_char)
    }
}

/// First metadata surface: vector id → (chunk id, doc id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRef {
    pub vector_id: i64,
    pub chunk_id: String,
    pub doc_id: String,
}

/// Second metadata surface: document id → full record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub title: String,
    pub source: String,
    pub section: String,
    pub start_char: usize,
    pub end_char: usize,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: usize, end: usize) -> DocumentRecord {
        DocumentRecord {
            doc_id: "DOC_000001".to_string(),
            title: "Inception".to_string(),
            source: "wiki".to_string(),
            section: sections::LEAD.to_string(),
            start_char: start,
            end_char: end,
            text: "Inception is a 2010 science fiction action film.".to_string(),
        }
    }

    #[test]
    fn from_parts_copies_both_surfaces() {
        let chunk_ref = ChunkRef {
            vector_id: 7,
            chunk_id: "DOC_000001_c0".to_string(),
            doc_id: "DOC_000001".to_string(),
        };
        let chunk = Chunk::from_parts(&chunk_ref, &record(0, 48));

        assert_eq!(chunk.vector_id, 7);
        assert_eq!(chunk.chunk_id, "DOC_000001_c0");
        assert_eq!(chunk.title, "Inception");
        assert_eq!(chunk.section, "lead_section");
        assert_eq!(chunk.span_len(), 48);
        assert!(chunk.is_valid());
    }

    #[test]
    fn empty_span_is_invalid() {
        let chunk_ref = ChunkRef {
            vector_id: 1,
            chunk_id: "c".to_string(),
            doc_id: "DOC_000001".to_string(),
        };
        assert!(!Chunk::from_parts(&chunk_ref, &record(10, 10)).is_valid());
        assert!(!Chunk::from_parts(&chunk_ref, &record(12, 3)).is_valid());
    }
}
