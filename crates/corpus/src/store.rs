use crate::error::{CorpusError, Result};
use crate::types::{ChunkRef, DocumentRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Read-only lookup surfaces over the ingested corpus.
///
/// Both lookups are batched and return only rows that exist; unknown ids are
/// silently absent rather than an error.
pub trait MetadataStore: Send + Sync {
    /// vector id → (chunk id, doc id)
    fn fetch_by_vector_ids(&self, vector_ids: &[i64]) -> Result<Vec<ChunkRef>>;

    /// doc id → full document record
    fn fetch_documents(&self, doc_ids: &[String]) -> Result<Vec<DocumentRecord>>;
}

/// On-disk layout of a metadata snapshot
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    #[serde(default)]
    pub chunks: Vec<ChunkRef>,
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
}

/// In-memory metadata store backed by a JSON snapshot
#[derive(Debug, Default)]
pub struct JsonMetadataStore {
    chunks: HashMap<i64, ChunkRef>,
    documents: HashMap<String, DocumentRecord>,
    path: Option<PathBuf>,
}

impl JsonMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from rows, rejecting duplicate primary keys.
    ///
    /// Rows with empty or inverted offsets are kept so lookups still resolve them;
    /// retrieval drops the chunks they produce.
    pub fn from_snapshot(snapshot: MetadataSnapshot) -> Result<Self> {
        let mut store = Self::new();
        for chunk in snapshot.chunks {
            store.insert_chunk(chunk)?;
        }
        for document in snapshot.documents {
            if document.start_char >= document.end_char {
                log::warn!(
                    "Document {} has invalid offsets {}..{}; its chunks will not be retrieved",
                    document.doc_id,
                    document.start_char,
                    document.end_char
                );
            }
            store.insert_row(document)?;
        }
        Ok(store)
    }

    pub fn insert_chunk(&mut self, chunk: ChunkRef) -> Result<()> {
        if self.chunks.contains_key(&chunk.vector_id) {
            return Err(CorpusError::duplicate("vector", chunk.vector_id.to_string()));
        }
        self.chunks.insert(chunk.vector_id, chunk);
        Ok(())
    }

    /// Strict insert: offsets must describe a non-empty span.
    pub fn insert_document(&mut self, document: DocumentRecord) -> Result<()> {
        if document.start_char >= document.end_char {
            return Err(CorpusError::InvalidOffsets {
                doc_id: document.doc_id,
                start: document.start_char,
                end: document.end_char,
            });
        }
        self.insert_row(document)
    }

    fn insert_row(&mut self, document: DocumentRecord) -> Result<()> {
        if self.documents.contains_key(&document.doc_id) {
            return Err(CorpusError::duplicate("document", document.doc_id));
        }
        self.documents.insert(document.doc_id.clone(), document);
        Ok(())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Load store from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        log::info!("Loading metadata from {:?}", path.as_ref());
        let data = std::fs::read_to_string(&path)?;
        let snapshot: MetadataSnapshot = serde_json::from_str(&data)?;
        let mut store = Self::from_snapshot(snapshot)?;
        store.path = Some(path.as_ref().to_path_buf());
        log::info!(
            "Loaded {} chunk rows and {} documents",
            store.chunk_count(),
            store.document_count()
        );
        Ok(store)
    }

    /// Save store to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut chunks: Vec<&ChunkRef> = self.chunks.values().collect();
        chunks.sort_by_key(|c| c.vector_id);
        let mut documents: Vec<&DocumentRecord> = self.documents.values().collect();
        documents.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));

        let data = serde_json::to_string_pretty(&serde_json::json!({
            "chunks": chunks,
            "documents": documents,
        }))?;
        std::fs::write(&path, data)?;
        log::info!("Metadata saved to {:?}", path.as_ref());
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl MetadataStore for JsonMetadataStore {
    fn fetch_by_vector_ids(&self, vector_ids: &[i64]) -> Result<Vec<ChunkRef>> {
        let mut rows: Vec<ChunkRef> = vector_ids
            .iter()
            .filter_map(|id| self.chunks.get(id).cloned())
            .collect();
        rows.sort_by_key(|r| r.vector_id);
        rows.dedup_by_key(|r| r.vector_id);
        Ok(rows)
    }

    fn fetch_documents(&self, doc_ids: &[String]) -> Result<Vec<DocumentRecord>> {
        let mut rows: Vec<DocumentRecord> = doc_ids
            .iter()
            .filter_map(|id| self.documents.get(id).cloned())
            .collect();
        rows.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        rows.dedup_by(|a, b| a.doc_id == b.doc_id);
        Ok(rows)
    }
}
