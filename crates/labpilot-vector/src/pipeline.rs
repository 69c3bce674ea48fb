//! Document ingestion pipeline.
//!
//! Turns extracted document text into an indexed [`Document`]:
//! 1. Validation (non-blank text)
//! 2. Overlapping character chunking
//! 3. Embedding per chunk
//! 4. Entity extraction per chunk, merged into a document-level list
//! 5. Insertion into the [`DocumentIndex`]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use labpilot_core::config::SearchConfig;
use labpilot_core::error::{LabpilotError, Result};
use labpilot_core::types::{Document, DocumentId, Entity, NewChunk, NewDocument};

use crate::chunking::chunk_text;
use crate::entity::{dedup, EntityExtractor};
use crate::index::DocumentIndex;

/// Summary of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub id: DocumentId,
    pub name: String,
    pub chunk_count: usize,
    pub entities: Vec<Entity>,
}

impl From<&Document> for IngestReport {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            name: doc.name.clone(),
            chunk_count: doc.chunk_count(),
            entities: doc.entities.clone(),
        }
    }
}

/// Chunks, embeds, and indexes document text.
#[derive(Debug)]
pub struct DocumentIngestor {
    index: Arc<DocumentIndex>,
    extractor: EntityExtractor,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl DocumentIngestor {
    pub fn new(index: Arc<DocumentIndex>, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            index,
            extractor: EntityExtractor::new(),
            chunk_size,
            chunk_overlap,
        }
    }

    /// Build an ingestor using the chunking settings from `config`.
    pub fn from_config(index: Arc<DocumentIndex>, config: &SearchConfig) -> Self {
        Self::new(index, config.chunk_size, config.chunk_overlap)
    }

    /// The index documents are written to.
    pub fn index(&self) -> &Arc<DocumentIndex> {
        &self.index
    }

    /// Ingest one document's extracted text.
    ///
    /// Blank text is a validation error. Embedding failures are
    /// collaborator errors and leave the index untouched.
    pub async fn ingest(&self, name: &str, text: &str) -> Result<Arc<Document>> {
        if name.trim().is_empty() {
            return Err(LabpilotError::Validation(
                "document name must not be empty".to_string(),
            ));
        }
        let pieces = chunk_text(text, self.chunk_size, self.chunk_overlap);
        if pieces.is_empty() {
            return Err(LabpilotError::Validation(format!(
                "document '{}' contains no text",
                name
            )));
        }
        debug!(name, chunks = pieces.len(), "Document chunked");

        let embedder = self.index.embedder();
        let mut chunks = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let vector = embedder.embed_boxed(&piece).await.map_err(|e| match e {
                LabpilotError::Collaborator(_) => e,
                other => LabpilotError::Collaborator(format!("chunk embedding failed: {}", other)),
            })?;
            let entities = self.extractor.extract(&piece);
            chunks.push(NewChunk {
                text: piece,
                vector,
                entities,
            });
        }

        let entities = dedup(chunks.iter().flat_map(|c| c.entities.iter().cloned()));
        let document = self.index.register(NewDocument {
            name: name.to_string(),
            chunks,
            entities,
        })?;

        info!(
            document_id = %document.id,
            chunks = document.chunk_count(),
            entities = document.entities.len(),
            "Document ingested"
        );
        Ok(document)
    }
}
