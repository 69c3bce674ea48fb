//! In-memory document index with brute-force cosine similarity search.
//!
//! Documents are kept in registration order and their chunks in document
//! order, so a stable sort on score breaks ties by insertion order.

use std::cmp::Ordering;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use labpilot_core::error::{LabpilotError, Result};
use labpilot_core::types::{Chunk, Document, DocumentId, DocumentMeta, NewDocument};

use crate::embedding::DynEmbeddingService;

/// A single chunk returned from a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The chunk's text.
    pub text: String,
    /// Name of the document the chunk belongs to.
    pub document: String,
    pub document_id: DocumentId,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Cosine similarity between the query and the chunk.
    pub score: f64,
}

/// Registry and similarity index over uploaded documents.
pub struct DocumentIndex {
    documents: RwLock<Vec<Arc<Document>>>,
    embedder: Arc<dyn DynEmbeddingService>,
    max_documents: Option<usize>,
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("documents", &self.len())
            .field("dimensions", &self.embedder.dimensions())
            .field("max_documents", &self.max_documents)
            .finish()
    }
}

impl DocumentIndex {
    /// Create an unbounded index that embeds queries with `embedder`.
    pub fn new(embedder: Arc<dyn DynEmbeddingService>) -> Self {
        Self::with_limit(embedder, None)
    }

    /// Create an index that evicts the oldest document beyond `max_documents`.
    pub fn with_limit(embedder: Arc<dyn DynEmbeddingService>, max_documents: Option<usize>) -> Self {
        Self {
            documents: RwLock::new(Vec::new()),
            embedder,
            max_documents,
        }
    }

    /// The embedding collaborator shared by ingestion and search.
    pub fn embedder(&self) -> &Arc<dyn DynEmbeddingService> {
        &self.embedder
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Arc<Document>>>> {
        self.documents
            .read()
            .map_err(|e| LabpilotError::Storage(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Arc<Document>>>> {
        self.documents
            .write()
            .map_err(|e| LabpilotError::Storage(format!("Lock poisoned: {}", e)))
    }

    /// Store an already chunked and embedded document under a fresh id.
    ///
    /// Every chunk vector must match the embedder's dimensionality.
    pub fn register(&self, new: NewDocument) -> Result<Arc<Document>> {
        let dims = self.embedder.dimensions();
        if let Some((i, chunk)) = new
            .chunks
            .iter()
            .enumerate()
            .find(|(_, c)| c.vector.len() != dims)
        {
            return Err(LabpilotError::Validation(format!(
                "chunk {} has {} dimensions, expected {}",
                i,
                chunk.vector.len(),
                dims
            )));
        }

        let document = Arc::new(Document {
            id: DocumentId::generate(),
            name: new.name,
            chunks: new
                .chunks
                .into_iter()
                .enumerate()
                .map(|(index, c)| Chunk {
                    index,
                    text: c.text,
                    vector: c.vector,
                    entities: c.entities,
                })
                .collect(),
            entities: new.entities,
            created_at: Utc::now(),
        });

        let mut documents = self.write()?;
        documents.push(Arc::clone(&document));
        if let Some(max) = self.max_documents {
            while documents.len() > max.max(1) {
                let evicted = documents.remove(0);
                debug!(document_id = %evicted.id, "Document evicted by retention limit");
            }
        }

        info!(
            document_id = %document.id,
            name = %document.name,
            chunks = document.chunk_count(),
            "Document indexed"
        );
        Ok(document)
    }

    /// Look up a document by id.
    pub fn get(&self, id: &DocumentId) -> Result<Arc<Document>> {
        self.read()?
            .iter()
            .find(|d| &d.id == id)
            .cloned()
            .ok_or_else(|| LabpilotError::NotFound(format!("document '{}'", id)))
    }

    /// Metadata for every document, in registration order.
    pub fn list(&self) -> Result<Vec<DocumentMeta>> {
        Ok(self.read()?.iter().map(|d| d.metadata()).collect())
    }

    /// Names of all documents, in registration order.
    pub fn names(&self) -> Result<Vec<String>> {
        Ok(self.read()?.iter().map(|d| d.name.clone()).collect())
    }

    /// Find a document by name, ignoring case. The most recent match wins.
    pub fn find_by_name(&self, name: &str) -> Result<Option<Arc<Document>>> {
        let needle = name.trim().to_lowercase();
        Ok(self
            .read()?
            .iter()
            .rev()
            .find(|d| d.name.to_lowercase() == needle)
            .cloned())
    }

    /// Return at most `top_k` chunks ordered by descending cosine similarity
    /// to `query`, optionally restricted to one document.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        scope: Option<&DocumentId>,
    ) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(LabpilotError::Validation(
                "search query must not be empty".to_string(),
            ));
        }

        let candidates: Vec<Arc<Document>> = match scope {
            Some(id) => vec![self.get(id)?],
            None => self.read()?.clone(),
        };
        if top_k == 0 || candidates.iter().all(|d| d.chunks.is_empty()) {
            return Ok(Vec::new());
        }

        let query_vec = self.embedder.embed_boxed(query).await.map_err(|e| match e {
            LabpilotError::Collaborator(_) => e,
            other => LabpilotError::Collaborator(format!("query embedding failed: {}", other)),
        })?;

        let mut hits: Vec<SearchHit> = candidates
            .iter()
            .flat_map(|doc| {
                doc.chunks.iter().map(|chunk| SearchHit {
                    text: chunk.text.clone(),
                    document: doc.name.clone(),
                    document_id: doc.id.clone(),
                    chunk_index: chunk.index,
                    score: cosine_similarity(&query_vec, &chunk.vector),
                })
            })
            .collect();

        sort_by_score(&mut hits);
        hits.truncate(top_k);

        debug!(top_k, returned = hits.len(), "Document search complete");
        Ok(hits)
    }

    /// Remove a document. Returns whether it was present.
    pub fn evict(&self, id: &DocumentId) -> Result<bool> {
        let mut documents = self.write()?;
        let before = documents.len();
        documents.retain(|d| &d.id != id);
        Ok(documents.len() != before)
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stable sort by descending score; NaN sorts last.
fn sort_by_score(hits: &mut [SearchHit]) {
    let key = |s: f64| if s.is_nan() { f64::NEG_INFINITY } else { s };
    hits.sort_by(|a, b| {
        key(b.score)
            .partial_cmp(&key(a.score))
            .unwrap_or(Ordering::Equal)
    });
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();
    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{EmbeddingService, MockEmbedding};
    use labpilot_core::types::NewChunk;

    /// Embeds every text as the same fixed direction, so all scores tie.
    struct ConstantEmbedding;

    impl EmbeddingService for ConstantEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    struct FailingEmbedding;

    impl EmbeddingService for FailingEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(LabpilotError::Storage("model offline".to_string()))
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    fn chunk(text: &str, vector: Vec<f32>) -> NewChunk {
        NewChunk {
            text: text.to_string(),
            vector,
            entities: Vec::new(),
        }
    }

    fn doc(name: &str, chunks: Vec<NewChunk>) -> NewDocument {
        NewDocument {
            name: name.to_string(),
            chunks,
            entities: Vec::new(),
        }
    }

    fn constant_index() -> DocumentIndex {
        DocumentIndex::new(Arc::new(ConstantEmbedding))
    }

    #[tokio::test]
    async fn test_search_orders_by_descending_score() {
        let index = constant_index();
        index
            .register(doc(
                "paper.pdf",
                vec![
                    chunk("far", vec![0.0, 1.0, 0.0]),
                    chunk("close", vec![1.0, 0.1, 0.0]),
                    chunk("opposite", vec![-1.0, 0.0, 0.0]),
                ],
            ))
            .unwrap();

        let hits = index.search("anything", 10, None).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["close", "far", "opposite"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(hits[0].chunk_index, 1);
        assert_eq!(hits[0].document, "paper.pdf");
    }

    #[tokio::test]
    async fn test_ties_keep_insertion_order() {
        let index = constant_index();
        let first = index
            .register(doc(
                "a",
                vec![chunk("a0", vec![1.0, 0.0, 0.0]), chunk("a1", vec![2.0, 0.0, 0.0])],
            ))
            .unwrap();
        let second = index
            .register(doc("b", vec![chunk("b0", vec![3.0, 0.0, 0.0])]))
            .unwrap();

        let hits = index.search("q", 10, None).await.unwrap();
        let order: Vec<(&DocumentId, usize)> =
            hits.iter().map(|h| (&h.document_id, h.chunk_index)).collect();
        assert_eq!(order, vec![(&first.id, 0), (&first.id, 1), (&second.id, 0)]);
    }

    #[tokio::test]
    async fn test_never_more_than_top_k() {
        let index = DocumentIndex::new(Arc::new(MockEmbedding::with_dimensions(8)));
        let embedder = MockEmbedding::with_dimensions(8);
        let mut chunks = Vec::new();
        for i in 0..12 {
            let text = format!("chunk number {}", i);
            let vector = embedder.embed(&text).await.unwrap();
            chunks.push(chunk(&text, vector));
        }
        index.register(doc("big", chunks)).unwrap();

        for k in [0, 1, 5, 12, 50] {
            let hits = index.search("chunk number 3", k, None).await.unwrap();
            assert!(hits.len() <= k);
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        }
        let hits = index.search("chunk number 3", 1, None).await.unwrap();
        assert_eq!(hits[0].text, "chunk number 3");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_scoped_search() {
        let index = constant_index();
        index
            .register(doc("a", vec![chunk("a0", vec![1.0, 0.0, 0.0])]))
            .unwrap();
        let b = index
            .register(doc("b", vec![chunk("b0", vec![1.0, 0.0, 0.0])]))
            .unwrap();

        let hits = index.search("q", 10, Some(&b.id)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "b0");

        let err = index
            .search("q", 10, Some(&DocumentId::new("missing")))
            .await
            .unwrap_err();
        assert!(matches!(err, LabpilotError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let index = constant_index();
        let err = index.search("   ", 5, None).await.unwrap_err();
        assert!(matches!(err, LabpilotError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = constant_index();
        assert!(index.search("q", 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_collaborator_error() {
        let index = DocumentIndex::new(Arc::new(FailingEmbedding));
        index
            .register(doc("a", vec![chunk("a0", vec![1.0, 0.0, 0.0])]))
            .unwrap();
        let err = index.search("q", 5, None).await.unwrap_err();
        assert!(matches!(err, LabpilotError::Collaborator(_)));
    }

    #[test]
    fn test_register_rejects_wrong_dimensions() {
        let index = constant_index();
        let err = index
            .register(doc("a", vec![chunk("a0", vec![1.0, 0.0])]))
            .unwrap_err();
        assert!(matches!(err, LabpilotError::Validation(_)));
        assert!(index.is_empty());
    }

    #[test]
    fn test_list_and_retention() {
        let index = DocumentIndex::with_limit(Arc::new(ConstantEmbedding), Some(2));
        let a = index.register(doc("a", vec![])).unwrap();
        index
            .register(doc("b", vec![chunk("b0", vec![1.0, 0.0, 0.0])]))
            .unwrap();
        index.register(doc("c", vec![])).unwrap();

        let names: Vec<String> = index.list().unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["b", "c"]);
        assert_eq!(index.list().unwrap()[0].chunk_count, 1);
        assert!(index.get(&a.id).is_err());
    }

    #[test]
    fn test_cosine_similarity_edges() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-9);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_nan_scores_sort_last() {
        let hit = |text: &str, score: f64| SearchHit {
            text: text.to_string(),
            document: "d".to_string(),
            document_id: DocumentId::new("d"),
            chunk_index: 0,
            score,
        };
        let mut hits = vec![hit("nan", f64::NAN), hit("low", 0.1), hit("high", 0.9)];
        sort_by_score(&mut hits);
        let order: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(order, vec!["high", "low", "nan"]);
    }
}
