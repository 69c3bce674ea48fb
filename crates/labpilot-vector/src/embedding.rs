//! Embedding service trait and its backends.
//!
//! - [`LexicalEmbedding`] hashes word and character-trigram features into a
//!   fixed-size vector. Runs offline; texts sharing vocabulary score close.
//! - [`RemoteEmbedding`](crate::remote::RemoteEmbedding) calls an
//!   OpenAI-compatible `/embeddings` endpoint.
//! - [`MockEmbedding`] hashes the whole input. Only useful in tests.

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::pin::Pin;
use std::sync::Arc;

use labpilot_core::config::SearchConfig;
use labpilot_core::error::LabpilotError;

use crate::remote::RemoteEmbedding;

/// Service for generating text embeddings.
///
/// Used for both ingestion (chunk vectors) and search (query vectors).
/// Backend failures should surface as [`LabpilotError::Collaborator`].
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, LabpilotError>> + Send;

    /// Dimensionality of the vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// `EmbeddingService::embed` returns `impl Future`, so it cannot be used as a
/// trait object. Every `EmbeddingService` gets this trait through the blanket
/// impl below, which lets `Arc<dyn DynEmbeddingService>` live in the index.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, LabpilotError>> + Send + 'a>>;

    /// Dimensionality of the vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<f32>, LabpilotError>> + Send + 'a>> {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Build the embedding backend selected by `config.embedding_provider`.
pub fn embedder_from_config(
    config: &SearchConfig,
) -> Result<Arc<dyn DynEmbeddingService>, LabpilotError> {
    match config.embedding_provider.as_str() {
        "lexical" => Ok(Arc::new(LexicalEmbedding::with_dimensions(
            config.embedding_dim,
        ))),
        "openai-compatible" | "openai" => Ok(Arc::new(RemoteEmbedding::from_config(config)?)),
        other => Err(LabpilotError::Config(format!(
            "unknown embedding provider '{}' (expected \"lexical\" or \"openai-compatible\")",
            other
        ))),
    }
}

fn empty_text_error() -> LabpilotError {
    LabpilotError::Validation("Cannot embed empty text".to_string())
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in vector.iter_mut() {
            *val /= norm;
        }
    }
}

// ---------------------------------------------------------------------------
// LexicalEmbedding - hashed bag of words and trigrams
// ---------------------------------------------------------------------------

/// Function words that carry no topic.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "was", "were", "with",
];

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Offline embedding from hashed lexical features.
///
/// Each lowercased word (minus stopwords) and each character trigram of
/// `^word$` is hashed to a signed bucket. Trigrams let inflections such as
/// "gene" and "genes" overlap. Vectors are L2-normalized.
#[derive(Debug, Clone)]
pub struct LexicalEmbedding {
    dimensions: usize,
}

impl LexicalEmbedding {
    /// 384-dimensional vectors.
    pub fn new() -> Self {
        Self::with_dimensions(384)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let mut hasher = DefaultHasher::new();
        feature.hash(&mut hasher);
        let h = hasher.finish();
        let bucket = (h % self.dimensions as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        let lower = text.to_lowercase();
        let words = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty() && !STOPWORDS.contains(w));

        let mut any = false;
        for word in words {
            any = true;
            self.add_feature(&mut vector, word, WORD_WEIGHT);
            let padded: Vec<char> = format!("^{}$", word).chars().collect();
            for gram in padded.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut vector, &gram, TRIGRAM_WEIGHT);
            }
        }
        if !any {
            self.add_feature(&mut vector, lower.trim(), WORD_WEIGHT);
        }
        normalize(&mut vector);
        vector
    }
}

impl Default for LexicalEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService for LexicalEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LabpilotError> {
        if text.trim().is_empty() {
            return Err(empty_text_error());
        }
        Ok(self.vectorize(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// MockEmbedding - deterministic hash-based vectors
// ---------------------------------------------------------------------------

/// Embedding service that derives unit vectors from a hash of the input.
///
/// Identical inputs always produce identical vectors; different inputs are
/// unrelated directions. For tests only.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl MockEmbedding {
    /// 384-dimensional vectors.
    pub fn new() -> Self {
        Self::with_dimensions(384)
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        let mut result = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let h = hasher.finish();
            let val = ((h as f64) / (u64::MAX as f64)) * 2.0 - 1.0;
            result.push(val as f32);
        }

        normalize(&mut result);
        result
    }
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingService for MockEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LabpilotError> {
        if text.trim().is_empty() {
            return Err(empty_text_error());
        }
        Ok(self.hash_to_vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
