//! Labpilot Vector crate - document chunking, embedding, and similarity search.
//!
//! Provides an embedding service trait with lexical, remote and mock
//! backends, an in-memory document index with brute-force cosine search, character
//! chunking with overlap, regex entity extraction, and the ingestion
//! pipeline that ties them together.

pub mod chunking;
pub mod embedding;
pub mod entity;
pub mod index;
pub mod pipeline;
pub mod remote;

pub use chunking::chunk_text;
pub use embedding::{
    embedder_from_config, DynEmbeddingService, EmbeddingService, LexicalEmbedding, MockEmbedding,
};
pub use entity::EntityExtractor;
pub use index::{DocumentIndex, SearchHit};
pub use pipeline::{DocumentIngestor, IngestReport};
pub use remote::RemoteEmbedding;
