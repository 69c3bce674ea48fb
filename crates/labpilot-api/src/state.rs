//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use labpilot_analysis::{TabularEngine, TabularLoader};
use labpilot_chat::{CapabilityAdapters, ChatService, LanguageModel};
use labpilot_core::config::LabpilotConfig;
use labpilot_storage::{DatasetRegistry, SessionStore};
use labpilot_vector::{DocumentIndex, DocumentIngestor, DynEmbeddingService, LexicalEmbedding};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration (read-only after startup).
    pub config: Arc<LabpilotConfig>,
    pub datasets: Arc<DatasetRegistry>,
    pub documents: Arc<DocumentIndex>,
    /// File parsers for dataset uploads.
    pub tabular: Arc<TabularLoader>,
    /// Chunk, embed and index pipeline for document uploads.
    pub ingestor: Arc<DocumentIngestor>,
    /// Validated analysis and search operations, shared with the chat.
    pub adapters: Arc<CapabilityAdapters>,
    pub chat: Arc<ChatService>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Build the state with the offline lexical embedder.
    pub fn new(config: LabpilotConfig, model: Arc<dyn LanguageModel>) -> Self {
        let embedder = Arc::new(LexicalEmbedding::with_dimensions(config.search.embedding_dim));
        Self::with_embedder(config, model, embedder)
    }

    /// Build the state around the given collaborators.
    pub fn with_embedder(
        config: LabpilotConfig,
        model: Arc<dyn LanguageModel>,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Self {
        let retention = &config.retention;
        let datasets = Arc::new(DatasetRegistry::with_limit(retention.max_datasets));
        let documents = Arc::new(DocumentIndex::with_limit(embedder, retention.max_documents));
        let sessions = Arc::new(SessionStore::with_retention(retention));

        let ingestor = Arc::new(DocumentIngestor::from_config(
            Arc::clone(&documents),
            &config.search,
        ));
        let adapters = Arc::new(CapabilityAdapters::new(
            Arc::clone(&datasets),
            Arc::clone(&documents),
            Arc::new(TabularEngine::new()),
            config.search.clone(),
        ));
        let chat = Arc::new(ChatService::new(
            config.chat.clone(),
            sessions,
            Arc::clone(&adapters),
            model,
        ));

        Self {
            config: Arc::new(config),
            datasets,
            documents,
            tabular: Arc::new(TabularLoader::default()),
            ingestor,
            adapters,
            chat,
            start_time: Instant::now(),
        }
    }
}
