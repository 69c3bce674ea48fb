//! Labpilot application binary - composition root.
//!
//! 1. Parse CLI flags and load configuration from TOML
//! 2. Install the tracing subscriber
//! 3. Select the language model and embedding providers
//! 4. Build the shared state (registries, session store, chat service)
//! 5. Start the axum REST API server

mod cli;

use std::sync::Arc;

use clap::Parser;

use labpilot_api::state::AppState;
use labpilot_chat::{LanguageModel, OpenAiCompatibleModel, RuleBasedModel};
use labpilot_core::config::{LabpilotConfig, LlmConfig};
use labpilot_core::error::LabpilotError;
use labpilot_vector::embedder_from_config;

use crate::cli::CliArgs;

/// Build the configured language model.
fn build_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>, LabpilotError> {
    match config.provider.as_str() {
        "rules" => Ok(Arc::new(RuleBasedModel::new())),
        "openai-compatible" | "openai" => Ok(Arc::new(OpenAiCompatibleModel::from_config(config)?)),
        other => Err(LabpilotError::Config(format!(
            "unknown llm provider '{}' (expected \"rules\" or \"openai-compatible\")",
            other
        ))),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can apply.
    let config_file = args.resolve_config_path();
    let (mut config, load_error) = match LabpilotConfig::load(&config_file) {
        Ok(config) => (config, None),
        Err(e) => (LabpilotConfig::default(), Some(e)),
    };
    config.general.port = args.resolve_port(config.general.port);
    if let Some(level) = args.resolve_log_level() {
        config.general.log_level = level;
    }

    // Tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Labpilot v{}", env!("CARGO_PKG_VERSION"));
    match load_error {
        None => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(LabpilotError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path = %config_file.display(), "No config file, using defaults")
        }
        Some(e) => {
            tracing::warn!(path = %config_file.display(), error = %e, "Failed to load config, using defaults")
        }
    }

    // Language model.
    let model = match build_model(&config.llm) {
        Ok(model) => model,
        Err(e) => {
            tracing::error!(provider = %config.llm.provider, error = %e, "Language model unavailable");
            return Err(e.into());
        }
    };
    tracing::info!(
        provider = %config.llm.provider,
        model = model.name(),
        "Language model ready"
    );

    if !config.chat.enabled {
        tracing::warn!("Chat is disabled in config; only direct endpoints will respond");
    }

    // Embedding backend.
    let embedder = match embedder_from_config(&config.search) {
        Ok(embedder) => embedder,
        Err(e) => {
            tracing::error!(provider = %config.search.embedding_provider, error = %e, "Embedding backend unavailable");
            return Err(e.into());
        }
    };
    tracing::info!(
        provider = %config.search.embedding_provider,
        dimensions = embedder.dimensions(),
        "Embedding backend ready"
    );

    let state = AppState::with_embedder(config.clone(), model, embedder);

    // === API server ===
    tracing::info!(port = config.general.port, "API server starting");
    if let Err(e) = labpilot_api::start_server(&config, state).await {
        tracing::error!(error = %e, "API server stopped");
        tracing::error!(
            "Try: labpilot --port {}",
            config.general.port.saturating_add(1)
        );
        return Err(e.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_provider() {
        let model = build_model(&LlmConfig::default()).unwrap();
        assert_eq!(model.name(), "rules");
    }

    #[test]
    fn test_unknown_provider() {
        let config = LlmConfig {
            provider: "mystery".into(),
            ..LlmConfig::default()
        };
        assert!(matches!(build_model(&config), Err(LabpilotError::Config(_))));
    }
}
