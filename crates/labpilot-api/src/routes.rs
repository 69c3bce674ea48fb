//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use labpilot_core::config::LabpilotConfig;
use labpilot_core::error::LabpilotError;

use crate::handlers;
use crate::state::AppState;

/// Upload bodies carry whole datasets and document texts.
const BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // Allow the server's own origin plus port+1 for a frontend dev server.
    let port = state.config.general.port;
    let dev_port = port.saturating_add(1);
    let origins: Vec<HeaderValue> = [port, dev_port]
        .iter()
        .flat_map(|p| {
            [
                format!("http://127.0.0.1:{}", p),
                format!("http://localhost:{}", p),
            ]
        })
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(handlers::SESSION_HEADER),
        ]);

    let data_routes = Router::new()
        .route("/upload", post(handlers::upload_dataset))
        .route("/list", get(handlers::list_datasets))
        .route("/filter", post(handlers::filter_data))
        .route("/aggregate", post(handlers::aggregate_data))
        .route("/describe", post(handlers::describe_data))
        .route("/plot", post(handlers::plot_data));

    let document_routes = Router::new()
        .route("/upload", post(handlers::upload_document))
        .route("/search", post(handlers::search_documents))
        .route("/list", get(handlers::list_documents));

    let chat_routes = Router::new()
        .route("/message", post(handlers::chat_message))
        .route("/history", get(handlers::chat_history))
        .route("/clear", post(handlers::chat_clear));

    let api = Router::new()
        .nest("/data", data_routes)
        .nest("/documents", document_routes)
        .nest("/chat", chat_routes);

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
///
/// Binds to 127.0.0.1 (localhost only) on the configured port.
pub async fn start_server(config: &LabpilotConfig, state: AppState) -> Result<(), LabpilotError> {
    let addr = format!("127.0.0.1:{}", config.general.port);
    let router = create_router(state);

    tracing::info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind");
        LabpilotError::Io(e)
    })?;

    axum::serve(listener, router).await?;

    Ok(())
}
