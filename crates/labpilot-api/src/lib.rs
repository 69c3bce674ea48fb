//! Labpilot API crate - the HTTP surface.
//!
//! Upload, list, analysis, search and chat endpoints under `/api`, served by
//! axum on localhost.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
