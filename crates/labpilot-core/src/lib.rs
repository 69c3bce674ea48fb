//! Shared configuration, error types, and domain model for Labpilot.

pub mod config;
pub mod error;
pub mod types;

pub use config::LabpilotConfig;
pub use error::{ErrorKind, LabpilotError, Result};
pub use types::*;
