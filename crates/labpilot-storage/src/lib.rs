//! Labpilot Storage crate - in-process dataset registry and session history.
//!
//! Everything lives for the lifetime of the process. The dataset registry is
//! shared behind a `RwLock`; each conversation session sits behind its own
//! fair async mutex so messages to one session are processed in arrival order.

pub mod datasets;
pub mod sessions;

pub use datasets::DatasetRegistry;
pub use sessions::{Session, SessionHandle, SessionStore};
