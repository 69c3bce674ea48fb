//! Labpilot Analysis crate - the in-process tabular analysis engine.
//!
//! Filter expressions, group-by aggregation, descriptive statistics, and
//! Plotly-compatible chart specifications over immutable [`Dataset`]s, plus
//! parsing of uploaded CSV and TSV files.
//!
//! [`Dataset`]: labpilot_core::types::Dataset

pub mod aggregate;
pub mod describe;
pub mod engine;
pub mod error;
pub mod expr;
pub mod plot;
pub mod tabular;

pub use aggregate::AggFunc;
pub use describe::Description;
pub use engine::{AnalysisEngine, TabularEngine};
pub use error::AnalysisError;
pub use expr::Expr;
pub use plot::{PlotRequest, PlotType};
pub use tabular::{CsvParser, TabularLoader, TabularParser};
