pub mod config;
pub mod cycles;
pub mod error;
pub mod filter;
pub mod graph;
pub mod index;
pub mod integrity;
pub mod metrics;
pub mod model;
pub mod profile;
pub mod report;
pub mod tree;

pub use error::{Result, TraceCheckError};
pub use index::SpanIndex;
pub use model::span::{SpanKind, SpanRecord};
pub use report::{AnalysisReport, Finding, FindingKind, analyze};
