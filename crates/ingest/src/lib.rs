pub mod otlp;
pub mod sink;
pub mod source;

pub use source::{InputFormat, LoadStats, load_inputs};
