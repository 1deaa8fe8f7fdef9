// Gridtag Core Library
//
// Structures raw spreadsheet grids into typed rows under a recovered
// header tree and tags the result through a configurable rule pipeline.
// Main interface is `DocumentProcessor`.

pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod headers;
pub mod ingest;
pub mod processor;
pub mod rows;
pub mod rules;
pub mod search;
pub mod types;

// Re-export main types and functions for easy use
pub use classifier::{parse_amount, CellClassifier};
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use processor::{DocumentProcessor, PipelineStages, StepProfiler};
pub use search::{BlockMatch, BlockQuery};
pub use types::*;
