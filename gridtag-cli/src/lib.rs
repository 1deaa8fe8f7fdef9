// All core functionality is in gridtag-core
// This CLI acts as a thin wrapper around the core library

// CLI-specific modules
pub mod output;

// Re-export core types for convenience
pub use gridtag_core::*;

// Re-export CLI utilities
pub use output::{load_document, render, write_output, InputKind};
