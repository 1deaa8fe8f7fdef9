// Tagging rules
// - engine.rs: TagEngine, the TagRule trait and the ordered pipeline
// - auto_tagger.rs: header keywords, value mining, cell types, free-text content
// - business.rs: TagAssigner with business rules, categories and root tag
// - statistics.rs: per-column majority types and table summary

pub mod auto_tagger;
pub mod business;
pub mod engine;
pub mod statistics;

pub use auto_tagger::{AutoTagger, CellTypeTagger, TextContentAnalyzer};
pub use business::{BusinessRule, TagAssigner};
pub use engine::*;
