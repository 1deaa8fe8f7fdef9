//! Input loading and output rendering for the `gridtag` binary.

use anyhow::{Context, Result};
use gridtag_core::search::find_blocks;
use gridtag_core::{BlockQuery, Document, DocumentProcessor, WorkbookInput};
use std::fs;
use std::path::Path;
use tracing::info;

/// How the input file is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A `WorkbookInput` JSON grid export
    Workbook,
    /// Any JSON payload
    Api,
}

/// Read `path` and run it through the processor.
pub fn load_document(
    processor: &DocumentProcessor,
    path: &Path,
    kind: InputKind,
    profile: bool,
) -> Result<Document> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input: {}", path.display()))?;

    let document = match kind {
        InputKind::Workbook => {
            let workbook: WorkbookInput = serde_json::from_str(&contents)
                .with_context(|| format!("Input is not a workbook grid: {}", path.display()))?;
            processor.process_workbook_with_profiling(&workbook, profile)?
        }
        InputKind::Api => {
            let payload: serde_json::Value = serde_json::from_str(&contents)
                .with_context(|| format!("Input is not valid JSON: {}", path.display()))?;
            let source = path.file_stem().and_then(|s| s.to_str());
            processor.process_api(&payload, source)?
        }
    };

    info!(
        "Built document with {} blocks and {} tags",
        document.blocks.len(),
        document.global_tags.len()
    );
    Ok(document)
}

/// Pretty JSON for the whole document, or for the tag-matched blocks only
/// when `tags` is non-empty.
pub fn render(document: &Document, tags: &[String], max_cells: usize) -> Result<String> {
    if tags.is_empty() {
        return Ok(serde_json::to_string_pretty(document)?);
    }
    let query = BlockQuery::new(tags, max_cells);
    let matches = find_blocks(document, &query);
    info!("{} blocks match tags {:?}", matches.len(), query.tags);
    Ok(serde_json::to_string_pretty(&matches)?)
}

/// Write to `output`, or stdout when none is given.
pub fn write_output(json: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Saved to: {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
