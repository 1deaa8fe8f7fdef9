use crate::api::ApiFlattener;
use crate::classifier::{date_format_of_text, CellClassifier};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::fingerprint::calculate_content_hash;
use crate::headers::{HeaderAnalyzer, HeaderStructure, MergeIndex};
use crate::ingest::{GridIngestor, SanitizedGrid};
use crate::rows::RowMaterializer;
use crate::rules::{TagContext, TagEngine, TagOutcome};
use crate::search::{find_blocks, BlockMatch, BlockQuery};
use crate::types::*;
use chrono::Utc;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Captured intermediate outputs from each pipeline stage
/// Used for testing and diagnostics to inspect each boundary
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStages {
    pub sanitized: SanitizedGrid,
    pub structure: HeaderStructure,
    pub rows: Vec<Row>,
    pub block: Block,
}

/// Simple profiler that collects timings for pipeline steps
pub struct StepProfiler {
    enabled: bool,
    timings: Vec<(String, Duration)>,
}

impl StepProfiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time_step<F, R>(&mut self, step_name: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }

        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();

        debug!("{}: {:.0}ms", step_name, elapsed.as_millis());
        match self.timings.iter_mut().find(|(name, _)| name == step_name) {
            Some((_, total)) => *total += elapsed,
            None => self.timings.push((step_name.to_string(), elapsed)),
        }

        result
    }

    pub fn timings(&self) -> &[(String, Duration)] {
        &self.timings
    }

    pub fn print_summary(&self) {
        if !self.enabled || self.timings.is_empty() {
            return;
        }

        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();
        let total_secs = total.as_secs_f64().max(f64::EPSILON);
        info!("Performance summary:");
        for (step, duration) in &self.timings {
            let percentage = (duration.as_secs_f64() / total_secs) * 100.0;
            info!(
                "   {:.<35} {:.0}ms ({:.1}%)",
                step,
                duration.as_millis(),
                percentage
            );
        }
        info!("   {:.<35} {:.0}ms", "Total", total.as_millis());
    }
}

/// Top-level entry point: sheets to blocks, workbooks and API payloads to documents.
///
/// Holds only immutable configuration and compiled rule tables.
pub struct DocumentProcessor {
    config: EngineConfig,
    classifier: CellClassifier,
    tag_engine: TagEngine,
}

impl DocumentProcessor {
    pub fn new() -> EngineResult<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> EngineResult<Self> {
        let classifier = CellClassifier::new(&config.ingest);
        let tag_engine = TagEngine::new(&config.tagging, classifier.clone())
            .map_err(EngineError::into_processing)?;
        Ok(Self {
            config,
            classifier,
            tag_engine,
        })
    }

    /// Processor with config loaded from a YAML file
    pub fn from_config_file(config_path: &str) -> anyhow::Result<Self> {
        let config = EngineConfig::load_from_file(config_path)?;
        Ok(Self::with_config(config)?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One sheet to one table block. Never fails; unusable grids degrade to
    /// an empty block tagged with the sheet name.
    pub fn process_sheet(&self, sheet: &SheetInput) -> Block {
        self.run_sheet(sheet, &mut StepProfiler::new(false)).block
    }

    /// Process a sheet and capture all intermediate stage outputs
    pub fn process_sheet_capture_stages(&self, sheet: &SheetInput) -> PipelineStages {
        self.run_sheet(sheet, &mut StepProfiler::new(false))
    }

    pub fn process_workbook(&self, workbook: &WorkbookInput) -> EngineResult<Document> {
        self.process_workbook_with_profiling(workbook, false)
    }

    pub fn process_workbook_with_profiling(
        &self,
        workbook: &WorkbookInput,
        enable_profiling: bool,
    ) -> EngineResult<Document> {
        self.build_workbook_document(workbook, enable_profiling)
            .map_err(EngineError::into_processing)
    }

    /// Flatten an arbitrary JSON payload into a document.
    pub fn process_api(&self, payload: &serde_json::Value, source: Option<&str>) -> EngineResult<Document> {
        self.build_api_document(payload, source.unwrap_or("api"))
            .map_err(EngineError::into_processing)
    }

    /// Tag raw sheet data in place; see `TagAssigner::assign_tags`.
    pub fn assign_tags(&self, data: SheetData) -> SheetData {
        self.tag_engine.tag_assigner().assign_tags(data)
    }

    /// Blocks carrying every tag in `tags`, under the configured display ceiling.
    pub fn find_blocks<'d, S: AsRef<str>>(&self, document: &'d Document, tags: &[S]) -> Vec<BlockMatch<'d>> {
        let query = BlockQuery::new(tags, self.config.search.max_display_cells);
        find_blocks(document, &query)
    }

    fn build_workbook_document(
        &self,
        workbook: &WorkbookInput,
        enable_profiling: bool,
    ) -> EngineResult<Document> {
        if workbook.sheets.is_empty() {
            return Err(EngineError::MissingInput("sheets"));
        }
        let start_time = Instant::now();
        let mut profiler = StepProfiler::new(enable_profiling);

        let mut document = Document::new(&workbook.file_name, DocumentType::Excel);
        document.metadata.source = Some(workbook.file_name.clone());
        document.metadata.source_hash =
            profiler.time_step("Fingerprint", || calculate_content_hash(workbook))?;
        document.metadata.config_hash = calculate_content_hash(&self.config)?;

        for sheet in &workbook.sheets {
            let stages = self.run_sheet(sheet, &mut profiler);
            document.push_block(stages.block);
        }
        if let Some(stem) = Path::new(&workbook.file_name).file_stem() {
            document.add_document_tag(&stem.to_string_lossy());
        }
        finish_document(&mut document, workbook.sheets.len());

        profiler.print_summary();
        info!(
            "Processed {} ({} sheets, {} tags) in {:.0}ms",
            workbook.file_name,
            workbook.sheets.len(),
            document.global_tags.len(),
            start_time.elapsed().as_millis()
        );
        Ok(document)
    }

    fn build_api_document(&self, payload: &serde_json::Value, source: &str) -> EngineResult<Document> {
        let flattener = ApiFlattener::new(&self.config.api, &self.classifier, &self.tag_engine);
        let blocks = flattener.flatten(payload, source)?;

        let file_name = format!("api_data_{}", Utc::now().timestamp_millis());
        let mut document = Document::new(&file_name, DocumentType::Api);
        document.metadata.source = Some(source.to_string());
        document.metadata.source_hash = calculate_content_hash(payload)?;
        document.metadata.config_hash = calculate_content_hash(&self.config)?;
        for block in blocks {
            document.push_block(block);
        }
        document.add_document_tag(source);
        finish_document(&mut document, 0);

        info!(
            "Processed API payload from {} ({} blocks, {} tags)",
            source,
            document.blocks.len(),
            document.global_tags.len()
        );
        Ok(document)
    }

    fn run_sheet(&self, sheet: &SheetInput, profiler: &mut StepProfiler) -> PipelineStages {
        let ingestor = GridIngestor::new(&self.config.ingest);
        let sanitized = profiler.time_step("Sanitize", || ingestor.sanitize_grid(&sheet.grid));
        let merges = MergeIndex::new(&sheet.merges, sanitized.source_rows, sanitized.source_cols);

        let analyzer = HeaderAnalyzer::new(&self.config.headers);
        let structure = profiler.time_step("Header Analysis", || analyzer.analyze(&sanitized, &merges));

        if sanitized.is_empty() || structure.is_empty() {
            warn!(
                "Sheet '{}' has no recognizable header rows, emitting empty block",
                sheet.name
            );
            let block = empty_sheet_block(sheet, &sanitized);
            return PipelineStages {
                sanitized,
                structure,
                rows: Vec::new(),
                block,
            };
        }

        let materializer = RowMaterializer::new(&self.classifier);
        let rows = profiler.time_step("Row Materialization", || {
            materializer.materialize(&sanitized, &structure, &merges)
        });

        let outcome = profiler.time_step("Tagging", || {
            self.tag_engine
                .run(&TagContext::new(Some(&sheet.name), &structure.headers, &rows))
        });
        for (rule, elapsed) in &outcome.rule_timings {
            debug!("   {rule}: {:.0}us", elapsed.as_micros());
        }

        let mut block = build_table_block(
            "excel",
            Some(sheet.name.clone()),
            structure.headers.clone(),
            rows.clone(),
            outcome,
        );
        if let BlockContent::Table(table) = &mut block.content {
            table.merged_cells = merges
                .ranges()
                .iter()
                .map(|range| {
                    let (r, c) = (range.start_row, range.start_col);
                    let value = sanitized.value_at(r, c).clone();
                    MergedCellSummary {
                        range: *range,
                        cell_type: self.classifier.classify_sanitized(&value, sanitized.origin_at(r, c)),
                        value,
                    }
                })
                .collect();
        }
        let meta = &mut block.metadata;
        meta.sheet_name = Some(sheet.name.clone());
        meta.has_merged_cells = !merges.is_empty();
        meta.has_multi_level_headers = structure.has_multi_level_headers;
        meta.header_row_count = structure.header_row_count;
        meta.dimensions = dimensions_of(&sanitized);

        debug!(
            "Sheet '{}': {} header rows, {} data rows, {} tags",
            sheet.name,
            structure.header_row_count,
            rows.len(),
            block.tags.len()
        );

        PipelineStages {
            sanitized,
            structure,
            rows,
            block,
        }
    }
}

/// Table block carrying the tag outcome and table-level metadata.
pub(crate) fn build_table_block(
    source: &str,
    title: Option<String>,
    headers: Vec<HeaderNode>,
    rows: Vec<Row>,
    outcome: TagOutcome,
) -> Block {
    let column_count = headers.len();
    let row_count = rows.len();
    let empty_rows = rows.iter().filter(|r| r.is_empty).count();

    let mut block = Block::new(
        BlockType::Table,
        source,
        BlockContent::Table(TableContent {
            title,
            headers,
            rows,
            merged_cells: Vec::new(),
        }),
    );
    block.tags = outcome.tags;
    block.metadata = BlockMetadata {
        row_count,
        column_count,
        total_cells: row_count * column_count,
        empty_rows,
        column_types: outcome.column_types,
        statistics: Some(outcome.statistics),
        ..BlockMetadata::default()
    };
    block
}

fn empty_sheet_block(sheet: &SheetInput, sanitized: &SanitizedGrid) -> Block {
    let mut block = Block::new(
        BlockType::Table,
        "excel",
        BlockContent::Table(TableContent {
            title: Some(sheet.name.clone()),
            ..TableContent::default()
        }),
    );
    let tag = sheet.name.trim().to_lowercase();
    if !tag.is_empty() {
        block.tags.insert(tag);
    }
    block.metadata.sheet_name = Some(sheet.name.clone());
    block.metadata.dimensions = dimensions_of(sanitized);
    block
}

fn dimensions_of(grid: &SanitizedGrid) -> Option<Dimensions> {
    (grid.source_rows > 0 && grid.source_cols > 0).then(|| Dimensions {
        start_row: 0,
        end_row: grid.source_rows - 1,
        start_col: 0,
        end_col: grid.source_cols - 1,
    })
}

/// Fill document statistics and the dominant date format from its blocks.
/// A format actually observed also becomes a document-level tag.
fn finish_document(document: &mut Document, sheets: usize) {
    let formats = document.blocks.iter().flat_map(block_date_formats);
    let mut counts: HashMap<DateFormat, usize> = HashMap::new();
    for format in formats {
        *counts.entry(format).or_default() += 1;
    }
    let dominant = counts
        .into_iter()
        .max_by_key(|(format, n)| (*n, Reverse(*format)))
        .map(|(format, _)| format);
    if let Some(format) = dominant {
        document.add_document_tag(format.as_str());
    }
    document.metadata.format = dominant.unwrap_or_default();

    let blocks = &document.blocks;
    document.metadata.statistics = DocumentStatistics {
        sheets,
        total_cells: blocks.iter().map(|b| b.metadata.total_cells).sum(),
        total_rows: blocks.iter().map(|b| b.metadata.row_count).sum(),
        empty_rows: blocks.iter().map(|b| b.metadata.empty_rows).sum(),
        merged_cells: blocks
            .iter()
            .filter_map(Block::table)
            .map(|t| t.merged_cells.len())
            .sum(),
        processed_at: Utc::now(),
    };
}

/// Date formats of a block: recognizable header labels plus every date cell.
fn block_date_formats(block: &Block) -> Vec<DateFormat> {
    match &block.content {
        BlockContent::Table(table) => table
            .headers
            .iter()
            .map(|h| date_format_of_text(&h.value))
            .filter(|f| *f != DateFormat::Unknown)
            .chain(
                table
                    .rows
                    .iter()
                    .flat_map(|r| &r.cells)
                    .filter_map(|c| c.cell.metadata.date_format),
            )
            .collect(),
        BlockContent::Value { cell, .. } => cell.metadata.date_format.into_iter().collect(),
        BlockContent::Text { .. } | BlockContent::Structured { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn t(s: &str) -> Scalar {
        Scalar::text(s)
    }

    fn financial_sheet() -> SheetInput {
        SheetInput {
            name: "Summary".to_string(),
            grid: vec![
                vec![t("Company"), t("2022"), t("2023")],
                vec![t("Revenue"), Scalar::Number(1_000_000.0), Scalar::Number(1_200_000.0)],
                vec![t("Profit"), Scalar::Number(300_000.0), Scalar::Number(350_000.0)],
                vec![t("Margin"), t("30%"), t("29.2%")],
            ],
            merges: vec![],
        }
    }

    #[test]
    fn test_profiler_accumulates_repeated_steps() {
        let mut profiler = StepProfiler::new(true);
        profiler.time_step("Sanitize", || ());
        profiler.time_step("Sanitize", || ());
        profiler.time_step("Tagging", || ());
        assert_eq!(profiler.timings().len(), 2);

        let mut disabled = StepProfiler::new(false);
        assert_eq!(disabled.time_step("Sanitize", || 7), 7);
        assert!(disabled.timings().is_empty());
    }

    #[test]
    fn test_sheet_to_tagged_block() {
        let processor = DocumentProcessor::new().unwrap();
        let block = processor.process_sheet(&financial_sheet());

        let table = block.table().unwrap();
        assert_eq!(table.headers.len(), 3);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(block.metadata.header_row_count, 1);
        assert_eq!(block.metadata.total_cells, 9);
        for tag in ["2022", "2023", "revenue", "high_revenue", "company", "financial"] {
            assert!(block.tags.contains(tag), "missing {tag}");
        }
        assert!(!block.tags.contains("large_profit"));
    }

    #[test]
    fn test_empty_and_headerless_sheets_degrade() {
        let processor = DocumentProcessor::new().unwrap();
        let blank = SheetInput {
            name: "Notes".to_string(),
            grid: vec![vec![Scalar::Empty, t("  ")]],
            merges: vec![],
        };
        let block = processor.process_sheet(&blank);
        assert_eq!(block.display_cells(), 0);
        assert!(block.tags.contains("notes"));

        let numbers_only = SheetInput {
            name: "Raw".to_string(),
            grid: vec![vec![Scalar::Number(1.0), Scalar::Number(2.0)]],
            merges: vec![],
        };
        let stages = processor.process_sheet_capture_stages(&numbers_only);
        assert_eq!(stages.structure.header_row_count, 0);
        assert!(stages.rows.is_empty());
        assert_eq!(stages.sanitized.rows.len(), 1);
    }

    #[test]
    fn test_workbook_document_statistics_and_hashes() {
        let processor = DocumentProcessor::new().unwrap();
        let workbook = WorkbookInput {
            file_name: "report.xlsx".to_string(),
            sheets: vec![financial_sheet()],
        };
        let doc = processor.process_workbook(&workbook).unwrap();

        assert_eq!(doc.document_type, DocumentType::Excel);
        assert_eq!(doc.metadata.statistics.sheets, 1);
        assert_eq!(doc.metadata.statistics.total_rows, 3);
        assert_eq!(doc.metadata.format, DateFormat::Yearly);
        assert_eq!(doc.metadata.source_hash.len(), 64);
        for block in &doc.blocks {
            assert!(block.tags.is_subset(&doc.global_tags));
        }

        for tag in ["report", "yearly"] {
            assert!(doc.global_tags.contains(tag), "missing {tag}");
            assert!(doc.blocks.iter().all(|b| !b.tags.contains(tag)));
        }

        let again = processor.process_workbook(&workbook).unwrap();
        assert_eq!(again.metadata.source_hash, doc.metadata.source_hash);
        assert_ne!(again.id, doc.id);
    }

    #[test]
    fn test_errors_carry_processing_prefix() {
        let processor = DocumentProcessor::new().unwrap();
        let err = processor
            .process_workbook(&WorkbookInput::default())
            .unwrap_err();
        assert_eq!(err.to_string(), "Processing error: missing required input: sheets");

        let err = processor.process_api(&serde_json::Value::Null, None).unwrap_err();
        assert!(err.is_processing());
        assert!(err.to_string().starts_with("Processing error: "));

        let mut config = EngineConfig::default();
        config.tagging.business_rules[0].label_pattern = Some("[".to_string());
        let err = DocumentProcessor::with_config(config).err().unwrap();
        assert!(err.to_string().starts_with("Processing error: invalid configuration"));
    }

    #[test]
    fn test_api_document() {
        let processor = DocumentProcessor::new().unwrap();
        let doc = processor
            .process_api(&json!({"period": "2023-12-31", "sales": 1200}), Some("crm"))
            .unwrap();
        assert_eq!(doc.document_type, DocumentType::Api);
        assert_eq!(doc.blocks.len(), 2);
        assert_eq!(doc.metadata.source.as_deref(), Some("crm"));
        assert_eq!(doc.metadata.format, DateFormat::Daily);
        assert!(doc.file_name.starts_with("api_data_"));
        assert!(doc.global_tags.contains("sales"));
        assert!(doc.global_tags.contains("crm"));
        assert!(doc.global_tags.contains("daily"));
    }

    #[test]
    fn test_cell_types_reach_block_tags() {
        let processor = DocumentProcessor::new().unwrap();
        let mut sheet = financial_sheet();
        sheet.grid.push(vec![t("Outlook"), t("FY 2025 plan"), Scalar::Empty]);
        let block = processor.process_sheet(&sheet);
        for tag in ["percentage", "number", "2025", "outlook"] {
            assert!(block.tags.contains(tag), "missing {tag}");
        }
        assert!(!block.tags.contains("empty"));
        assert!(!block.tags.contains("text"));
    }
}
