use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

pub type BlockId = Uuid;

/// Lower-cased labels attached to blocks and documents. Ordered so that
/// serialized output is deterministic.
pub type TagSet = BTreeSet<String>;

/// The schema version stamped on every document output.
/// Bump this when the output shape changes.
pub const SCHEMA_VERSION: &str = "0.1.0";

// ===== SCALARS =====

/// A single grid value as delivered by a spreadsheet adapter.
///
/// Deserializes from plain JSON: `null` → `Empty`, numbers → `Number`,
/// ISO `YYYY-MM-DD` strings → `Date`, any other string → `Text`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Empty,
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl Scalar {
    pub fn text(value: impl Into<String>) -> Self {
        Scalar::Text(value.into())
    }

    /// True for `Empty` and for strings that are blank after trimming.
    pub fn is_blank(&self) -> bool {
        match self {
            Scalar::Empty => true,
            Scalar::Text(s) => s.trim().is_empty(),
            Scalar::Number(_) | Scalar::Date(_) => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Empty => Ok(()),
            Scalar::Number(n) => write!(f, "{}", format_number(*n)),
            Scalar::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Scalar::Date(value)
    }
}

/// Integers print without a fractional part so that `2022.0` reads as `2022`.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ===== CELLS =====

/// Semantic type of a cell value. Closed set; every value maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Empty,
    Number,
    Date,
    Percentage,
    Currency,
    Formula,
    Text,
}

impl CellType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CellType::Empty => "empty",
            CellType::Number => "number",
            CellType::Date => "date",
            CellType::Percentage => "percentage",
            CellType::Currency => "currency",
            CellType::Formula => "formula",
            CellType::Text => "text",
        }
    }

    /// Types that carry a numeric magnitude.
    pub fn is_numeric(&self) -> bool {
        matches!(self, CellType::Number | CellType::Percentage | CellType::Currency)
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse granularity of a date value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    #[default]
    Yearly,
    Monthly,
    Quarterly,
    Daily,
    Unknown,
}

impl DateFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            DateFormat::Yearly => "yearly",
            DateFormat::Monthly => "monthly",
            DateFormat::Quarterly => "quarterly",
            DateFormat::Daily => "daily",
            DateFormat::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeInfo {
    pub is_merged: bool,
    /// The cell is the top-left anchor of its merged range
    pub is_start: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CellMetadata {
    /// Decimal places of a number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency_symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_format: Option<DateFormat>,
    /// Fraction for percentages (15% → 0.15), magnitude for currency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_header: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_info: Option<MergeInfo>,
}

/// A classified value. Build through `CellClassifier::cell` so that
/// `cell_type` always agrees with `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub value: Scalar,
    #[serde(rename = "type")]
    pub cell_type: CellType,
    #[serde(default)]
    pub metadata: CellMetadata,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        self.cell_type == CellType::Empty
    }
}

// ===== HEADERS AND MERGES =====

/// Rectangle of the raw grid sharing one logical value (inclusive bounds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MergedRange {
    pub start_row: usize,
    pub start_col: usize,
    pub end_row: usize,
    pub end_col: usize,
}

impl MergedRange {
    pub fn new(start_row: usize, start_col: usize, end_row: usize, end_col: usize) -> Self {
        Self {
            start_row: start_row.min(end_row),
            start_col: start_col.min(end_col),
            end_row: start_row.max(end_row),
            end_col: start_col.max(end_col),
        }
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.start_row..=self.end_row).contains(&row) && (self.start_col..=self.end_col).contains(&col)
    }

    pub fn is_start(&self, row: usize, col: usize) -> bool {
        self.start_row == row && self.start_col == col
    }

    pub fn row_span(&self) -> usize {
        self.end_row - self.start_row + 1
    }

    pub fn col_span(&self) -> usize {
        self.end_col - self.start_col + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderNode {
    pub value: String,
    /// 1-based depth (header row index + 1)
    pub level: u32,
    pub column: usize,
    pub row_span: usize,
    pub col_span: usize,
    pub parent: Option<String>,
    pub is_merged: bool,
}

// ===== ROWS =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCell {
    /// Column key, normally the header text
    pub header: String,
    #[serde(flatten)]
    pub cell: Cell,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// 1-based position within the data region
    pub row_number: usize,
    /// One cell per header column, in header order
    pub cells: Vec<RowCell>,
    pub is_empty: bool,
}

impl Row {
    pub fn get(&self, header: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.header == header).map(|c| &c.cell)
    }

    /// The first column's value, conventionally the row's indicator label.
    pub fn label(&self) -> Option<&Scalar> {
        self.cells.first().map(|c| &c.cell.value)
    }

    /// Every cell after the label column.
    pub fn values(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().skip(1).map(|c| &c.cell)
    }
}

// ===== BLOCKS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Table,
    Text,
    Structured,
    Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedCellSummary {
    #[serde(flatten)]
    pub range: MergedRange,
    pub value: Scalar,
    #[serde(rename = "type")]
    pub cell_type: CellType,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub headers: Vec<HeaderNode>,
    pub rows: Vec<Row>,
    #[serde(default)]
    pub merged_cells: Vec<MergedCellSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BlockContent {
    Table(TableContent),
    Text {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        text: String,
    },
    Structured {
        title: String,
        data: serde_json::Value,
    },
    Value {
        title: String,
        #[serde(flatten)]
        cell: Cell,
    },
}

/// Raw grid bounds (inclusive, 0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Dimensions {
    pub start_row: usize,
    pub end_row: usize,
    pub start_col: usize,
    pub end_col: usize,
}

/// Summary statistics computed by the tag engine over a table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TagStatistics {
    pub total_rows: usize,
    pub empty_values: usize,
    pub numerical_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    pub row_count: usize,
    pub column_count: usize,
    pub total_cells: usize,
    pub empty_rows: usize,
    pub has_merged_cells: bool,
    pub has_multi_level_headers: bool,
    pub header_row_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub column_types: BTreeMap<String, CellType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<TagStatistics>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub source: String,
    pub content: BlockContent,
    pub tags: TagSet,
    #[serde(default)]
    pub metadata: BlockMetadata,
}

impl Block {
    pub fn new(block_type: BlockType, source: &str, content: BlockContent) -> Self {
        Self {
            id: Uuid::new_v4(),
            block_type,
            source: source.to_string(),
            content,
            tags: TagSet::new(),
            metadata: BlockMetadata::default(),
        }
    }

    pub fn table(&self) -> Option<&TableContent> {
        match &self.content {
            BlockContent::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Rows × columns for tables, 1 for any other block.
    pub fn display_cells(&self) -> usize {
        match &self.content {
            BlockContent::Table(table) => table.rows.len() * table.headers.len(),
            _ => 1,
        }
    }
}

// ===== DOCUMENTS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Excel,
    Api,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentStatistics {
    pub sheets: usize,
    pub total_cells: usize,
    pub total_rows: usize,
    pub empty_rows: usize,
    pub merged_cells: usize,
    pub processed_at: DateTime<Utc>,
}

impl Default for DocumentStatistics {
    fn default() -> Self {
        Self {
            sheets: 0,
            total_cells: 0,
            total_rows: 0,
            empty_rows: 0,
            merged_cells: 0,
            processed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub statistics: DocumentStatistics,
    /// Dominant date granularity over all date cells
    pub format: DateFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub source_hash: String,
    #[serde(default)]
    pub config_hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub schema_version: String,
    pub id: Uuid,
    pub file_name: String,
    pub document_type: DocumentType,
    /// Union of all block tags plus document-level tags
    pub global_tags: TagSet,
    pub blocks: Vec<Block>,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(file_name: &str, document_type: DocumentType) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            document_type,
            global_tags: TagSet::new(),
            blocks: Vec::new(),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Append a block, folding its tags into `global_tags`.
    pub fn push_block(&mut self, block: Block) {
        self.global_tags.extend(block.tags.iter().cloned());
        self.blocks.push(block);
    }

    pub fn add_document_tag(&mut self, tag: &str) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() {
            self.global_tags.insert(tag);
        }
    }
}

// ===== INPUTS =====

/// One sheet as produced by a spreadsheet adapter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SheetInput {
    pub name: String,
    pub grid: Vec<Vec<Scalar>>,
    /// Merged rectangles in raw grid coordinates
    #[serde(default)]
    pub merges: Vec<MergedRange>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkbookInput {
    pub file_name: String,
    pub sheets: Vec<SheetInput>,
}

/// Loosely shaped sheet data accepted by `TagAssigner::assign_tags`:
/// `sheet_data[0]` is the header row, every later element a data row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SheetData {
    #[serde(default)]
    pub sheet_data: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl SheetData {
    /// Tags written by the last `assign_tags` call, if any.
    pub fn assigned_tags(&self) -> Vec<String> {
        self.metadata
            .get("tagging")
            .and_then(|t| t.get("tags"))
            .and_then(|t| t.as_array())
            .map(|tags| {
                tags.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}
