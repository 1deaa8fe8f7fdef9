//! Grid sanitization: the first pipeline stage.
//!
//! Turns a raw adapter grid into a `SanitizedGrid`. Cell values are
//! normalized, blank rows are dropped, and every surviving row remembers
//! its raw-grid index so merged ranges keep working after filtering.

use crate::config::IngestConfig;
use crate::types::Scalar;
use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

/// Serial number of 1970-01-01 in spreadsheet date encoding.
const UNIX_EPOCH_SERIAL: f64 = 25569.0;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(?:#\d+|#x[0-9a-fA-F]+|[a-zA-Z][a-zA-Z0-9]*);").unwrap());
static NUMERIC_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").unwrap());

static EMPTY: Scalar = Scalar::Empty;

/// How a sanitized value came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellOrigin {
    /// Taken as delivered (after cleaning)
    #[default]
    Value,
    /// A number parsed out of a text cell
    NumericText,
    /// Text that carried a leading formula marker
    Formula,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanitizedRow {
    /// Index of this row in the raw grid
    pub source_row: usize,
    pub cells: Vec<Scalar>,
    pub origins: Vec<CellOrigin>,
}

impl SanitizedRow {
    pub fn get(&self, col: usize) -> &Scalar {
        self.cells.get(col).unwrap_or(&EMPTY)
    }

    pub fn origin(&self, col: usize) -> CellOrigin {
        self.origins.get(col).copied().unwrap_or_default()
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(Scalar::is_blank)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SanitizedGrid {
    pub rows: Vec<SanitizedRow>,
    /// Raw grid height before filtering
    pub source_rows: usize,
    /// Widest raw row
    pub source_cols: usize,
}

impl SanitizedGrid {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Widest surviving row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(|r| r.cells.len()).max().unwrap_or(0)
    }

    pub fn row_by_source(&self, source_row: usize) -> Option<&SanitizedRow> {
        self.rows
            .binary_search_by_key(&source_row, |r| r.source_row)
            .ok()
            .map(|i| &self.rows[i])
    }

    /// Value at raw-grid coordinates; rows that were filtered out read as empty.
    pub fn value_at(&self, source_row: usize, col: usize) -> &Scalar {
        self.row_by_source(source_row)
            .map(|r| r.get(col))
            .unwrap_or(&EMPTY)
    }

    pub fn origin_at(&self, source_row: usize, col: usize) -> CellOrigin {
        self.row_by_source(source_row)
            .map(|r| r.origin(col))
            .unwrap_or_default()
    }

    pub fn without_blank_rows(mut self) -> Self {
        self.rows.retain(|r| !r.is_blank());
        self
    }
}

/// Applies the per-cell normalization rules to raw values.
pub struct GridIngestor<'a> {
    config: &'a IngestConfig,
}

impl<'a> GridIngestor<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        Self { config }
    }

    /// Sanitize one value. Never fails, and `sanitize(sanitize(x)) == sanitize(x)`.
    pub fn sanitize(&self, value: &Scalar) -> Scalar {
        self.sanitize_with_origin(value).0
    }

    pub fn sanitize_with_origin(&self, value: &Scalar) -> (Scalar, CellOrigin) {
        match value {
            Scalar::Empty => (Scalar::Empty, CellOrigin::Value),
            Scalar::Date(d) => (Scalar::Date(*d), CellOrigin::Value),
            Scalar::Number(n) => (self.sanitize_number(*n), CellOrigin::Value),
            Scalar::Text(s) => self.sanitize_text(s),
        }
    }

    /// Sanitize every cell and drop rows that end up blank.
    pub fn sanitize_grid(&self, grid: &[Vec<Scalar>]) -> SanitizedGrid {
        let all = self.sanitize_rows(grid);
        let before = all.rows.len();
        let filtered = all.without_blank_rows();
        debug!(
            "Sanitized {}x{} grid, dropped {} blank rows",
            filtered.source_rows,
            filtered.source_cols,
            before - filtered.rows.len()
        );
        filtered
    }

    /// Sanitize every cell, keeping blank rows in place.
    pub fn sanitize_rows(&self, grid: &[Vec<Scalar>]) -> SanitizedGrid {
        let rows = grid
            .iter()
            .enumerate()
            .map(|(source_row, raw)| {
                let (cells, origins) = raw.iter().map(|v| self.sanitize_with_origin(v)).unzip();
                SanitizedRow {
                    source_row,
                    cells,
                    origins,
                }
            })
            .collect();

        SanitizedGrid {
            rows,
            source_rows: grid.len(),
            source_cols: grid.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    fn sanitize_number(&self, n: f64) -> Scalar {
        if !n.is_finite() {
            return Scalar::Empty;
        }
        if self.config.is_serial_date(n) {
            if let Some(date) = serial_to_date(n) {
                return Scalar::Date(date);
            }
        }
        Scalar::Number(round_to(n, self.config.decimal_places))
    }

    fn sanitize_text(&self, raw: &str) -> (Scalar, CellOrigin) {
        // A single leading formula marker is dropped; the rest is kept as text.
        let trimmed = raw.trim();
        let (body, had_formula) = match trimmed.strip_prefix('=') {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };
        let cleaned = clean_text(body, self.config.max_text_length);
        let origin = if had_formula {
            CellOrigin::Formula
        } else {
            CellOrigin::Value
        };

        if cleaned.is_empty() {
            return (Scalar::Empty, origin);
        }
        if NUMERIC_TEXT_RE.is_match(&cleaned) {
            if let Ok(n) = cleaned.parse::<f64>() {
                let origin = if had_formula {
                    CellOrigin::Formula
                } else {
                    CellOrigin::NumericText
                };
                // Text amounts are only rounded; serial-date conversion is
                // reserved for native numbers.
                if !n.is_finite() {
                    return (Scalar::Empty, origin);
                }
                return (Scalar::Number(round_to(n, self.config.decimal_places)), origin);
            }
        }
        (Scalar::Text(cleaned), origin)
    }
}

/// Days since 1970-01-01, counted from the spreadsheet serial.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    let days = (serial - UNIX_EPOCH_SERIAL).floor();
    if days < 0.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_days(Days::new(days as u64))
}

fn round_to(n: f64, places: u32) -> f64 {
    if n.fract() == 0.0 {
        return n;
    }
    let factor = 10f64.powi(places as i32);
    let scaled = (n * factor).round();
    if scaled.is_finite() {
        scaled / factor
    } else {
        n
    }
}

/// Repeats one cleaning pass until the text stops changing.
fn clean_text(raw: &str, max_len: usize) -> String {
    let mut current = raw.to_string();
    loop {
        let next = clean_pass(&current, max_len);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn clean_pass(s: &str, max_len: usize) -> String {
    let s = TAG_RE.replace_all(s.trim(), "");
    let s = ENTITY_RE.replace_all(&s, "");
    let s: String = s
        .chars()
        .filter_map(|c| match c {
            '\t' | '\n' | '\r' => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    s.trim().chars().take(max_len).collect()
}

/// Header text: markup and entities removed, whitespace runs collapsed.
pub fn sanitize_header_text(raw: &str) -> String {
    let s = TAG_RE.replace_all(raw, "");
    let s = ENTITY_RE.replace_all(&s, "");
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
