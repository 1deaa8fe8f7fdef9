use crate::config::HeaderConfig;
use crate::ingest::{sanitize_header_text, CellOrigin, SanitizedGrid, SanitizedRow};
use crate::types::{HeaderNode, MergedRange, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Lookup from raw-grid position to the merged range covering it.
///
/// Ranges are clipped to the grid bounds when indexed. Where ranges
/// overlap, the first one listed owns the shared positions.
#[derive(Debug, Clone, Default)]
pub struct MergeIndex {
    ranges: Vec<MergedRange>,
    cells: HashMap<(usize, usize), usize>,
}

impl MergeIndex {
    pub fn new(ranges: &[MergedRange], rows: usize, cols: usize) -> Self {
        let mut index = Self::default();
        if rows == 0 || cols == 0 {
            return index;
        }
        for range in ranges {
            if range.start_row >= rows || range.start_col >= cols {
                continue;
            }
            let clipped = MergedRange::new(
                range.start_row,
                range.start_col,
                range.end_row.min(rows - 1),
                range.end_col.min(cols - 1),
            );
            if clipped.row_span() == 1 && clipped.col_span() == 1 {
                continue;
            }
            let id = index.ranges.len();
            index.ranges.push(clipped);
            for row in clipped.start_row..=clipped.end_row {
                for col in clipped.start_col..=clipped.end_col {
                    index.cells.entry((row, col)).or_insert(id);
                }
            }
        }
        index
    }

    pub fn range_at(&self, row: usize, col: usize) -> Option<&MergedRange> {
        self.cells.get(&(row, col)).map(|&id| &self.ranges[id])
    }

    /// Position holding the value for `(row, col)`: the top-left of its range.
    pub fn canonical(&self, row: usize, col: usize) -> (usize, usize) {
        self.range_at(row, col)
            .map(|r| (r.start_row, r.start_col))
            .unwrap_or((row, col))
    }

    pub fn ranges(&self) -> &[MergedRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Value at a raw position after merge resolution.
    pub fn resolve<'g>(&self, grid: &'g SanitizedGrid, row: usize, col: usize) -> &'g Scalar {
        let (r, c) = self.canonical(row, col);
        grid.value_at(r, c)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HeaderStructure {
    /// Leading sanitized rows that form the header region
    pub header_row_count: usize,
    pub headers: Vec<HeaderNode>,
    pub has_multi_level_headers: bool,
}

impl HeaderStructure {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

pub struct HeaderAnalyzer<'a> {
    config: &'a HeaderConfig,
}

impl<'a> HeaderAnalyzer<'a> {
    pub fn new(config: &'a HeaderConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, grid: &SanitizedGrid, merges: &MergeIndex) -> HeaderStructure {
        let header_row_count = self.detect_header_rows(grid);
        if header_row_count == 0 {
            debug!("No header rows detected");
            return HeaderStructure::default();
        }

        let headers = build_header_tree(&grid.rows[..header_row_count], grid, merges);
        let has_multi_level_headers = headers.iter().any(|h| h.level > 1);
        debug!(
            "Detected {} header rows with {} headers",
            header_row_count,
            headers.len()
        );

        HeaderStructure {
            header_row_count,
            headers,
            has_multi_level_headers,
        }
    }

    /// Count of contiguous qualifying rows from the top, capped.
    pub fn detect_header_rows(&self, grid: &SanitizedGrid) -> usize {
        grid.rows
            .iter()
            .take(self.config.max_header_rows)
            .take_while(|row| is_header_row(row))
            .count()
    }
}

/// Non-empty, fewer than half of its values numeric, and no formulas.
/// Native numbers and dates (serial numbers included) count as numeric;
/// numbers parsed out of text labels do not.
pub fn is_header_row(row: &SanitizedRow) -> bool {
    let mut non_empty = 0;
    let mut numeric = 0;
    for (col, value) in row.cells.iter().enumerate() {
        if value.is_blank() {
            continue;
        }
        non_empty += 1;
        match row.origin(col) {
            CellOrigin::Formula => return false,
            CellOrigin::Value if matches!(value, Scalar::Number(_) | Scalar::Date(_)) => {
                numeric += 1
            }
            _ => {}
        }
    }
    non_empty > 0 && numeric * 2 < non_empty
}

fn build_header_tree(
    header_rows: &[SanitizedRow],
    grid: &SanitizedGrid,
    merges: &MergeIndex,
) -> Vec<HeaderNode> {
    let width = header_rows.iter().map(|r| r.cells.len()).max().unwrap_or(0);
    let mut processed: HashSet<(usize, usize)> = HashSet::new();
    let mut headers = Vec::new();

    for (depth, row) in header_rows.iter().enumerate() {
        let source_row = row.source_row;
        for col in 0..width {
            if processed.contains(&(source_row, col)) {
                continue;
            }

            let range = merges.range_at(source_row, col);
            match range {
                Some(r) => {
                    for rr in r.start_row..=r.end_row {
                        for cc in r.start_col..=r.end_col {
                            processed.insert((rr, cc));
                        }
                    }
                }
                None => {
                    processed.insert((source_row, col));
                }
            }

            let text = sanitize_header_text(&merges.resolve(grid, source_row, col).to_string());
            if text.is_empty() {
                continue;
            }

            headers.push(HeaderNode {
                value: text,
                level: depth as u32 + 1,
                column: col,
                row_span: range.map_or(1, MergedRange::row_span),
                col_span: range.map_or(1, MergedRange::col_span),
                parent: find_parent(&header_rows[..depth], grid, merges, col),
                is_merged: range.is_some(),
            });
        }
    }

    headers
}

/// Nearest non-empty header text above `col`, walking upward.
fn find_parent(
    rows_above: &[SanitizedRow],
    grid: &SanitizedGrid,
    merges: &MergeIndex,
    col: usize,
) -> Option<String> {
    rows_above.iter().rev().find_map(|row| {
        let text = sanitize_header_text(&merges.resolve(grid, row.source_row, col).to_string());
        (!text.is_empty()).then_some(text)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::ingest::GridIngestor;

    fn sanitize(grid: Vec<Vec<Scalar>>) -> SanitizedGrid {
        let config = IngestConfig::default();
        GridIngestor::new(&config).sanitize_grid(&grid)
    }

    fn t(s: &str) -> Scalar {
        Scalar::text(s)
    }

    #[test]
    fn year_labels_from_text_still_make_a_header_row() {
        let grid = sanitize(vec![
            vec![t("Company"), t("2022"), t("2023")],
            vec![t("Revenue"), Scalar::Number(1_000_000.0), Scalar::Number(1_200_000.0)],
        ]);
        let config = HeaderConfig::default();
        let structure = HeaderAnalyzer::new(&config).analyze(&grid, &MergeIndex::default());
        assert_eq!(structure.header_row_count, 1);
        let values: Vec<_> = structure.headers.iter().map(|h| h.value.as_str()).collect();
        assert_eq!(values, ["Company", "2022", "2023"]);
        assert!(!structure.has_multi_level_headers);
        assert!(structure.headers.iter().all(|h| h.parent.is_none()));
    }

    #[test]
    fn serial_range_amounts_do_not_extend_the_header() {
        let grid = sanitize(vec![
            vec![t("Company"), t("2022"), t("2023")],
            vec![t("Profit"), Scalar::Number(30_000.0), Scalar::Number(35_000.0)],
            vec![t("Revenue"), Scalar::Number(1e6), Scalar::Number(1.2e6)],
        ]);
        assert!(matches!(grid.rows[1].cells[1], Scalar::Date(_)));

        let config = HeaderConfig::default();
        let structure = HeaderAnalyzer::new(&config).analyze(&grid, &MergeIndex::default());
        assert_eq!(structure.header_row_count, 1);
        let values: Vec<_> = structure.headers.iter().map(|h| h.value.as_str()).collect();
        assert_eq!(values, ["Company", "2022", "2023"]);
        assert!(!structure.has_multi_level_headers);
    }

    #[test]
    fn header_detection_is_capped_and_contiguous() {
        let rows: Vec<Vec<Scalar>> = (0..8).map(|i| vec![t(&format!("h{i}")), t("x")]).collect();
        let grid = sanitize(rows);
        let config = HeaderConfig { max_header_rows: 5 };
        assert_eq!(HeaderAnalyzer::new(&config).detect_header_rows(&grid), 5);

        let grid = sanitize(vec![
            vec![t("Name"), t("Total")],
            vec![t("a"), Scalar::Number(1.0)],
            vec![t("Notes"), t("More")],
        ]);
        assert_eq!(HeaderAnalyzer::new(&config).detect_header_rows(&grid), 1);
    }

    #[test]
    fn formula_row_is_not_a_header() {
        let grid = sanitize(vec![vec![t("Total"), t("=SUM(A1:A2)")]]);
        let config = HeaderConfig::default();
        assert_eq!(HeaderAnalyzer::new(&config).detect_header_rows(&grid), 0);
        let structure = HeaderAnalyzer::new(&config).analyze(&grid, &MergeIndex::default());
        assert!(structure.is_empty());
    }

    #[test]
    fn merged_group_header_yields_one_node_and_parents() {
        // | Region (2 rows) | Sales (2 cols)  |
        // |                 | 2022   | 2023   |
        let grid = sanitize(vec![
            vec![t("Region"), t("Sales"), Scalar::Empty],
            vec![Scalar::Empty, t("2022"), t("2023")],
            vec![t("North"), Scalar::Number(10.0), Scalar::Number(12.0)],
        ]);
        let merges = MergeIndex::new(
            &[MergedRange::new(0, 1, 0, 2), MergedRange::new(0, 0, 1, 0)],
            grid.source_rows,
            grid.source_cols,
        );
        let config = HeaderConfig::default();
        let structure = HeaderAnalyzer::new(&config).analyze(&grid, &merges);

        assert_eq!(structure.header_row_count, 2);
        assert!(structure.has_multi_level_headers);
        let sales: Vec<_> = structure.headers.iter().filter(|h| h.value == "Sales").collect();
        assert_eq!(sales.len(), 1);
        assert_eq!((sales[0].col_span, sales[0].row_span), (2, 1));

        let region = &structure.headers[0];
        assert_eq!(region.value, "Region");
        assert_eq!(region.row_span, 2);
        assert!(region.is_merged);

        let y2023 = structure.headers.iter().find(|h| h.value == "2023").unwrap();
        assert_eq!(y2023.level, 2);
        assert_eq!(y2023.parent.as_deref(), Some("Sales"));
        assert_eq!(structure.headers.len(), 4);
    }

    #[test]
    fn merge_index_clips_and_resolves() {
        let index = MergeIndex::new(&[MergedRange::new(0, 0, 10, 1)], 3, 2);
        assert_eq!(index.range_at(2, 1).unwrap().end_row, 2);
        assert_eq!(index.canonical(2, 1), (0, 0));
        assert_eq!(index.canonical(5, 5), (5, 5));
        assert!(MergeIndex::new(&[MergedRange::new(4, 4, 5, 5)], 3, 2).is_empty());
    }
}
