use crate::classifier::CellClassifier;
use crate::headers::{HeaderStructure, MergeIndex};
use crate::ingest::SanitizedGrid;
use crate::types::{HeaderNode, MergeInfo, Row, RowCell};
use std::collections::HashSet;

/// Combines the header tree with the data region into typed rows.
pub struct RowMaterializer<'a> {
    classifier: &'a CellClassifier,
}

impl<'a> RowMaterializer<'a> {
    pub fn new(classifier: &'a CellClassifier) -> Self {
        Self { classifier }
    }

    pub fn materialize(
        &self,
        grid: &SanitizedGrid,
        structure: &HeaderStructure,
        merges: &MergeIndex,
    ) -> Vec<Row> {
        if structure.is_empty() {
            return Vec::new();
        }
        let keys = column_keys(&structure.headers);

        grid.rows
            .iter()
            .skip(structure.header_row_count)
            .enumerate()
            .map(|(i, row)| {
                let cells: Vec<RowCell> = structure
                    .headers
                    .iter()
                    .zip(&keys)
                    .map(|(header, key)| {
                        let (r, c) = merges.canonical(row.source_row, header.column);
                        let mut cell = self
                            .classifier
                            .sanitized_cell(grid.value_at(r, c).clone(), grid.origin_at(r, c));
                        cell.metadata.header_level = Some(header.level);
                        cell.metadata.parent_header = header.parent.clone();
                        cell.metadata.merge_info =
                            merges.range_at(row.source_row, header.column).map(|range| MergeInfo {
                                is_merged: true,
                                is_start: range.is_start(row.source_row, header.column),
                            });
                        RowCell {
                            header: key.clone(),
                            cell,
                        }
                    })
                    .collect();
                let is_empty = cells.iter().all(|c| c.cell.is_empty());
                Row {
                    row_number: i + 1,
                    cells,
                    is_empty,
                }
            })
            .collect()
    }
}

/// Column keys for a header list. Normally the header text; repeated
/// labels are qualified by their parent, then by column index.
pub fn column_keys(headers: &[HeaderNode]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    headers
        .iter()
        .map(|header| {
            let mut key = header.value.clone();
            if seen.contains(&key) {
                if let Some(parent) = &header.parent {
                    key = format!("{parent}.{}", header.value);
                }
            }
            if seen.contains(&key) {
                key = format!("{key}#{}", header.column);
            }
            seen.insert(key.clone());
            key
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HeaderConfig, IngestConfig};
    use crate::headers::HeaderAnalyzer;
    use crate::ingest::GridIngestor;
    use crate::types::{CellType, MergedRange, Scalar};

    fn t(s: &str) -> Scalar {
        Scalar::text(s)
    }

    fn run(grid: Vec<Vec<Scalar>>, merges: &[MergedRange]) -> Vec<Row> {
        let ingest = IngestConfig::default();
        let sanitized = GridIngestor::new(&ingest).sanitize_grid(&grid);
        let index = MergeIndex::new(merges, sanitized.source_rows, sanitized.source_cols);
        let headers = HeaderConfig::default();
        let structure = HeaderAnalyzer::new(&headers).analyze(&sanitized, &index);
        let classifier = CellClassifier::new(&ingest);
        RowMaterializer::new(&classifier).materialize(&sanitized, &structure, &index)
    }

    #[test]
    fn rows_are_numbered_and_typed_per_header() {
        let rows = run(
            vec![
                vec![t("Company"), t("2022"), t("2023")],
                vec![t("Revenue"), Scalar::Number(1_000_000.0), Scalar::Number(1_200_000.0)],
                vec![t("Margin"), t("30%"), t("29.2%")],
            ],
            &[],
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].row_number, 2);
        assert_eq!(rows[1].get("2022").unwrap().cell_type, CellType::Percentage);
        assert_eq!(rows[0].get("2023").unwrap().value, Scalar::Number(1_200_000.0));
        assert_eq!(rows[0].label(), Some(&t("Revenue")));
        assert_eq!(rows[0].get("Company").unwrap().metadata.header_level, Some(1));
    }

    #[test]
    fn merged_data_cells_share_the_top_left_value() {
        let rows = run(
            vec![
                vec![t("Segment"), t("Amount"), t("Qty")],
                vec![t("Retail"), Scalar::Number(10.0), Scalar::Number(3.0)],
                vec![Scalar::Empty, Scalar::Number(5.0), Scalar::Number(1.0)],
            ],
            &[MergedRange::new(1, 0, 2, 0)],
        );
        let first = rows[0].get("Segment").unwrap();
        let second = rows[1].get("Segment").unwrap();
        assert_eq!(second.value, t("Retail"));
        assert_eq!(
            first.metadata.merge_info,
            Some(MergeInfo { is_merged: true, is_start: true })
        );
        assert_eq!(
            second.metadata.merge_info,
            Some(MergeInfo { is_merged: true, is_start: false })
        );
    }

    #[test]
    fn row_outside_header_columns_is_empty() {
        let rows = run(
            vec![
                vec![t("Name"), t("Value")],
                vec![Scalar::Empty, Scalar::Empty, Scalar::Number(5.0), Scalar::Number(6.0)],
            ],
            &[],
        );
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_empty);
    }

    #[test]
    fn duplicate_labels_get_qualified_keys() {
        let header = |value: &str, column, parent: Option<&str>| HeaderNode {
            value: value.to_string(),
            level: if parent.is_some() { 2 } else { 1 },
            column,
            row_span: 1,
            col_span: 1,
            parent: parent.map(str::to_string),
            is_merged: false,
        };
        let keys = column_keys(&[
            header("Plan", 1, Some("2022")),
            header("Plan", 2, Some("2023")),
            header("Plan", 3, Some("2023")),
        ]);
        assert_eq!(keys, ["Plan", "2023.Plan", "2023.Plan#3"]);
    }
}
