use crate::types::{CellType, Row, TagStatistics};
use std::collections::HashMap;

// Tie-break order for the column majority vote
const TYPE_PRIORITY: [CellType; 6] = [
    CellType::Number,
    CellType::Currency,
    CellType::Percentage,
    CellType::Date,
    CellType::Formula,
    CellType::Text,
];

/// Majority type of every column over its non-empty cells, in column order.
/// `None` for columns with no non-empty cell.
pub fn column_types(rows: &[Row]) -> Vec<(String, Option<CellType>)> {
    let Some(first) = rows.first() else {
        return Vec::new();
    };

    first
        .cells
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let mut counts: HashMap<CellType, usize> = HashMap::new();
            for row in rows {
                if let Some(rc) = row.cells.get(i) {
                    if !rc.cell.is_empty() {
                        *counts.entry(rc.cell.cell_type).or_default() += 1;
                    }
                }
            }
            let majority = TYPE_PRIORITY
                .iter()
                .filter_map(|t| counts.get(t).map(|&n| (*t, n)))
                .fold(None, |best: Option<(CellType, usize)>, (t, n)| match best {
                    Some((_, m)) if m >= n => best,
                    _ => Some((t, n)),
                })
                .map(|(t, _)| t);
            (column.header.clone(), majority)
        })
        .collect()
}

pub fn summarize(rows: &[Row]) -> TagStatistics {
    let empty_values = rows
        .iter()
        .flat_map(|r| &r.cells)
        .filter(|c| c.cell.is_empty())
        .count();

    let mut numerical_columns = Vec::new();
    let mut categorical_columns = Vec::new();
    for (name, majority) in column_types(rows) {
        if majority.is_some_and(|t| t.is_numeric()) {
            numerical_columns.push(name);
        } else {
            categorical_columns.push(name);
        }
    }

    TagStatistics {
        total_rows: rows.len(),
        empty_values,
        numerical_columns,
        categorical_columns,
    }
}
