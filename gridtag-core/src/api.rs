//! Flattening of arbitrary nested JSON payloads into blocks.
//!
//! Arrays of records become table blocks and go through the regular tag
//! pipeline. Other leaves become value blocks tagged from their key path
//! and content.

use crate::classifier::CellClassifier;
use crate::config::ApiConfig;
use crate::error::{EngineError, EngineResult};
use crate::processor::build_table_block;
use crate::rows::column_keys;
use crate::rules::auto_tagger::text_tags;
use crate::rules::business::json_to_scalar;
use crate::rules::{TagContext, TagEngine, TagSink};
use crate::types::*;
use serde_json::{Map, Value};
use tracing::debug;

pub struct ApiFlattener<'a> {
    config: &'a ApiConfig,
    classifier: &'a CellClassifier,
    tag_engine: &'a TagEngine,
}

impl<'a> ApiFlattener<'a> {
    pub fn new(config: &'a ApiConfig, classifier: &'a CellClassifier, tag_engine: &'a TagEngine) -> Self {
        Self {
            config,
            classifier,
            tag_engine,
        }
    }

    pub fn flatten(&self, payload: &Value, source: &str) -> EngineResult<Vec<Block>> {
        match payload {
            Value::Null => Err(EngineError::MissingInput("payload")),
            Value::Array(items) => {
                self.check_depth(payload, 1)?;
                Ok(vec![self.array_block("data", items, source)])
            }
            Value::Object(map) => {
                self.check_depth(payload, 1)?;
                let mut leaves = Vec::new();
                flatten_object(map, "", &mut leaves);
                debug!("Flattened API payload into {} leaves", leaves.len());
                Ok(leaves
                    .into_iter()
                    .map(|(path, value)| match value {
                        Value::Array(items) => self.array_block(&path, items, source),
                        other => self.value_block(&path, other, source),
                    })
                    .collect())
            }
            _ => Err(EngineError::invalid_payload(
                "top-level value must be an object or an array",
            )),
        }
    }

    fn check_depth(&self, value: &Value, depth: usize) -> EngineResult<()> {
        if depth > self.config.max_depth {
            return Err(EngineError::invalid_payload(format!(
                "nesting depth exceeds {}",
                self.config.max_depth
            )));
        }
        match value {
            Value::Array(items) => items.iter().try_for_each(|v| self.check_depth(v, depth + 1)),
            Value::Object(map) => map.values().try_for_each(|v| self.check_depth(v, depth + 1)),
            _ => Ok(()),
        }
    }

    fn array_block(&self, path: &str, items: &[Value], source: &str) -> Block {
        let all_records = items.iter().all(Value::is_object);
        let all_scalars = items.iter().all(|v| !v.is_object() && !v.is_array());

        if !items.is_empty() && !all_records && !all_scalars {
            let mut block = Block::new(
                BlockType::Structured,
                source,
                BlockContent::Structured {
                    title: path.to_string(),
                    data: Value::Array(items.to_vec()),
                },
            );
            let mut sink = TagSink::new();
            path_tags(path, &mut sink);
            items.iter().for_each(|v| value_tags(v, path, &mut sink));
            block.tags = sink.into_tags();
            return block;
        }

        let header_names: Vec<String> = match items.first() {
            Some(Value::Object(first)) => first.keys().cloned().collect(),
            Some(_) => vec![last_segment(path).to_string()],
            None => Vec::new(),
        };
        let headers: Vec<HeaderNode> = header_names
            .iter()
            .enumerate()
            .map(|(column, name)| HeaderNode {
                value: name.clone(),
                level: 1,
                column,
                row_span: 1,
                col_span: 1,
                parent: None,
                is_merged: false,
            })
            .collect();
        let keys = column_keys(&headers);

        let rows: Vec<Row> = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let cells: Vec<RowCell> = header_names
                    .iter()
                    .zip(&keys)
                    .map(|(name, key)| {
                        let raw = match item {
                            Value::Object(record) => record.get(name).unwrap_or(&Value::Null),
                            scalar => scalar,
                        };
                        let mut cell = self.classifier.cell(json_to_scalar(raw));
                        cell.metadata.header_level = Some(1);
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
            .collect();

        let outcome = self.tag_engine.run(&TagContext::new(None, &headers, &rows));
        let mut block = build_table_block(source, Some(path.to_string()), headers, rows, outcome);

        let mut sink = TagSink::new();
        path_tags(path, &mut sink);
        items.iter().for_each(|v| value_tags(v, path, &mut sink));
        block.tags.extend(sink.into_tags());
        block
    }

    fn value_block(&self, path: &str, value: &Value, source: &str) -> Block {
        let cell = self.classifier.cell(json_to_scalar(value));
        let mut block = Block::new(
            BlockType::Value,
            source,
            BlockContent::Value {
                title: path.to_string(),
                cell,
            },
        );
        let mut sink = TagSink::new();
        path_tags(path, &mut sink);
        value_tags(value, path, &mut sink);
        block.tags = sink.into_tags();
        block.metadata.row_count = 1;
        block.metadata.column_count = 1;
        block.metadata.total_cells = 1;
        block
    }
}

/// Dot-joined leaf paths. Nested objects are walked; arrays and scalars are leaves.
fn flatten_object<'v>(map: &'v Map<String, Value>, prefix: &str, out: &mut Vec<(String, &'v Value)>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_object(inner, &path, out),
            other => out.push((path, other)),
        }
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

/// The key itself, and the full `parent.key` path for nested keys.
fn path_tags(path: &str, tags: &mut TagSink) {
    tags.add(last_segment(path));
    if path.contains('.') {
        tags.add(path);
    }
}

fn value_tags(value: &Value, path: &str, tags: &mut TagSink) {
    match value {
        Value::String(s) => text_tags(s, tags),
        Value::Number(n) => {
            if let Some(year) = n.as_f64().filter(|v| v.fract() == 0.0 && (1900.0..=2100.0).contains(v)) {
                tags.add(&format_number(year));
            }
        }
        Value::Array(items) => items.iter().for_each(|v| value_tags(v, path, tags)),
        Value::Object(map) => {
            for (key, inner) in map {
                tags.add(key);
                tags.add(&format!("{}.{key}", last_segment(path)));
                value_tags(inner, path, tags);
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}
