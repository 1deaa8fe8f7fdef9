use crate::classifier::CellClassifier;
use crate::config::{BusinessRuleConfig, RuleCondition, TaggingConfig};
use crate::error::{EngineError, EngineResult};
use crate::rows::column_keys;
use crate::types::*;
use chrono::Utc;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::auto_tagger::AutoTagger;
use super::engine::{TagContext, TagRule, TagSink};
use super::statistics::summarize;

/// A business rule with its label pattern compiled.
#[derive(Debug, Clone)]
pub struct BusinessRule {
    pub name: String,
    pub tag: String,
    label: Option<Regex>,
    condition: RuleCondition,
}

impl BusinessRule {
    pub fn compile(config: &BusinessRuleConfig) -> EngineResult<Self> {
        let label = config
            .label_pattern
            .as_deref()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        EngineError::config(format!("business rule '{}': {e}", config.name))
                    })
            })
            .transpose()?;
        Ok(Self {
            name: config.name.clone(),
            tag: config.tag.clone(),
            label,
            condition: config.condition,
        })
    }

    /// `value` is `None` for a blank cell.
    pub fn matches(&self, label: &str, value: Option<f64>) -> bool {
        if let Some(re) = &self.label {
            if !re.is_match(label) {
                return false;
            }
        }
        match (self.condition, value) {
            (RuleCondition::GreaterThan(limit), Some(v)) => v > limit,
            (RuleCondition::LessThan(limit), Some(v)) => v < limit,
            (RuleCondition::Blank, None) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Category {
    name: String,
    keywords: Vec<String>,
}

/// Business tagging layer. Wraps an `AutoTagger` and adds the root tag,
/// threshold rules and keyword categories.
pub struct TagAssigner {
    auto_tagger: AutoTagger,
    classifier: CellClassifier,
    rules: Vec<BusinessRule>,
    categories: Vec<Category>,
}

impl TagAssigner {
    pub fn new(config: &TaggingConfig, classifier: CellClassifier) -> EngineResult<Self> {
        let rules = config
            .business_rules
            .iter()
            .map(BusinessRule::compile)
            .collect::<EngineResult<Vec<_>>>()?;
        let categories = config
            .categories
            .iter()
            .map(|c| Category {
                name: c.name.clone(),
                keywords: c.keywords.iter().map(|k| k.to_lowercase()).collect(),
            })
            .collect();

        Ok(Self {
            auto_tagger: AutoTagger::new(config),
            classifier,
            rules,
            categories,
        })
    }

    pub fn auto_tagger(&self) -> &AutoTagger {
        &self.auto_tagger
    }

    /// Base tags plus business tags for one table.
    pub fn tag(&self, ctx: &TagContext<'_>) -> TagSet {
        let mut sink = TagSink::new();
        self.auto_tagger.apply(ctx, &mut sink);
        self.apply(ctx, &mut sink);
        sink.into_tags()
    }

    /// Tags raw sheet data whose first row is the header row.
    ///
    /// Input without a usable grid is logged and returned untouched.
    pub fn assign_tags(&self, mut data: SheetData) -> SheetData {
        let Some(grid) = data.sheet_data.as_ref() else {
            warn!("Tag assignment skipped: no sheet data");
            return data;
        };
        let Some(Value::Array(header_row)) = grid.first() else {
            warn!("Tag assignment skipped: first row of sheet data is not a row");
            return data;
        };

        let headers: Vec<HeaderNode> = header_row
            .iter()
            .enumerate()
            .filter_map(|(column, value)| {
                let text = json_to_scalar(value).to_string().trim().to_string();
                (!text.is_empty()).then(|| HeaderNode {
                    value: text,
                    level: 1,
                    column,
                    row_span: 1,
                    col_span: 1,
                    parent: None,
                    is_merged: false,
                })
            })
            .collect();
        let keys = column_keys(&headers);

        let rows: Vec<Row> = grid[1..]
            .iter()
            .filter_map(Value::as_array)
            .enumerate()
            .map(|(i, raw)| {
                let cells: Vec<RowCell> = headers
                    .iter()
                    .zip(&keys)
                    .map(|(header, key)| RowCell {
                        header: key.clone(),
                        cell: self
                            .classifier
                            .cell(raw.get(header.column).map(json_to_scalar).unwrap_or_default()),
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

        let ctx = TagContext::new(None, &headers, &rows);
        let tags = self.tag(&ctx);
        let statistics = summarize(&rows);
        debug!("Assigned {} tags to sheet data", tags.len());

        data.metadata.insert(
            "tagging".to_string(),
            json!({
                "tags": tags,
                "statistics": statistics,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        );
        data
    }

    fn root_tag(&self, ctx: &TagContext<'_>, tags: &mut TagSink) {
        let top_left = ctx
            .headers
            .iter()
            .filter(|h| h.level == 1)
            .min_by_key(|h| h.column);
        if let Some(header) = top_left {
            let root = header
                .value
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("_");
            tags.add(&root);
        }
    }

    fn business_rules(&self, ctx: &TagContext<'_>, tags: &mut TagSink) {
        for row in ctx.rows {
            let label = row.label().map(Scalar::to_string).unwrap_or_default();
            for cell in row.values() {
                let value = match cell.cell_type {
                    CellType::Empty => None,
                    t if t.is_numeric() => cell.metadata.numeric_value.or(cell.value.as_number()),
                    _ => continue,
                };
                for rule in &self.rules {
                    if rule.matches(&label, value) {
                        tags.add(&rule.tag);
                    }
                }
            }
        }
    }

    fn categories(&self, ctx: &TagContext<'_>, tags: &mut TagSink) {
        for row in ctx.rows {
            let label = row.label().map(Scalar::to_string).unwrap_or_default().to_lowercase();
            if label.is_empty() {
                continue;
            }
            for category in &self.categories {
                if category.keywords.iter().any(|k| label.contains(k.as_str())) {
                    tags.add(&category.name);
                }
            }
        }
    }
}

impl TagRule for TagAssigner {
    fn apply(&self, ctx: &TagContext<'_>, tags: &mut TagSink) {
        self.root_tag(ctx, tags);
        self.business_rules(ctx, tags);
        self.categories(ctx, tags);
    }

    fn name(&self) -> &str {
        "TagAssigner"
    }
}

pub fn json_to_scalar(value: &Value) -> Scalar {
    match value {
        Value::Null => Scalar::Empty,
        Value::Bool(b) => Scalar::Text(b.to_string()),
        Value::Number(n) => n.as_f64().map(Scalar::Number).unwrap_or_default(),
        Value::String(s) => Scalar::Text(s.clone()),
        other => Scalar::Text(other.to_string()),
    }
}
