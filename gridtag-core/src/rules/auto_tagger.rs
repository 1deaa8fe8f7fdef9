use crate::config::{KeywordGroup, TaggingConfig};
use crate::types::{Cell, CellType, Scalar};
use regex::Regex;
use std::sync::LazyLock;

use super::engine::{TagContext, TagRule, TagSink};

static DATE_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-\d{2}-\d{2}$").unwrap());
static MONEY_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d{2})?$").unwrap());
static YEAR_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").unwrap());
static CAPITALIZED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-ZА-ЯЁ][a-zа-яё]{2,}").unwrap());

const METRIC_KEYWORDS: [&str; 5] = ["revenue", "profit", "margin", "growth", "sales"];

/// Generic tagging layer: header keywords and per-value mining.
pub struct AutoTagger {
    keyword_groups: Vec<KeywordGroup>,
    entity_forms: Vec<(Regex, String)>,
    large_amount_threshold: f64,
}

impl AutoTagger {
    pub fn new(config: &TaggingConfig) -> Self {
        let keyword_groups = config
            .keyword_groups
            .iter()
            .map(|group| KeywordGroup {
                stems: group.stems.iter().map(|s| s.to_lowercase()).collect(),
                tags: group.tags.clone(),
            })
            .collect();
        // Escaped literals always form a valid pattern.
        let entity_forms = config
            .entity_forms
            .iter()
            .filter(|form| !form.abbreviation.trim().is_empty())
            .filter_map(|form| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(form.abbreviation.trim()));
                Regex::new(&pattern).ok().map(|re| (re, form.tag.clone()))
            })
            .collect();

        Self {
            keyword_groups,
            entity_forms,
            large_amount_threshold: config.large_amount_threshold,
        }
    }

    /// Header text plus the synonym tags of every keyword group it mentions.
    pub fn tag_header(&self, header: &str, tags: &mut TagSink) {
        let lower = header.to_lowercase();
        tags.add(&lower);
        for group in &self.keyword_groups {
            if group.stems.iter().any(|stem| lower.contains(stem.as_str())) {
                tags.extend(group.tags.iter().map(String::as_str));
            }
        }
    }

    /// Tags mined from a single value: the value itself, its year when it is
    /// an ISO date, money markers and legal-entity forms.
    pub fn tag_value(&self, value: &Scalar, tags: &mut TagSink) {
        let text = value.to_string();
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        tags.add(text);

        if let Some(caps) = DATE_VALUE_RE.captures(text) {
            tags.add("date");
            tags.add(&caps[1]);
        }

        if MONEY_VALUE_RE.is_match(text) {
            tags.add("money");
            if text.parse::<f64>().is_ok_and(|n| n > self.large_amount_threshold) {
                tags.add("large_amount");
            }
        }

        for (re, tag) in &self.entity_forms {
            if re.is_match(text) {
                tags.add("organization");
                tags.add(tag);
            }
        }
    }
}

impl TagRule for AutoTagger {
    fn apply(&self, ctx: &TagContext<'_>, tags: &mut TagSink) {
        for header in ctx.headers {
            self.tag_header(&header.value, tags);
        }
        for cell in ctx.cells() {
            if !cell.is_empty() {
                self.tag_value(&cell.value, tags);
            }
        }
    }

    fn name(&self) -> &str {
        "AutoTagger"
    }
}

/// Free-text tokens and out-of-range numeric content.
pub struct TextContentAnalyzer {
    min_token_length: usize,
    large_value_threshold: f64,
}

impl TextContentAnalyzer {
    pub fn new(config: &TaggingConfig) -> Self {
        Self {
            min_token_length: config.min_token_length,
            large_value_threshold: config.large_value_threshold,
        }
    }

    pub fn tag_cell(&self, cell: &Cell, tags: &mut TagSink) {
        match cell.cell_type {
            CellType::Text => {
                if let Scalar::Text(s) = &cell.value {
                    s.split(|c: char| !c.is_alphanumeric())
                        .filter(|token| token.chars().count() >= self.min_token_length)
                        .for_each(|token| tags.add(token));
                }
            }
            t if t.is_numeric() => {
                if let Some(n) = cell.metadata.numeric_value {
                    tags.add("numeric");
                    if n > self.large_value_threshold {
                        tags.add("large_value");
                    }
                    if n < 0.0 {
                        tags.add("negative_value");
                    }
                }
            }
            _ => {}
        }
    }
}

impl TagRule for TextContentAnalyzer {
    fn apply(&self, ctx: &TagContext<'_>, tags: &mut TagSink) {
        for cell in ctx.cells() {
            self.tag_cell(cell, tags);
        }
    }

    fn name(&self) -> &str {
        "TextContent"
    }
}

/// Per-cell structure: header parents, the type of every typed cell, and
/// years, capitalized words and metric names found in text.
pub struct CellTypeTagger;

impl TagRule for CellTypeTagger {
    fn apply(&self, ctx: &TagContext<'_>, tags: &mut TagSink) {
        for header in ctx.headers {
            if let Some(parent) = &header.parent {
                tags.add(parent);
            }
        }
        for cell in ctx.cells() {
            match cell.cell_type {
                CellType::Empty => {}
                CellType::Text => {
                    if let Scalar::Text(s) = &cell.value {
                        text_tags(s, tags);
                    }
                }
                other => tags.add(other.as_str()),
            }
        }
    }

    fn name(&self) -> &str {
        "CellTypes"
    }
}

/// Years, capitalized words and metric names inside free text.
pub fn text_tags(text: &str, tags: &mut TagSink) {
    for year in YEAR_IN_TEXT_RE.find_iter(text) {
        tags.add(year.as_str());
    }
    for word in CAPITALIZED_RE.find_iter(text) {
        tags.add(word.as_str());
    }
    let lower = text.to_lowercase();
    for metric in METRIC_KEYWORDS {
        if lower.contains(metric) {
            tags.add(metric);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::CellClassifier;
    use crate::types::{HeaderNode, Row, RowCell};
    use chrono::NaiveDate;

    fn tags_of(f: impl FnOnce(&mut TagSink)) -> Vec<String> {
        let mut sink = TagSink::new();
        f(&mut sink);
        sink.into_tags().into_iter().collect()
    }

    #[test]
    fn header_keywords_add_synonyms() {
        let tagger = AutoTagger::new(&TaggingConfig::default());
        let tags = tags_of(|s| tagger.tag_header("Дата платежа", s));
        assert!(tags.contains(&"дата платежа".to_string()));
        assert!(tags.contains(&"date".to_string()));
        assert!(tags.contains(&"temporal".to_string()));

        let tags = tags_of(|s| tagger.tag_header("Client name", s));
        assert!(tags.contains(&"organization".to_string()));
    }

    #[test]
    fn values_yield_year_money_and_entity_tags() {
        let tagger = AutoTagger::new(&TaggingConfig::default());

        let date = Scalar::Date(NaiveDate::from_ymd_opt(2023, 5, 17).unwrap());
        let tags = tags_of(|s| tagger.tag_value(&date, s));
        assert!(tags.contains(&"2023".to_string()));
        assert!(tags.contains(&"date".to_string()));

        let tags = tags_of(|s| tagger.tag_value(&Scalar::Number(1500.0), s));
        assert!(tags.contains(&"money".to_string()));
        assert!(tags.contains(&"large_amount".to_string()));

        let tags = tags_of(|s| tagger.tag_value(&Scalar::text("ООО Ромашка"), s));
        assert!(tags.contains(&"organization".to_string()));
        assert!(tags.contains(&"company".to_string()));

        let tags = tags_of(|s| tagger.tag_value(&Scalar::text("ИП Иванов"), s));
        assert!(tags.contains(&"entrepreneur".to_string()));

        let tags = tags_of(|s| tagger.tag_value(&Scalar::text("Incoming"), s));
        assert!(!tags.contains(&"organization".to_string()));
    }

    #[test]
    fn text_content_tokens_and_numeric_markers() {
        let analyzer = TextContentAnalyzer::new(&TaggingConfig::default());
        let classifier = CellClassifier::default();

        let tags = tags_of(|s| analyzer.tag_cell(&classifier.cell(Scalar::text("Net cash, of ops")), s));
        assert_eq!(tags, ["cash", "net", "ops"]);

        let tags = tags_of(|s| analyzer.tag_cell(&classifier.cell(Scalar::Number(-2500.0)), s));
        assert_eq!(tags, ["negative_value", "numeric"]);

        let tags = tags_of(|s| analyzer.tag_cell(&classifier.cell(Scalar::text("$5k")), s));
        assert_eq!(tags, ["large_value", "numeric"]);
    }

    #[test]
    fn cell_types_and_text_years() {
        let classifier = CellClassifier::default();
        let headers = vec![HeaderNode {
            value: "2023".to_string(),
            level: 2,
            column: 1,
            row_span: 1,
            col_span: 1,
            parent: Some("Sales".to_string()),
            is_merged: false,
        }];
        let cells = [
            Scalar::text("Margin"),
            Scalar::text("29.2%"),
            Scalar::text("FY 2023 plan"),
            Scalar::Empty,
        ]
        .into_iter()
        .map(|v| RowCell {
            header: "2023".to_string(),
            cell: classifier.cell(v),
        })
        .collect();
        let rows = vec![Row {
            row_number: 1,
            cells,
            is_empty: false,
        }];

        let tags = tags_of(|s| CellTypeTagger.apply(&TagContext::new(None, &headers, &rows), s));
        assert_eq!(tags, ["2023", "margin", "percentage", "sales"]);
    }
}
