use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_max_text_length() -> usize {
    1000
}

fn default_serial_date_min() -> f64 {
    25569.0
}

fn default_serial_date_max() -> f64 {
    47483.0
}

fn default_decimal_places() -> u32 {
    2
}

fn default_max_header_rows() -> usize {
    5
}

fn default_large_amount_threshold() -> f64 {
    1000.0
}

fn default_large_value_threshold() -> f64 {
    1000.0
}

fn default_min_token_length() -> usize {
    3
}

fn default_max_display_cells() -> usize {
    10_000
}

fn default_max_depth() -> usize {
    32
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Complete engine configuration. Every section falls back to its defaults
/// when missing from a YAML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub headers: HeaderConfig,
    #[serde(default)]
    pub tagging: TaggingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Text cells are truncated to this many characters
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    /// Numbers strictly between these bounds are spreadsheet serial dates
    #[serde(default = "default_serial_date_min")]
    pub serial_date_min: f64,
    #[serde(default = "default_serial_date_max")]
    pub serial_date_max: f64,
    /// Non-integer numbers are rounded to this precision
    #[serde(default = "default_decimal_places")]
    pub decimal_places: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
            serial_date_min: default_serial_date_min(),
            serial_date_max: default_serial_date_max(),
            decimal_places: default_decimal_places(),
        }
    }
}

impl IngestConfig {
    pub fn is_serial_date(&self, n: f64) -> bool {
        n > self.serial_date_min && n < self.serial_date_max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderConfig {
    /// Header rows are only searched for in this many leading rows
    #[serde(default = "default_max_header_rows")]
    pub max_header_rows: usize,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            max_header_rows: default_max_header_rows(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggingConfig {
    /// Money values above this add `large_amount`
    #[serde(default = "default_large_amount_threshold")]
    pub large_amount_threshold: f64,
    /// Numeric text content above this adds `large_value`
    #[serde(default = "default_large_value_threshold")]
    pub large_value_threshold: f64,
    /// Free-text tokens shorter than this are not tagged
    #[serde(default = "default_min_token_length")]
    pub min_token_length: usize,
    #[serde(default = "default_keyword_groups")]
    pub keyword_groups: Vec<KeywordGroup>,
    #[serde(default = "default_entity_forms")]
    pub entity_forms: Vec<EntityForm>,
    #[serde(default = "default_business_rules")]
    pub business_rules: Vec<BusinessRuleConfig>,
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryConfig>,
    /// Tag rules to run, in order
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            large_amount_threshold: default_large_amount_threshold(),
            large_value_threshold: default_large_value_threshold(),
            min_token_length: default_min_token_length(),
            keyword_groups: default_keyword_groups(),
            entity_forms: default_entity_forms(),
            business_rules: default_business_rules(),
            categories: default_categories(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// A header containing any of `stems` (case-insensitive) receives `tags`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordGroup {
    pub stems: Vec<String>,
    pub tags: Vec<String>,
}

fn default_keyword_groups() -> Vec<KeywordGroup> {
    vec![
        KeywordGroup {
            stems: strings(&["дата", "date"]),
            tags: strings(&["date", "temporal"]),
        },
        KeywordGroup {
            stems: strings(&["сумма", "amount"]),
            tags: strings(&["amount", "numeric"]),
        },
        KeywordGroup {
            stems: strings(&["клиент", "client", "customer"]),
            tags: strings(&["client", "organization"]),
        },
    ]
}

/// Legal-entity abbreviation. A whole-word match adds `organization` and `tag`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityForm {
    pub abbreviation: String,
    pub tag: String,
}

fn default_entity_forms() -> Vec<EntityForm> {
    [
        ("ооо", "company"),
        ("зао", "company"),
        ("пао", "company"),
        ("ип", "entrepreneur"),
        ("llc", "company"),
        ("inc", "company"),
        ("ltd", "company"),
        ("corp", "company"),
    ]
    .into_iter()
    .map(|(abbreviation, tag)| EntityForm {
        abbreviation: abbreviation.to_string(),
        tag: tag.to_string(),
    })
    .collect()
}

/// Condition half of a business rule, evaluated against one cell value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RuleCondition {
    GreaterThan(f64),
    LessThan(f64),
    Blank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRuleConfig {
    pub name: String,
    pub tag: String,
    /// Case-insensitive regex the row label must match; absent matches every row
    #[serde(default)]
    pub label_pattern: Option<String>,
    pub condition: RuleCondition,
}

fn default_business_rules() -> Vec<BusinessRuleConfig> {
    vec![
        BusinessRuleConfig {
            name: "high_revenue".to_string(),
            tag: "high_revenue".to_string(),
            label_pattern: Some("revenue|выручк".to_string()),
            condition: RuleCondition::GreaterThan(1_000_000.0),
        },
        BusinessRuleConfig {
            name: "large_profit".to_string(),
            tag: "large_profit".to_string(),
            label_pattern: Some("profit|прибыл".to_string()),
            condition: RuleCondition::GreaterThan(500_000.0),
        },
        BusinessRuleConfig {
            name: "negative_value".to_string(),
            tag: "negative_value".to_string(),
            label_pattern: None,
            condition: RuleCondition::LessThan(0.0),
        },
        BusinessRuleConfig {
            name: "incomplete_data".to_string(),
            tag: "incomplete_data".to_string(),
            label_pattern: None,
            condition: RuleCondition::Blank,
        },
    ]
}

/// Row labels containing any keyword add the category `name` as a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub keywords: Vec<String>,
}

fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig {
            name: "financial".to_string(),
            keywords: strings(&["revenue", "profit", "ebitda", "выручка", "прибыль"]),
        },
        CategoryConfig {
            name: "results".to_string(),
            keywords: strings(&["growth", "decline", "рост", "снижение"]),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// List of rules to run in order
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Name of the rule
    pub name: String,
    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl RuleConfig {
    pub fn enabled(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                RuleConfig::enabled("AutoTagger"),
                RuleConfig::enabled("CellTypes"),
                RuleConfig::enabled("TextContent"),
                RuleConfig::enabled("TagAssigner"),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Blocks larger than rows × columns are reported instead of returned
    #[serde(default = "default_max_display_cells")]
    pub max_display_cells: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_display_cells: default_max_display_cells(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Deeper payloads are rejected as malformed
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl EngineConfig {
    /// Load config from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {path}"))?;
        let config: EngineConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {path}"))?;
        Ok(config)
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                warn!("Failed to load config from {p}, using defaults: {e:#}");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
