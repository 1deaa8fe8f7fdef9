use crate::classifier::CellClassifier;
use crate::config::{PipelineConfig, TaggingConfig};
use crate::error::EngineResult;
use crate::types::*;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::auto_tagger::{CellTypeTagger, TextContentAnalyzer};
use super::business::TagAssigner;
use super::statistics::{column_types, summarize};

/// Read-only view of a materialized table handed to every tag rule.
#[derive(Debug, Clone, Copy)]
pub struct TagContext<'a> {
    pub sheet_name: Option<&'a str>,
    pub headers: &'a [HeaderNode],
    pub rows: &'a [Row],
}

impl<'a> TagContext<'a> {
    pub fn new(sheet_name: Option<&'a str>, headers: &'a [HeaderNode], rows: &'a [Row]) -> Self {
        Self {
            sheet_name,
            headers,
            rows,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = &'a Cell> {
        self.rows.iter().flat_map(|r| r.cells.iter().map(|c| &c.cell))
    }
}

/// Add-only tag accumulator. Tags are trimmed and lower-cased on the way in.
#[derive(Debug, Default, Clone)]
pub struct TagSink {
    tags: TagSet,
}

impl TagSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tag: &str) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() {
            self.tags.insert(tag);
        }
    }

    pub fn extend<'t>(&mut self, tags: impl IntoIterator<Item = &'t str>) {
        for tag in tags {
            self.add(tag);
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn into_tags(self) -> TagSet {
        self.tags
    }
}

// Sequential tag pipeline infrastructure
pub trait TagRule {
    fn apply(&self, ctx: &TagContext<'_>, tags: &mut TagSink);
    fn name(&self) -> &str;
}

/// Result of running the tag pipeline over one table.
#[derive(Debug, Clone, Default)]
pub struct TagOutcome {
    pub tags: TagSet,
    pub statistics: TagStatistics,
    pub column_types: BTreeMap<String, CellType>,
    pub rule_timings: Vec<(String, Duration)>,
}

/// Runs the configured tag rules in order over a table.
///
/// Built once from configuration; holds only immutable compiled tables,
/// so one engine can be shared by concurrent callers.
pub struct TagEngine {
    pipeline: PipelineConfig,
    cell_types: CellTypeTagger,
    text_content: TextContentAnalyzer,
    tag_assigner: TagAssigner,
}

impl TagEngine {
    pub fn new(config: &TaggingConfig, classifier: CellClassifier) -> EngineResult<Self> {
        Ok(Self {
            pipeline: config.pipeline.clone(),
            cell_types: CellTypeTagger,
            text_content: TextContentAnalyzer::new(config),
            tag_assigner: TagAssigner::new(config, classifier)?,
        })
    }

    pub fn tag_assigner(&self) -> &TagAssigner {
        &self.tag_assigner
    }

    pub fn run(&self, ctx: &TagContext<'_>) -> TagOutcome {
        let mut sink = TagSink::new();
        let mut rule_timings = Vec::new();

        for rule_config in &self.pipeline.rules {
            if !rule_config.enabled {
                debug!("Skipping disabled tag rule: {}", rule_config.name);
                continue;
            }
            let rule_start = Instant::now();
            let before = sink.len();
            self.apply_rule_by_name(&rule_config.name, ctx, &mut sink);
            debug!(
                "{} added {} tags",
                rule_config.name,
                sink.len().saturating_sub(before)
            );
            rule_timings.push((rule_config.name.clone(), rule_start.elapsed()));
        }

        TagOutcome {
            tags: sink.into_tags(),
            statistics: summarize(ctx.rows),
            column_types: column_types(ctx.rows)
                .into_iter()
                .map(|(name, kind)| (name, kind.unwrap_or(CellType::Empty)))
                .collect(),
            rule_timings,
        }
    }

    fn apply_rule_by_name(&self, rule_name: &str, ctx: &TagContext<'_>, sink: &mut TagSink) {
        let rule: &dyn TagRule = match rule_name {
            "AutoTagger" => self.tag_assigner.auto_tagger(),
            "CellTypes" => &self.cell_types,
            "TextContent" => &self.text_content,
            "TagAssigner" => &self.tag_assigner,
            _ => {
                warn!("Unknown tag rule: {rule_name}. Skipping...");
                return;
            }
        };
        rule.apply(ctx, sink);
    }
}
