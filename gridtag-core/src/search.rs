use crate::types::{Block, Document};
use serde::Serialize;

/// Tag filter plus display ceiling for block retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockQuery {
    /// Every tag must be present on a block for it to match
    pub tags: Vec<String>,
    /// Largest rows × columns a displayable block may have
    pub max_cells: usize,
}

impl BlockQuery {
    pub fn new<I, S>(tags: I, max_cells: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tags: tags
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            max_cells,
        }
    }

    pub fn matches(&self, block: &Block) -> bool {
        self.tags.iter().all(|t| block.tags.contains(t))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BlockMatch<'a> {
    Displayable { block: &'a Block },
    Oversized { block_id: uuid::Uuid, cells: usize, max_cells: usize },
}

/// Matching blocks in document order. Blocks over the ceiling are reported,
/// not returned.
pub fn find_blocks<'a>(document: &'a Document, query: &BlockQuery) -> Vec<BlockMatch<'a>> {
    document
        .blocks
        .iter()
        .filter(|block| query.matches(block))
        .map(|block| {
            let cells = block.display_cells();
            if cells > query.max_cells {
                BlockMatch::Oversized {
                    block_id: block.id,
                    cells,
                    max_cells: query.max_cells,
                }
            } else {
                BlockMatch::Displayable { block }
            }
        })
        .collect()
}
