//! Metric Index Structures
//!
//! Provides the in-memory catalog the query engine resolves series from:
//!
//! - **PathTree**: per-tenant trie for hierarchical glob queries
//! - **TagIndex**: per-tenant inverted index for tag expressions
//! - **GlobMatcher**: compiled dotted glob patterns
//! - **MemoryIndex**: façade coordinating store, tree and tag index under
//!   per-tenant locks
//!
//! # Architecture
//!
//! ```text
//! add(key, def)
//!        ↓
//! validate → classify (IndexRules, SchemaRules) → Archive
//!        ↓
//! archive store ← PathTree (name) ← TagIndex (tags + name)
//!
//! find("metric.{a,b}.*")        find_by_tag(["host=a", "name=~cpu"])
//!        ↓                                ↓
//! GlobMatcher over PathTree       TagIndex evaluation
//!        ↓                                ↓
//!        └────── archive store → SearchNode ──────┘
//! ```

mod error;
pub mod expr;
pub mod glob;
mod memory;
mod prune;
pub mod tag_index;
mod tenant;
pub mod tree;

pub use error::{IndexError, IndexResult};
pub use expr::{Operator, TagExpression, TagQuery};
pub use glob::{GlobMatcher, SegmentMatcher};
pub use memory::{IndexConfig, MemoryIndex};
pub use tag_index::TagIndex;
pub use tree::{PathTree, TreeNode};

use crate::metric::{MetricDefinition, MetricKey};
use serde::{Deserialize, Serialize};

/// A metric definition plus its derived classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub key: MetricKey,
    pub definition: MetricDefinition,
    /// Retention schema id, see `rules::SchemaRules`
    pub schema_id: u16,
    /// Rollup aggregation id, see `rules::AggregationRules`
    pub agg_id: u16,
    /// Staleness rule id, see `rules::IndexRules`
    pub rule_id: u16,
}

impl Archive {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn last_update(&self) -> i64 {
        self.definition.last_update
    }
}

/// One result of a glob or tag search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchNode {
    pub path: String,
    /// Carries at least one archive
    pub leaf: bool,
    pub has_children: bool,
    pub archives: Vec<Archive>,
}

impl SearchNode {
    /// Fold another tenant's node for the same path into this one
    fn merge(&mut self, other: SearchNode) {
        self.leaf |= other.leaf;
        self.has_children |= other.has_children;
        self.archives.extend(other.archives);
    }
}

/// Statistics about index usage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    /// Number of tenants with state
    pub tenants: usize,
    /// Number of archives across tenants
    pub archives: usize,
    /// Number of path tree nodes across tenants
    pub tree_nodes: usize,
    /// Number of distinct key/value pairs in tag indexes
    pub tag_pairs: usize,
}

impl std::fmt::Display for IndexStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} tenants, {} archives, {} tree nodes, {} tag pairs",
            self.tenants, self.archives, self.tree_nodes, self.tag_pairs
        )
    }
}
