//! Classification rules applied at ingest time
//!
//! - **IndexRules**: staleness budget per metric name, consumed by prune
//! - **SchemaRules** / **AggregationRules**: retention and rollup ids handed
//!   to the storage layer
//!
//! All regexes are compiled once when the rules are built; resolution is a
//! linear first-match scan and its result is cached on the archive.

mod index_rules;
mod schema;

pub use index_rules::{IndexRule, IndexRules};
pub use schema::{Aggregation, AggregationRules, Classified, Classifier, Schema, SchemaRules};
