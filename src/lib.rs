//! # metric-index
//!
//! In-memory metadata index for a multi-tenant time-series database. For
//! every ingested metric it tracks identity, hierarchical name, tags and
//! freshness, and resolves the series a query should read.
//!
//! ## Features
//!
//! - **Hierarchical search**: dotted-path globs with `*`, `?`, `[..]` and `{a,b}`
//! - **Tag search**: `key=value`, `!=`, `=~` and `!=~` expressions
//! - **Multi-tenancy**: per-tenant locking plus a read-only public tenant
//! - **Pruning**: staleness sweeps driven by per-name index rules
//! - **Classification**: retention and aggregation ids resolved at ingest
//!
//! ## Modules
//!
//! - [`metric`]: metric keys, definitions and validation
//! - [`rules`]: staleness, retention and aggregation rules
//! - [`index`]: path tree, tag index and the `MemoryIndex` façade
//! - [`config`]: TOML and environment configuration
//! - [`logging`]: tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metric_index::config::Config;
//! use metric_index::index::{IndexConfig, MemoryIndex};
//! use metric_index::metric::MetricDefinition;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     metric_index::logging::init(&config.logging);
//!
//!     let index = Arc::new(MemoryIndex::new(IndexConfig::from_config(&config)?));
//!     let prune = index.start_background_prune();
//!
//!     let def = MetricDefinition::new("servers.web01.cpu", 1, 10).tag("dc", "east");
//!     index.add(def.key(), def, 0)?;
//!
//!     let nodes = index.find(1, "servers.*.cpu", 0)?;
//!     let tagged = index.find_by_tag(1, &["dc=east", "name=~servers\\."], 0)?;
//!     println!("{} glob matches, {} tag matches", nodes.len(), tagged.len());
//!
//!     index.shutdown();
//!     prune.await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod index;
pub mod logging;
pub mod metric;
pub mod rules;

// Re-export top-level types for convenience
pub use config::{Config, ConfigError};
pub use index::{Archive, IndexConfig, IndexError, IndexResult, MemoryIndex, SearchNode};
pub use metric::{MetricDefinition, MetricKey, ValidationError};
