//! Memory Index - coordinates archive store, path tree and tag index
//!
//! Provides the operations the ingestion and query paths call:
//!
//! - `add`: validate, classify and upsert a definition
//! - `get` / `list`: direct store access
//! - `find`: hierarchical glob search
//! - `find_by_tag`: tag expression search
//! - `delete` / `delete_by_tag`: explicit removal
//! - `prune`: staleness sweep (see `prune.rs`)
//!
//! # Locking
//!
//! ```text
//! tenants: RwLock<HashMap<tenant, Arc<RwLock<Tenant>>>>
//!                  │                    │
//!   held only to look up/create         one lock per tenant:
//!   a tenant entry                      add/delete/prune write,
//!                                       find/list/get read
//! ```
//!
//! Reads for tenant T also read the public tenant. T and the public tenant
//! are locked one after the other, never together.

use crate::index::expr::TagQuery;
use crate::index::glob::GlobMatcher;
use crate::index::tenant::Tenant;
use crate::index::{Archive, IndexError, IndexResult, IndexStats, SearchNode};
use crate::metric::{MetricDefinition, MetricKey, ValidationError};
use crate::rules::{AggregationRules, IndexRules, SchemaRules};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process-wide settings fixed at construction
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Maintain per-tenant tag indexes
    pub tag_support: bool,
    /// Tenant whose series every tenant can read; 0 disables the overlay
    pub public_tenant_id: u32,
    /// Staleness rules used by prune
    pub rules: IndexRules,
    pub schemas: SchemaRules,
    pub aggregations: AggregationRules,
    /// Period of the background prune task
    pub prune_interval: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            tag_support: true,
            public_tenant_id: 0,
            rules: IndexRules::default(),
            schemas: SchemaRules::default(),
            aggregations: AggregationRules::default(),
            prune_interval: Duration::from_secs(3 * 60 * 60),
        }
    }
}

type SharedTenant = Arc<RwLock<Tenant>>;

/// In-memory multi-tenant metric index
pub struct MemoryIndex {
    pub(crate) config: IndexConfig,
    pub(crate) tenants: RwLock<HashMap<u32, SharedTenant>>,
    pub(crate) shutdown: AtomicBool,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new(IndexConfig::default())
    }
}

impl MemoryIndex {
    pub fn new(config: IndexConfig) -> Self {
        tracing::info!(
            tag_support = config.tag_support,
            public_tenant = config.public_tenant_id,
            index_rules = config.rules.len(),
            "Memory index initialised"
        );
        Self {
            config,
            tenants: RwLock::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    fn tenant(&self, id: u32) -> Option<SharedTenant> {
        self.tenants.read().get(&id).cloned()
    }

    fn tenant_or_create(&self, id: u32) -> SharedTenant {
        if let Some(tenant) = self.tenant(id) {
            return tenant;
        }
        let tag_support = self.config.tag_support;
        self.tenants
            .write()
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(Tenant::new(tag_support))))
            .clone()
    }

    /// Tenants visible to reads for `id`: its own plus the public overlay
    fn visible(&self, id: u32) -> Vec<SharedTenant> {
        let public = self.config.public_tenant_id;
        let tenants = self.tenants.read();

        let mut visible: Vec<SharedTenant> = tenants.get(&id).cloned().into_iter().collect();
        if public != 0 && public != id {
            visible.extend(tenants.get(&public).cloned());
        }
        visible
    }

    /// Compute the classification an archive for `def` receives
    fn classify(&self, key: MetricKey, def: MetricDefinition) -> Archive {
        let name_with_tags = def.name_with_tags();
        let (rule_id, _) = self.config.rules.resolve(&def.name);

        Archive {
            key,
            schema_id: self.config.schemas.resolve(&name_with_tags),
            agg_id: self.config.aggregations.resolve(&name_with_tags),
            rule_id,
            definition: def,
        }
    }

    // ==================== Write Methods ====================

    /// Add a definition, or refresh the archive already stored under `key`
    ///
    /// A refresh updates `last_update` and `partition` in place; the tree
    /// and tag index are left alone.
    pub fn add(
        &self,
        key: MetricKey,
        mut def: MetricDefinition,
        partition: i32,
    ) -> IndexResult<Archive> {
        def.validate()?;
        if key.tenant != def.tenant_id {
            return Err(ValidationError::TenantMismatch {
                key: key.tenant,
                definition: def.tenant_id,
            }
            .into());
        }
        def.partition = partition;

        let tenant = self.tenant_or_create(key.tenant);
        let mut tenant = tenant.write();

        if let Some(existing) = tenant.archives.get_mut(&key) {
            existing.definition.last_update = def.last_update;
            existing.definition.partition = partition;
            tracing::trace!(key = %key, "Updated archive");
            return Ok(existing.clone());
        }

        let archive = self.classify(key, def);
        tracing::debug!(
            key = %key,
            name = %archive.definition.name,
            schema_id = archive.schema_id,
            rule_id = archive.rule_id,
            "Indexed new archive"
        );
        tenant.insert(archive.clone());
        Ok(archive)
    }

    /// Rebuild from upstream metadata, skipping invalid definitions
    ///
    /// Returns the number of definitions indexed.
    pub fn load<I>(&self, defs: I) -> usize
    where
        I: IntoIterator<Item = MetricDefinition>,
    {
        let start = Instant::now();
        let mut loaded = 0;

        for def in defs {
            let key = def.key();
            let partition = def.partition;
            match self.add(key, def, partition) {
                Ok(_) => loaded += 1,
                Err(e) => tracing::warn!(key = %key, "Skipping definition on load: {}", e),
            }
        }

        tracing::info!(loaded, elapsed = ?start.elapsed(), "Loaded definitions");
        loaded
    }

    /// Delete every series matching `pattern`, including all series below
    /// a matched node
    pub fn delete(&self, tenant: u32, pattern: &str) -> IndexResult<Vec<Archive>> {
        let glob = GlobMatcher::compile(pattern)?;
        let Some(shared) = self.tenant(tenant) else {
            return Ok(Vec::new());
        };

        let start = Instant::now();
        let deleted = shared.write().evict_matching(&glob);

        tracing::info!(
            tenant,
            pattern,
            deleted = deleted.len(),
            elapsed = ?start.elapsed(),
            "Deleted series"
        );
        Ok(deleted)
    }

    /// Delete every series matching the tag expressions
    pub fn delete_by_tag<S: AsRef<str>>(
        &self,
        tenant: u32,
        expressions: &[S],
    ) -> IndexResult<Vec<Archive>> {
        let query = TagQuery::parse(expressions)?;
        let Some(shared) = self.tenant(tenant) else {
            return Ok(Vec::new());
        };

        let mut guard = shared.write();
        let deleted: Vec<Archive> = guard
            .tag_matches(&query)
            .into_iter()
            .filter_map(|key| guard.evict(&key))
            .collect();

        tracing::info!(tenant, deleted = deleted.len(), "Deleted tagged series");
        Ok(deleted)
    }

    // ==================== Query Methods ====================

    pub fn get(&self, key: &MetricKey) -> Option<Archive> {
        let tenant = self.tenant(key.tenant)?;
        let guard = tenant.read();
        guard.archives.get(key).cloned()
    }

    /// All archives visible to `tenant`, sorted by name then key
    pub fn list(&self, tenant: u32) -> Vec<Archive> {
        let mut archives: Vec<Archive> = self
            .visible(tenant)
            .iter()
            .flat_map(|t| t.read().archives.values().cloned().collect::<Vec<_>>())
            .collect();
        archives.sort_by(|a, b| a.name().cmp(b.name()).then(a.key.cmp(&b.key)));
        archives
    }

    /// Glob search; `from` > 0 hides archives last updated before it
    pub fn find(&self, tenant: u32, pattern: &str, from: i64) -> IndexResult<Vec<SearchNode>> {
        let glob = GlobMatcher::compile(pattern)?;

        let nodes = self
            .visible(tenant)
            .iter()
            .flat_map(|t| t.read().find(&glob, from))
            .collect();
        Ok(merge_by_path(nodes))
    }

    /// Tag expression search, grouped into one node per metric name
    pub fn find_by_tag<S: AsRef<str>>(
        &self,
        tenant: u32,
        expressions: &[S],
        from: i64,
    ) -> IndexResult<Vec<SearchNode>> {
        let query = TagQuery::parse(expressions)?;

        let nodes = self
            .visible(tenant)
            .iter()
            .flat_map(|t| t.read().find_by_tag(&query, from))
            .collect();
        Ok(merge_by_path(nodes))
    }

    /// Known tag keys, optionally filtered by a start-anchored regex
    pub fn tags(&self, tenant: u32, filter: Option<&str>) -> IndexResult<Vec<String>> {
        let filter = compile_filter(filter)?;

        let keys: BTreeSet<String> = self
            .visible(tenant)
            .iter()
            .flat_map(|t| t.read().tag_keys(filter.as_ref()))
            .collect();
        Ok(keys.into_iter().collect())
    }

    /// Values of `key` with the number of series carrying each
    pub fn tag_values(
        &self,
        tenant: u32,
        key: &str,
        filter: Option<&str>,
    ) -> IndexResult<Vec<(String, usize)>> {
        let filter = compile_filter(filter)?;

        let mut values: BTreeMap<String, usize> = BTreeMap::new();
        for shared in self.visible(tenant) {
            for (value, count) in shared.read().tag_values(key, filter.as_ref()) {
                *values.entry(value).or_insert(0) += count;
            }
        }
        Ok(values.into_iter().collect())
    }

    // ==================== Stats Methods ====================

    pub fn stats(&self) -> IndexStats {
        let tenants: Vec<SharedTenant> = self.tenants.read().values().cloned().collect();

        let mut stats = IndexStats {
            tenants: tenants.len(),
            ..IndexStats::default()
        };
        for shared in tenants {
            let guard = shared.read();
            stats.archives += guard.archives.len();
            stats.tree_nodes += guard.tree.node_count();
            stats.tag_pairs += guard.tag_pair_count();
        }
        stats
    }
}

/// Combine nodes from several tenants, one node per path, sorted by path
fn merge_by_path(nodes: Vec<SearchNode>) -> Vec<SearchNode> {
    let mut by_path: BTreeMap<String, SearchNode> = BTreeMap::new();
    for node in nodes {
        match by_path.get_mut(&node.path) {
            Some(existing) => existing.merge(node),
            None => {
                by_path.insert(node.path.clone(), node);
            }
        }
    }
    by_path.into_values().collect()
}

fn compile_filter(filter: Option<&str>) -> IndexResult<Option<Regex>> {
    filter
        .filter(|f| !f.is_empty())
        .map(|f| {
            Regex::new(&format!("^(?:{})", f))
                .map_err(|e| IndexError::Expression(format!("invalid filter {:?}: {}", f, e)))
        })
        .transpose()
}
