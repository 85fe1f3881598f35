//! Per-tenant index state
//!
//! The archive store, path tree and optional tag index of one tenant. All
//! three are only ever mutated together, under the tenant's write lock, so
//! a reader never sees an archive that is in the store but not in the tree
//! or the other way round.

use crate::index::expr::TagQuery;
use crate::index::glob::GlobMatcher;
use crate::index::tag_index::TagIndex;
use crate::index::tree::PathTree;
use crate::index::{Archive, SearchNode};
use crate::metric::{MetricKey, NAME_TAG};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug)]
pub(crate) struct Tenant {
    pub(crate) archives: HashMap<MetricKey, Archive>,
    pub(crate) tree: PathTree,
    /// Present when tag support is enabled
    pub(crate) tags: Option<TagIndex>,
}

impl Tenant {
    pub(crate) fn new(tag_support: bool) -> Self {
        Self {
            archives: HashMap::new(),
            tree: PathTree::new(),
            tags: tag_support.then(TagIndex::new),
        }
    }

    /// Store a new archive and index it
    pub(crate) fn insert(&mut self, archive: Archive) {
        self.tree.add(&archive.definition.name, archive.key);
        if let Some(tags) = self.tags.as_mut() {
            tags.insert(archive.key, &archive.definition);
        }
        self.archives.insert(archive.key, archive);
    }

    /// Remove one archive from the store, the tag index and its tree leaf
    pub(crate) fn evict(&mut self, key: &MetricKey) -> Option<Archive> {
        let archive = self.archives.remove(key)?;
        if let Some(tags) = self.tags.as_mut() {
            tags.remove(key, &archive.definition);
        }
        self.tree.remove_archive(&archive.definition.name, key);
        Some(archive)
    }

    /// Remove every archive matching `glob` and everything below the matches
    pub(crate) fn evict_matching(&mut self, glob: &GlobMatcher) -> Vec<Archive> {
        let mut evicted = Vec::new();

        for idx in self.tree.find(glob) {
            for key in self.tree.delete_subtree(idx) {
                if let Some(archive) = self.archives.remove(&key) {
                    if let Some(tags) = self.tags.as_mut() {
                        tags.remove(&key, &archive.definition);
                    }
                    evicted.push(archive);
                }
            }
        }

        evicted
    }

    /// Glob search, dropping archives last updated before `from`
    pub(crate) fn find(&self, glob: &GlobMatcher, from: i64) -> Vec<SearchNode> {
        self.tree
            .find(glob)
            .into_iter()
            .filter_map(|idx| self.tree.node(idx))
            .filter_map(|node| {
                let archives: Vec<Archive> = node
                    .archives()
                    .iter()
                    .filter_map(|k| self.archives.get(k))
                    .filter(|a| from == 0 || a.last_update() >= from)
                    .cloned()
                    .collect();

                // a leaf whose archives were all filtered out is not a match
                if archives.is_empty() && !node.has_children() {
                    return None;
                }

                Some(SearchNode {
                    path: node.path().to_string(),
                    leaf: !archives.is_empty(),
                    has_children: node.has_children(),
                    archives,
                })
            })
            .collect()
    }

    /// Keys matching a tag query, via the tag index or a store scan
    pub(crate) fn tag_matches(&self, query: &TagQuery) -> Vec<MetricKey> {
        match &self.tags {
            Some(tags) => tags.evaluate(query).into_iter().collect(),
            None => self
                .archives
                .iter()
                .filter(|(_, a)| query.matches(&a.definition))
                .map(|(k, _)| *k)
                .collect(),
        }
    }

    /// Tag search results grouped into one node per metric name
    pub(crate) fn find_by_tag(&self, query: &TagQuery, from: i64) -> Vec<SearchNode> {
        let mut by_name: BTreeMap<&str, Vec<Archive>> = BTreeMap::new();

        for key in self.tag_matches(query) {
            let Some(archive) = self.archives.get(&key) else {
                continue;
            };
            if from != 0 && archive.last_update() < from {
                continue;
            }
            by_name
                .entry(archive.definition.name.as_str())
                .or_default()
                .push(archive.clone());
        }

        by_name
            .into_iter()
            .map(|(name, mut archives)| {
                archives.sort_by_key(|a| a.key);
                let has_children = self
                    .tree
                    .lookup(name)
                    .and_then(|idx| self.tree.node(idx))
                    .map_or(false, |n| n.has_children());
                SearchNode {
                    path: name.to_string(),
                    leaf: true,
                    has_children,
                    archives,
                }
            })
            .collect()
    }

    /// Tag keys known to this tenant
    pub(crate) fn tag_keys(&self, filter: Option<&Regex>) -> BTreeSet<String> {
        if let Some(tags) = &self.tags {
            return tags.get_keys(filter).into_iter().collect();
        }

        let mut keys = BTreeSet::new();
        for archive in self.archives.values() {
            let def = &archive.definition;
            for key in std::iter::once(NAME_TAG).chain(def.tag_pairs().map(|(k, _)| k)) {
                if filter.map_or(true, |re| re.is_match(key)) && !keys.contains(key) {
                    keys.insert(key.to_string());
                }
            }
        }
        keys
    }

    /// Values of one tag key with series counts
    pub(crate) fn tag_values(&self, key: &str, filter: Option<&Regex>) -> BTreeMap<String, usize> {
        if let Some(tags) = &self.tags {
            return tags.get_values(key, filter).into_iter().collect();
        }

        let mut values = BTreeMap::new();
        for archive in self.archives.values() {
            if let Some(value) = archive.definition.tag_value(key) {
                if filter.map_or(true, |re| re.is_match(value)) {
                    *values.entry(value.to_string()).or_insert(0) += 1;
                }
            }
        }
        values
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    pub(crate) fn tag_pair_count(&self) -> usize {
        self.tags.as_ref().map_or(0, TagIndex::tag_count)
    }
}
