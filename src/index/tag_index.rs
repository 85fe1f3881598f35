//! Tag Index - Inverted index for tag-based queries
//!
//! Maps tag key → tag value → set of `MetricKey`. Every series is also
//! indexed under the synthetic `name` tag so expressions can filter on the
//! metric name the same way they filter on tags.
//!
//! # Example
//! ```ignore
//! // series: cpu.user;host=a   cpu.user;host=b   mem.free;host=a
//! let keys = tag_index.evaluate(&TagQuery::parse(&["host=a", "name=~cpu"])?);
//! // keys = {cpu.user;host=a}
//! ```
//!
//! # Design Notes
//! - One instance per tenant, kept in lockstep with the archive store
//! - Negative and regex operators scan the values of one key, never the
//!   whole index

use crate::index::expr::{Operator, TagExpression, TagQuery};
use crate::metric::{MetricDefinition, MetricKey, NAME_TAG};
use regex::Regex;
use std::collections::{HashMap, HashSet};

type KeySet = HashSet<MetricKey>;

/// Keys an expression admits, either listed directly or by exclusion
enum Selection {
    Include(KeySet),
    Exclude(KeySet),
}

/// Inverted index for tag-based queries
#[derive(Debug, Default)]
pub struct TagIndex {
    /// tag key → tag value → metric keys
    index: HashMap<String, HashMap<String, KeySet>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, key: &str, value: &str, mkey: MetricKey) {
        self.index
            .entry(key.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default()
            .insert(mkey);
    }

    fn remove_entry(&mut self, key: &str, value: &str, mkey: &MetricKey) {
        let Some(values) = self.index.get_mut(key) else {
            return;
        };
        if let Some(keys) = values.get_mut(value) {
            keys.remove(mkey);
            if keys.is_empty() {
                values.remove(value);
            }
        }
        if values.is_empty() {
            self.index.remove(key);
        }
    }

    /// Index all tags of a definition plus its name
    pub fn insert(&mut self, mkey: MetricKey, def: &MetricDefinition) {
        for (key, value) in def.tag_pairs() {
            self.add(key, value, mkey);
        }
        self.add(NAME_TAG, &def.name, mkey);
    }

    /// Remove everything `insert` added for this definition
    pub fn remove(&mut self, mkey: &MetricKey, def: &MetricDefinition) {
        for (key, value) in def.tag_pairs() {
            self.remove_entry(key, value, mkey);
        }
        self.remove_entry(NAME_TAG, &def.name, mkey);
    }

    /// Keys with an exact tag value
    pub fn find(&self, key: &str, value: &str) -> Vec<MetricKey> {
        self.index
            .get(key)
            .and_then(|values| values.get(value))
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every indexed key (all series carry a name)
    pub fn universe(&self) -> KeySet {
        self.with_key(NAME_TAG)
    }

    fn with_key(&self, key: &str) -> KeySet {
        self.index
            .get(key)
            .map(|values| values.values().flatten().copied().collect())
            .unwrap_or_default()
    }

    /// Union of key sets for the values of `key` accepted by `accept`
    fn collect_values(&self, key: &str, accept: impl Fn(&str) -> bool) -> KeySet {
        self.index
            .get(key)
            .map(|values| {
                values
                    .iter()
                    .filter(|(value, _)| accept(value))
                    .flat_map(|(_, keys)| keys.iter().copied())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn select(&self, expr: &TagExpression) -> Selection {
        let key = expr.key.as_str();
        match expr.operator {
            Operator::Equal if expr.value.is_empty() => Selection::Exclude(self.with_key(key)),
            Operator::Equal => {
                Selection::Include(self.find(key, &expr.value).into_iter().collect())
            }
            Operator::NotEqual if expr.value.is_empty() => {
                Selection::Include(self.with_key(key))
            }
            Operator::NotEqual => {
                Selection::Exclude(self.find(key, &expr.value).into_iter().collect())
            }
            Operator::Match if expr.matches_absent() => {
                Selection::Exclude(self.collect_values(key, |v| !expr.regex_matches(v)))
            }
            Operator::Match => Selection::Include(self.collect_values(key, |v| expr.regex_matches(v))),
            Operator::NotMatch if expr.matches_absent() => {
                Selection::Exclude(self.collect_values(key, |v| expr.regex_matches(v)))
            }
            Operator::NotMatch => {
                Selection::Include(self.collect_values(key, |v| !expr.regex_matches(v)))
            }
        }
    }

    /// Keys matching every expression of the query
    ///
    /// Sets are intersected progressively and evaluation stops as soon as
    /// the candidate set is empty.
    pub fn evaluate(&self, query: &TagQuery) -> KeySet {
        let mut result: Option<KeySet> = None;

        for expr in query.expressions() {
            let selection = self.select(expr);
            let next = match (result.take(), selection) {
                (None, Selection::Include(keys)) => keys,
                (None, Selection::Exclude(keys)) => {
                    let mut all = self.universe();
                    all.retain(|k| !keys.contains(k));
                    all
                }
                (Some(mut current), Selection::Include(keys)) => {
                    current.retain(|k| keys.contains(k));
                    current
                }
                (Some(mut current), Selection::Exclude(keys)) => {
                    current.retain(|k| !keys.contains(k));
                    current
                }
            };

            if next.is_empty() {
                return next;
            }
            result = Some(next);
        }

        result.unwrap_or_default()
    }

    /// Known tag keys, sorted, optionally filtered by a start-anchored regex
    pub fn get_keys(&self, filter: Option<&Regex>) -> Vec<String> {
        let mut keys: Vec<String> = self
            .index
            .keys()
            .filter(|k| filter.map_or(true, |re| re.is_match(k)))
            .cloned()
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Known values of one tag key with their series counts, sorted by value
    pub fn get_values(&self, key: &str, filter: Option<&Regex>) -> Vec<(String, usize)> {
        let mut values: Vec<(String, usize)> = self
            .index
            .get(key)
            .map(|values| {
                values
                    .iter()
                    .filter(|(v, _)| filter.map_or(true, |re| re.is_match(v)))
                    .map(|(v, keys)| (v.clone(), keys.len()))
                    .collect()
            })
            .unwrap_or_default();
        values.sort_unstable();
        values
    }

    /// Count of tag keys, including `name`
    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    /// Count of unique key/value combinations
    pub fn tag_count(&self) -> usize {
        self.index.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
