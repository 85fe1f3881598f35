//! Staleness sweep
//!
//! An archive is stale when its rule has a non-zero `max_stale` and it was
//! last updated more than `max_stale` before `now`. Archives sharing a path
//! tree leaf are evicted together, and only once every one of them is
//! stale; a single fresh archive keeps the whole leaf.

use crate::index::tenant::Tenant;
use crate::index::{Archive, MemoryIndex};
use crate::metric::MetricKey;
use crate::rules::IndexRules;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;

impl Tenant {
    /// Keys of every leaf whose archives are all stale at `now` (seconds)
    fn stale_keys(&self, rules: &IndexRules, now: i64) -> Vec<MetricKey> {
        let mut leaves: HashMap<&str, (bool, Vec<MetricKey>)> = HashMap::new();

        for archive in self.archives.values() {
            let max_stale = rules.get(archive.rule_id).max_stale;
            // budgets beyond i64 seconds never expire
            let stale = !max_stale.is_zero()
                && i64::try_from(max_stale.as_secs())
                    .map_or(false, |secs| archive.last_update() < now.saturating_sub(secs));

            let (all_stale, keys) = leaves
                .entry(archive.name())
                .or_insert_with(|| (true, Vec::new()));
            *all_stale &= stale;
            keys.push(archive.key);
        }

        leaves
            .into_values()
            .filter(|(all_stale, _)| *all_stale)
            .flat_map(|(_, keys)| keys)
            .collect()
    }
}

impl MemoryIndex {
    /// Evict stale archives across all tenants
    ///
    /// Tenants are locked one at a time, so adds and queries against other
    /// tenants proceed while a sweep is running.
    pub fn prune(&self, now: DateTime<Utc>) -> Vec<Archive> {
        let start = Instant::now();
        let now = now.timestamp();

        if self.config.rules.min_max_stale().is_none() {
            tracing::debug!("No index rule expires metrics, skipping prune");
            self.drop_empty_tenants();
            return Vec::new();
        }

        let tenants: Vec<(u32, Arc<_>)> = self
            .tenants
            .read()
            .iter()
            .map(|(id, t)| (*id, Arc::clone(t)))
            .collect();

        let mut pruned = Vec::new();
        for (id, shared) in tenants {
            let mut tenant = shared.write();
            let stale = tenant.stale_keys(&self.config.rules, now);
            if stale.is_empty() {
                continue;
            }

            let before = pruned.len();
            pruned.extend(stale.iter().filter_map(|key| tenant.evict(key)));
            tracing::debug!(tenant = id, pruned = pruned.len() - before, "Pruned tenant");
        }
        let dropped = self.drop_empty_tenants();

        tracing::info!(
            pruned = pruned.len(),
            dropped_tenants = dropped,
            elapsed = ?start.elapsed(),
            "Prune complete"
        );
        pruned
    }

    /// Remove tenants left without archives by deletes or earlier sweeps
    ///
    /// A tenant still referenced outside the map may be mid-add and is kept.
    fn drop_empty_tenants(&self) -> usize {
        let mut tenants = self.tenants.write();
        let before = tenants.len();
        tenants.retain(|_, t| Arc::strong_count(t) > 1 || !t.read().is_empty());
        before - tenants.len()
    }

    /// Spawn a task running `prune` every `prune_interval` until `shutdown`
    pub fn start_background_prune(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let index = Arc::clone(self);
        let period = index.config.prune_interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                if index.shutdown.load(Ordering::Acquire) {
                    break;
                }

                let sweep = Arc::clone(&index);
                if let Err(e) = tokio::task::spawn_blocking(move || sweep.prune(Utc::now())).await {
                    tracing::error!("Background prune failed: {}", e);
                }
            }

            tracing::info!("Background prune stopped");
        })
    }

    /// Stop the background prune task after its current tick
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexConfig;
    use crate::metric::MetricDefinition;
    use crate::rules::IndexRule;
    use chrono::TimeZone;
    use regex::Regex;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn index_with(rules: IndexRules, tag_support: bool) -> MemoryIndex {
        MemoryIndex::new(IndexConfig {
            tag_support,
            rules,
            ..IndexConfig::default()
        })
    }

    fn expire_all(max_stale: Duration) -> IndexRules {
        IndexRules::new(Vec::new(), IndexRule::catch_all("default", max_stale))
    }

    fn add(index: &MemoryIndex, def: MetricDefinition) -> MetricKey {
        index.add(def.key(), def, 0).unwrap().key
    }

    #[test]
    fn test_prune_collision() {
        for tag_support in [true, false] {
            let index = index_with(expire_all(Duration::from_secs(1)), tag_support);

            add(&index, MetricDefinition::new("metric.bah.boz", 1, 10).last_update(1));
            add(&index, MetricDefinition::new("metric.bah.boz", 1, 60).last_update(10));

            assert!(index.prune(at(11)).is_empty());
            assert_eq!(index.list(1).len(), 2);

            let pruned = index.prune(at(20));
            assert_eq!(pruned.len(), 2);
            assert!(index.list(1).is_empty());
            assert!(index.find(1, "metric.*", 0).unwrap().is_empty());
            assert_eq!(index.stats().tree_nodes, 0);
            assert_eq!(index.stats().tag_pairs, 0);
        }
    }

    #[test]
    fn test_prune_by_rule() {
        let rules = IndexRules::new(
            vec![IndexRule::new(
                "longterm",
                Regex::new("^longterm\\.").unwrap(),
                Duration::from_secs(10 * 86400),
            )],
            IndexRule::catch_all("default", Duration::from_secs(86400)),
        );

        for tag_support in [true, false] {
            let index = index_with(rules.clone(), tag_support);
            let now = 30 * 86400;

            let fresh = add(&index, MetricDefinition::new("metric.a", 1, 10).last_update(now - 100));
            let stale = add(&index, MetricDefinition::new("metric.b", 1, 10).last_update(now - 2 * 86400));
            let kept = add(&index, MetricDefinition::new("longterm.a", 1, 10).last_update(now - 5 * 86400));
            let old = add(&index, MetricDefinition::new("longterm.b", 1, 10).last_update(now - 20 * 86400));
            let other = add(&index, MetricDefinition::new("metric.b", 2, 10).last_update(now - 2 * 86400));

            let mut pruned: Vec<MetricKey> = index.prune(at(now)).iter().map(|a| a.key).collect();
            pruned.sort();
            let mut want = vec![stale, old, other];
            want.sort();
            assert_eq!(pruned, want);

            assert!(index.get(&fresh).is_some());
            assert!(index.get(&kept).is_some());
            assert!(index.get(&stale).is_none());

            let names: Vec<String> = index
                .find_by_tag(1, &["name=~.*"], 0)
                .unwrap()
                .into_iter()
                .map(|n| n.path)
                .collect();
            assert_eq!(names, vec!["longterm.a", "metric.a"]);
            assert!(index.find(2, "*", 0).unwrap().is_empty());
        }
    }

    #[test]
    fn test_prune_keeps_branch_with_fresh_children() {
        let index = index_with(expire_all(Duration::from_secs(60)), true);

        add(&index, MetricDefinition::new("a.b", 1, 10).last_update(0));
        add(&index, MetricDefinition::new("a.b.c", 1, 10).last_update(1000));

        let pruned = index.prune(at(1000));
        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].name(), "a.b");

        let nodes = index.find(1, "a.b", 0).unwrap();
        assert_eq!(nodes.len(), 1);
        assert!(!nodes[0].leaf);
        assert!(nodes[0].has_children);
    }

    #[test]
    fn test_prune_never_with_zero_max_stale() {
        let index = index_with(IndexRules::default(), true);
        add(&index, MetricDefinition::new("a.b", 1, 10).last_update(0));

        assert!(index.prune(at(4_000_000_000)).is_empty());
        assert_eq!(index.list(1).len(), 1);
    }

    #[test]
    fn test_prune_never_with_oversized_max_stale() {
        let secs = crate::config::parse_duration("600000000000y").unwrap();
        assert!(secs.as_secs() > i64::MAX as u64);

        let index = index_with(expire_all(secs), true);
        add(&index, MetricDefinition::new("a.b", 1, 10).last_update(1000));

        assert!(index.prune(at(1000)).is_empty());
        assert!(index.prune(at(4_000_000_000)).is_empty());
        assert_eq!(index.list(1).len(), 1);
    }

    #[test]
    fn test_prune_collision_three_way() {
        for tag_support in [true, false] {
            let index = index_with(expire_all(Duration::from_secs(5)), tag_support);

            add(&index, MetricDefinition::new("metric.bah.boz", 1, 10).last_update(1));
            add(&index, MetricDefinition::new("metric.bah.boz", 1, 60).last_update(2));
            add(&index, MetricDefinition::new("metric.bah.boz", 1, 60).unit("ms").last_update(20));
            add(&index, MetricDefinition::new("metric.bah.other", 1, 10).last_update(1));

            // one fresh archive keeps the whole leaf
            let pruned = index.prune(at(22));
            assert_eq!(pruned.len(), 1);
            assert_eq!(pruned[0].name(), "metric.bah.other");
            assert_eq!(index.find(1, "metric.bah.boz", 0).unwrap()[0].archives.len(), 3);

            let pruned = index.prune(at(30));
            assert_eq!(pruned.len(), 3);
            assert!(pruned.iter().all(|a| a.name() == "metric.bah.boz"));
            assert!(index.list(1).is_empty());
            assert_eq!(index.stats().tree_nodes, 0);
        }
    }

    #[test]
    fn test_prune_drops_empty_tenants() {
        let index = index_with(expire_all(Duration::from_secs(60)), true);
        add(&index, MetricDefinition::new("old.series", 1, 10).last_update(0));
        add(&index, MetricDefinition::new("kept.series", 2, 10).last_update(1000));
        add(&index, MetricDefinition::new("deleted.series", 3, 10).last_update(1000));
        index.delete(3, "deleted.*").unwrap();
        assert_eq!(index.stats().tenants, 3);

        assert_eq!(index.prune(at(1000)).len(), 1);
        assert_eq!(index.stats().tenants, 1);
        assert_eq!(index.list(2).len(), 1);

        // a dropped tenant comes back on the next add
        add(&index, MetricDefinition::new("old.series", 1, 10).last_update(1000));
        assert_eq!(index.stats().tenants, 2);
        assert_eq!(index.find(1, "old.*", 0).unwrap().len(), 1);
    }

    #[test]
    fn test_prune_without_expiring_rules_drops_empty_tenants() {
        let index = index_with(IndexRules::default(), false);
        add(&index, MetricDefinition::new("a.b", 1, 10));
        index.delete(1, "a").unwrap();

        assert!(index.prune(at(1000)).is_empty());
        assert_eq!(index.stats().tenants, 0);
    }

    #[test]
    fn test_prune_large_tenant() {
        let index = index_with(expire_all(Duration::from_secs(60)), true);
        for i in 0..100_000 {
            add(&index, MetricDefinition::new(format!("some.metric.{}", i), 1, 10).last_update(0));
        }

        let start = Instant::now();
        let pruned = index.prune(at(1000));

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(pruned.len(), 100_000);
        assert_eq!(index.stats().archives, 0);
        assert_eq!(index.stats().tree_nodes, 0);
    }

    #[tokio::test]
    async fn test_background_prune() {
        let index = Arc::new(MemoryIndex::new(IndexConfig {
            rules: expire_all(Duration::from_secs(60)),
            prune_interval: Duration::from_millis(20),
            ..IndexConfig::default()
        }));
        add(&index, MetricDefinition::new("old.series", 1, 10).last_update(0));

        let handle = index.start_background_prune();
        for _ in 0..100 {
            if index.list(1).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(index.list(1).is_empty());

        index.shutdown();
        assert!(index.is_shutdown());
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
