//! Staleness rules
//!
//! An ordered list of `IndexRule`s plus a mandatory default decides how long
//! a metric may go without updates before prune evicts it. The first rule
//! whose pattern matches the metric name wins.

use regex::Regex;
use std::time::Duration;

/// One staleness rule
#[derive(Debug, Clone)]
pub struct IndexRule {
    pub name: String,
    /// Matched against the metric name (unanchored); `None` matches all
    pub pattern: Option<Regex>,
    /// Zero means never pruned
    pub max_stale: Duration,
}

impl IndexRule {
    pub fn new(name: impl Into<String>, pattern: Regex, max_stale: Duration) -> Self {
        Self {
            name: name.into(),
            pattern: Some(pattern),
            max_stale,
        }
    }

    /// Default rule matching everything
    pub fn catch_all(name: impl Into<String>, max_stale: Duration) -> Self {
        Self {
            name: name.into(),
            pattern: None,
            max_stale,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.pattern.as_ref().map_or(true, |p| p.is_match(name))
    }
}

/// Ordered staleness rules with a fallback
#[derive(Debug, Clone)]
pub struct IndexRules {
    rules: Vec<IndexRule>,
    default: IndexRule,
}

impl Default for IndexRules {
    fn default() -> Self {
        Self::new(Vec::new(), IndexRule::catch_all("default", Duration::ZERO))
    }
}

impl IndexRules {
    pub fn new(rules: Vec<IndexRule>, default: IndexRule) -> Self {
        Self { rules, default }
    }

    /// Resolve `name` to `(rule_id, max_stale)`.
    ///
    /// Rule ids are positions in the ordered list; the default is `len()`.
    pub fn resolve(&self, name: &str) -> (u16, Duration) {
        for (id, rule) in self.rules.iter().enumerate() {
            if rule.matches(name) {
                return (id as u16, rule.max_stale);
            }
        }
        (self.rules.len() as u16, self.default.max_stale)
    }

    /// Rule for an id produced by `resolve`
    pub fn get(&self, id: u16) -> &IndexRule {
        self.rules.get(id as usize).unwrap_or(&self.default)
    }

    /// Number of ordered rules, excluding the default
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Smallest non-zero budget across all rules, if any rule prunes
    pub fn min_max_stale(&self) -> Option<Duration> {
        self.rules
            .iter()
            .chain(std::iter::once(&self.default))
            .map(|r| r.max_stale)
            .filter(|d| !d.is_zero())
            .min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> IndexRules {
        IndexRules::new(
            vec![
                IndexRule::new("longterm", Regex::new("^long").unwrap(), Duration::from_secs(60)),
                IndexRule::new("debug", Regex::new("debug").unwrap(), Duration::from_secs(10)),
            ],
            IndexRule::catch_all("default", Duration::ZERO),
        )
    }

    #[test]
    fn test_first_match_wins() {
        let rules = rules();

        assert_eq!(rules.resolve("longterm.debug.x"), (0, Duration::from_secs(60)));
        assert_eq!(rules.resolve("app.debug.x"), (1, Duration::from_secs(10)));
    }

    #[test]
    fn test_default_fallback() {
        let rules = rules();
        let (id, stale) = rules.resolve("metric.never.expire");

        assert_eq!(id, 2);
        assert_eq!(stale, Duration::ZERO);
        assert_eq!(rules.get(id).name, "default");
        assert_eq!(rules.get(0).name, "longterm");
    }

    #[test]
    fn test_min_max_stale() {
        assert_eq!(rules().min_max_stale(), Some(Duration::from_secs(10)));
        assert_eq!(IndexRules::default().min_max_stale(), None);
    }
}
