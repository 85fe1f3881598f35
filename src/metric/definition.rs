//! Metric definitions
//!
//! This module defines the metadata record the index stores for each series:
//! - `MetricDefinition`: name, tenant, interval, unit, mtype, tags, freshness
//! - `Mtype`: the recognised metric types
//! - tag helpers shared with the tag index

use crate::metric::error::ValidationError;
use crate::metric::key::MetricKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Tag key under which the metric name is indexed
pub const NAME_TAG: &str = "name";

/// Kind of values a metric carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Mtype {
    Gauge,
    Rate,
    Count,
    Counter,
    Timestamp,
}

impl Mtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mtype::Gauge => "gauge",
            Mtype::Rate => "rate",
            Mtype::Count => "count",
            Mtype::Counter => "counter",
            Mtype::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for Mtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mtype {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(Mtype::Gauge),
            "rate" => Ok(Mtype::Rate),
            "count" => Ok(Mtype::Count),
            "counter" => Ok(Mtype::Counter),
            "timestamp" => Ok(Mtype::Timestamp),
            other => Err(ValidationError::InvalidMtype(other.to_string())),
        }
    }
}

/// Metadata of one series as received from ingestion
///
/// `mtype` is kept in its wire form so an unknown type surfaces as a
/// validation error instead of a decode failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricDefinition {
    /// Dot separated hierarchical name
    pub name: String,
    pub tenant_id: u32,
    /// Seconds between points
    pub interval: u32,
    #[serde(default)]
    pub unit: String,
    pub mtype: String,
    /// `key=value` pairs
    #[serde(default)]
    pub tags: Vec<String>,
    /// Unix seconds of the most recent datapoint
    #[serde(default)]
    pub last_update: i64,
    /// Shard assignment, opaque to the index
    #[serde(default)]
    pub partition: i32,
}

impl MetricDefinition {
    /// Create a gauge definition with required fields
    pub fn new(name: impl Into<String>, tenant_id: u32, interval: u32) -> Self {
        Self {
            name: name.into(),
            tenant_id,
            interval,
            unit: String::new(),
            mtype: Mtype::Gauge.as_str().to_string(),
            tags: Vec::new(),
            last_update: 0,
            partition: 0,
        }
    }

    /// Builder method: add a tag
    pub fn tag(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.tags.push(format!("{}={}", key.as_ref(), value.as_ref()));
        self
    }

    /// Builder method: set the last update timestamp
    pub fn last_update(mut self, ts: i64) -> Self {
        self.last_update = ts;
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn mtype(mut self, mtype: Mtype) -> Self {
        self.mtype = mtype.as_str().to_string();
        self
    }

    /// Check every field the index relies on
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tenant_id == 0 {
            return Err(ValidationError::ZeroTenant);
        }
        if self.interval == 0 {
            return Err(ValidationError::ZeroInterval);
        }
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        self.mtype.parse::<Mtype>()?;

        let mut seen = HashSet::with_capacity(self.tags.len());
        for tag in &self.tags {
            let (key, _) = parse_tag(tag)?;
            if !seen.insert(key) {
                return Err(ValidationError::DuplicateTagKey(key.to_string()));
            }
        }
        Ok(())
    }

    /// Tags sorted, with any `name=` tag removed
    pub fn sorted_tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self
            .tags
            .iter()
            .map(String::as_str)
            .filter(|t| !is_name_tag(t))
            .collect();
        tags.sort_unstable();
        tags
    }

    /// Identity string the key hash is computed over
    pub fn identity(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.name.len() + self.unit.len() + 32);
        buf.extend_from_slice(self.name.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.unit.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.mtype.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.interval.to_string().as_bytes());
        for tag in self.sorted_tags() {
            buf.push(0);
            buf.extend_from_slice(tag.as_bytes());
        }
        buf
    }

    pub fn key(&self) -> MetricKey {
        MetricKey::from_identity(&self.identity(), self.tenant_id)
    }

    /// `name;tag1=v1;tag2=v2` with tags sorted
    pub fn name_with_tags(&self) -> String {
        let mut out = self.name.clone();
        for tag in self.sorted_tags() {
            out.push(';');
            out.push_str(tag);
        }
        out
    }

    /// Iterate `(key, value)` pairs, skipping malformed and `name` tags
    pub fn tag_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .filter_map(|t| t.split_once('='))
            .filter(|(k, _)| *k != NAME_TAG)
    }

    /// Value of tag `key`; `name` resolves to the metric name
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        if key == NAME_TAG {
            return Some(&self.name);
        }
        self.tag_pairs().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

fn is_name_tag(tag: &str) -> bool {
    tag.strip_prefix(NAME_TAG)
        .map(|rest| rest.starts_with('='))
        .unwrap_or(false)
}

/// Split and validate a `key=value` tag
pub fn parse_tag(tag: &str) -> Result<(&str, &str), ValidationError> {
    let invalid = || ValidationError::InvalidTag(tag.to_string());
    let (key, value) = tag.split_once('=').ok_or_else(invalid)?;

    if !valid_tag_key(key) || !valid_tag_value(value) {
        return Err(invalid());
    }
    Ok((key, value))
}

pub fn valid_tag_key(key: &str) -> bool {
    !key.is_empty() && !key.contains([';', '!', '^', '='])
}

pub fn valid_tag_value(value: &str) -> bool {
    !value.is_empty() && !value.starts_with('~') && !value.contains(';')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ok() {
        let def = MetricDefinition::new("a.b.c", 1, 10).tag("host", "web1");
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validate_errors() {
        assert_eq!(
            MetricDefinition::new("a", 0, 10).validate(),
            Err(ValidationError::ZeroTenant)
        );
        assert_eq!(
            MetricDefinition::new("a", 1, 0).validate(),
            Err(ValidationError::ZeroInterval)
        );
        assert_eq!(
            MetricDefinition::new("", 1, 10).validate(),
            Err(ValidationError::EmptyName)
        );

        let mut def = MetricDefinition::new("a", 1, 10);
        def.mtype = "histogram".to_string();
        assert!(matches!(def.validate(), Err(ValidationError::InvalidMtype(_))));

        def.mtype = String::new();
        assert!(matches!(def.validate(), Err(ValidationError::InvalidMtype(_))));
    }

    #[test]
    fn test_tag_validation() {
        for bad in ["novalue", "=v", "k=", "k;x=v", "k!=v", "k^=v", "k=~v", "k=a;b"] {
            let mut def = MetricDefinition::new("a", 1, 10);
            def.tags.push(bad.to_string());
            assert!(
                matches!(def.validate(), Err(ValidationError::InvalidTag(_))),
                "{} should be rejected",
                bad
            );
        }

        let def = MetricDefinition::new("a", 1, 10).tag("k", "v=w");
        assert!(def.validate().is_ok());

        let dup = MetricDefinition::new("a", 1, 10).tag("k", "1").tag("k", "2");
        assert_eq!(
            dup.validate(),
            Err(ValidationError::DuplicateTagKey("k".to_string()))
        );
    }

    #[test]
    fn test_key_ignores_tag_order() {
        let a = MetricDefinition::new("m", 1, 10).tag("a", "1").tag("b", "2");
        let b = MetricDefinition::new("m", 1, 10).tag("b", "2").tag("a", "1");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_depends_on_identity_fields() {
        let base = MetricDefinition::new("m", 1, 10);

        assert_ne!(base.key(), MetricDefinition::new("m", 1, 60).key());
        assert_ne!(base.key(), base.clone().unit("ms").key());
        assert_ne!(base.key(), base.clone().mtype(Mtype::Rate).key());
        assert_ne!(base.key(), base.clone().tag("a", "1").key());

        // freshness and partition are not part of identity
        let mut moved = base.clone().last_update(500);
        moved.partition = 3;
        assert_eq!(base.key(), moved.key());
    }

    #[test]
    fn test_name_tag_excluded_from_identity() {
        let plain = MetricDefinition::new("m", 1, 10);
        let named = MetricDefinition::new("m", 1, 10).tag("name", "m");

        assert_eq!(plain.key(), named.key());
        assert_eq!(named.name_with_tags(), "m");
    }

    #[test]
    fn test_name_with_tags_sorted() {
        let def = MetricDefinition::new("cpu.user", 1, 10)
            .tag("zone", "a")
            .tag("host", "h1");
        assert_eq!(def.name_with_tags(), "cpu.user;host=h1;zone=a");
    }

    #[test]
    fn test_tag_value() {
        let def = MetricDefinition::new("cpu", 1, 10).tag("host", "h1");
        assert_eq!(def.tag_value("host"), Some("h1"));
        assert_eq!(def.tag_value("name"), Some("cpu"));
        assert_eq!(def.tag_value("zone"), None);
    }

    #[test]
    fn test_json_shape() {
        let json = r#"{"name":"a.b","tenant_id":4,"interval":10,"mtype":"rate","tags":["x=y"]}"#;
        let def: MetricDefinition = serde_json::from_str(json).unwrap();

        assert_eq!(def.tenant_id, 4);
        assert_eq!(def.unit, "");
        assert_eq!(def.last_update, 0);
        assert!(def.validate().is_ok());
    }
}
