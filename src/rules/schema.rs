//! Retention and aggregation classification
//!
//! Both rule sets are matched against `name;tag1=v1;tag2=v2` (tags sorted)
//! with a first-match-else-default policy. The index only computes the id;
//! the storage layer owns what a schema or aggregation means.

use regex::Regex;

/// Anything classified by a regex over `name;tags`
pub trait Classified {
    fn pattern(&self) -> Option<&Regex>;
}

/// Retention schema
#[derive(Debug, Clone)]
pub struct Schema {
    pub name: String,
    pub pattern: Option<Regex>,
    /// Retention string handed to storage as-is, e.g. `1s:35d:10min:7`
    pub retentions: String,
}

impl Classified for Schema {
    fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            pattern: None,
            retentions: "1s:35d:10min:7".to_string(),
        }
    }
}

/// Rollup aggregation settings
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub name: String,
    pub pattern: Option<Regex>,
    pub x_files_factor: f64,
    pub methods: Vec<String>,
}

impl Classified for Aggregation {
    fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }
}

impl Default for Aggregation {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            pattern: None,
            x_files_factor: 0.5,
            methods: vec!["avg".to_string()],
        }
    }
}

/// Ordered rule list with a default at id `len()`
#[derive(Debug, Clone)]
pub struct Classifier<T> {
    entries: Vec<T>,
    default: T,
}

pub type SchemaRules = Classifier<Schema>;
pub type AggregationRules = Classifier<Aggregation>;

impl<T: Classified + Default> Default for Classifier<T> {
    fn default() -> Self {
        Self::new(Vec::new(), T::default())
    }
}

impl<T: Classified> Classifier<T> {
    pub fn new(entries: Vec<T>, default: T) -> Self {
        Self { entries, default }
    }

    /// Id of the first entry matching `name_with_tags`
    ///
    /// An entry without a pattern matches everything.
    pub fn resolve(&self, name_with_tags: &str) -> u16 {
        self.entries
            .iter()
            .position(|e| e.pattern().map_or(true, |p| p.is_match(name_with_tags)))
            .unwrap_or(self.entries.len()) as u16
    }

    pub fn get(&self, id: u16) -> &T {
        self.entries.get(id as usize).unwrap_or(&self.default)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
