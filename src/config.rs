//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.
//!
//! The file form holds plain strings; `IndexConfig::from_config` compiles
//! it into the runtime value the index is built from.

use crate::index::IndexConfig;
use crate::rules::{
    Aggregation, AggregationRules, IndexRule, IndexRules, Schema, SchemaRules,
};
use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::digit1;
use nom::combinator::{all_consuming, map_res, value};
use nom::multi::many1;
use nom::sequence::pair;
use nom::IResult;
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexSettings,

    #[serde(default)]
    pub schemas: Vec<SchemaSettings>,

    #[serde(default)]
    pub aggregations: Vec<AggregationSettings>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[index]` section
#[derive(Debug, Clone, Deserialize)]
pub struct IndexSettings {
    #[serde(default = "default_tag_support")]
    pub tag_support: bool,

    /// 0 disables the public overlay
    #[serde(default)]
    pub public_tenant_id: u32,

    #[serde(default = "default_prune_interval")]
    pub prune_interval: String,

    #[serde(default)]
    pub rules: Vec<IndexRuleSettings>,

    #[serde(default)]
    pub default_rule: IndexRuleSettings,
}

fn default_tag_support() -> bool {
    true
}

fn default_prune_interval() -> String {
    "3h".to_string()
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            tag_support: default_tag_support(),
            public_tenant_id: 0,
            prune_interval: default_prune_interval(),
            rules: Vec::new(),
            default_rule: IndexRuleSettings::default(),
        }
    }
}

/// `[[index.rules]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct IndexRuleSettings {
    #[serde(default = "default_rule_name")]
    pub name: String,

    /// Regex over the metric name; empty matches everything
    #[serde(default)]
    pub pattern: String,

    /// `0` never prunes
    #[serde(default = "default_max_stale")]
    pub max_stale: String,
}

fn default_rule_name() -> String {
    "default".to_string()
}

fn default_max_stale() -> String {
    "0".to_string()
}

impl Default for IndexRuleSettings {
    fn default() -> Self {
        Self {
            name: default_rule_name(),
            pattern: String::new(),
            max_stale: default_max_stale(),
        }
    }
}

/// `[[schemas]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaSettings {
    pub name: String,

    /// Regex over `name;tags`; empty matches everything
    #[serde(default)]
    pub pattern: String,

    #[serde(default = "default_retentions")]
    pub retentions: String,
}

fn default_retentions() -> String {
    Schema::default().retentions
}

/// `[[aggregations]]` entry
#[derive(Debug, Clone, Deserialize)]
pub struct AggregationSettings {
    pub name: String,

    #[serde(default)]
    pub pattern: String,

    #[serde(default = "default_x_files_factor")]
    pub x_files_factor: f64,

    #[serde(default = "default_methods")]
    pub methods: Vec<String>,
}

fn default_x_files_factor() -> f64 {
    0.5
}

fn default_methods() -> Vec<String> {
    vec!["avg".to_string()]
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("metric-index").join("config.toml")),
            Some(PathBuf::from("/etc/metric-index/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Index overrides
        if let Ok(enabled) = std::env::var("METRIC_INDEX_TAG_SUPPORT") {
            if let Ok(b) = enabled.parse() {
                self.index.tag_support = b;
            }
        }
        if let Ok(tenant) = std::env::var("METRIC_INDEX_PUBLIC_TENANT") {
            if let Ok(id) = tenant.parse() {
                self.index.public_tenant_id = id;
            }
        }
        if let Ok(interval) = std::env::var("METRIC_INDEX_PRUNE_INTERVAL") {
            self.index.prune_interval = interval;
        }

        // Logging overrides
        if let Ok(level) = std::env::var("METRIC_INDEX_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("METRIC_INDEX_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: IndexSettings::default(),
            schemas: Vec::new(),
            aggregations: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid rule {name:?}: {error}")]
    InvalidRule { name: String, error: String },

    #[error("Invalid duration: {0:?}")]
    InvalidDuration(String),
}

fn duration_part(input: &str) -> IResult<&str, u64> {
    let unit = alt((
        value(60, tag("min")),
        value(1, tag("s")),
        value(60, tag("m")),
        value(3_600, tag("h")),
        value(86_400, tag("d")),
        value(7 * 86_400, tag("w")),
        value(365 * 86_400, tag("y")),
    ));
    let (rest, (count, secs)) = pair(map_res(digit1, str::parse::<u64>), unit)(input)?;
    Ok((rest, count.saturating_mul(secs)))
}

/// Parse a duration such as `30s`, `15m`, `6h`, `7d`, `2w`, `1y` or `1h30m`
///
/// A bare `0` is accepted and means zero.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }

    all_consuming(many1(duration_part))(trimmed)
        .map(|(_, parts)| Duration::from_secs(parts.into_iter().fold(0, u64::saturating_add)))
        .map_err(|_| ConfigError::InvalidDuration(input.to_string()))
}

/// Compile an optional regex; empty means "match everything"
fn compile_pattern(name: &str, pattern: &str) -> Result<Option<Regex>, ConfigError> {
    if pattern.is_empty() {
        return Ok(None);
    }
    Regex::new(pattern)
        .map(Some)
        .map_err(|e| ConfigError::InvalidRule {
            name: name.to_string(),
            error: e.to_string(),
        })
}

fn compile_index_rule(settings: &IndexRuleSettings) -> Result<IndexRule, ConfigError> {
    let max_stale = parse_duration(&settings.max_stale)?;
    Ok(match compile_pattern(&settings.name, &settings.pattern)? {
        Some(pattern) => IndexRule::new(&settings.name, pattern, max_stale),
        None => IndexRule::catch_all(&settings.name, max_stale),
    })
}

impl IndexConfig {
    /// Compile file settings into the runtime configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let rules = config
            .index
            .rules
            .iter()
            .map(compile_index_rule)
            .collect::<Result<Vec<_>, _>>()?;
        let default_rule = compile_index_rule(&config.index.default_rule)?;

        let schemas = config
            .schemas
            .iter()
            .map(|s| {
                Ok(Schema {
                    name: s.name.clone(),
                    pattern: compile_pattern(&s.name, &s.pattern)?,
                    retentions: s.retentions.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let aggregations = config
            .aggregations
            .iter()
            .map(|a| {
                Ok(Aggregation {
                    name: a.name.clone(),
                    pattern: compile_pattern(&a.name, &a.pattern)?,
                    x_files_factor: a.x_files_factor,
                    methods: a.methods.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            tag_support: config.index.tag_support,
            public_tenant_id: config.index.public_tenant_id,
            rules: IndexRules::new(rules, default_rule),
            schemas: SchemaRules::new(schemas, Schema::default()),
            aggregations: AggregationRules::new(aggregations, Aggregation::default()),
            prune_interval: parse_duration(&config.index.prune_interval)?,
        })
    }
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Metric Index Configuration
#
# Environment variables override these settings:
# - METRIC_INDEX_TAG_SUPPORT
# - METRIC_INDEX_PUBLIC_TENANT
# - METRIC_INDEX_PRUNE_INTERVAL
# - METRIC_INDEX_LOG_LEVEL
# - METRIC_INDEX_LOG_FORMAT

[index]
# Maintain tag indexes for tag queries
tag_support = true

# Tenant whose series are visible to every tenant (0 disables)
public_tenant_id = 0

# How often the background prune runs
prune_interval = "3h"

# Staleness rules, first match on the metric name wins
# [[index.rules]]
# name = "longterm"
# pattern = "^longterm\\."
# max_stale = "1y"

[index.default_rule]
name = "default"
# 0 never prunes
max_stale = "0"

# Retention schemas, matched against "name;tag1=v1;tag2=v2"
# [[schemas]]
# name = "high_res"
# pattern = ";res=high(;|$)"
# retentions = "1s:1d:10min:2"

# Rollup aggregations, matched against "name;tag1=v1;tag2=v2"
# [[aggregations]]
# name = "counters"
# pattern = "\\.count$"
# x_files_factor = 0.0
# methods = ["sum"]

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
