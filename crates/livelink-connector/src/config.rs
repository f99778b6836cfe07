//! Connector configuration types.
//!
//! Provides two layers:
//! - [`ConnectorConfig`]: Key-value configuration with validation
//! - [`ConfigKeySpec`]: Specification for a configuration key
//! - [`LivelinkConfig`]: The typed traversal configuration parsed from it

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::date_format;
use crate::error::ConnectorError;
use crate::genealogist::GenealogistKind;
use crate::queries::Dialect;
use crate::repository::{CandidateFilter, LocationFilter};

/// Configuration for a connector instance.
///
/// Connectors receive their configuration as a string key-value map,
/// typically loaded from a configuration file or set programmatically.
#[derive(Debug, Clone, Default)]
pub struct ConnectorConfig {
    /// The connector type identifier (e.g., "livelink").
    connector_type: String,

    /// Configuration properties.
    properties: HashMap<String, String>,
}

impl ConnectorConfig {
    /// Creates a new connector config with the given type.
    #[must_use]
    pub fn new(connector_type: impl Into<String>) -> Self {
        Self {
            connector_type: connector_type.into(),
            properties: HashMap::new(),
        }
    }

    /// Creates a config from existing properties.
    #[must_use]
    pub fn with_properties(
        connector_type: impl Into<String>,
        properties: HashMap<String, String>,
    ) -> Self {
        Self {
            connector_type: connector_type.into(),
            properties,
        }
    }

    /// Returns the connector type identifier.
    #[must_use]
    pub fn connector_type(&self) -> &str {
        &self.connector_type
    }

    /// Sets a configuration property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Gets a configuration property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Gets a required configuration property, returning an error if missing.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` if the key is not set.
    pub fn require(&self, key: &str) -> Result<&str, ConnectorError> {
        self.get(key)
            .ok_or_else(|| ConnectorError::MissingConfig(key.to_string()))
    }

    /// Gets a property parsed as the given type.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if the value cannot be parsed.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>, ConnectorError>
    where
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(v) => v.trim().parse::<T>().map(Some).map_err(|e| {
                ConnectorError::ConfigurationError(format!("invalid value for '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Gets a required property parsed as the given type.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` if the key is missing, or
    /// `ConnectorError::ConfigurationError` if parsing fails.
    pub fn require_parsed<T: FromStr>(&self, key: &str) -> Result<T, ConnectorError>
    where
        T::Err: fmt::Display,
    {
        let value = self.require(key)?;
        value.trim().parse::<T>().map_err(|e| {
            ConnectorError::ConfigurationError(format!("invalid value for '{key}': {e}"))
        })
    }

    /// Gets a comma-separated list property. Blank entries are skipped.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if an entry cannot be parsed.
    pub fn get_list<T: FromStr>(&self, key: &str) -> Result<Vec<T>, ConnectorError>
    where
        T::Err: fmt::Display,
    {
        let Some(value) = self.get(key) else {
            return Ok(Vec::new());
        };
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<T>().map_err(|e| {
                    ConnectorError::ConfigurationError(format!(
                        "invalid entry '{s}' in '{key}': {e}"
                    ))
                })
            })
            .collect()
    }

    /// Returns all properties as a reference.
    #[must_use]
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Returns properties with a given prefix, with the prefix stripped.
    #[must_use]
    pub fn properties_with_prefix(&self, prefix: &str) -> HashMap<String, String> {
        self.properties
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(prefix)
                    .map(|stripped| (stripped.to_string(), v.clone()))
            })
            .collect()
    }

    /// Validates the configuration against a set of key specifications.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::MissingConfig` for missing required keys.
    pub fn validate(&self, specs: &[ConfigKeySpec]) -> Result<(), ConnectorError> {
        for spec in specs {
            if spec.required && spec.default.is_none() && self.get(&spec.key).is_none() {
                return Err(ConnectorError::MissingConfig(spec.key.clone()));
            }
        }
        Ok(())
    }

    /// Returns keys that no specification mentions.
    #[must_use]
    pub fn unknown_keys(&self, specs: &[ConfigKeySpec]) -> Vec<String> {
        let mut unknown: Vec<String> = self
            .properties
            .keys()
            .filter(|k| !specs.iter().any(|s| &s.key == *k))
            .cloned()
            .collect();
        unknown.sort();
        unknown
    }
}

/// Specification for a configuration key.
///
/// Used by connectors to declare their expected configuration.
#[derive(Debug, Clone)]
pub struct ConfigKeySpec {
    /// The configuration key name.
    pub key: String,

    /// Human-readable description.
    pub description: String,

    /// Whether this key is required.
    pub required: bool,

    /// Default value if not provided.
    pub default: Option<String>,
}

impl ConfigKeySpec {
    /// Creates a required configuration key spec.
    #[must_use]
    pub fn required(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional configuration key spec with a default value.
    #[must_use]
    pub fn optional(
        key: impl Into<String>,
        description: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: false,
            default: Some(default.into()),
        }
    }

    /// Creates an optional configuration key spec that is unset by default.
    #[must_use]
    pub fn unset(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            required: false,
            default: None,
        }
    }
}

// ── Typed configuration ──

/// Default initial batch hint.
pub const DEFAULT_BATCH_SIZE: i64 = 100;

/// Default per-call traversal time budget.
pub const DEFAULT_BATCH_TIME: Duration = Duration::from_secs(60);

/// Default genealogist cache bounds.
pub const DEFAULT_CACHE_MIN: usize = 1000;
/// Default genealogist cache upper bound.
pub const DEFAULT_CACHE_MAX: usize = 32_000;

/// Columns fetched for result rows when `select.columns` is not set.
pub const DEFAULT_SELECT_COLUMNS: &[&str] = &[
    "DataID",
    "ModifyDate",
    "OwnerID",
    "ParentID",
    "SubType",
    "Name",
    "MimeType",
    "DataSize",
    "CreateDate",
    "UserID",
];

/// How the SQL dialect is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialectSetting {
    /// Probe the repository.
    #[default]
    Auto,
    /// Use the given dialect.
    Fixed(Dialect),
}

impl FromStr for DialectSetting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            Ok(DialectSetting::Auto)
        } else {
            s.parse().map(DialectSetting::Fixed)
        }
    }
}

/// Typed traversal configuration.
#[derive(Debug, Clone)]
pub struct LivelinkConfig {
    /// Initial insert position; items modified earlier are never traversed.
    pub start_date: Option<NaiveDateTime>,
    /// Location nodes whose descendants are indexed (empty = everything).
    pub included_location_nodes: Vec<i64>,
    /// Location nodes whose descendants are never indexed.
    pub excluded_location_nodes: Vec<i64>,
    /// Item subtypes never indexed.
    pub excluded_node_types: Vec<i64>,
    /// Volume subtypes whose contents are never indexed.
    pub excluded_volume_types: Vec<i64>,
    /// Initial batch hint.
    pub batch_size: i64,
    /// Whether delete events are reported.
    pub track_deleted_items: bool,
    /// Whether the ancestor-closure table is available.
    pub use_dtree_ancestors: bool,
    /// Genealogist strategy when the closure table is not used.
    pub genealogist: GenealogistKind,
    /// Genealogist cache preallocation.
    pub cache_min: usize,
    /// Genealogist cache capacity.
    pub cache_max: usize,
    /// SQL dialect.
    pub dialect: DialectSetting,
    /// Wall-clock budget per traversal call.
    pub batch_time: Duration,
    /// Columns fetched for result rows.
    pub select_columns: Vec<String>,
    /// Display URL pattern; `{id}` is replaced by the item id.
    pub display_url: Option<String>,
}

impl Default for LivelinkConfig {
    fn default() -> Self {
        Self {
            start_date: None,
            included_location_nodes: Vec::new(),
            excluded_location_nodes: Vec::new(),
            excluded_node_types: Vec::new(),
            excluded_volume_types: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            track_deleted_items: true,
            use_dtree_ancestors: false,
            genealogist: GenealogistKind::default(),
            cache_min: DEFAULT_CACHE_MIN,
            cache_max: DEFAULT_CACHE_MAX,
            dialect: DialectSetting::Auto,
            batch_time: DEFAULT_BATCH_TIME,
            select_columns: DEFAULT_SELECT_COLUMNS
                .iter()
                .map(ToString::to_string)
                .collect(),
            display_url: None,
        }
    }
}

impl LivelinkConfig {
    /// Parses configuration from a generic [`ConnectorConfig`].
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::ConfigurationError` if a value is invalid.
    pub fn from_config(config: &ConnectorConfig) -> Result<Self, ConnectorError> {
        let mut cfg = Self::default();

        if let Some(date) = config.get("start.date").map(str::trim) {
            if !date.is_empty() {
                cfg.start_date = Some(date_format::parse_start_date(date).ok_or_else(|| {
                    ConnectorError::ConfigurationError(format!("invalid start.date: {date}"))
                })?);
            }
        }
        cfg.included_location_nodes = config.get_list("included.location.nodes")?;
        cfg.excluded_location_nodes = config.get_list("excluded.location.nodes")?;
        cfg.excluded_node_types = config.get_list("excluded.node.types")?;
        cfg.excluded_volume_types = config.get_list("excluded.volume.types")?;

        if let Some(size) = config.get_parsed::<i64>("batch.size")? {
            cfg.batch_size = size;
        }
        if let Some(track) = config.get_parsed::<bool>("track.deleted.items")? {
            cfg.track_deleted_items = track;
        }
        if let Some(ancestors) = config.get_parsed::<bool>("use.dtree.ancestors")? {
            cfg.use_dtree_ancestors = ancestors;
        }
        if let Some(kind) = config.get("genealogist") {
            cfg.genealogist = kind.trim().parse().map_err(|e: String| {
                ConnectorError::ConfigurationError(format!("invalid genealogist: {e}"))
            })?;
        }
        if let Some(min) = config.get_parsed::<usize>("genealogist.cache.min")? {
            cfg.cache_min = min;
        }
        if let Some(max) = config.get_parsed::<usize>("genealogist.cache.max")? {
            cfg.cache_max = max;
        }
        if let Some(dialect) = config.get("sql.dialect") {
            cfg.dialect = dialect.trim().parse().map_err(|e: String| {
                ConnectorError::ConfigurationError(format!("invalid sql.dialect: {e}"))
            })?;
        }
        if let Some(ms) = config.get_parsed::<u64>("batch.time.ms")? {
            cfg.batch_time = Duration::from_millis(ms);
        }
        let columns: Vec<String> = config.get_list("select.columns")?;
        if !columns.is_empty() {
            cfg.select_columns = columns;
        }
        cfg.display_url = config
            .get("display.url")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConnectorError::InvalidBatchSize` for a negative batch
    /// size and `ConnectorError::ConfigurationError` for other inconsistent
    /// values.
    pub fn validate(&self) -> Result<(), ConnectorError> {
        if self.batch_size < 0 {
            return Err(ConnectorError::InvalidBatchSize(self.batch_size));
        }
        if self.cache_max == 0 {
            return Err(ConnectorError::ConfigurationError(
                "genealogist.cache.max must be positive".to_string(),
            ));
        }
        if self.cache_min > self.cache_max {
            return Err(ConnectorError::ConfigurationError(format!(
                "genealogist.cache.min ({}) exceeds genealogist.cache.max ({})",
                self.cache_min, self.cache_max
            )));
        }
        if self.batch_time.is_zero() {
            return Err(ConnectorError::ConfigurationError(
                "batch.time.ms must be positive".to_string(),
            ));
        }
        if let Some(ref url) = self.display_url {
            if !url.contains("{id}") {
                return Err(ConnectorError::ConfigurationError(format!(
                    "display.url must contain {{id}}: {url}"
                )));
            }
        }
        Ok(())
    }

    /// Candidate-query exclusions.
    ///
    /// Excluded volume types only apply when no included location nodes
    /// are configured.
    #[must_use]
    pub fn candidate_filter(&self) -> CandidateFilter {
        CandidateFilter {
            excluded_node_types: self.excluded_node_types.clone(),
            excluded_volume_types: if self.included_location_nodes.is_empty() {
                self.excluded_volume_types.clone()
            } else {
                Vec::new()
            },
        }
    }

    /// Location filter for the ancestor-closure table.
    ///
    /// Every node is listed as both `n` and `-n`: the closure table records
    /// the contents of a project-style volume under the negated id.
    #[must_use]
    pub fn location_filter(&self) -> LocationFilter {
        LocationFilter {
            included: with_negations(&self.included_location_nodes),
            excluded: with_negations(&self.excluded_location_nodes),
        }
    }

    /// Whether any location filtering is configured.
    #[must_use]
    pub fn has_location_filter(&self) -> bool {
        !self.included_location_nodes.is_empty() || !self.excluded_location_nodes.is_empty()
    }

    /// Result-row columns, with `DataID` and `ModifyDate` always present.
    #[must_use]
    pub fn result_columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.select_columns.len() + 2);
        for required in ["DataID", "ModifyDate"] {
            if !self
                .select_columns
                .iter()
                .any(|c| c.eq_ignore_ascii_case(required))
            {
                columns.push(required.to_string());
            }
        }
        columns.extend(self.select_columns.iter().cloned());
        columns
    }

    /// Returns the configuration keys this connector accepts.
    #[must_use]
    pub fn config_keys() -> Vec<ConfigKeySpec> {
        vec![
            ConfigKeySpec::unset(
                "start.date",
                "Initial insert position (yyyy-MM-dd or yyyy-MM-dd HH:mm:ss)",
            ),
            ConfigKeySpec::optional(
                "included.location.nodes",
                "Comma-separated node ids whose descendants are indexed",
                "",
            ),
            ConfigKeySpec::optional(
                "excluded.location.nodes",
                "Comma-separated node ids whose descendants are skipped",
                "",
            ),
            ConfigKeySpec::optional("excluded.node.types", "Subtypes never indexed", ""),
            ConfigKeySpec::optional(
                "excluded.volume.types",
                "Volume subtypes whose contents are never indexed",
                "",
            ),
            ConfigKeySpec::optional("batch.size", "Initial batch size hint", "100"),
            ConfigKeySpec::optional("track.deleted.items", "Report delete events", "true"),
            ConfigKeySpec::optional(
                "use.dtree.ancestors",
                "Filter through the ancestor-closure table",
                "false",
            ),
            ConfigKeySpec::optional("genealogist", "Genealogist: per-node or hybrid", "hybrid"),
            ConfigKeySpec::optional("genealogist.cache.min", "Cache preallocation", "1000"),
            ConfigKeySpec::optional("genealogist.cache.max", "Cache capacity", "32000"),
            ConfigKeySpec::optional("sql.dialect", "auto, sqlserver or oracle", "auto"),
            ConfigKeySpec::optional("batch.time.ms", "Traversal call budget", "60000"),
            ConfigKeySpec::unset("select.columns", "Columns fetched for result rows"),
            ConfigKeySpec::unset("display.url", "Display URL pattern with {id}"),
        ]
    }
}

fn with_negations(ids: &[i64]) -> Vec<i64> {
    let mut out = Vec::with_capacity(ids.len() * 2);
    for &id in ids {
        for n in [id, -id] {
            if !out.contains(&n) {
                out.push(n);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_basic_operations() {
        let mut config = ConnectorConfig::new("livelink");
        config.set("batch.size", "50");
        config.set("sql.dialect", "oracle");

        assert_eq!(config.connector_type(), "livelink");
        assert_eq!(config.get("batch.size"), Some("50"));
        assert_eq!(config.get("missing"), None);
        assert!(config.require("sql.dialect").is_ok());
        assert!(matches!(
            config.require("missing"),
            Err(ConnectorError::MissingConfig(_))
        ));
    }

    #[test]
    fn test_config_parsed() {
        let mut config = ConnectorConfig::new("livelink");
        config.set("batch.size", " 1000 ");
        config.set("bad_number", "not_a_number");

        let size: Option<i64> = config.get_parsed("batch.size").unwrap();
        assert_eq!(size, Some(1000));
        let missing: Option<i64> = config.get_parsed("missing").unwrap();
        assert_eq!(missing, None);
        assert!(config.get_parsed::<i64>("bad_number").is_err());

        let size: i64 = config.require_parsed("batch.size").unwrap();
        assert_eq!(size, 1000);
        assert!(config.require_parsed::<i64>("missing").is_err());
    }

    #[test]
    fn test_config_list() {
        let mut config = ConnectorConfig::new("livelink");
        config.set("ids", "2000, 42,,-7 ");
        config.set("bad", "1,x");

        assert_eq!(config.get_list::<i64>("ids").unwrap(), vec![2000, 42, -7]);
        assert!(config.get_list::<i64>("missing").unwrap().is_empty());
        assert!(config.get_list::<i64>("bad").is_err());
    }

    #[test]
    fn test_config_prefix_extraction() {
        let mut config = ConnectorConfig::new("livelink");
        config.set("genealogist.cache.min", "10");
        config.set("genealogist.cache.max", "20");
        config.set("batch.size", "5");

        let props = config.properties_with_prefix("genealogist.cache.");
        assert_eq!(props.len(), 2);
        assert_eq!(props.get("max"), Some(&"20".to_string()));
    }

    #[test]
    fn test_config_validate_specs() {
        let specs = vec![
            ConfigKeySpec::required("server", "Host"),
            ConfigKeySpec::optional("batch.size", "Batch size", "100"),
        ];
        let mut config = ConnectorConfig::new("livelink");
        config.set("server", "ll.example.com");
        config.set("colour", "blue");
        assert!(config.validate(&specs).is_ok());
        assert_eq!(config.unknown_keys(&specs), vec!["colour".to_string()]);

        assert!(ConnectorConfig::new("livelink").validate(&specs).is_err());
    }

    #[test]
    fn test_livelink_defaults() {
        let cfg = LivelinkConfig::from_config(&ConnectorConfig::new("livelink")).unwrap();
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert!(cfg.track_deleted_items);
        assert!(!cfg.use_dtree_ancestors);
        assert_eq!(cfg.genealogist, GenealogistKind::Batch);
        assert_eq!(cfg.dialect, DialectSetting::Auto);
        assert_eq!(cfg.cache_max, DEFAULT_CACHE_MAX);
        assert!(cfg.start_date.is_none());
        assert!(!cfg.has_location_filter());
    }

    #[test]
    fn test_livelink_from_config() {
        let mut config = ConnectorConfig::new("livelink");
        config.set("start.date", "2020-06-01");
        config.set("included.location.nodes", "2000,9000");
        config.set("excluded.node.types", "136");
        config.set("excluded.volume.types", "148,162");
        config.set("batch.size", "25");
        config.set("track.deleted.items", "false");
        config.set("use.dtree.ancestors", "true");
        config.set("genealogist", "per-node");
        config.set("sql.dialect", "sqlserver");
        config.set("batch.time.ms", "1500");
        config.set("select.columns", "Name,SubType");
        config.set("display.url", "http://ll/open/{id}");

        let cfg = LivelinkConfig::from_config(&config).unwrap();
        assert_eq!(
            cfg.start_date,
            date_format::parse("2020-06-01 00:00:00")
        );
        assert_eq!(cfg.included_location_nodes, vec![2000, 9000]);
        assert_eq!(cfg.batch_size, 25);
        assert!(!cfg.track_deleted_items);
        assert!(cfg.use_dtree_ancestors);
        assert_eq!(cfg.genealogist, GenealogistKind::PerNode);
        assert_eq!(cfg.dialect, DialectSetting::Fixed(Dialect::SqlServer));
        assert_eq!(cfg.batch_time, Duration::from_millis(1500));
        assert_eq!(
            cfg.result_columns(),
            vec!["DataID", "ModifyDate", "Name", "SubType"]
        );
        assert_eq!(cfg.display_url.as_deref(), Some("http://ll/open/{id}"));
    }

    #[test]
    fn test_volume_types_ignored_with_included_locations() {
        let mut cfg = LivelinkConfig {
            excluded_node_types: vec![136],
            excluded_volume_types: vec![148],
            ..LivelinkConfig::default()
        };
        assert_eq!(cfg.candidate_filter().excluded_volume_types, vec![148]);

        cfg.included_location_nodes = vec![2000];
        let filter = cfg.candidate_filter();
        assert!(filter.excluded_volume_types.is_empty());
        assert_eq!(filter.excluded_node_types, vec![136]);
    }

    #[test]
    fn test_livelink_invalid_values() {
        for (key, value) in [
            ("start.date", "June"),
            ("genealogist", "psychic"),
            ("sql.dialect", "db2"),
            ("genealogist.cache.min", "99999"),
            ("display.url", "http://ll/open"),
            ("batch.time.ms", "0"),
            ("track.deleted.items", "maybe"),
        ] {
            let mut config = ConnectorConfig::new("livelink");
            config.set(key, value);
            let err = LivelinkConfig::from_config(&config).unwrap_err();
            assert!(
                matches!(err, ConnectorError::ConfigurationError(_)),
                "{key}={value}: {err}"
            );
        }
    }

    #[test]
    fn test_negative_batch_size() {
        let mut config = ConnectorConfig::new("livelink");
        config.set("batch.size", "-5");
        let err = LivelinkConfig::from_config(&config).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidBatchSize(-5)), "{err}");
    }

    #[test]
    fn test_location_filter_lists_negated_ids() {
        let cfg = LivelinkConfig {
            included_location_nodes: vec![2000, 20],
            excluded_location_nodes: vec![30, -30],
            ..LivelinkConfig::default()
        };
        let filter = cfg.location_filter();
        assert_eq!(filter.included, vec![2000, -2000, 20, -20]);
        assert_eq!(filter.excluded, vec![30, -30]);
        assert!(LivelinkConfig::default().location_filter().included.is_empty());
    }

    #[test]
    fn test_config_keys_cover_parsed_keys() {
        let keys = LivelinkConfig::config_keys();
        for key in [
            "start.date",
            "batch.size",
            "genealogist",
            "sql.dialect",
            "display.url",
        ] {
            assert!(keys.iter().any(|k| k.key == key), "{key}");
        }
        assert!(keys.iter().all(|k| !k.required));
    }
}
