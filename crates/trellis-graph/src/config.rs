//! Graph and service configuration
//!
//! Graphs are declared through `TRELLIS_GRAPH_<NAME>_<PART>` variables, where
//! the part is one of `ID`, `SCHEMA` (comma-separated schema files),
//! `PROPERTIES` (a store properties file) or `PARENT` (another graph name).

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

use trellis_core::{Schema, StoreProperties};
use trellis_monitoring::MonitoringConfig;

use crate::error::{GraphError, GraphResult};

/// Prefix of graph configuration variables
pub const GRAPH_PREFIX: &str = "TRELLIS_GRAPH_";
const ID_SUFFIX: &str = "_ID";
const SCHEMA_SUFFIX: &str = "_SCHEMA";
const PROPERTIES_SUFFIX: &str = "_PROPERTIES";
const PARENT_SUFFIX: &str = "_PARENT";

/// Where the parts of one graph come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphConfig {
    /// Graph id reported by the store
    pub graph_id: String,
    /// Schema files, merged in order
    pub schema_paths: Vec<PathBuf>,
    /// Store properties file
    pub properties_path: Option<PathBuf>,
    /// Graph whose schema and properties this one extends
    pub parent_graph: Option<String>,
}

impl GraphConfig {
    /// A configuration for a graph id without any files
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            ..Self::default()
        }
    }

    /// Add a schema file
    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_paths.push(path.into());
        self
    }

    /// Set the store properties file
    pub fn with_properties_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.properties_path = Some(path.into());
        self
    }

    /// Extend another graph
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_graph = Some(parent.into());
        self
    }

    /// Load and merge the schema files; `None` when there are none
    pub fn load_schema(&self) -> GraphResult<Option<Schema>> {
        if self.schema_paths.is_empty() {
            return Ok(None);
        }
        Ok(Some(Schema::from_paths(&self.schema_paths)?))
    }

    /// Load the store properties file; `None` when there is none
    pub fn load_properties(&self) -> GraphResult<Option<StoreProperties>> {
        match &self.properties_path {
            Some(path) => Ok(Some(StoreProperties::from_path(path)?)),
            None => Ok(None),
        }
    }
}

#[derive(Default)]
struct GraphParts {
    graph_id: Option<String>,
    schema_paths: Option<Vec<PathBuf>>,
    properties_path: Option<PathBuf>,
    parent_graph: Option<String>,
}

fn set_once<T>(slot: &mut Option<T>, value: T, part: &str, graph: &str) -> GraphResult<()> {
    if slot.is_some() {
        return Err(GraphError::Configuration(format!(
            "{} for graph {} has already been defined",
            part, graph
        )));
    }
    *slot = Some(value);
    Ok(())
}

/// Graph configurations keyed by graph name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphConfigs {
    graphs: BTreeMap<String, GraphConfig>,
}

impl GraphConfigs {
    /// Read graph configurations from the process environment
    pub fn from_env() -> GraphResult<Self> {
        Self::from_vars(env::vars())
    }

    /// Read graph configurations from `(name, value)` pairs
    ///
    /// Variables without the graph prefix are ignored. Defining a part twice,
    /// an unknown part, or a graph without an id is an error.
    pub fn from_vars<I, K, V>(vars: I) -> GraphResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut parts: BTreeMap<String, GraphParts> = BTreeMap::new();
        for (key, value) in vars {
            let (key, value) = (key.as_ref(), value.as_ref());
            let Some(rest) = key.strip_prefix(GRAPH_PREFIX) else {
                continue;
            };
            let split = |suffix: &str| {
                rest.strip_suffix(suffix)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
            };

            if let Some(name) = split(ID_SUFFIX) {
                let graph = parts.entry(name.clone()).or_default();
                set_once(&mut graph.graph_id, value.to_string(), "Graph id", &name)?;
            } else if let Some(name) = split(SCHEMA_SUFFIX) {
                let paths = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .collect();
                let graph = parts.entry(name.clone()).or_default();
                set_once(&mut graph.schema_paths, paths, "Schema", &name)?;
            } else if let Some(name) = split(PROPERTIES_SUFFIX) {
                let graph = parts.entry(name.clone()).or_default();
                set_once(&mut graph.properties_path, PathBuf::from(value), "Properties", &name)?;
            } else if let Some(name) = split(PARENT_SUFFIX) {
                let graph = parts.entry(name.clone()).or_default();
                set_once(&mut graph.parent_graph, value.to_string(), "Parent graph", &name)?;
            } else {
                return Err(GraphError::Configuration(format!(
                    "Invalid graph variable: {}",
                    key
                )));
            }
        }

        let mut graphs = BTreeMap::new();
        for (name, part) in parts {
            let graph_id = part.graph_id.ok_or_else(|| GraphError::MissingPart {
                graph: name.clone(),
                part: "graph id",
            })?;
            graphs.insert(
                name,
                GraphConfig {
                    graph_id,
                    schema_paths: part.schema_paths.unwrap_or_default(),
                    properties_path: part.properties_path,
                    parent_graph: part.parent_graph,
                },
            );
        }
        info!(graphs = graphs.len(), "Loaded graph configurations");
        Ok(Self { graphs })
    }

    /// Add or replace a configuration
    pub fn insert(&mut self, name: impl Into<String>, config: GraphConfig) {
        self.graphs.insert(name.into(), config);
    }

    /// A configuration by graph name
    pub fn get(&self, name: &str) -> Option<&GraphConfig> {
        self.graphs.get(name)
    }

    /// Number of graphs
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// Check if no graph is configured
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Iterate in graph name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &GraphConfig)> {
        self.graphs.iter()
    }
}

/// Default bound of the chunked result channel
pub const DEFAULT_CHUNK_CHANNEL_SIZE: usize = 64;

/// Operation service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Log level filter
    pub log_level: String,
    /// Emit JSON log lines
    pub json_logs: bool,
    /// Bound of the chunked result channel
    pub chunk_channel_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            chunk_channel_size: DEFAULT_CHUNK_CHANNEL_SIZE,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_vars(env::vars())
    }

    /// Load configuration from `(name, value)` pairs, keeping defaults for
    /// missing or invalid values
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                "TRELLIS_LOG_LEVEL" => config.log_level = value.to_string(),
                "TRELLIS_JSON_LOGS" => match value.parse::<bool>() {
                    Ok(json_logs) => config.json_logs = json_logs,
                    Err(_) => warn!("Invalid TRELLIS_JSON_LOGS value: {}", value),
                },
                "TRELLIS_CHUNK_CHANNEL_SIZE" => match value.parse::<usize>() {
                    Ok(size) if size > 0 => config.chunk_channel_size = size,
                    _ => warn!("Invalid TRELLIS_CHUNK_CHANNEL_SIZE value: {}", value),
                },
                _ => {}
            }
        }
        config
    }

    /// Monitoring settings derived from this configuration
    pub fn monitoring(&self) -> MonitoringConfig {
        MonitoringConfig {
            log_filter: self.log_level.clone(),
            enable_json_logging: self.json_logs,
            ..MonitoringConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_graph_parts_are_collected_by_name() {
        let configs = GraphConfigs::from_vars(vars(&[
            ("PATH", "/usr/bin"),
            ("TRELLIS_GRAPH_PEOPLE_ID", "people"),
            ("TRELLIS_GRAPH_PEOPLE_SCHEMA", "a.json, b.yaml"),
            ("TRELLIS_GRAPH_PEOPLE_PROPERTIES", "store.json"),
            ("TRELLIS_GRAPH_FRIENDS_ID", "friends"),
            ("TRELLIS_GRAPH_FRIENDS_PARENT", "PEOPLE"),
        ]))
        .unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(
            configs.get("PEOPLE").unwrap(),
            &GraphConfig::new("people")
                .with_schema_path("a.json")
                .with_schema_path("b.yaml")
                .with_properties_path("store.json")
        );
        assert_eq!(
            configs.get("FRIENDS").unwrap(),
            &GraphConfig::new("friends").with_parent("PEOPLE")
        );
    }

    #[test]
    fn test_duplicate_part_is_rejected() {
        let err = GraphConfigs::from_vars(vars(&[
            ("TRELLIS_GRAPH_A_ID", "a"),
            ("TRELLIS_GRAPH_A_ID", "b"),
        ]))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Graph id for graph A has already been defined"
        );
    }

    #[test]
    fn test_unknown_part_is_rejected() {
        let err = GraphConfigs::from_vars(vars(&[("TRELLIS_GRAPH_A_COLOUR", "red")])).unwrap_err();
        assert_eq!(
            err,
            GraphError::Configuration("Invalid graph variable: TRELLIS_GRAPH_A_COLOUR".to_string())
        );
    }

    #[test]
    fn test_graph_without_id_is_rejected() {
        let err =
            GraphConfigs::from_vars(vars(&[("TRELLIS_GRAPH_A_SCHEMA", "a.json")])).unwrap_err();
        assert!(matches!(err, GraphError::MissingPart { part: "graph id", .. }));
    }

    #[test]
    fn test_service_config_keeps_defaults_on_bad_values() {
        let config = ServiceConfig::from_vars(vars(&[
            ("TRELLIS_LOG_LEVEL", "debug"),
            ("TRELLIS_JSON_LOGS", "maybe"),
            ("TRELLIS_CHUNK_CHANNEL_SIZE", "0"),
        ]));
        assert_eq!(config.log_level, "debug");
        assert!(!config.json_logs);
        assert_eq!(config.chunk_channel_size, DEFAULT_CHUNK_CHANNEL_SIZE);

        let config = ServiceConfig::from_vars(vars(&[
            ("TRELLIS_JSON_LOGS", "true"),
            ("TRELLIS_CHUNK_CHANNEL_SIZE", "8"),
        ]));
        assert!(config.json_logs);
        assert_eq!(config.chunk_channel_size, 8);
        assert!(config.monitoring().enable_json_logging);
    }
}
