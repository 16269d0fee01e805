//! Explicit registry of graphs and the store factories that build them
//!
//! A graph with a parent inherits the parent's schema, merged under its own,
//! and the parent's store properties, overridden by its own.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::info;

use trellis_core::{CoreError, Schema, Store, StoreProperties};
use trellis_store_inmemory::{MapStore, MAP_STORE_TYPE};

use crate::config::{GraphConfig, GraphConfigs};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;

/// Builds a store for a graph id, schema and properties
pub type StoreFactory =
    Arc<dyn Fn(&str, Schema, &StoreProperties) -> Result<Arc<dyn Store>, CoreError> + Send + Sync>;

/// The resolved parts of a graph before parent inheritance
#[derive(Debug, Clone, Default)]
pub struct GraphParts {
    /// Graph id
    pub graph_id: String,
    /// Own schema, if any
    pub schema: Option<Schema>,
    /// Own store properties, if any
    pub properties: Option<StoreProperties>,
    /// Parent graph name
    pub parent_graph: Option<String>,
}

impl GraphParts {
    /// Load the files named by a configuration
    pub fn load(config: &GraphConfig) -> GraphResult<Self> {
        Ok(Self {
            graph_id: config.graph_id.clone(),
            schema: config.load_schema()?,
            properties: config.load_properties()?,
            parent_graph: config.parent_graph.clone(),
        })
    }
}

/// Graphs by name
pub struct GraphRegistry {
    factories: HashMap<String, StoreFactory>,
    graphs: DashMap<String, Arc<Graph>>,
}

impl GraphRegistry {
    /// A registry without store factories
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            graphs: DashMap::new(),
        }
    }

    /// A registry that can build in-memory map stores
    pub fn with_default_factories() -> Self {
        let mut registry = Self::new();
        registry.register_factory(
            MAP_STORE_TYPE,
            Arc::new(
                |graph_id: &str,
                 schema: Schema,
                 properties: &StoreProperties|
                 -> Result<Arc<dyn Store>, CoreError> {
                    Ok(Arc::new(MapStore::new(graph_id, schema, properties)?))
                },
            ),
        );
        registry
    }

    /// Register a factory for a store type
    pub fn register_factory(&mut self, store_type: impl Into<String>, factory: StoreFactory) {
        self.factories.insert(store_type.into(), factory);
    }

    /// Build and register a graph
    pub fn add(&self, name: &str, parts: GraphParts) -> GraphResult<Arc<Graph>> {
        if self.graphs.contains_key(name) {
            return Err(GraphError::AlreadyExists(name.to_string()));
        }

        let (schema, properties) = match &parts.parent_graph {
            Some(parent_name) => {
                let parent = self.get(parent_name)?;
                let schema = match parts.schema {
                    Some(own) => Schema::merge(parent.schema(), &own)?,
                    None => parent.schema().clone(),
                };
                let properties = match &parts.properties {
                    Some(own) => parent.properties().overridden_by(own),
                    None => parent.properties().clone(),
                };
                (schema, properties)
            }
            None => {
                let schema = parts.schema.ok_or_else(|| GraphError::MissingPart {
                    graph: name.to_string(),
                    part: "schema",
                })?;
                let properties = parts.properties.ok_or_else(|| GraphError::MissingPart {
                    graph: name.to_string(),
                    part: "store properties",
                })?;
                (schema, properties)
            }
        };

        let factory = self
            .factories
            .get(&properties.store_type)
            .ok_or_else(|| GraphError::UnknownStoreType(properties.store_type.clone()))?;
        let store = (factory.as_ref())(&parts.graph_id, schema, &properties)?;
        let graph = Arc::new(Graph::new(store, properties));

        match self.graphs.entry(name.to_string()) {
            Entry::Occupied(_) => Err(GraphError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                info!(
                    graph = name,
                    graph_id = %graph.graph_id(),
                    parent = ?parts.parent_graph,
                    "Registered graph"
                );
                slot.insert(Arc::clone(&graph));
                Ok(graph)
            }
        }
    }

    /// Build and register every configured graph, parents before children
    pub fn add_all(&self, configs: &GraphConfigs) -> GraphResult<()> {
        let mut pending: Vec<(&String, &GraphConfig)> = configs.iter().collect();
        while !pending.is_empty() {
            let (ready, waiting): (Vec<_>, Vec<_>) = pending.into_iter().partition(|(_, config)| {
                config
                    .parent_graph
                    .as_deref()
                    .map_or(true, |parent| self.graphs.contains_key(parent))
            });
            if ready.is_empty() {
                let names: BTreeSet<&str> = waiting.iter().map(|(name, _)| name.as_str()).collect();
                return Err(GraphError::Configuration(format!(
                    "parent graphs of {:?} are missing or cyclic",
                    names
                )));
            }
            for (name, config) in ready {
                self.add(name, GraphParts::load(config)?)?;
            }
            pending = waiting;
        }
        Ok(())
    }

    /// A graph by name
    pub fn get(&self, name: &str) -> GraphResult<Arc<Graph>> {
        self.graphs
            .get(name)
            .map(|graph| Arc::clone(graph.value()))
            .ok_or_else(|| GraphError::NotFound(name.to_string()))
    }

    /// Registered graph names, sorted
    pub fn graph_names(&self) -> BTreeSet<String> {
        self.graphs.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl Default for GraphRegistry {
    fn default() -> Self {
        Self::with_default_factories()
    }
}
