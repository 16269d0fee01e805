use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use trellis_core::operation::impls::{AddElements, GetAllElements, GetElements};
use trellis_core::serialisation::SerialiserRegistry;
use trellis_core::{CoreError, Element, HandlerRegistry, Schema, Store, StoreProperties, Value};

use crate::handlers::{AddElementsHandler, GetAllElementsHandler, GetElementsHandler};
use crate::key::KeyEncoder;
use crate::properties::MapStoreProperties;

/// Store type key of the map store
pub const MAP_STORE_TYPE: &str = "map";

/// Stored elements plus a vertex index
#[derive(Debug, Default)]
pub(crate) struct MapData {
    /// Elements by key; a key holds one element when aggregating
    pub(crate) elements: BTreeMap<Vec<u8>, Vec<Element>>,
    /// Keys of every element touching a vertex
    pub(crate) by_vertex: HashMap<Value, BTreeSet<Vec<u8>>>,
}

impl MapData {
    pub(crate) fn index(&mut self, key: &[u8], element: &Element) {
        for vertex in element.identifiers() {
            self.by_vertex
                .entry(vertex.clone())
                .or_default()
                .insert(key.to_vec());
        }
    }
}

/// State shared between a store and its handlers
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) data: RwLock<MapData>,
    pub(crate) serialisers: SerialiserRegistry,
    pub(crate) properties: MapStoreProperties,
    pub(crate) open_iterators: AtomicUsize,
}

impl Shared {
    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, MapData>, CoreError> {
        self.data
            .read()
            .map_err(|_| CoreError::operation("map store lock poisoned"))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, MapData>, CoreError> {
        self.data
            .write()
            .map_err(|_| CoreError::operation("map store lock poisoned"))
    }

    pub(crate) fn encoder<'a>(&'a self, schema: &'a Schema) -> KeyEncoder<'a> {
        KeyEncoder::new(schema, &self.serialisers)
    }
}

/// An ordered in-memory store
///
/// Elements are kept in key order. Retrieval snapshots matching elements
/// under a read lock and hands them out as a stream; while any stream is
/// open [`MapStore::open_iterators`] counts it.
#[derive(Debug)]
pub struct MapStore {
    graph_id: String,
    schema: Schema,
    handlers: HandlerRegistry,
    shared: Arc<Shared>,
}

impl MapStore {
    /// Create a store from generic store properties
    pub fn new(
        graph_id: impl Into<String>,
        schema: Schema,
        properties: &StoreProperties,
    ) -> Result<Self, CoreError> {
        Self::with_properties(
            graph_id,
            schema,
            MapStoreProperties::from_store_properties(properties)?,
        )
    }

    /// Create a store with typed properties
    pub fn with_properties(
        graph_id: impl Into<String>,
        schema: Schema,
        properties: MapStoreProperties,
    ) -> Result<Self, CoreError> {
        schema.check_ordered_group_by()?;
        let graph_id = graph_id.into();
        let shared = Arc::new(Shared {
            data: RwLock::new(MapData::default()),
            serialisers: SerialiserRegistry::with_defaults(),
            properties,
            open_iterators: AtomicUsize::new(0),
        });

        let mut handlers = HandlerRegistry::with_core_handlers();
        handlers.register::<AddElements, _>(AddElementsHandler::new(Arc::clone(&shared)));
        handlers.register::<GetElements, _>(GetElementsHandler::new(Arc::clone(&shared)));
        handlers.register::<GetAllElements, _>(GetAllElementsHandler::new(Arc::clone(&shared)));

        info!(
            graph_id = %graph_id,
            groups = schema.groups().count(),
            aggregate = properties.aggregate,
            "Created map store"
        );
        Ok(Self {
            graph_id,
            schema,
            handlers,
            shared,
        })
    }

    /// The store's options
    pub fn properties(&self) -> &MapStoreProperties {
        &self.shared.properties
    }

    /// Number of stored elements
    pub fn element_count(&self) -> Result<usize, CoreError> {
        Ok(self.shared.read()?.elements.values().map(Vec::len).sum())
    }

    /// Number of result streams not yet released
    pub fn open_iterators(&self) -> usize {
        self.shared.open_iterators.load(Ordering::Acquire)
    }

    /// Remove every element
    pub fn clear(&self) -> Result<(), CoreError> {
        let mut data = self.shared.write()?;
        data.elements.clear();
        data.by_vertex.clear();
        Ok(())
    }
}

impl Store for MapStore {
    fn graph_id(&self) -> &str {
        &self.graph_id
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::domain::schema::{ElementDefinition, PropertyDefinition, SchemaDefinition};
    use trellis_core::ValueType;

    #[test]
    fn test_rejects_unordered_group_by() {
        let schema = Schema::from_definition(SchemaDefinition::default().entity(
            "Tagged",
            ElementDefinition::default()
                .property("tags", PropertyDefinition::new(ValueType::StringSet))
                .group_by(["tags"]),
        ))
        .unwrap();
        let err = MapStore::with_properties("g", schema, MapStoreProperties::default()).unwrap_err();
        assert!(err.to_string().contains("Tagged.tags"));
    }

    #[test]
    fn test_registers_backend_handlers() {
        let store = MapStore::new("g", Schema::default(), &StoreProperties::new(MAP_STORE_TYPE)).unwrap();
        for kind in ["AddElements", "GetElements", "GetAllElements", "Sort", "Count"] {
            assert!(
                store.handlers().kinds().iter().any(|k| k.0 == kind),
                "{} missing",
                kind
            );
        }
        assert_eq!(store.element_count().unwrap(), 0);
    }
}
