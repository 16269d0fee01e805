use serde::{Deserialize, Serialize};
use trellis_core::{CoreError, StoreProperties};

/// Options of a [`crate::MapStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapStoreProperties {
    /// Aggregate elements sharing a key on ingest
    pub aggregate: bool,

    /// Validate elements against the schema on ingest
    pub validate: bool,

    /// Drop invalid elements instead of failing the operation
    pub skip_invalid_elements: bool,
}

impl Default for MapStoreProperties {
    fn default() -> Self {
        Self {
            aggregate: true,
            validate: true,
            skip_invalid_elements: false,
        }
    }
}

impl MapStoreProperties {
    /// Read from generic store properties; unknown options are ignored
    pub fn from_store_properties(properties: &StoreProperties) -> Result<Self, CoreError> {
        properties.options_as()
    }
}
