//! Backend store interface and store properties

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::application::chain_executor::ChainExecutor;
use crate::domain::schema::Schema;
use crate::operation::handler::{Handler, HandlerRegistry};
use crate::operation::{Data, OperationChain, OperationKind};
use crate::{Context, CoreError};

/// A storage backend executing operation chains
///
/// The schema and handler registry are fixed at construction and shared
/// read-only across concurrent executions.
pub trait Store: Send + Sync {
    /// Graph id this store serves
    fn graph_id(&self) -> &str;

    /// The store's schema
    fn schema(&self) -> &Schema;

    /// Handlers registered for this store
    fn handlers(&self) -> &HandlerRegistry;

    /// Resolve the handler for an operation kind
    fn handler(&self, kind: OperationKind) -> Result<Arc<dyn Handler>, CoreError> {
        self.handlers()
            .get(kind)
            .ok_or_else(|| CoreError::UnsupportedOperation {
                operation: kind.to_string(),
                store: self.graph_id().to_string(),
            })
    }

    /// Execute a chain against this store
    fn execute(&self, chain: OperationChain, context: &mut Context) -> Result<Data, CoreError>
    where
        Self: Sized,
    {
        ChainExecutor::new(self).execute(chain, context)
    }
}

/// Backend selection plus free-form backend options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreProperties {
    /// Store factory key, e.g. `map`
    pub store_type: String,

    /// Backend-specific options
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl StoreProperties {
    /// Properties for a store type without options
    pub fn new(store_type: impl Into<String>) -> Self {
        Self {
            store_type: store_type.into(),
            options: serde_json::Map::new(),
        }
    }

    /// Set an option, builder style
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Load from a JSON or YAML file, chosen by extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Io(format!(
                "failed to read store properties {}: {}",
                path.display(),
                e
            ))
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&text)?),
            _ => Ok(serde_json::from_str(&text)?),
        }
    }

    /// A boolean option, or `default` when absent or not a boolean
    pub fn bool_option(&self, key: &str, default: bool) -> bool {
        self.options
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(default)
    }

    /// Overlay `child` on these properties; child values win
    pub fn overridden_by(&self, child: &StoreProperties) -> StoreProperties {
        let mut merged = self.clone();
        if !child.store_type.is_empty() {
            merged.store_type = child.store_type.clone();
        }
        for (key, value) in &child.options {
            merged.options.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Decode the options into a typed struct
    pub fn options_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_value(serde_json::Value::Object(self.options.clone())).map_err(|e| {
            CoreError::Configuration(format!(
                "invalid options for store type '{}': {}",
                self.store_type, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_flattened_options() {
        let properties: StoreProperties =
            serde_json::from_str(r#"{"store_type": "map", "aggregate": false}"#).unwrap();
        assert_eq!(properties.store_type, "map");
        assert!(!properties.bool_option("aggregate", true));
        assert!(properties.bool_option("validate", true));
    }

    #[test]
    fn test_child_overrides_parent() {
        let parent = StoreProperties::new("map")
            .with_option("aggregate", json!(true))
            .with_option("validate", json!(true));
        let child = StoreProperties::new("").with_option("aggregate", json!(false));
        let merged = parent.overridden_by(&child);
        assert_eq!(merged.store_type, "map");
        assert!(!merged.bool_option("aggregate", true));
        assert!(merged.bool_option("validate", false));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "store_type: map\nskip_invalid_elements: true").unwrap();
        let properties = StoreProperties::from_path(file.path()).unwrap();
        assert!(properties.bool_option("skip_invalid_elements", false));
    }

    #[test]
    fn test_missing_file() {
        let err = StoreProperties::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, CoreError::Io(_)));
    }
}
