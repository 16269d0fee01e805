//! Value serialisers
//!
//! A serialiser turns a value of one [`ValueType`] into bytes and back. Those
//! that report [`Serialiser::preserves_ordering`] guarantee that the byte
//! order of their outputs matches the natural order of their inputs, which
//! ordered stores rely on for group-by and range keys.
//!
//! Every serialiser writes `Null` as zero bytes and reads zero bytes through
//! [`Serialiser::deserialise_empty`]. `Null` therefore reads back as `Null`
//! only for the boolean, numeric and JSON serialisers. The string, bytes and
//! string set serialisers read it back as their empty value and cannot tell
//! the two apart, and the sketch serialiser rejects zero bytes.

use std::fmt;
use std::sync::Arc;

use crate::domain::value::{Value, ValueType};
use crate::CoreError;

mod impls;

pub use impls::{
    BooleanSerialiser, BytesSerialiser, JsonSerialiser, OrderedDoubleSerialiser,
    OrderedLongSerialiser, SketchSerialiser, StringSerialiser, StringSetSerialiser,
};

/// Codec between one value type and bytes
pub trait Serialiser: Send + Sync {
    /// Stable name used in schema definitions
    fn name(&self) -> &'static str;

    /// The type this serialiser is written for
    fn handled_type(&self) -> ValueType;

    /// Whether this serialiser can encode values of `value_type`
    fn can_handle(&self, value_type: ValueType) -> bool {
        value_type == self.handled_type()
    }

    /// Encode a value
    fn serialise(&self, value: &Value) -> Result<Vec<u8>, CoreError>;

    /// Decode bytes produced by [`Serialiser::serialise`]
    fn deserialise(&self, bytes: &[u8]) -> Result<Value, CoreError>;

    /// The value represented by zero bytes
    fn deserialise_empty(&self) -> Result<Value, CoreError>;

    /// Whether byte order matches value order
    fn preserves_ordering(&self) -> bool;
}

impl fmt::Debug for dyn Serialiser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn type_mismatch(serialiser: &dyn Serialiser, value: &Value) -> CoreError {
    CoreError::Serialisation(format!(
        "{} cannot serialise {}",
        serialiser.name(),
        value
            .value_type()
            .map_or_else(|| "null".to_string(), |t| t.to_string())
    ))
}

/// Ordered collection of serialisers
///
/// Lookup picks the serialiser whose handled type matches exactly, otherwise
/// the first registered one whose `can_handle` accepts the type. Registration
/// order is therefore part of a deployment's behaviour.
#[derive(Debug, Clone, Default)]
pub struct SerialiserRegistry {
    serialisers: Vec<Arc<dyn Serialiser>>,
}

impl SerialiserRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The default registry, in this order: boolean, ordered long, ordered
    /// double, string, bytes, string set, sketch, then the JSON fallback
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BooleanSerialiser));
        registry.register(Arc::new(OrderedLongSerialiser));
        registry.register(Arc::new(OrderedDoubleSerialiser));
        registry.register(Arc::new(StringSerialiser));
        registry.register(Arc::new(BytesSerialiser));
        registry.register(Arc::new(StringSetSerialiser));
        registry.register(Arc::new(SketchSerialiser));
        registry.register(Arc::new(JsonSerialiser));
        registry
    }

    /// Append a serialiser
    pub fn register(&mut self, serialiser: Arc<dyn Serialiser>) {
        self.serialisers.push(serialiser);
    }

    /// Registered serialisers in registration order
    pub fn serialisers(&self) -> &[Arc<dyn Serialiser>] {
        &self.serialisers
    }

    /// Find a serialiser by name
    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Serialiser>> {
        self.serialisers.iter().find(|s| s.name() == name).cloned()
    }

    /// Select a serialiser for a declared type
    pub fn for_type(&self, value_type: ValueType) -> Result<Arc<dyn Serialiser>, CoreError> {
        self.serialisers
            .iter()
            .find(|s| s.handled_type() == value_type)
            .or_else(|| self.serialisers.iter().find(|s| s.can_handle(value_type)))
            .cloned()
            .ok_or_else(|| {
                CoreError::Serialisation(format!("no serialiser registered for {}", value_type))
            })
    }

    /// Select a serialiser for a runtime value; `Null` is treated as `Any`
    pub fn for_value(&self, value: &Value) -> Result<Arc<dyn Serialiser>, CoreError> {
        self.for_type(value.value_type().unwrap_or(ValueType::Any))
    }
}
