//! Operations, the data flowing between them, and their handlers
//!
//! Every operation declares the [`DataType`] it consumes and the one it
//! produces. Chains are type-checked on those declarations before anything
//! runs. At run time the values themselves travel as [`Data`].

use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use crate::domain::element::{Element, ElementId};
use crate::domain::schema::Schema;
use crate::domain::value::Value;
use crate::CoreError;

/// Operation structs
pub mod impls;

/// Lazily produced element streams
pub mod stream;

/// Handler trait and registry
pub mod handler;

/// Store-agnostic handlers
pub mod handlers;

pub use self::stream::{ElementStream, ReleaseHandle};

/// Tag identifying an operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OperationKind(pub &'static str);

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Declared type of an operation's input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    /// Nothing
    Null,
    /// One element
    Element,
    /// A stream of elements
    Elements,
    /// Seeds
    ElementIds,
    /// Plain values, e.g. vertices
    Values,
    /// Strings, e.g. cache keys
    Strings,
    /// JSON documents, e.g. exported results
    Json,
    /// A count
    Count,
    /// Named lists of JSON documents
    CacheMap,
    /// Any of the above
    Any,
}

impl DataType {
    /// Whether output of type `self` may feed an input of type `input`
    ///
    /// A single element may feed an element stream, elements may act as
    /// seeds, and `Any` matches everything.
    pub fn is_assignable_to(self, input: DataType) -> bool {
        use DataType::*;
        self == input
            || self == Any
            || input == Any
            || matches!(
                (self, input),
                (Element, Elements) | (Element, ElementIds) | (Elements, ElementIds)
            )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A runtime value passed between operations
#[derive(Debug)]
pub enum Data {
    /// Nothing
    Null,
    /// One element
    Element(Element),
    /// A stream of elements
    Elements(ElementStream),
    /// Seeds
    ElementIds(Vec<ElementId>),
    /// Plain values
    Values(Vec<Value>),
    /// Strings
    Strings(Vec<String>),
    /// JSON documents
    Json(Vec<serde_json::Value>),
    /// A count
    Count(u64),
    /// Named lists of JSON documents
    CacheMap(HashMap<String, Vec<serde_json::Value>>),
}

/// Items of a result rendered as JSON, one per output line
pub type JsonItems = Box<dyn Iterator<Item = Result<serde_json::Value, CoreError>> + Send>;

impl Data {
    /// Runtime type
    pub fn data_type(&self) -> DataType {
        match self {
            Data::Null => DataType::Null,
            Data::Element(_) => DataType::Element,
            Data::Elements(_) => DataType::Elements,
            Data::ElementIds(_) => DataType::ElementIds,
            Data::Values(_) => DataType::Values,
            Data::Strings(_) => DataType::Strings,
            Data::Json(_) => DataType::Json,
            Data::Count(_) => DataType::Count,
            Data::CacheMap(_) => DataType::CacheMap,
        }
    }

    /// Check if this is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null)
    }

    /// Release handle of a lazily produced result
    pub fn release_handle(&self) -> Option<ReleaseHandle> {
        match self {
            Data::Elements(stream) => Some(stream.release_handle()),
            _ => None,
        }
    }

    /// Read as elements; `Null` becomes `None`
    pub fn into_elements(self) -> Result<Option<ElementStream>, CoreError> {
        match self {
            Data::Null => Ok(None),
            Data::Elements(stream) => Ok(Some(stream)),
            Data::Element(element) => Ok(Some(ElementStream::from_vec(vec![element]))),
            other => Err(unexpected(DataType::Elements, &other)),
        }
    }

    /// Read as seeds; elements are converted to their ids
    pub fn into_element_ids(self) -> Result<Option<Vec<ElementId>>, CoreError> {
        match self {
            Data::Null => Ok(None),
            Data::ElementIds(ids) => Ok(Some(ids)),
            Data::Elements(stream) => Ok(Some(Iterator::map(stream, |e| e.element_id()).collect())),
            Data::Element(element) => Ok(Some(vec![element.element_id()])),
            other => Err(unexpected(DataType::ElementIds, &other)),
        }
    }

    /// Read as plain values
    pub fn into_values(self) -> Result<Option<Vec<Value>>, CoreError> {
        match self {
            Data::Null => Ok(None),
            Data::Values(values) => Ok(Some(values)),
            Data::Strings(strings) => Ok(Some(strings.into_iter().map(Value::String).collect())),
            other => Err(unexpected(DataType::Values, &other)),
        }
    }

    /// Render every item as JSON
    pub fn into_json_items(self) -> JsonItems {
        fn encode<T: Serialize>(item: T) -> Result<serde_json::Value, CoreError> {
            Ok(serde_json::to_value(item)?)
        }
        match self {
            Data::Null => Box::new(std::iter::empty()),
            Data::Element(element) => Box::new(std::iter::once(encode(element))),
            Data::Elements(stream) => Box::new(Iterator::map(stream, encode)),
            Data::ElementIds(ids) => Box::new(ids.into_iter().map(encode)),
            Data::Values(values) => Box::new(values.into_iter().map(encode)),
            Data::Strings(strings) => Box::new(strings.into_iter().map(encode)),
            Data::Json(items) => Box::new(items.into_iter().map(Ok)),
            Data::Count(count) => Box::new(std::iter::once(Ok(serde_json::Value::from(count)))),
            Data::CacheMap(map) => Box::new(std::iter::once(encode(map))),
        }
    }
}

fn unexpected(expected: DataType, actual: &Data) -> CoreError {
    CoreError::operation(format!(
        "expected {} input but received {}",
        expected,
        actual.data_type()
    ))
}

/// A node in an operation chain
pub trait Operation: fmt::Debug + Send + 'static {
    /// Kind tag used for handler lookup
    fn kind(&self) -> OperationKind;

    /// Declared input type
    fn input_type(&self) -> DataType;

    /// Declared output type
    fn output_type(&self) -> DataType;

    /// Access to the concrete type
    fn as_any(&self) -> &dyn Any;

    /// Take the input configured on the operation itself
    fn take_input(&mut self) -> Data;

    /// Schema-level checks; each returned string is one problem
    fn validate(&self, schema: &Schema) -> Vec<String>;
}

/// An operation with a fixed kind and fixed declared types
pub trait KnownOperation: fmt::Debug + Send + 'static {
    /// Kind tag
    const KIND: OperationKind;
    /// Declared input type
    const INPUT: DataType;
    /// Declared output type
    const OUTPUT: DataType;

    /// Take the input configured on the operation itself
    fn take_input(&mut self) -> Data {
        Data::Null
    }

    /// Schema-level checks
    fn validate(&self, _schema: &Schema) -> Vec<String> {
        Vec::new()
    }
}

impl<T: KnownOperation> Operation for T {
    fn kind(&self) -> OperationKind {
        T::KIND
    }

    fn input_type(&self) -> DataType {
        T::INPUT
    }

    fn output_type(&self) -> DataType {
        T::OUTPUT
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn take_input(&mut self) -> Data {
        KnownOperation::take_input(self)
    }

    fn validate(&self, schema: &Schema) -> Vec<String> {
        KnownOperation::validate(self, schema)
    }
}

/// An ordered sequence of operations executed as one unit
#[derive(Debug, Default)]
pub struct OperationChain {
    operations: Vec<Box<dyn Operation>>,
}

impl OperationChain {
    /// An empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a chain with its first operation
    pub fn first(operation: impl Operation) -> Self {
        Self::new().then(operation)
    }

    /// Append an operation, builder style
    pub fn then(mut self, operation: impl Operation) -> Self {
        self.operations.push(Box::new(operation));
        self
    }

    /// Append a boxed operation
    pub fn push(&mut self, operation: Box<dyn Operation>) {
        self.operations.push(operation);
    }

    /// The operations in order
    pub fn operations(&self) -> &[Box<dyn Operation>] {
        &self.operations
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Declared output type of the last operation
    pub fn output_type(&self) -> DataType {
        self.operations
            .last()
            .map_or(DataType::Null, |op| op.output_type())
    }

    pub(crate) fn into_operations(self) -> Vec<Box<dyn Operation>> {
        self.operations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::element::Entity;

    #[test]
    fn test_assignability() {
        assert!(DataType::Elements.is_assignable_to(DataType::Elements));
        assert!(DataType::Elements.is_assignable_to(DataType::ElementIds));
        assert!(!DataType::ElementIds.is_assignable_to(DataType::Elements));
        assert!(DataType::Any.is_assignable_to(DataType::Count));
        assert!(DataType::Element.is_assignable_to(DataType::Any));
        assert!(DataType::Element.is_assignable_to(DataType::Elements));
        assert!(!DataType::Elements.is_assignable_to(DataType::Element));
        assert!(!DataType::Element.is_assignable_to(DataType::Strings));
        assert!(!DataType::Values.is_assignable_to(DataType::Null));
    }

    #[test]
    fn test_elements_become_seeds() {
        let stream = ElementStream::from_vec(vec![Element::from(Entity::new("E", "a"))]);
        let ids = Data::Elements(stream).into_element_ids().unwrap().unwrap();
        assert_eq!(ids, vec![ElementId::entity("a")]);
    }

    #[test]
    fn test_unexpected_input() {
        let err = Data::Count(3).into_elements().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Operation error: expected Elements input but received Count"
        );
    }

    #[test]
    fn test_json_items() {
        let items: Vec<_> = Data::Strings(vec!["a".to_string(), "b".to_string()])
            .into_json_items()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(items, vec![serde_json::json!("a"), serde_json::json!("b")]);
        assert_eq!(Data::Null.into_json_items().count(), 0);
    }
}
