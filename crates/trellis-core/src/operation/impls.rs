use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{Data, DataType, ElementStream, KnownOperation, OperationKind};
use crate::comparison::ElementComparator;
use crate::domain::element::{Element, ElementId};
use crate::domain::schema::Schema;
use crate::domain::value::Value;
use crate::domain::view::View;

/// Default export key
pub const DEFAULT_EXPORT_KEY: &str = "ALL";

fn check_view(operation: &str, view: &View, schema: &Schema) -> Vec<String> {
    view.groups
        .keys()
        .filter(|group| schema.element_definition(group).is_none())
        .map(|group| format!("{}: view group '{}' is not in the schema", operation, group))
        .collect()
}

fn check_comparator(
    operation: &str,
    comparator: Option<&Arc<dyn ElementComparator>>,
    schema: &Schema,
) -> Vec<String> {
    comparator
        .map(|c| c.comparable_pairs())
        .unwrap_or_default()
        .into_iter()
        .filter(|(group, property)| !schema.is_orderable(group, property))
        .map(|(group, property)| {
            format!(
                "{}: property '{}' of group '{}' is not defined with an orderable type",
                operation, property, group
            )
        })
        .collect()
}

/// Validate, aggregate and persist elements
#[derive(Debug, Clone)]
pub struct AddElements {
    /// Elements configured on the operation; upstream input otherwise
    pub elements: Option<Vec<Element>>,
    /// Validate against the schema before storing
    pub validate: bool,
    /// Drop invalid elements instead of failing
    pub skip_invalid_elements: bool,
}

impl Default for AddElements {
    fn default() -> Self {
        Self {
            elements: None,
            validate: true,
            skip_invalid_elements: false,
        }
    }
}

impl AddElements {
    /// Add the given elements
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            elements: Some(elements),
            ..Self::default()
        }
    }

    /// Drop invalid elements instead of failing
    pub fn skip_invalid(mut self) -> Self {
        self.skip_invalid_elements = true;
        self
    }

    /// Store without validating
    pub fn without_validation(mut self) -> Self {
        self.validate = false;
        self
    }
}

impl KnownOperation for AddElements {
    const KIND: OperationKind = OperationKind("AddElements");
    const INPUT: DataType = DataType::Elements;
    const OUTPUT: DataType = DataType::Null;

    fn take_input(&mut self) -> Data {
        self.elements
            .take()
            .map_or(Data::Null, |e| Data::Elements(ElementStream::from_vec(e)))
    }
}

/// How seeds select elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedMatching {
    /// Elements related to the seed: an entity seed returns its entities and
    /// every edge touching the vertex
    #[default]
    Related,
    /// Only elements whose id equals the seed
    Equal,
}

/// Which edges a vertex seed reaches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeIncomingOutgoing {
    /// Both directions
    #[default]
    Either,
    /// Directed edges whose destination is the seed
    Incoming,
    /// Directed edges whose source is the seed
    Outgoing,
}

/// Retrieve elements for a set of seeds
#[derive(Debug, Clone, Default)]
pub struct GetElements {
    /// Seeds configured on the operation; upstream input otherwise
    pub seeds: Option<Vec<ElementId>>,
    /// Result view
    pub view: View,
    /// Seed matching mode
    pub seed_matching: SeedMatching,
    /// Edge direction filter
    pub direction: IncludeIncomingOutgoing,
}

impl GetElements {
    /// Look up the given seeds
    pub fn new(seeds: Vec<ElementId>) -> Self {
        Self {
            seeds: Some(seeds),
            ..Self::default()
        }
    }

    /// Apply a view
    pub fn with_view(mut self, view: View) -> Self {
        self.view = view;
        self
    }

    /// Change seed matching
    pub fn with_seed_matching(mut self, seed_matching: SeedMatching) -> Self {
        self.seed_matching = seed_matching;
        self
    }

    /// Restrict edge direction
    pub fn with_direction(mut self, direction: IncludeIncomingOutgoing) -> Self {
        self.direction = direction;
        self
    }
}

impl KnownOperation for GetElements {
    const KIND: OperationKind = OperationKind("GetElements");
    const INPUT: DataType = DataType::ElementIds;
    const OUTPUT: DataType = DataType::Elements;

    fn take_input(&mut self) -> Data {
        self.seeds.take().map_or(Data::Null, Data::ElementIds)
    }

    fn validate(&self, schema: &Schema) -> Vec<String> {
        check_view("GetElements", &self.view, schema)
    }
}

/// Retrieve every element
#[derive(Debug, Clone, Default)]
pub struct GetAllElements {
    /// Result view
    pub view: View,
}

impl GetAllElements {
    /// Retrieve everything through a view
    pub fn with_view(view: View) -> Self {
        Self { view }
    }
}

impl KnownOperation for GetAllElements {
    const KIND: OperationKind = OperationKind("GetAllElements");
    const INPUT: DataType = DataType::Null;
    const OUTPUT: DataType = DataType::Elements;

    fn validate(&self, schema: &Schema) -> Vec<String> {
        check_view("GetAllElements", &self.view, schema)
    }
}

/// Sort elements and keep the first `result_limit`
#[derive(Debug, Clone, Default)]
pub struct Sort {
    /// Elements configured on the operation; upstream input otherwise
    pub elements: Option<Vec<Element>>,
    /// Ordering; no comparator means no result
    pub comparator: Option<Arc<dyn ElementComparator>>,
    /// Maximum number of results
    pub result_limit: Option<usize>,
}

impl Sort {
    /// Sort with a comparator
    pub fn by(comparator: Arc<dyn ElementComparator>) -> Self {
        Self {
            comparator: Some(comparator),
            ..Self::default()
        }
    }

    /// Limit the result size
    pub fn limit(mut self, result_limit: usize) -> Self {
        self.result_limit = Some(result_limit);
        self
    }
}

impl KnownOperation for Sort {
    const KIND: OperationKind = OperationKind("Sort");
    const INPUT: DataType = DataType::Elements;
    const OUTPUT: DataType = DataType::Elements;

    fn take_input(&mut self) -> Data {
        self.elements
            .take()
            .map_or(Data::Null, |e| Data::Elements(ElementStream::from_vec(e)))
    }

    fn validate(&self, schema: &Schema) -> Vec<String> {
        check_comparator("Sort", self.comparator.as_ref(), schema)
    }
}

/// The greatest element by a comparator
#[derive(Debug, Clone, Default)]
pub struct Max {
    /// Elements configured on the operation; upstream input otherwise
    pub elements: Option<Vec<Element>>,
    /// Ordering; no comparator means no result
    pub comparator: Option<Arc<dyn ElementComparator>>,
}

impl Max {
    /// Max by a comparator
    pub fn by(comparator: Arc<dyn ElementComparator>) -> Self {
        Self {
            elements: None,
            comparator: Some(comparator),
        }
    }
}

impl KnownOperation for Max {
    const KIND: OperationKind = OperationKind("Max");
    const INPUT: DataType = DataType::Elements;
    const OUTPUT: DataType = DataType::Element;

    fn take_input(&mut self) -> Data {
        self.elements
            .take()
            .map_or(Data::Null, |e| Data::Elements(ElementStream::from_vec(e)))
    }

    fn validate(&self, schema: &Schema) -> Vec<String> {
        check_comparator("Max", self.comparator.as_ref(), schema)
    }
}

/// The smallest element by a comparator
#[derive(Debug, Clone, Default)]
pub struct Min {
    /// Elements configured on the operation; upstream input otherwise
    pub elements: Option<Vec<Element>>,
    /// Ordering; no comparator means no result
    pub comparator: Option<Arc<dyn ElementComparator>>,
}

impl Min {
    /// Min by a comparator
    pub fn by(comparator: Arc<dyn ElementComparator>) -> Self {
        Self {
            elements: None,
            comparator: Some(comparator),
        }
    }
}

impl KnownOperation for Min {
    const KIND: OperationKind = OperationKind("Min");
    const INPUT: DataType = DataType::Elements;
    const OUTPUT: DataType = DataType::Element;

    fn take_input(&mut self) -> Data {
        self.elements
            .take()
            .map_or(Data::Null, |e| Data::Elements(ElementStream::from_vec(e)))
    }

    fn validate(&self, schema: &Schema) -> Vec<String> {
        check_comparator("Min", self.comparator.as_ref(), schema)
    }
}

/// Pass through at most `result_limit` elements
#[derive(Debug, Clone)]
pub struct Limit {
    /// Maximum number of results
    pub result_limit: usize,
    /// Silently drop extra elements; when false, exceeding the limit fails
    pub truncate: bool,
}

impl Limit {
    /// A truncating limit
    pub fn new(result_limit: usize) -> Self {
        Self {
            result_limit,
            truncate: true,
        }
    }

    /// Fail instead of truncating
    pub fn strict(mut self) -> Self {
        self.truncate = false;
        self
    }
}

impl KnownOperation for Limit {
    const KIND: OperationKind = OperationKind("Limit");
    const INPUT: DataType = DataType::Elements;
    const OUTPUT: DataType = DataType::Elements;
}

/// Count the items of the input
#[derive(Debug, Clone, Default)]
pub struct Count;

impl KnownOperation for Count {
    const KIND: OperationKind = OperationKind("Count");
    const INPUT: DataType = DataType::Any;
    const OUTPUT: DataType = DataType::Count;
}

/// Turn vertices into entity seeds
#[derive(Debug, Clone, Default)]
pub struct ToEntitySeeds {
    /// Vertices configured on the operation; upstream input otherwise
    pub vertices: Option<Vec<Value>>,
}

impl KnownOperation for ToEntitySeeds {
    const KIND: OperationKind = OperationKind("ToEntitySeeds");
    const INPUT: DataType = DataType::Values;
    const OUTPUT: DataType = DataType::ElementIds;

    fn take_input(&mut self) -> Data {
        self.vertices.take().map_or(Data::Null, Data::Values)
    }
}

/// Which vertices of an edge to emit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeVertices {
    /// Skip edges
    None,
    /// Source only
    Source,
    /// Destination only
    Destination,
    /// Both endpoints
    #[default]
    Both,
}

/// Extract vertices from elements or seeds
#[derive(Debug, Clone, Default)]
pub struct ToVertices {
    /// Edge endpoint selection
    pub edge_vertices: EdgeVertices,
    /// Drop repeated vertices, keeping first occurrences
    pub deduplicate: bool,
}

impl KnownOperation for ToVertices {
    const KIND: OperationKind = OperationKind("ToVertices");
    const INPUT: DataType = DataType::ElementIds;
    const OUTPUT: DataType = DataType::Values;
}

/// Save the input under a key and pass it through
#[derive(Debug, Clone)]
pub struct ExportToCache {
    /// Export key
    pub key: String,
}

impl Default for ExportToCache {
    fn default() -> Self {
        Self {
            key: DEFAULT_EXPORT_KEY.to_string(),
        }
    }
}

impl ExportToCache {
    /// Export under a specific key
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl KnownOperation for ExportToCache {
    const KIND: OperationKind = OperationKind("ExportToCache");
    const INPUT: DataType = DataType::Any;
    const OUTPUT: DataType = DataType::Any;
}

/// Read an export, from this run or, with a job id, from an earlier one
#[derive(Debug, Clone)]
pub struct GetExport {
    /// Export key
    pub key: String,
    /// Job that made the export; this run when unset
    pub job_id: Option<String>,
}

impl Default for GetExport {
    fn default() -> Self {
        Self {
            key: DEFAULT_EXPORT_KEY.to_string(),
            job_id: None,
        }
    }
}

impl GetExport {
    /// Read an export of this run
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            job_id: None,
        }
    }

    /// Read an export of another job
    pub fn from_job(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }
}

impl KnownOperation for GetExport {
    const KIND: OperationKind = OperationKind("GetExport");
    const INPUT: DataType = DataType::Any;
    const OUTPUT: DataType = DataType::Json;
}

/// Return every export of this run
#[derive(Debug, Clone, Default)]
pub struct FetchCache;

impl KnownOperation for FetchCache {
    const KIND: OperationKind = OperationKind("FetchCache");
    const INPUT: DataType = DataType::Any;
    const OUTPUT: DataType = DataType::CacheMap;
}

/// List the keys of a cache in the cache service
#[derive(Debug, Clone)]
pub struct GetCacheKeys {
    /// Cache name
    pub cache_name: String,
}

impl GetCacheKeys {
    /// Keys of a named cache
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
        }
    }
}

impl KnownOperation for GetCacheKeys {
    const KIND: OperationKind = OperationKind("GetCacheKeys");
    const INPUT: DataType = DataType::Any;
    const OUTPUT: DataType = DataType::Strings;
}

/// Drop the input, releasing it
#[derive(Debug, Clone, Default)]
pub struct DiscardOutput;

impl KnownOperation for DiscardOutput {
    const KIND: OperationKind = OperationKind("DiscardOutput");
    const INPUT: DataType = DataType::Any;
    const OUTPUT: DataType = DataType::Null;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::PropertyComparator;
    use crate::domain::schema::{ElementDefinition, PropertyDefinition, SchemaDefinition};
    use crate::domain::value::ValueType;
    use crate::operation::Operation;

    fn schema() -> Schema {
        Schema::from_definition(
            SchemaDefinition::default().entity(
                "E",
                ElementDefinition::default()
                    .property("count", PropertyDefinition::new(ValueType::Long))
                    .property("hll", PropertyDefinition::new(ValueType::Sketch)),
            ),
        )
        .unwrap()
    }

    #[test]
    fn test_sort_on_orderable_property_is_valid() {
        let sort = Sort::by(Arc::new(PropertyComparator::new("E", "count")));
        assert!(Operation::validate(&sort, &schema()).is_empty());
    }

    #[test]
    fn test_sort_on_sketch_or_unknown_property_is_invalid() {
        let schema = schema();
        let on_sketch = Max::by(Arc::new(PropertyComparator::new("E", "hll")));
        let on_missing = Min::by(Arc::new(PropertyComparator::new("E", "nope")));
        assert_eq!(
            Operation::validate(&on_sketch, &schema),
            vec!["Max: property 'hll' of group 'E' is not defined with an orderable type".to_string()]
        );
        assert_eq!(Operation::validate(&on_missing, &schema).len(), 1);
    }

    #[test]
    fn test_view_groups_must_exist() {
        let get = GetAllElements::with_view(View::all().with_group("Missing"));
        assert_eq!(
            Operation::validate(&get, &schema()),
            vec!["GetAllElements: view group 'Missing' is not in the schema".to_string()]
        );
    }

    #[test]
    fn test_configured_input_is_taken_once() {
        let mut add = AddElements::new(vec![]);
        assert!(matches!(Operation::take_input(&mut add), Data::Elements(_)));
        assert!(Operation::take_input(&mut add).is_null());
    }
}
