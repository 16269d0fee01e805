//! Schema definitions, compilation, merging and validation
//!
//! A [`SchemaDefinition`] is plain serde data loaded from JSON or YAML.
//! Compiling it against a [`FunctionRegistry`] and a [`SerialiserRegistry`]
//! resolves every function and serialiser reference and yields a [`Schema`],
//! which is immutable and cheap to clone.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::element::Element;
use super::functions::{AggregateFunction, FunctionRef, FunctionRegistry, Predicate};
use super::value::ValueType;
use crate::error::ValidationFailure;
use crate::serialisation::{Serialiser, SerialiserRegistry};
use crate::CoreError;

/// Declared shape of one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    /// Declared value type
    #[serde(rename = "type")]
    pub value_type: ValueType,

    /// Serialiser name; defaults to the registry's choice for the type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialiser: Option<String>,

    /// Aggregate function; `None` means the property is never merged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_function: Option<FunctionRef>,
}

impl PropertyDefinition {
    /// A property of the given type with no aggregation
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            serialiser: None,
            aggregate_function: None,
        }
    }

    /// Set the aggregate function
    pub fn aggregated_by(mut self, function: FunctionRef) -> Self {
        self.aggregate_function = Some(function);
        self
    }

    /// Set the serialiser by name
    pub fn serialised_by(mut self, serialiser: impl Into<String>) -> Self {
        self.serialiser = Some(serialiser.into());
        self
    }
}

/// A predicate applied to one property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatorDefinition {
    /// Property the predicate receives
    pub property: String,

    /// The predicate
    pub predicate: FunctionRef,
}

/// Definition of one group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementDefinition {
    /// Properties by name
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyDefinition>,

    /// Properties that, with the identifiers, form the aggregation key
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,

    /// Validation predicates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validators: Vec<ValidatorDefinition>,

    /// Free text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ElementDefinition {
    /// Add a property definition, builder style
    pub fn property(mut self, name: impl Into<String>, definition: PropertyDefinition) -> Self {
        self.properties.insert(name.into(), definition);
        self
    }

    /// Set the group-by properties
    pub fn group_by<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add a validator
    pub fn validator(mut self, property: impl Into<String>, predicate: FunctionRef) -> Self {
        self.validators.push(ValidatorDefinition {
            property: property.into(),
            predicate,
        });
        self
    }

    fn conflict_with(&self, other: &ElementDefinition) -> Option<String> {
        for (name, definition) in &self.properties {
            match other.properties.get(name) {
                Some(theirs) if theirs == definition => {}
                Some(_) => return Some(format!("property '{}' differs", name)),
                None => return Some(format!("property '{}' is missing from one side", name)),
            }
        }
        if let Some(name) = other
            .properties
            .keys()
            .find(|name| !self.properties.contains_key(*name))
        {
            return Some(format!("property '{}' is missing from one side", name));
        }
        if self.group_by != other.group_by {
            return Some("group-by differs".to_string());
        }
        if self.validators != other.validators {
            return Some("validators differ".to_string());
        }
        None
    }
}

/// Serialisable schema data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    /// Entity groups
    #[serde(default)]
    pub entities: BTreeMap<String, ElementDefinition>,

    /// Edge groups
    #[serde(default)]
    pub edges: BTreeMap<String, ElementDefinition>,
}

impl SchemaDefinition {
    /// Add an entity group, builder style
    pub fn entity(mut self, group: impl Into<String>, definition: ElementDefinition) -> Self {
        self.entities.insert(group.into(), definition);
        self
    }

    /// Add an edge group, builder style
    pub fn edge(mut self, group: impl Into<String>, definition: ElementDefinition) -> Self {
        self.edges.insert(group.into(), definition);
        self
    }

    /// Merge two definitions
    ///
    /// Disjoint groups are unioned. A group present on both sides must be
    /// defined identically (apart from its description) and as the same
    /// element kind.
    pub fn merge(&self, other: &SchemaDefinition) -> Result<SchemaDefinition, CoreError> {
        let mut merged = self.clone();
        for (theirs, ours, opposite) in [
            (&other.entities, &mut merged.entities, &self.edges),
            (&other.edges, &mut merged.edges, &self.entities),
        ] {
            for (group, definition) in theirs {
                if opposite.contains_key(group) {
                    return Err(CoreError::SchemaMerge {
                        group: group.clone(),
                        reason: "defined as both an entity and an edge".to_string(),
                    });
                }
                match ours.get_mut(group) {
                    None => {
                        ours.insert(group.clone(), definition.clone());
                    }
                    Some(existing) => {
                        if let Some(reason) = existing.conflict_with(definition) {
                            return Err(CoreError::SchemaMerge {
                                group: group.clone(),
                                reason,
                            });
                        }
                        if existing.description.is_none() {
                            existing.description = definition.description.clone();
                        }
                    }
                }
            }
        }
        Ok(merged)
    }
}

/// Whether a group holds entities or edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Entity group
    Entity,
    /// Edge group
    Edge,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Entity => f.write_str("entity"),
            ElementKind::Edge => f.write_str("edge"),
        }
    }
}

/// A property with its serialiser and aggregator resolved
#[derive(Clone)]
pub struct CompiledProperty {
    /// Source definition
    pub definition: PropertyDefinition,
    /// Resolved serialiser
    pub serialiser: Arc<dyn Serialiser>,
    /// Resolved aggregate function
    pub aggregator: Option<Arc<dyn AggregateFunction>>,
}

impl fmt::Debug for CompiledProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledProperty")
            .field("definition", &self.definition)
            .field("serialiser", &self.serialiser.name())
            .finish()
    }
}

#[derive(Clone)]
struct CompiledValidator {
    property: String,
    predicate: Arc<dyn Predicate>,
}

/// A group definition ready for use
#[derive(Clone)]
pub struct CompiledElementDefinition {
    group: String,
    kind: ElementKind,
    definition: ElementDefinition,
    properties: BTreeMap<String, CompiledProperty>,
    validators: Vec<CompiledValidator>,
}

impl fmt::Debug for CompiledElementDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledElementDefinition")
            .field("group", &self.group)
            .field("kind", &self.kind)
            .field("definition", &self.definition)
            .finish()
    }
}

impl CompiledElementDefinition {
    fn compile(
        group: &str,
        kind: ElementKind,
        definition: &ElementDefinition,
        functions: &FunctionRegistry,
        serialisers: &SerialiserRegistry,
    ) -> Result<Self, CoreError> {
        let mut properties = BTreeMap::new();
        for (name, property) in &definition.properties {
            let serialiser = match &property.serialiser {
                Some(serialiser_name) => serialisers.by_name(serialiser_name).ok_or_else(|| {
                    CoreError::Schema(format!(
                        "{}.{}: unknown serialiser '{}'",
                        group, name, serialiser_name
                    ))
                })?,
                None => serialisers.for_type(property.value_type)?,
            };
            if !serialiser.can_handle(property.value_type) {
                return Err(CoreError::Schema(format!(
                    "{}.{}: serialiser '{}' cannot handle {}",
                    group,
                    name,
                    serialiser.name(),
                    property.value_type
                )));
            }
            let aggregator = property
                .aggregate_function
                .as_ref()
                .map(|f| functions.aggregator(f))
                .transpose()?;
            properties.insert(
                name.clone(),
                CompiledProperty {
                    definition: property.clone(),
                    serialiser,
                    aggregator,
                },
            );
        }

        for name in &definition.group_by {
            if !properties.contains_key(name) {
                return Err(CoreError::Schema(format!(
                    "{}: group-by property '{}' is not defined",
                    group, name
                )));
            }
        }

        let validators = definition
            .validators
            .iter()
            .map(|v| {
                if !properties.contains_key(&v.property) {
                    return Err(CoreError::Schema(format!(
                        "{}: validator references undefined property '{}'",
                        group, v.property
                    )));
                }
                Ok(CompiledValidator {
                    property: v.property.clone(),
                    predicate: functions.predicate(&v.predicate)?,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        Ok(Self {
            group: group.to_string(),
            kind,
            definition: definition.clone(),
            properties,
            validators,
        })
    }

    /// Group name
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Entity or edge
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Source definition
    pub fn definition(&self) -> &ElementDefinition {
        &self.definition
    }

    /// Group-by property names
    pub fn group_by(&self) -> &[String] {
        &self.definition.group_by
    }

    /// A compiled property
    pub fn property(&self, name: &str) -> Option<&CompiledProperty> {
        self.properties.get(name)
    }

    /// All compiled properties
    pub fn properties(&self) -> impl Iterator<Item = (&String, &CompiledProperty)> {
        self.properties.iter()
    }

    /// Aggregate function for a property
    pub fn aggregator(&self, name: &str) -> Option<&Arc<dyn AggregateFunction>> {
        self.properties.get(name).and_then(|p| p.aggregator.as_ref())
    }

    /// Evaluate every check and collect all failures
    pub fn validate(&self, element: &Element) -> Result<(), ValidationFailure> {
        let mut failures = Vec::new();

        let kind_matches = match self.kind {
            ElementKind::Entity => element.is_entity(),
            ElementKind::Edge => element.is_edge(),
        };
        if !kind_matches {
            failures.push(format!("element_kind.{}", self.kind));
        }

        for (name, value) in element.properties() {
            match self.properties.get(name) {
                None => failures.push(format!("{}.unknown_property", name)),
                Some(p) if !p.definition.value_type.accepts(value) => {
                    failures.push(format!("{}.type", name))
                }
                Some(_) => {}
            }
        }

        for validator in &self.validators {
            if !validator
                .predicate
                .test(element.property(&validator.property))
            {
                failures.push(format!(
                    "{}.{}",
                    validator.property,
                    validator.predicate.name()
                ));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ValidationFailure::new(element.group(), failures))
        }
    }
}

/// A compiled, immutable schema
///
/// Two schemas are equal when their definitions are equal.
#[derive(Clone, Default)]
pub struct Schema {
    definition: SchemaDefinition,
    groups: BTreeMap<String, Arc<CompiledElementDefinition>>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("definition", &self.definition)
            .finish()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition
    }
}

impl Schema {
    /// Compile a definition against explicit registries
    pub fn compile(
        definition: SchemaDefinition,
        functions: &FunctionRegistry,
        serialisers: &SerialiserRegistry,
    ) -> Result<Self, CoreError> {
        let mut groups = BTreeMap::new();
        for (kind, map) in [
            (ElementKind::Entity, &definition.entities),
            (ElementKind::Edge, &definition.edges),
        ] {
            for (group, element_definition) in map {
                if groups.contains_key(group) {
                    return Err(CoreError::Schema(format!(
                        "group '{}' is defined as both an entity and an edge",
                        group
                    )));
                }
                let compiled = CompiledElementDefinition::compile(
                    group,
                    kind,
                    element_definition,
                    functions,
                    serialisers,
                )?;
                groups.insert(group.clone(), Arc::new(compiled));
            }
        }
        debug!(groups = groups.len(), "Compiled schema");
        Ok(Self { definition, groups })
    }

    /// Compile with the built-in functions and default serialisers
    pub fn from_definition(definition: SchemaDefinition) -> Result<Self, CoreError> {
        Self::compile(
            definition,
            &FunctionRegistry::with_builtins(),
            &SerialiserRegistry::with_defaults(),
        )
    }

    /// Parse and compile a JSON schema
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Self::from_definition(serde_json::from_str(json)?)
    }

    /// Parse and compile a YAML schema
    pub fn from_yaml(yaml: &str) -> Result<Self, CoreError> {
        Self::from_definition(serde_yaml::from_str(yaml)?)
    }

    /// Load schema files and merge them in order
    ///
    /// Files ending in `.yaml` or `.yml` are read as YAML, everything else
    /// as JSON.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Self, CoreError> {
        let mut merged = SchemaDefinition::default();
        for path in paths {
            let path = path.as_ref();
            let text = std::fs::read_to_string(path).map_err(|e| {
                CoreError::Io(format!("failed to read schema {}: {}", path.display(), e))
            })?;
            let definition: SchemaDefinition = match path.extension().and_then(|e| e.to_str()) {
                Some("yaml") | Some("yml") => serde_yaml::from_str(&text)?,
                _ => serde_json::from_str(&text)?,
            };
            merged = merged.merge(&definition)?;
        }
        Self::from_definition(merged)
    }

    /// Render the definition as pretty JSON
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(&self.definition)?)
    }

    /// Merge two compiled schemas
    pub fn merge(a: &Schema, b: &Schema) -> Result<Schema, CoreError> {
        let definition = a.definition.merge(&b.definition)?;
        let mut groups = a.groups.clone();
        for (group, compiled) in &b.groups {
            groups
                .entry(group.clone())
                .or_insert_with(|| Arc::clone(compiled));
        }
        Ok(Schema { definition, groups })
    }

    /// Source definition
    pub fn definition(&self) -> &SchemaDefinition {
        &self.definition
    }

    /// Definition for a group
    pub fn element_definition(&self, group: &str) -> Option<&CompiledElementDefinition> {
        self.groups.get(group).map(Arc::as_ref)
    }

    /// All group names
    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Entity group names
    pub fn entity_groups(&self) -> impl Iterator<Item = &str> {
        self.definition.entities.keys().map(String::as_str)
    }

    /// Edge group names
    pub fn edge_groups(&self) -> impl Iterator<Item = &str> {
        self.definition.edges.keys().map(String::as_str)
    }

    /// Validate an element against its group
    pub fn validate(&self, element: &Element) -> Result<(), ValidationFailure> {
        match self.element_definition(element.group()) {
            Some(definition) => definition.validate(element),
            None => Err(ValidationFailure::new(
                element.group(),
                vec!["group.unknown".to_string()],
            )),
        }
    }

    /// Whether a group's property has a declared orderable type
    pub fn is_orderable(&self, group: &str, property: &str) -> bool {
        self.element_definition(group)
            .and_then(|d| d.property(property))
            .map_or(false, |p| p.definition.value_type.is_orderable())
    }

    /// Reject group-by properties whose serialiser does not preserve ordering
    pub fn check_ordered_group_by(&self) -> Result<(), CoreError> {
        let offending: Vec<String> = self
            .groups
            .values()
            .flat_map(|d| {
                d.group_by().iter().filter_map(move |name| match d.property(name) {
                    Some(p) if p.serialiser.preserves_ordering() => None,
                    _ => Some(format!(
                        "group-by property {}.{} does not use an order-preserving serialiser",
                        d.group(),
                        name
                    )),
                })
            })
            .collect();
        if offending.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Schema(offending.join("; ")))
        }
    }
}
