//! Group-aware property aggregation
//!
//! Elements with the same group, identifiers and group-by property values are
//! merged into one. Each remaining property is combined with its group's
//! aggregate function; a property present on only one side is kept as is.
//!
//! Properties without an aggregate function follow a first-write-wins
//! policy: the first non-null value seen for a key is kept and later values
//! are discarded.

use std::collections::HashMap;

use crate::domain::element::{Element, ElementId};
use crate::domain::schema::{CompiledElementDefinition, Schema};
use crate::domain::value::Value;
use crate::domain::view::View;
use crate::CoreError;

/// Identity of an aggregation bucket
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationKey {
    /// Element group
    pub group: String,
    /// Canonical identifiers
    pub id: ElementId,
    /// Group-by values in declaration order; unset properties are `Null`
    pub group_by: Vec<Value>,
}

impl AggregationKey {
    /// Build the key of an element for the given group-by properties
    pub fn of(element: &Element, group_by: &[String]) -> Self {
        Self {
            group: element.group().to_string(),
            id: element.element_id(),
            group_by: group_by
                .iter()
                .map(|name| element.property(name).cloned().unwrap_or_default())
                .collect(),
        }
    }
}

/// Merge `incoming` into `target`, which must share its aggregation key
///
/// Properties named in `group_by` are left untouched. On error `target` is
/// unchanged.
pub fn merge_into(
    definition: Option<&CompiledElementDefinition>,
    group_by: &[String],
    target: &mut Element,
    incoming: Element,
) -> Result<(), CoreError> {
    let mut incoming = incoming;
    let properties = std::mem::take(incoming.properties_mut());
    let existing = target.properties();
    let mut updates = Vec::with_capacity(properties.len());
    for (name, value) in properties {
        if group_by.iter().any(|g| g == &name) {
            continue;
        }
        let aggregator = definition.and_then(|d| d.aggregator(&name));
        match existing.get(&name) {
            // without an aggregator the first write wins
            Some(current) => {
                if let Some(aggregator) = aggregator {
                    let merged = aggregator.apply(current.clone(), value).map_err(|e| {
                        CoreError::operation_caused_by(
                            format!("failed to aggregate property '{}'", name),
                            e,
                        )
                    })?;
                    updates.push((name, merged));
                }
            }
            None => updates.push((name, value)),
        }
    }
    target.properties_mut().extend(updates);
    Ok(())
}

/// Accumulates elements into aggregated buckets, preserving first-seen order
#[derive(Debug)]
pub struct ElementAggregator<'a> {
    schema: &'a Schema,
    view: Option<&'a View>,
    elements: Vec<Element>,
    index: HashMap<AggregationKey, usize>,
}

impl<'a> ElementAggregator<'a> {
    /// Aggregate with the schema's group-by keys
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            view: None,
            elements: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Aggregate with a view's group-by overrides, falling back to the
    /// schema's keys
    pub fn with_view(schema: &'a Schema, view: &'a View) -> Self {
        Self {
            view: Some(view),
            ..Self::new(schema)
        }
    }

    fn group_by_for(&self, group: &str) -> &'a [String] {
        let from_view = self.view.and_then(|v| v.group_by(group));
        match from_view {
            Some(group_by) => group_by,
            None => match self.schema.element_definition(group) {
                Some(definition) => definition.group_by(),
                None => &[],
            },
        }
    }

    /// Add one element
    pub fn add(&mut self, element: Element) -> Result<(), CoreError> {
        let group_by = self.group_by_for(element.group());
        let key = AggregationKey::of(&element, group_by);
        match self.index.get(&key) {
            Some(&position) => {
                let definition = self.schema.element_definition(element.group());
                merge_into(definition, group_by, &mut self.elements[position], element)
            }
            None => {
                self.index.insert(key, self.elements.len());
                self.elements.push(element);
                Ok(())
            }
        }
    }

    /// Add every element of an iterator
    pub fn extend<I>(&mut self, elements: I) -> Result<(), CoreError>
    where
        I: IntoIterator<Item = Element>,
    {
        for element in elements {
            self.add(element)?;
        }
        Ok(())
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether nothing was added
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The aggregated elements
    pub fn into_elements(self) -> Vec<Element> {
        self.elements
    }
}

/// Aggregate a batch with the schema's group-by keys
pub fn aggregate<I>(schema: &Schema, elements: I) -> Result<Vec<Element>, CoreError>
where
    I: IntoIterator<Item = Element>,
{
    let mut aggregator = ElementAggregator::new(schema);
    aggregator.extend(elements)?;
    Ok(aggregator.into_elements())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::element::{Edge, Entity};
    use crate::domain::functions::FunctionRef;
    use crate::domain::schema::{ElementDefinition, PropertyDefinition, SchemaDefinition};
    use crate::domain::value::ValueType;
    use crate::domain::view::ViewElementDefinition;

    fn schema() -> Schema {
        let counted = ElementDefinition::default()
            .property(
                "count",
                PropertyDefinition::new(ValueType::Long).aggregated_by(FunctionRef::new("sum")),
            )
            .property(
                "tags",
                PropertyDefinition::new(ValueType::StringSet)
                    .aggregated_by(FunctionRef::new("string_set_union")),
            )
            .property("label", PropertyDefinition::new(ValueType::String))
            .property("day", PropertyDefinition::new(ValueType::Long))
            .group_by(["day"]);
        Schema::from_definition(
            SchemaDefinition::default()
                .entity("Counted", counted.clone())
                .edge("link", counted),
        )
        .unwrap()
    }

    fn counted(vertex: &str, day: i64, count: i64) -> Element {
        Element::from(
            Entity::new("Counted", vertex)
                .with_property("day", day)
                .with_property("count", count),
        )
    }

    #[test]
    fn test_same_key_is_merged() {
        let result = aggregate(&schema(), vec![counted("a", 1, 2), counted("a", 1, 5)]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].property("count"), Some(&Value::Long(7)));
    }

    #[test]
    fn test_different_group_by_stays_distinct() {
        let result = aggregate(
            &schema(),
            vec![counted("a", 1, 2), counted("a", 2, 5), counted("b", 1, 1)],
        )
        .unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_flipped_undirected_edges_aggregate() {
        let a = Element::from(Edge::new("link", "x", "y", false).with_property("count", 1));
        let b = Element::from(Edge::new("link", "y", "x", false).with_property("count", 2));
        let c = Element::from(Edge::new("link", "y", "x", true).with_property("count", 4));
        let result = aggregate(&schema(), vec![a, b, c]).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].property("count"), Some(&Value::Long(3)));
    }

    #[test]
    fn test_non_aggregated_property_first_write_wins() {
        let first = Element::from(Entity::new("Counted", "a").with_property("label", "first"));
        let second = Element::from(Entity::new("Counted", "a").with_property("label", "second"));
        let unlabelled = Element::from(Entity::new("Counted", "b"));
        let late = Element::from(Entity::new("Counted", "b").with_property("label", "late"));

        let result = aggregate(&schema(), vec![first, second, unlabelled, late]).unwrap();
        assert_eq!(result[0].property("label"), Some(&Value::from("first")));
        assert_eq!(result[1].property("label"), Some(&Value::from("late")));
    }

    #[test]
    fn test_view_group_by_override_summarises() {
        let view = View::all().with_group_definition(
            "Counted",
            ViewElementDefinition {
                properties: None,
                group_by: Some(vec![]),
            },
        );
        let schema = schema();
        let mut aggregator = ElementAggregator::with_view(&schema, &view);
        aggregator
            .extend(vec![counted("a", 1, 2), counted("a", 2, 5)])
            .unwrap();
        let result = aggregator.into_elements();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].property("count"), Some(&Value::Long(7)));
    }

    #[test]
    fn test_aggregation_failure_names_the_property() {
        let bad = Element::from(
            Entity::new("Counted", "a")
                .with_property("day", 0)
                .with_property("count", "oops"),
        );
        let err = aggregate(&schema(), vec![counted("a", 0, 1), bad]).unwrap_err();
        assert!(err.to_string().contains("failed to aggregate property 'count'"));
    }

    #[test]
    fn test_failed_merge_leaves_target_unchanged() {
        let schema = schema();
        let definition = schema.element_definition("Counted");
        let mut target = Element::from(
            Entity::new("Counted", "a")
                .with_property("day", 0)
                .with_property("count", 1),
        );
        let before = target.clone();
        let bad = Element::from(
            Entity::new("Counted", "a")
                .with_property("day", 0)
                .with_property("label", "new")
                .with_property("count", "oops"),
        );
        let group_by = ["day".to_string()];
        assert!(merge_into(definition, &group_by, &mut target, bad).is_err());
        assert_eq!(target, before);
    }
}
