//! Byte keys for stored elements
//!
//! A key is the group name, a kind byte, the serialised identifiers and, last,
//! the group-by values serialised with their property serialisers. Each part
//! is written with `0x00` escaped as `0x00 0xFF` and closed by `0x00 0x01`, so
//! a part sorts exactly as its raw bytes do and a shorter prefix sorts first.
//! Group-by serialisers preserve ordering, so keys of one element sort by
//! group-by value.

use trellis_core::domain::schema::Schema;
use trellis_core::serialisation::SerialiserRegistry;
use trellis_core::{CoreError, Element, Value};

const ENTITY: u8 = 0;
const DIRECTED_EDGE: u8 = 1;
const UNDIRECTED_EDGE: u8 = 2;

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

fn push_part(out: &mut Vec<u8>, bytes: &[u8]) {
    for &byte in bytes {
        out.push(byte);
        if byte == ESCAPE {
            out.push(ESCAPED_ZERO);
        }
    }
    out.extend_from_slice(&[ESCAPE, TERMINATOR]);
}

fn push_identifier(
    out: &mut Vec<u8>,
    serialisers: &SerialiserRegistry,
    identifier: &Value,
) -> Result<(), CoreError> {
    let serialiser = serialisers.for_value(identifier)?;
    push_part(out, serialiser.name().as_bytes());
    push_part(out, &serialiser.serialise(identifier)?);
    Ok(())
}

/// Encodes element keys for one schema
#[derive(Debug)]
pub struct KeyEncoder<'a> {
    schema: &'a Schema,
    serialisers: &'a SerialiserRegistry,
}

impl<'a> KeyEncoder<'a> {
    /// An encoder using `serialisers` for identifiers
    pub fn new(schema: &'a Schema, serialisers: &'a SerialiserRegistry) -> Self {
        Self {
            schema,
            serialisers,
        }
    }

    /// Key of an element; elements with equal keys are aggregated together
    pub fn key(&self, element: &Element) -> Result<Vec<u8>, CoreError> {
        let mut out = Vec::new();
        push_part(&mut out, element.group().as_bytes());
        match element {
            Element::Entity(entity) => {
                out.push(ENTITY);
                push_identifier(&mut out, self.serialisers, &entity.vertex)?;
            }
            Element::Edge(edge) => {
                out.push(if edge.is_directed() {
                    DIRECTED_EDGE
                } else {
                    UNDIRECTED_EDGE
                });
                push_identifier(&mut out, self.serialisers, edge.source())?;
                push_identifier(&mut out, self.serialisers, edge.destination())?;
            }
        }
        if let Some(definition) = self.schema.element_definition(element.group()) {
            for name in definition.group_by() {
                let value = element.property(name).cloned().unwrap_or_default();
                let bytes = match definition.property(name) {
                    Some(property) => property.serialiser.serialise(&value)?,
                    None => Vec::new(),
                };
                push_part(&mut out, &bytes);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::domain::schema::{ElementDefinition, PropertyDefinition, SchemaDefinition};
    use trellis_core::{Edge, Entity, ValueType};

    fn schema() -> Schema {
        Schema::from_definition(
            SchemaDefinition::default()
                .entity(
                    "Day",
                    ElementDefinition::default()
                        .property("day", PropertyDefinition::new(ValueType::Long))
                        .group_by(["day"]),
                )
                .entity(
                    "Tagged",
                    ElementDefinition::default()
                        .property("tag", PropertyDefinition::new(ValueType::String))
                        .property("raw", PropertyDefinition::new(ValueType::Bytes))
                        .group_by(["tag", "raw"]),
                )
                .edge("link", ElementDefinition::default()),
        )
        .unwrap()
    }

    #[test]
    fn test_group_by_values_order_keys() {
        let schema = schema();
        let serialisers = SerialiserRegistry::with_defaults();
        let encoder = KeyEncoder::new(&schema, &serialisers);
        let day = |d: i64| Element::from(Entity::new("Day", "v").with_property("day", d));
        assert!(encoder.key(&day(-3)).unwrap() < encoder.key(&day(2)).unwrap());
        assert_ne!(encoder.key(&day(1)).unwrap(), encoder.key(&day(2)).unwrap());
    }

    #[test]
    fn test_flipped_undirected_edges_share_a_key() {
        let schema = schema();
        let serialisers = SerialiserRegistry::with_defaults();
        let encoder = KeyEncoder::new(&schema, &serialisers);
        let ab = Element::from(Edge::new("link", "a", "b", false));
        let ba = Element::from(Edge::new("link", "b", "a", false));
        let directed = Element::from(Edge::new("link", "a", "b", true));
        assert_eq!(encoder.key(&ab).unwrap(), encoder.key(&ba).unwrap());
        assert_ne!(encoder.key(&ab).unwrap(), encoder.key(&directed).unwrap());
    }

    #[test]
    fn test_identifier_types_do_not_collide() {
        let schema = schema();
        let serialisers = SerialiserRegistry::with_defaults();
        let encoder = KeyEncoder::new(&schema, &serialisers);
        let text = Element::from(Entity::new("Other", "1"));
        let number = Element::from(Entity::new("Other", 1));
        assert_ne!(encoder.key(&text).unwrap(), encoder.key(&number).unwrap());
    }

    #[test]
    fn test_variable_length_group_by_sorts_by_content() {
        let schema = schema();
        let serialisers = SerialiserRegistry::with_defaults();
        let encoder = KeyEncoder::new(&schema, &serialisers);
        let tagged = |tag: &str, raw: Vec<u8>| {
            let element = Element::from(
                Entity::new("Tagged", "v")
                    .with_property("tag", tag)
                    .with_property("raw", Value::Bytes(raw)),
            );
            encoder.key(&element).unwrap()
        };
        assert!(tagged("aa", vec![]) < tagged("b", vec![]));
        assert!(tagged("a", vec![9]) < tagged("aa", vec![]));
        assert!(tagged("a", vec![0]) < tagged("a", vec![0, 0]));
        assert!(tagged("a", vec![0, 0]) < tagged("a", vec![1]));
        assert_ne!(tagged("a\u{0}", vec![]), tagged("a", vec![0]));
    }

    #[test]
    fn test_identifiers_sort_by_content() {
        let schema = schema();
        let serialisers = SerialiserRegistry::with_defaults();
        let encoder = KeyEncoder::new(&schema, &serialisers);
        let alice = Element::from(Entity::new("Other", "alice"));
        let bob = Element::from(Entity::new("Other", "bob"));
        assert!(encoder.key(&alice).unwrap() < encoder.key(&bob).unwrap());
    }
}
