use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use trellis_core::aggregation::aggregate;
use trellis_core::domain::functions::FunctionRef;
use trellis_core::domain::schema::{ElementDefinition, PropertyDefinition, SchemaDefinition};
use trellis_core::{Edge, Element, Entity, Schema, Value, ValueType};

fn schema() -> Schema {
    let definition = ElementDefinition::default()
        .property(
            "count",
            PropertyDefinition::new(ValueType::Long).aggregated_by(FunctionRef::new("sum")),
        )
        .property(
            "tags",
            PropertyDefinition::new(ValueType::StringSet)
                .aggregated_by(FunctionRef::new("string_set_union")),
        )
        .property(
            "peak",
            PropertyDefinition::new(ValueType::Long).aggregated_by(FunctionRef::new("max")),
        );
    Schema::from_definition(
        SchemaDefinition::default()
            .entity("Counter", definition.clone())
            .edge("counted", definition),
    )
    .unwrap()
}

fn counter(count: i64, tags: Vec<String>, peak: i64) -> Element {
    Element::from(
        Entity::new("Counter", "v")
            .with_property("count", count)
            .with_property("tags", Value::string_set(tags))
            .with_property("peak", peak),
    )
}

fn elements() -> impl Strategy<Value = Vec<Element>> {
    vec(
        (
            -1000i64..1000,
            btree_set("[a-c]", 0..3),
            -50i64..50,
        )
            .prop_map(|(count, tags, peak)| counter(count, tags.into_iter().collect(), peak)),
        1..6,
    )
}

proptest! {
    #[test]
    fn merge_order_does_not_change_the_result(
        (original, shuffled) in elements().prop_flat_map(|e| (Just(e.clone()), Just(e).prop_shuffle()))
    ) {
        let schema = schema();
        let a = aggregate(&schema, original).unwrap();
        let b = aggregate(&schema, shuffled).unwrap();
        prop_assert_eq!(a.len(), 1);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn partitioned_merge_equals_single_pass(input in elements(), split in 0usize..6) {
        let schema = schema();
        let split = split.min(input.len());
        let (left, right) = input.split_at(split);
        let mut partials = aggregate(&schema, left.to_vec()).unwrap();
        partials.extend(aggregate(&schema, right.to_vec()).unwrap());
        let combined = aggregate(&schema, partials).unwrap();
        prop_assert_eq!(combined, aggregate(&schema, input).unwrap());
    }
}

#[test]
fn three_way_permutations_agree() {
    let e1 = counter(1, vec!["a".into()], 3);
    let e2 = counter(2, vec!["b".into()], 9);
    let e3 = counter(4, vec!["a".into(), "c".into()], 1);
    let orders = [
        [&e1, &e2, &e3],
        [&e1, &e3, &e2],
        [&e2, &e1, &e3],
        [&e2, &e3, &e1],
        [&e3, &e1, &e2],
        [&e3, &e2, &e1],
    ];
    let schema = schema();
    for order in orders {
        let merged = aggregate(&schema, order.iter().map(|e| (*e).clone())).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].property("count"), Some(&Value::Long(7)));
        assert_eq!(merged[0].property("peak"), Some(&Value::Long(9)));
        assert_eq!(
            merged[0].property("tags"),
            Some(&Value::string_set(["a", "b", "c"]))
        );
    }
}

#[test]
fn undirected_edges_merge_regardless_of_orientation() {
    let forward = Element::from(Edge::new("counted", 1, 2, false).with_property("count", 1));
    let backward = Element::from(Edge::new("counted", 2, 1, false).with_property("count", 1));
    let merged = aggregate(&schema(), vec![forward, backward]).unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].property("count"), Some(&Value::Long(2)));
}
