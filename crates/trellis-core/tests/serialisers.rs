use proptest::collection::{btree_set, vec};
use proptest::prelude::*;
use trellis_core::domain::sketch::HyperLogLog;
use trellis_core::serialisation::{Serialiser, SerialiserRegistry};
use trellis_core::{Value, ValueType};

fn finite_double() -> impl Strategy<Value = f64> {
    prop_oneof![
        -1e300f64..1e300f64,
        Just(0.0),
        Just(-0.0),
        Just(f64::INFINITY),
        Just(f64::NEG_INFINITY),
    ]
}

fn value_of(value_type: ValueType) -> BoxedStrategy<Value> {
    match value_type {
        ValueType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
        ValueType::Long => any::<i64>().prop_map(Value::Long).boxed(),
        ValueType::Double => finite_double().prop_map(Value::Double).boxed(),
        ValueType::String => ".{0,16}".prop_map(Value::String).boxed(),
        ValueType::Bytes => vec(any::<u8>(), 0..24).prop_map(Value::Bytes).boxed(),
        ValueType::StringSet => btree_set("[a-z]{0,6}", 0..5)
            .prop_map(Value::StringSet)
            .boxed(),
        ValueType::Sketch => vec("[a-z]{1,8}", 0..20)
            .prop_map(|items| {
                let mut sketch = HyperLogLog::new(6).expect("valid precision");
                for item in &items {
                    sketch.offer(item);
                }
                Value::Sketch(sketch)
            })
            .boxed(),
        ValueType::Any => prop_oneof![
            any::<i64>().prop_map(Value::Long),
            "[a-z]{0,8}".prop_map(Value::String),
            any::<bool>().prop_map(Value::Bool),
        ]
        .boxed(),
    }
}

fn serialiser(name: &str) -> std::sync::Arc<dyn Serialiser> {
    SerialiserRegistry::with_defaults()
        .by_name(name)
        .expect("default serialiser")
}

fn round_trip(serialiser: &dyn Serialiser, value: &Value) -> Value {
    let bytes = serialiser.serialise(value).unwrap();
    serialiser.deserialise(&bytes).unwrap()
}

proptest! {
    #[test]
    fn every_default_serialiser_round_trips(
        (name, value) in prop_oneof![
            Just(("boolean", ValueType::Bool)),
            Just(("ordered_long", ValueType::Long)),
            Just(("ordered_double", ValueType::Double)),
            Just(("string", ValueType::String)),
            Just(("bytes", ValueType::Bytes)),
            Just(("string_set", ValueType::StringSet)),
            Just(("sketch", ValueType::Sketch)),
            Just(("json", ValueType::Any)),
        ]
        .prop_flat_map(|(name, value_type)| (Just(name), value_of(value_type)))
    ) {
        let serialiser = serialiser(name);
        prop_assert_eq!(round_trip(serialiser.as_ref(), &value), value);
    }

    #[test]
    fn ordered_long_preserves_order(a in any::<i64>(), b in any::<i64>()) {
        let serialiser = serialiser("ordered_long");
        let (x, y) = (Value::Long(a.min(b)), Value::Long(a.max(b)));
        prop_assume!(x < y);
        prop_assert!(serialiser.serialise(&x).unwrap() < serialiser.serialise(&y).unwrap());
    }

    #[test]
    fn ordered_double_preserves_order(a in finite_double(), b in finite_double()) {
        let serialiser = serialiser("ordered_double");
        let (x, y) = (Value::Double(a), Value::Double(b));
        prop_assume!(x != y);
        let (lo, hi) = if x < y { (x, y) } else { (y, x) };
        prop_assert!(serialiser.serialise(&lo).unwrap() < serialiser.serialise(&hi).unwrap());
    }

    #[test]
    fn string_and_bytes_preserve_order(a in ".{0,12}", b in ".{0,12}") {
        prop_assume!(a != b);
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let strings = serialiser("string");
        prop_assert!(
            strings.serialise(&Value::from(lo.as_str())).unwrap()
                < strings.serialise(&Value::from(hi.as_str())).unwrap()
        );
        let bytes = serialiser("bytes");
        prop_assert!(
            bytes.serialise(&Value::Bytes(lo.into_bytes())).unwrap()
                < bytes.serialise(&Value::Bytes(hi.into_bytes())).unwrap()
        );
    }
}

#[test]
fn empty_values_round_trip() {
    let cases = [
        ("string", Value::from("")),
        ("bytes", Value::Bytes(Vec::new())),
        ("string_set", Value::StringSet(Default::default())),
        ("ordered_long", Value::Null),
        ("boolean", Value::Null),
    ];
    for (name, value) in cases {
        let serialiser = serialiser(name);
        assert_eq!(round_trip(serialiser.as_ref(), &value), value, "{}", name);
        assert_eq!(serialiser.deserialise_empty().unwrap(), value, "{}", name);
    }
}

#[test]
fn sketch_has_no_empty_value() {
    let err = serialiser("sketch").deserialise_empty().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Serialisation error: a sketch has no empty representation"
    );
}

#[test]
fn ordering_flags_match_the_documented_defaults() {
    let registry = SerialiserRegistry::with_defaults();
    let ordered: Vec<_> = registry
        .serialisers()
        .iter()
        .filter(|s| s.preserves_ordering())
        .map(|s| s.name())
        .collect();
    assert_eq!(
        ordered,
        vec!["boolean", "ordered_long", "ordered_double", "string", "bytes"]
    );
}
