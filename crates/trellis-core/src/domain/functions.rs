//! Aggregate functions and validation predicates
//!
//! Schemas reference functions by id plus JSON arguments; a
//! [`FunctionRegistry`] turns those references into trait objects when the
//! schema is compiled.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::value::Value;
use crate::CoreError;

/// Combines two property values into one
///
/// Implementations must be associative and commutative so merge order never
/// changes the result.
pub trait AggregateFunction: Send + Sync {
    /// Function id
    fn name(&self) -> &str;

    /// Combine two non-null values
    fn apply(&self, left: Value, right: Value) -> Result<Value, CoreError>;
}

/// Tests a single property value; `None` means the property is unset
pub trait Predicate: Send + Sync {
    /// Predicate id
    fn name(&self) -> &str;

    /// Evaluate the predicate
    fn test(&self, value: Option<&Value>) -> bool;
}

impl fmt::Debug for dyn AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AggregateFunction({})", self.name())
    }
}

impl fmt::Debug for dyn Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Predicate({})", self.name())
    }
}

/// A reference to a registered function with its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRef {
    /// Registered id
    pub id: String,

    /// Factory arguments
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub args: serde_json::Value,
}

impl FunctionRef {
    /// Reference a function that takes no arguments
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            args: serde_json::Value::Null,
        }
    }

    /// Attach factory arguments
    pub fn with_args(mut self, args: serde_json::Value) -> Self {
        self.args = args;
        self
    }
}

/// Factory for aggregate functions
pub type AggregateFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn AggregateFunction>, CoreError> + Send + Sync>;

/// Factory for predicates
pub type PredicateFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Predicate>, CoreError> + Send + Sync>;

/// Registry of function factories keyed by id
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    aggregators: HashMap<String, AggregateFactory>,
    predicates: HashMap<String, PredicateFactory>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut aggregators: Vec<_> = self.aggregators.keys().collect();
        aggregators.sort();
        let mut predicates: Vec<_> = self.predicates.keys().collect();
        predicates.sort();
        f.debug_struct("FunctionRegistry")
            .field("aggregators", &aggregators)
            .field("predicates", &predicates)
            .finish()
    }
}

impl FunctionRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in functions
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for op in [BinaryOp::Sum, BinaryOp::Max, BinaryOp::Min, BinaryOp::StringSetUnion, BinaryOp::SketchUnion] {
            registry.register_aggregator(op.id(), move |_| Ok(Arc::new(op) as Arc<dyn AggregateFunction>));
        }

        registry.register_predicate("exists", |_| Ok(Arc::new(Exists) as Arc<dyn Predicate>));
        registry.register_predicate(
            "is_more_than",
            |args| Ok(Arc::new(Threshold::parse("is_more_than", args, true)?) as Arc<dyn Predicate>),
        );
        registry.register_predicate(
            "is_less_than",
            |args| Ok(Arc::new(Threshold::parse("is_less_than", args, false)?) as Arc<dyn Predicate>),
        );
        registry.register_predicate(
            "is_equal",
            |args| {
                let value = value_from_json(required(args, "is_equal", "value")?)?;
                Ok(Arc::new(IsEqual { value }) as Arc<dyn Predicate>)
            },
        );
        registry.register_predicate(
            "is_in",
            |args| {
                let values = match required(args, "is_in", "values")? {
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(value_from_json)
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => {
                        return Err(CoreError::Schema(
                            "is_in: 'values' must be an array".to_string(),
                        ))
                    }
                };
                Ok(Arc::new(IsIn { values }) as Arc<dyn Predicate>)
            },
        );
        registry.register_predicate(
            "matches_regex",
            |args| {
                let pattern = required(args, "matches_regex", "pattern")?
                    .as_str()
                    .ok_or_else(|| CoreError::Schema("matches_regex: 'pattern' must be a string".to_string()))?;
                let regex = Regex::new(pattern)
                    .map_err(|e| CoreError::Schema(format!("matches_regex: {}", e)))?;
                Ok(Arc::new(MatchesRegex { regex }) as Arc<dyn Predicate>)
            },
        );
        registry
    }

    /// Register an aggregate function factory, replacing any with the same id
    pub fn register_aggregator<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn AggregateFunction>, CoreError> + Send + Sync + 'static,
    {
        self.aggregators.insert(id.into(), Arc::new(factory));
    }

    /// Register a predicate factory, replacing any with the same id
    pub fn register_predicate<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn Predicate>, CoreError> + Send + Sync + 'static,
    {
        self.predicates.insert(id.into(), Arc::new(factory));
    }

    /// Build an aggregate function from a reference
    pub fn aggregator(&self, reference: &FunctionRef) -> Result<Arc<dyn AggregateFunction>, CoreError> {
        let factory = self.aggregators.get(&reference.id).ok_or_else(|| {
            CoreError::Schema(format!("unknown aggregate function '{}'", reference.id))
        })?;
        factory(&reference.args)
    }

    /// Build a predicate from a reference
    pub fn predicate(&self, reference: &FunctionRef) -> Result<Arc<dyn Predicate>, CoreError> {
        let factory = self.predicates.get(&reference.id).ok_or_else(|| {
            CoreError::Schema(format!("unknown predicate '{}'", reference.id))
        })?;
        factory(&reference.args)
    }
}

/// Convert a plain JSON literal into a property value
///
/// Integers become `Long`, other numbers `Double`, arrays of strings a
/// `StringSet`; objects are read as explicitly tagged values.
pub fn value_from_json(json: &serde_json::Value) -> Result<Value, CoreError> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Long(i)),
            None => n
                .as_f64()
                .map(Value::Double)
                .ok_or_else(|| CoreError::Schema(format!("unsupported number {}", n))),
        },
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| CoreError::Schema("only string arrays are supported".to_string()))
            })
            .collect::<Result<_, _>>()
            .map(Value::StringSet),
        serde_json::Value::Object(_) => Ok(serde_json::from_value(json.clone())?),
    }
}

fn required<'a>(
    args: &'a serde_json::Value,
    function: &str,
    name: &str,
) -> Result<&'a serde_json::Value, CoreError> {
    args.get(name)
        .ok_or_else(|| CoreError::Schema(format!("{}: missing argument '{}'", function, name)))
}

#[derive(Debug, Clone, Copy)]
enum BinaryOp {
    Sum,
    Max,
    Min,
    StringSetUnion,
    SketchUnion,
}

impl BinaryOp {
    fn id(&self) -> &'static str {
        match self {
            BinaryOp::Sum => "sum",
            BinaryOp::Max => "max",
            BinaryOp::Min => "min",
            BinaryOp::StringSetUnion => "string_set_union",
            BinaryOp::SketchUnion => "sketch_union",
        }
    }

    fn mismatch(&self, left: &Value, right: &Value) -> CoreError {
        CoreError::operation(format!(
            "{} cannot combine {:?} and {:?}",
            self.id(),
            left.value_type(),
            right.value_type()
        ))
    }
}

impl AggregateFunction for BinaryOp {
    fn name(&self) -> &str {
        self.id()
    }

    fn apply(&self, left: Value, right: Value) -> Result<Value, CoreError> {
        if left.is_null() {
            return Ok(right);
        }
        if right.is_null() {
            return Ok(left);
        }
        match self {
            // wraps on overflow so the sum stays associative
            BinaryOp::Sum => match (&left, &right) {
                (Value::Long(a), Value::Long(b)) => Ok(Value::Long(a.wrapping_add(*b))),
                (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
                _ => Err(self.mismatch(&left, &right)),
            },
            BinaryOp::Max => Ok(std::cmp::max(left, right)),
            BinaryOp::Min => Ok(std::cmp::min(left, right)),
            BinaryOp::StringSetUnion => match (left, right) {
                (Value::StringSet(mut a), Value::StringSet(b)) => {
                    a.extend(b);
                    Ok(Value::StringSet(a))
                }
                (l, r) => Err(self.mismatch(&l, &r)),
            },
            BinaryOp::SketchUnion => match (left, right) {
                (Value::Sketch(mut a), Value::Sketch(b)) => {
                    a.merge(&b)?;
                    Ok(Value::Sketch(a))
                }
                (l, r) => Err(self.mismatch(&l, &r)),
            },
        }
    }
}

struct Exists;

impl Predicate for Exists {
    fn name(&self) -> &str {
        "exists"
    }

    fn test(&self, value: Option<&Value>) -> bool {
        value.map_or(false, |v| !v.is_null())
    }
}

struct Threshold {
    name: &'static str,
    bound: Value,
    or_equal_to: bool,
    above: bool,
}

impl Threshold {
    fn parse(name: &'static str, args: &serde_json::Value, above: bool) -> Result<Self, CoreError> {
        let bound = value_from_json(required(args, name, "value")?)?;
        let or_equal_to = args
            .get("or_equal_to")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        Ok(Self {
            name,
            bound,
            or_equal_to,
            above,
        })
    }
}

impl Predicate for Threshold {
    fn name(&self) -> &str {
        self.name
    }

    fn test(&self, value: Option<&Value>) -> bool {
        let value = match value {
            Some(v) if v.value_type() == self.bound.value_type() => v,
            _ => return false,
        };
        let ordering = value.cmp(&self.bound);
        match (self.above, self.or_equal_to) {
            (true, false) => ordering.is_gt(),
            (true, true) => ordering.is_ge(),
            (false, false) => ordering.is_lt(),
            (false, true) => ordering.is_le(),
        }
    }
}

struct IsEqual {
    value: Value,
}

impl Predicate for IsEqual {
    fn name(&self) -> &str {
        "is_equal"
    }

    fn test(&self, value: Option<&Value>) -> bool {
        value.map_or(self.value.is_null(), |v| *v == self.value)
    }
}

struct IsIn {
    values: Vec<Value>,
}

impl Predicate for IsIn {
    fn name(&self) -> &str {
        "is_in"
    }

    fn test(&self, value: Option<&Value>) -> bool {
        value.map_or(false, |v| self.values.contains(v))
    }
}

struct MatchesRegex {
    regex: Regex,
}

impl Predicate for MatchesRegex {
    fn name(&self) -> &str {
        "matches_regex"
    }

    fn test(&self, value: Option<&Value>) -> bool {
        value
            .and_then(Value::as_str)
            .map_or(false, |s| self.regex.is_match(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn aggregator(id: &str) -> Arc<dyn AggregateFunction> {
        FunctionRegistry::with_builtins()
            .aggregator(&FunctionRef::new(id))
            .unwrap()
    }

    fn predicate(id: &str, args: serde_json::Value) -> Arc<dyn Predicate> {
        FunctionRegistry::with_builtins()
            .predicate(&FunctionRef::new(id).with_args(args))
            .unwrap()
    }

    #[test]
    fn test_sum() {
        let sum = aggregator("sum");
        assert_eq!(sum.apply(Value::from(2), Value::from(3)).unwrap(), Value::from(5));
        assert_eq!(sum.apply(Value::Null, Value::from(3)).unwrap(), Value::from(3));
        assert!(sum.apply(Value::from(2), Value::from("x")).is_err());
    }

    #[test]
    fn test_max_and_min() {
        assert_eq!(
            aggregator("max").apply(Value::from(2), Value::from(7)).unwrap(),
            Value::from(7)
        );
        assert_eq!(
            aggregator("min").apply(Value::from(2), Value::from(7)).unwrap(),
            Value::from(2)
        );
    }

    #[test]
    fn test_string_set_union() {
        let union = aggregator("string_set_union");
        let merged = union
            .apply(Value::string_set(["a", "b"]), Value::string_set(["b", "c"]))
            .unwrap();
        assert_eq!(merged, Value::string_set(["a", "b", "c"]));
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::with_builtins();
        let err = registry.aggregator(&FunctionRef::new("median")).unwrap_err();
        assert_eq!(err.to_string(), "Schema error: unknown aggregate function 'median'");
    }

    #[test]
    fn test_threshold_predicates() {
        let more = predicate("is_more_than", json!({"value": 10}));
        assert!(more.test(Some(&Value::from(11))));
        assert!(!more.test(Some(&Value::from(10))));
        assert!(!more.test(None));
        assert!(!more.test(Some(&Value::from("11"))));

        let less_eq = predicate("is_less_than", json!({"value": 10, "or_equal_to": true}));
        assert!(less_eq.test(Some(&Value::from(10))));
    }

    #[test]
    fn test_missing_argument() {
        let registry = FunctionRegistry::with_builtins();
        let err = registry
            .predicate(&FunctionRef::new("is_more_than"))
            .err()
            .unwrap();
        assert!(err.to_string().contains("missing argument 'value'"));
    }

    #[test]
    fn test_is_in_and_regex() {
        let is_in = predicate("is_in", json!({"values": ["red", "green"]}));
        assert!(is_in.test(Some(&Value::from("red"))));
        assert!(!is_in.test(Some(&Value::from("blue"))));

        let regex = predicate("matches_regex", json!({"pattern": "^[a-z]+$"}));
        assert!(regex.test(Some(&Value::from("abc"))));
        assert!(!regex.test(Some(&Value::from("ABC"))));
    }

    #[test]
    fn test_value_from_json() {
        assert_eq!(value_from_json(&json!(3)).unwrap(), Value::Long(3));
        assert_eq!(value_from_json(&json!(1.5)).unwrap(), Value::Double(1.5));
        assert_eq!(
            value_from_json(&json!(["a"])).unwrap(),
            Value::string_set(["a"])
        );
        assert_eq!(value_from_json(&json!({"long": 4})).unwrap(), Value::Long(4));
    }
}
