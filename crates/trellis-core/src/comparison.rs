//! Element ordering, sorting and min/max selection
//!
//! [`sort`], [`max`] and [`min`] share a three-way contract: a missing input
//! or comparator yields `None` (nothing to do), an input that is empty after
//! filtering is an [`CoreError::EmptyInput`] for the reducing operations, and
//! anything else yields a value.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use crate::domain::element::Element;
use crate::domain::value::Value;
use crate::CoreError;

/// Total order over property values
pub trait ValueComparator: Send + Sync + fmt::Debug {
    /// Compare two values
    fn compare(&self, left: &Value, right: &Value) -> Ordering;
}

/// The natural value order
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl ValueComparator for NaturalOrder {
    fn compare(&self, left: &Value, right: &Value) -> Ordering {
        left.cmp(right)
    }
}

/// Total order over elements
pub trait ElementComparator: Send + Sync + fmt::Debug {
    /// Compare two elements
    fn compare(&self, left: &Element, right: &Element) -> Ordering;

    /// Downcast to a property comparator, used to pre-filter inputs
    fn as_property_comparator(&self) -> Option<&PropertyComparator> {
        None
    }

    /// `(group, property)` pairs that must have an orderable declared type
    fn comparable_pairs(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Orders elements by one property of one group
///
/// Elements of other groups, or without the property, sort after every
/// element that has it, regardless of `reversed`.
#[derive(Debug, Clone)]
pub struct PropertyComparator {
    group: String,
    property: String,
    reversed: bool,
    comparator: Option<Arc<dyn ValueComparator>>,
}

impl PropertyComparator {
    /// Compare `property` of `group` in natural order
    pub fn new(group: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            property: property.into(),
            reversed: false,
            comparator: None,
        }
    }

    /// Reverse the order of applicable elements
    pub fn reversed(mut self) -> Self {
        self.reversed = !self.reversed;
        self
    }

    /// Use an explicit value comparator instead of the natural order
    pub fn with_comparator(mut self, comparator: Arc<dyn ValueComparator>) -> Self {
        self.comparator = Some(comparator);
        self
    }

    /// Target group
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Target property
    pub fn property(&self) -> &str {
        &self.property
    }

    /// Whether an explicit value comparator is set
    pub fn has_explicit_comparator(&self) -> bool {
        self.comparator.is_some()
    }

    fn value_of<'a>(&self, element: &'a Element) -> Option<&'a Value> {
        if element.group() == self.group {
            element.property(&self.property)
        } else {
            None
        }
    }

    /// Whether an element carries the compared property
    pub fn is_applicable(&self, element: &Element) -> bool {
        self.value_of(element).is_some()
    }

    /// A filter keeping only applicable elements
    pub fn as_predicate(&self) -> impl Fn(&Element) -> bool + '_ {
        move |element| self.is_applicable(element)
    }
}

impl ElementComparator for PropertyComparator {
    fn compare(&self, left: &Element, right: &Element) -> Ordering {
        match (self.value_of(left), self.value_of(right)) {
            (Some(a), Some(b)) => {
                let ordering = match &self.comparator {
                    Some(c) => c.compare(a, b),
                    None => a.cmp(b),
                };
                if self.reversed {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn as_property_comparator(&self) -> Option<&PropertyComparator> {
        Some(self)
    }

    fn comparable_pairs(&self) -> Vec<(String, String)> {
        if self.comparator.is_some() {
            Vec::new()
        } else {
            vec![(self.group.clone(), self.property.clone())]
        }
    }
}

/// Lexicographic combination of comparators
#[derive(Debug, Clone, Default)]
pub struct CompositeComparator {
    comparators: Vec<Arc<dyn ElementComparator>>,
}

impl CompositeComparator {
    /// An empty composite, which considers every element equal
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tie-breaking comparator
    pub fn then(mut self, comparator: Arc<dyn ElementComparator>) -> Self {
        self.comparators.push(comparator);
        self
    }
}

impl ElementComparator for CompositeComparator {
    fn compare(&self, left: &Element, right: &Element) -> Ordering {
        self.comparators
            .iter()
            .map(|c| c.compare(left, right))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn comparable_pairs(&self) -> Vec<(String, String)> {
        self.comparators
            .iter()
            .flat_map(|c| c.comparable_pairs())
            .collect()
    }
}

fn applicable<I>(input: I, comparator: &dyn ElementComparator) -> Vec<Element>
where
    I: IntoIterator<Item = Element>,
{
    match comparator.as_property_comparator() {
        Some(property) => input.into_iter().filter(property.as_predicate()).collect(),
        None => input.into_iter().collect(),
    }
}

/// Sort ascending and keep at most `limit` elements
///
/// Property comparators drop non-applicable elements first. The sort is
/// stable.
pub fn sort<I>(
    input: Option<I>,
    comparator: Option<&dyn ElementComparator>,
    limit: Option<usize>,
) -> Option<Vec<Element>>
where
    I: IntoIterator<Item = Element>,
{
    let (input, comparator) = (input?, comparator?);
    let mut elements = applicable(input, comparator);
    elements.sort_by(|a, b| comparator.compare(a, b));
    if let Some(limit) = limit {
        elements.truncate(limit);
    }
    Some(elements)
}

fn reduce<I>(
    input: Option<I>,
    comparator: Option<&dyn ElementComparator>,
    operation: &str,
    keep: Ordering,
) -> Result<Option<Element>, CoreError>
where
    I: IntoIterator<Item = Element>,
{
    let (input, comparator) = match (input, comparator) {
        (Some(input), Some(comparator)) => (input, comparator),
        _ => return Ok(None),
    };
    let mut elements = applicable(input, comparator).into_iter();
    let first = elements.next().ok_or_else(|| {
        CoreError::EmptyInput(format!("{} requires at least one comparable element", operation))
    })?;
    let best = elements.fold(first, |best, candidate| {
        if comparator.compare(&candidate, &best) == keep {
            candidate
        } else {
            best
        }
    });
    Ok(Some(best))
}

/// The greatest element; ties keep the first seen
pub fn max<I>(
    input: Option<I>,
    comparator: Option<&dyn ElementComparator>,
) -> Result<Option<Element>, CoreError>
where
    I: IntoIterator<Item = Element>,
{
    reduce(input, comparator, "max", Ordering::Greater)
}

/// The smallest element; ties keep the first seen
pub fn min<I>(
    input: Option<I>,
    comparator: Option<&dyn ElementComparator>,
) -> Result<Option<Element>, CoreError>
where
    I: IntoIterator<Item = Element>,
{
    reduce(input, comparator, "min", Ordering::Less)
}
