use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

use trellis_core::aggregation::{merge_into, ElementAggregator};
use trellis_core::operation::handler::OperationHandler;
use trellis_core::operation::impls::{
    AddElements, GetAllElements, GetElements, IncludeIncomingOutgoing, SeedMatching,
};
use trellis_core::{
    Context, CoreError, Data, Element, ElementId, ElementStream, ReleaseHandle, Schema, Store,
    View,
};

use crate::store::Shared;

/// Handles [`AddElements`]: validate, aggregate, then merge into the map
#[derive(Debug)]
pub struct AddElementsHandler {
    shared: Arc<Shared>,
}

impl AddElementsHandler {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl OperationHandler<AddElements> for AddElementsHandler {
    fn handle(
        &self,
        operation: &AddElements,
        input: Data,
        _context: &mut Context,
        store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let elements = match input.into_elements()? {
            Some(elements) => elements,
            None => return Ok(Data::Null),
        };
        let schema = store.schema();
        let properties = &self.shared.properties;
        let validate = properties.validate && operation.validate;
        let skip_invalid = properties.skip_invalid_elements || operation.skip_invalid_elements;

        let mut accepted = Vec::new();
        let mut skipped = 0usize;
        for element in elements {
            if validate {
                if let Err(failure) = schema.validate(&element) {
                    if skip_invalid {
                        debug!(group = %element.group(), failure = %failure, "Skipping invalid element");
                        skipped += 1;
                        continue;
                    }
                    return Err(failure.into());
                }
            }
            accepted.push(element);
        }

        let batch = if properties.aggregate {
            trellis_core::aggregation::aggregate(schema, accepted)?
        } else {
            accepted
        };

        let encoder = self.shared.encoder(schema);
        let keyed = batch
            .into_iter()
            .map(|element| encoder.key(&element).map(|key| (key, element)))
            .collect::<Result<Vec<_>, _>>()?;

        let mut data = self.shared.write()?;
        let added = keyed.len();
        // merged slots are staged so a failed merge leaves the map untouched
        let mut staged: BTreeMap<Vec<u8>, Vec<Element>> = BTreeMap::new();
        for (key, element) in keyed {
            let slot = match staged.entry(key) {
                Entry::Occupied(slot) => slot.into_mut(),
                Entry::Vacant(slot) => {
                    let current = data.elements.get(slot.key()).cloned().unwrap_or_default();
                    slot.insert(current)
                }
            };
            if properties.aggregate && !slot.is_empty() {
                let definition = schema.element_definition(element.group());
                let group_by = definition.map_or(&[][..], |d| d.group_by());
                merge_into(definition, group_by, &mut slot[0], element)?;
            } else {
                slot.push(element);
            }
        }
        for (key, slot) in staged {
            for element in &slot {
                data.index(&key, element);
            }
            data.elements.insert(key, slot);
        }
        debug!(graph_id = %store.graph_id(), added, skipped, "Added elements");
        Ok(Data::Null)
    }
}

fn direction_allows(direction: IncludeIncomingOutgoing, element: &Element, seed: &ElementId) -> bool {
    let (edge, vertex) = match (element, seed) {
        (Element::Edge(edge), ElementId::Entity(seed)) => (edge, &seed.vertex),
        _ => return true,
    };
    if !edge.is_directed() {
        return true;
    }
    match direction {
        IncludeIncomingOutgoing::Either => true,
        IncludeIncomingOutgoing::Outgoing => edge.source() == vertex,
        IncludeIncomingOutgoing::Incoming => edge.destination() == vertex,
    }
}

fn seed_matches(operation: &GetElements, element: &Element, seed: &ElementId) -> bool {
    match operation.seed_matching {
        SeedMatching::Equal => &element.element_id() == seed,
        SeedMatching::Related => {
            element.is_related(seed).is_match()
                && direction_allows(operation.direction, element, seed)
        }
    }
}

/// Shape retrieved elements with a view and wrap them in a tracked stream
fn into_stream(
    shared: &Arc<Shared>,
    schema: &Schema,
    view: &View,
    elements: Vec<Element>,
) -> Result<Data, CoreError> {
    let mut elements = if view.summarise {
        let mut aggregator = ElementAggregator::with_view(schema, view);
        aggregator.extend(elements)?;
        aggregator.into_elements()
    } else {
        elements
    };
    for element in &mut elements {
        view.project(element);
    }

    shared.open_iterators.fetch_add(1, Ordering::AcqRel);
    let counter = Arc::clone(shared);
    let release = ReleaseHandle::new(move || {
        counter.open_iterators.fetch_sub(1, Ordering::AcqRel);
    });
    Ok(Data::Elements(ElementStream::new(elements.into_iter(), release)))
}

/// Handles [`GetElements`]
#[derive(Debug)]
pub struct GetElementsHandler {
    shared: Arc<Shared>,
}

impl GetElementsHandler {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl OperationHandler<GetElements> for GetElementsHandler {
    fn handle(
        &self,
        operation: &GetElements,
        input: Data,
        _context: &mut Context,
        store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let seeds = match input.into_element_ids()? {
            Some(seeds) => seeds,
            None => {
                warn!(graph_id = %store.graph_id(), "GetElements ran without seeds");
                return Ok(Data::Elements(ElementStream::empty()));
            }
        };

        let data = self.shared.read()?;
        let mut seen: HashSet<&[u8]> = HashSet::new();
        let mut found = Vec::new();
        for seed in &seeds {
            let keys = seed
                .identifiers()
                .into_iter()
                .filter_map(|vertex| data.by_vertex.get(vertex))
                .flatten();
            for key in keys {
                if seen.contains(key.as_slice()) {
                    continue;
                }
                let Some(elements) = data.elements.get(key) else {
                    continue;
                };
                let matching: Vec<&Element> = elements
                    .iter()
                    .filter(|e| operation.view.allows(e) && seed_matches(operation, e, seed))
                    .collect();
                if !matching.is_empty() {
                    seen.insert(key.as_slice());
                    found.extend(matching.into_iter().cloned());
                }
            }
        }
        drop(seen);
        drop(data);

        debug!(seeds = seeds.len(), found = found.len(), "Retrieved seeded elements");
        into_stream(&self.shared, store.schema(), &operation.view, found)
    }
}

/// Handles [`GetAllElements`]
#[derive(Debug)]
pub struct GetAllElementsHandler {
    shared: Arc<Shared>,
}

impl GetAllElementsHandler {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }
}

impl OperationHandler<GetAllElements> for GetAllElementsHandler {
    fn handle(
        &self,
        operation: &GetAllElements,
        _input: Data,
        _context: &mut Context,
        store: &dyn Store,
    ) -> Result<Data, CoreError> {
        let found: Vec<Element> = self
            .shared
            .read()?
            .elements
            .values()
            .flatten()
            .filter(|e| operation.view.allows(e))
            .cloned()
            .collect();
        debug!(found = found.len(), "Retrieved all elements");
        into_stream(&self.shared, store.schema(), &operation.view, found)
    }
}
