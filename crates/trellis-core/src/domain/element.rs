//! Graph elements and element identifiers
//!
//! Undirected edges are stored canonically (smaller endpoint first by the
//! value order), so `Edge(a, b, false)` and `Edge(b, a, false)` are the same
//! value and hash identically.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::value::{Identifier, Value};

/// Property bag keyed by property name
pub type Properties = BTreeMap<String, Value>;

/// Which endpoint of an edge matched a related identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchedVertex {
    /// The edge source matched
    Source,
    /// The edge destination matched
    Destination,
}

/// Outcome of a relation check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    /// Whether the two ids are related
    pub is_match: bool,
    /// Which endpoint matched, when an edge matched a vertex
    pub matched_vertex: Option<MatchedVertex>,
}

impl MatchResult {
    /// A positive match without endpoint information
    pub const MATCH: MatchResult = MatchResult {
        is_match: true,
        matched_vertex: None,
    };

    /// A negative match
    pub const NO_MATCH: MatchResult = MatchResult {
        is_match: false,
        matched_vertex: None,
    };

    /// A positive match on a specific endpoint
    pub fn on(vertex: MatchedVertex) -> Self {
        Self {
            is_match: true,
            matched_vertex: Some(vertex),
        }
    }

    /// Check if the result is a match
    #[inline]
    pub fn is_match(&self) -> bool {
        self.is_match
    }
}

fn canonical(
    source: Identifier,
    destination: Identifier,
    directed: bool,
) -> (Identifier, Identifier) {
    if !directed && destination < source {
        (destination, source)
    } else {
        (source, destination)
    }
}

/// Identifier of an entity: its vertex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    /// The vertex
    pub vertex: Identifier,
}

/// Identifier of an edge: its endpoints and directedness
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "EdgeIdFields")]
pub struct EdgeId {
    source: Identifier,
    destination: Identifier,
    directed: bool,
}

#[derive(Deserialize)]
struct EdgeIdFields {
    source: Identifier,
    destination: Identifier,
    directed: bool,
}

impl From<EdgeIdFields> for EdgeId {
    fn from(fields: EdgeIdFields) -> Self {
        EdgeId::new(fields.source, fields.destination, fields.directed)
    }
}

impl EdgeId {
    /// Create an edge id, canonicalising undirected endpoints
    pub fn new(source: impl Into<Identifier>, destination: impl Into<Identifier>, directed: bool) -> Self {
        let (source, destination) = canonical(source.into(), destination.into(), directed);
        Self {
            source,
            destination,
            directed,
        }
    }

    /// Source endpoint
    #[inline]
    pub fn source(&self) -> &Identifier {
        &self.source
    }

    /// Destination endpoint
    #[inline]
    pub fn destination(&self) -> &Identifier {
        &self.destination
    }

    /// Whether direction matters
    #[inline]
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    fn match_vertex(&self, vertex: &Identifier) -> MatchResult {
        if &self.source == vertex {
            MatchResult::on(MatchedVertex::Source)
        } else if &self.destination == vertex {
            MatchResult::on(MatchedVertex::Destination)
        } else {
            MatchResult::NO_MATCH
        }
    }
}

/// Identifier of either kind of element, used as a seed for look-ups
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum ElementId {
    /// Entity seed
    Entity(EntityId),
    /// Edge seed
    Edge(EdgeId),
}

impl ElementId {
    /// Seed for a single vertex
    pub fn entity(vertex: impl Into<Identifier>) -> Self {
        ElementId::Entity(EntityId {
            vertex: vertex.into(),
        })
    }

    /// Seed for an edge
    pub fn edge(source: impl Into<Identifier>, destination: impl Into<Identifier>, directed: bool) -> Self {
        ElementId::Edge(EdgeId::new(source, destination, directed))
    }

    /// Identifiers used for relation matching
    pub fn identifiers(&self) -> Vec<&Identifier> {
        match self {
            ElementId::Entity(id) => vec![&id.vertex],
            ElementId::Edge(id) => vec![&id.source, &id.destination],
        }
    }

    /// Whether this id is related to another
    ///
    /// Edges relate to entities whose vertex equals either endpoint (null
    /// endpoints match null vertices); edges relate to edges with equal
    /// endpoints and directedness; entities relate to entities with equal
    /// vertices.
    pub fn is_related(&self, other: &ElementId) -> MatchResult {
        match (self, other) {
            (ElementId::Entity(a), ElementId::Entity(b)) => {
                if a.vertex == b.vertex {
                    MatchResult::MATCH
                } else {
                    MatchResult::NO_MATCH
                }
            }
            (ElementId::Edge(edge), ElementId::Entity(entity))
            | (ElementId::Entity(entity), ElementId::Edge(edge)) => edge.match_vertex(&entity.vertex),
            (ElementId::Edge(a), ElementId::Edge(b)) => {
                if a == b {
                    MatchResult::MATCH
                } else {
                    MatchResult::NO_MATCH
                }
            }
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementId::Entity(id) => write!(f, "EntitySeed[{}]", id.vertex),
            ElementId::Edge(id) => write!(
                f,
                "EdgeSeed[{} {} {}]",
                id.source,
                if id.directed { "->" } else { "--" },
                id.destination
            ),
        }
    }
}

/// A vertex-attached element
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity {
    /// Element group
    pub group: String,
    /// The vertex this entity describes
    pub vertex: Identifier,
    /// Properties
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    /// Create an entity without properties
    pub fn new(group: impl Into<String>, vertex: impl Into<Identifier>) -> Self {
        Self {
            group: group.into(),
            vertex: vertex.into(),
            properties: Properties::new(),
        }
    }

    /// Add a property, builder style
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        put(&mut self.properties, name.into(), value.into());
        self
    }
}

/// A relationship between two vertices
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "EdgeFields")]
pub struct Edge {
    group: String,
    source: Identifier,
    destination: Identifier,
    directed: bool,
    properties: Properties,
}

#[derive(Deserialize)]
struct EdgeFields {
    group: String,
    source: Identifier,
    destination: Identifier,
    directed: bool,
    #[serde(default)]
    properties: Properties,
}

impl From<EdgeFields> for Edge {
    fn from(fields: EdgeFields) -> Self {
        let mut edge = Edge::new(fields.group, fields.source, fields.destination, fields.directed);
        edge.properties = fields.properties;
        edge
    }
}

impl Edge {
    /// Create an edge, canonicalising undirected endpoints
    pub fn new(
        group: impl Into<String>,
        source: impl Into<Identifier>,
        destination: impl Into<Identifier>,
        directed: bool,
    ) -> Self {
        let (source, destination) = canonical(source.into(), destination.into(), directed);
        Self {
            group: group.into(),
            source,
            destination,
            directed,
            properties: Properties::new(),
        }
    }

    /// Add a property, builder style
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        put(&mut self.properties, name.into(), value.into());
        self
    }

    /// Element group
    #[inline]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Source endpoint
    #[inline]
    pub fn source(&self) -> &Identifier {
        &self.source
    }

    /// Destination endpoint
    #[inline]
    pub fn destination(&self) -> &Identifier {
        &self.destination
    }

    /// Whether direction matters
    #[inline]
    pub fn is_directed(&self) -> bool {
        self.directed
    }

    /// The edge's id
    pub fn edge_id(&self) -> EdgeId {
        EdgeId {
            source: self.source.clone(),
            destination: self.destination.clone(),
            directed: self.directed,
        }
    }
}

fn put(properties: &mut Properties, name: String, value: Value) {
    if value.is_null() {
        properties.remove(&name);
    } else {
        properties.insert(name, value);
    }
}

/// An entity or an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Element {
    /// Entity element
    Entity(Entity),
    /// Edge element
    Edge(Edge),
}

impl Element {
    /// Element group
    pub fn group(&self) -> &str {
        match self {
            Element::Entity(e) => &e.group,
            Element::Edge(e) => &e.group,
        }
    }

    /// Check if this is an entity
    #[inline]
    pub fn is_entity(&self) -> bool {
        matches!(self, Element::Entity(_))
    }

    /// Check if this is an edge
    #[inline]
    pub fn is_edge(&self) -> bool {
        matches!(self, Element::Edge(_))
    }

    /// All properties
    pub fn properties(&self) -> &Properties {
        match self {
            Element::Entity(e) => &e.properties,
            Element::Edge(e) => &e.properties,
        }
    }

    /// Mutable access to the properties
    pub fn properties_mut(&mut self) -> &mut Properties {
        match self {
            Element::Entity(e) => &mut e.properties,
            Element::Edge(e) => &mut e.properties,
        }
    }

    /// Read a property; unset properties are `None`
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties().get(name)
    }

    /// Set a property; setting `Null` removes it
    pub fn put_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        put(self.properties_mut(), name.into(), value.into());
    }

    /// Remove a property, returning its old value
    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties_mut().remove(name)
    }

    /// Identifiers relevant for relation matching
    pub fn identifiers(&self) -> Vec<&Identifier> {
        match self {
            Element::Entity(e) => vec![&e.vertex],
            Element::Edge(e) => vec![&e.source, &e.destination],
        }
    }

    /// The id this element is addressed by
    pub fn element_id(&self) -> ElementId {
        match self {
            Element::Entity(e) => ElementId::entity(e.vertex.clone()),
            Element::Edge(e) => ElementId::Edge(e.edge_id()),
        }
    }

    /// Whether this element is related to a seed
    pub fn is_related(&self, seed: &ElementId) -> MatchResult {
        self.element_id().is_related(seed)
    }

    /// Whether this element is related to another element
    pub fn is_related_to(&self, other: &Element) -> MatchResult {
        self.element_id().is_related(&other.element_id())
    }
}

impl From<Entity> for Element {
    fn from(entity: Entity) -> Self {
        Element::Entity(entity)
    }
}

impl From<Edge> for Element {
    fn from(edge: Edge) -> Self {
        Element::Edge(edge)
    }
}

impl From<&Element> for ElementId {
    fn from(element: &Element) -> Self {
        element.element_id()
    }
}
