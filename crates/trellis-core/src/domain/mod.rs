/// Property and vertex values
pub mod value;

/// Cardinality sketch value type
pub mod sketch;

/// Entities, edges and element ids
pub mod element;

/// Query-time views
pub mod view;

/// Aggregate functions and validation predicates
pub mod functions;

/// Schema definitions and validation
pub mod schema;
