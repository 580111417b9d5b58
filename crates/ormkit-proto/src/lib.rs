//! ormkit boundary types.
//!
//! This crate defines the types every ormkit layer and every storage adapter
//! agree on.
//!
//! # Modules
//!
//! - [`value`] - Runtime values for attributes and filter operands
//! - [`record`] - Raw records exchanged with adapters
//! - [`schema`] - Object types, attribute type contracts and relationships
//! - [`mutation`] - Write operations for batch application
//! - [`error`] - Cast errors

pub mod error;
pub mod mutation;
pub mod record;
pub mod schema;
pub mod value;

pub use error::CastError;

// Re-export commonly used types at crate root
pub use mutation::BatchOp;
pub use record::Record;
pub use schema::{
    AttributeDef, AttributeType, Direction, DisplayFormat, ObjectType, Relationship, Schema,
};
pub use value::Value;

/// Name of the synthetic id field every object type exposes.
pub const ID_FIELD: &str = "id";
