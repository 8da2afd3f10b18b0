//! Schema registry: maps Rust entity types to relational concepts.
//!
//! Each entity type declares its relation, properties and associations once
//! through the `Entity` trait. The resulting `EntityType` is immutable and
//! shared by the query builder and the type checker.
mod builder;
mod registry;
mod types;

pub use builder::{describe, Entity, EntityTypeBuilder};
pub use registry::SchemaRegistry;
pub use types::*;
