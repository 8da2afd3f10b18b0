//! Type-safe relational queries for PostgreSQL.
//!
//! Entity types are registered once in a [`SchemaRegistry`], queries are
//! built as immutable [`ast::Query`] values and rendered to SQL only when a
//! [`Connection`] executes them.
pub mod ast;
pub mod config;
pub mod db;
pub mod error;
pub mod schema;

pub use ast::{column, compile, from, literal, projection, raw_column, sql, Dialect, Query};
pub use config::Configuration;
pub use db::{Connection, Pool, ResultSet, SessionInfo};
pub use error::{
    ConnectionError, Error, QueryBuildError, QueryExecutionError, Result, SanitizeError,
    SchemaError,
};
pub use schema::{Entity, EntityType, EntityTypeBuilder, SchemaRegistry, ValueType};
