//! Relational algebra AST and SQL rendering.
//!
//! Queries are built as immutable trees and turned into SQL text only at
//! the end of the pipeline:
//!
//! ```text
//! Entity types            (schema/)
//!       ↓
//! Builder DSL             (dsl.rs, query.rs)
//!       ↓
//! Relational AST          (types.rs)
//!       ↓
//! SQL renderer            (compiler.rs + dialect.rs)
//!       ↓
//! Execution               (db/ module)
//! ```
pub mod compiler;
pub mod dialect;
pub mod dsl;
pub mod query;
pub mod types;

// Re-export key types for convenience
pub use compiler::{compile, compile_expression};
pub use dialect::Dialect;
pub use dsl::{column, literal, raw_column, sql};
pub use query::{from, projection};
pub use types::*;
