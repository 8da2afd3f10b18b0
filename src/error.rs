//! Error taxonomy for the query layer.
//!
//! Schema and build errors are raised before any backend I/O happens, so a
//! failed build never leaves partial state on the server.
use std::fmt;

use thiserror::Error;

use crate::schema::ValueType;

/// Mistakes in entity registration or lookup. Always a programming error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown entity type `{0}`")]
    UnknownEntityType(String),
    #[error("entity `{entity}` has no property `{property}`")]
    UnknownProperty { entity: String, property: String },
    #[error("entity `{entity}` has no association `{association}`")]
    UnknownAssociation { entity: String, association: String },
    #[error("association `{entity}.{association}` targets unregistered entity `{target}`")]
    UnresolvedAssociation {
        entity: String,
        association: String,
        target: String,
    },
    #[error("entity `{0}` declares no primary key")]
    MissingPrimaryKey(String),
    #[error("entity `{0}` declares more than one primary key")]
    MultiplePrimaryKeys(String),
    #[error("entity `{entity}` maps column `{column}` twice")]
    DuplicateColumn { entity: String, column: String },
    #[error("cannot register `{0}`: the schema registry is sealed after the first lookup")]
    RegistrySealed(String),
    #[error("entity name `{0}` is already registered by another type")]
    DuplicateEntityName(String),
}

/// Invalid query shapes, detected while building or rendering.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryBuildError {
    #[error("relation alias `{0}` is already used in this query")]
    DuplicateAlias(String),
    #[error("query has no ORDER BY clause to reverse")]
    NoOrderClause,
    #[error("cannot compare `{property}` ({expected}) with {found}")]
    TypeMismatch {
        property: String,
        expected: ValueType,
        found: String,
    },
    #[error("column `{column}` refers to unknown relation alias `{alias}`")]
    UnknownRelationAlias { alias: String, column: String },
    #[error("query over `{0}` is not bound to an entity type")]
    NoEntity(String),
}

/// Failure to establish a session. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),
    #[error("failed to build TLS connector: {0}")]
    Tls(String),
    #[error("connection timed out after {0}s")]
    Timeout(u64),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection pool error: {0}")]
    Pool(String),
}

/// A statement the backend rejected. Carries the backend's own message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct QueryExecutionError {
    pub message: String,
    /// SQLSTATE code, when the error came from the server.
    pub code: Option<String>,
}

impl QueryExecutionError {
    pub fn from_pg_error(err: &tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db_err) => Self {
                message: db_err.message().to_string(),
                code: Some(db_err.code().code().to_string()),
            },
            None => Self {
                message: err.to_string(),
                code: None,
            },
        }
    }
}

impl fmt::Display for QueryExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "query failed [{}]: {}", code, self.message),
            None => write!(f, "query failed: {}", self.message),
        }
    }
}

/// Text that cannot be embedded in a PostgreSQL string literal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("string contains a NUL byte at offset {0}")]
    InteriorNul(usize),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    QueryBuild(#[from] QueryBuildError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    QueryExecution(#[from] QueryExecutionError),
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
