//! Relational algebra AST types.
//!
//! Every node is an immutable value: builders clone and extend, they never
//! mutate a node another query may still hold. Trees are `Send + Sync` and
//! can be shared freely across threads.
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::schema::{EntityType, ValueType};

/// Root of a query: `SELECT … FROM source JOIN … WHERE … ORDER BY …`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Relation name; doubles as its alias.
    pub source: String,
    /// Entity the source relation was derived from, if any.
    pub entity: Option<Arc<EntityType>>,
    pub joins: Vec<Join>,
    pub predicate: Option<Expression>,
    pub order_by: Option<OrderBy>,
    /// `None` selects every column.
    pub projection: Option<Vec<ColumnRef>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub relation: String,
    pub alias: String,
    pub on: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: ColumnRef,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

impl OrderDirection {
    pub fn reversed(self) -> Self {
        match self {
            OrderDirection::Ascending => OrderDirection::Descending,
            OrderDirection::Descending => OrderDirection::Ascending,
        }
    }
}

/// A column of the source relation or of a join alias.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub relation_alias: String,
    pub column: String,
    /// Set when the reference was built from an entity property.
    pub origin: Option<PropertyOrigin>,
    /// Skip the alias check at render time.
    pub unchecked: bool,
}

/// Where a typed column reference came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyOrigin {
    pub entity: String,
    pub property: String,
    pub value_type: ValueType,
}

impl PropertyOrigin {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.entity, self.property)
    }
}

/// Predicate and value expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(ColumnRef),
    Literal(Literal),
    /// SQL text emitted verbatim. Never escaped.
    RawSql(String),
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Literal {
    /// Short description used in type-mismatch errors.
    pub fn describe(&self) -> &'static str {
        match self {
            Literal::Null => "NULL",
            Literal::Boolean(_) => "boolean literal",
            Literal::Integer(_) => "integer literal",
            Literal::Float(_) => "float literal",
            Literal::Text(_) => "text literal",
            Literal::Timestamp(_) => "timestamp literal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    // Logical
    And,
    Or,
}

impl BinaryOperator {
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::And | BinaryOperator::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    IsNull,
    IsNotNull,
}
