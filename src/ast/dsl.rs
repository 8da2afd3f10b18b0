//! Combinators that build expression nodes.
//!
//! Every combinator allocates a new node and leaves its operands untouched.
//! Comparisons between a typed column and a literal are checked against the
//! property's `ValueType` when the node is built.
use std::ops::{BitAnd, BitOr, Not};

use chrono::NaiveDateTime;

use super::types::*;
use crate::error::{QueryBuildError, SchemaError};
use crate::schema::{EntityType, ValueType};

/// A typed reference to `property` of `entity`. A belongs-to association
/// name resolves to its key column.
pub fn column(entity: &EntityType, property: &str) -> Result<ColumnRef, SchemaError> {
    let prop = entity
        .resolve_property(property)
        .ok_or_else(|| SchemaError::UnknownProperty {
            entity: entity.name.clone(),
            property: property.to_string(),
        })?;
    Ok(ColumnRef {
        relation_alias: entity.relation.clone(),
        column: prop.column.clone(),
        origin: Some(PropertyOrigin {
            entity: entity.name.clone(),
            property: prop.name.clone(),
            value_type: prop.value_type.clone(),
        }),
        unchecked: false,
    })
}

/// An untyped reference to `alias.column`. The alias must still name the
/// query's source or one of its joins when rendered.
pub fn raw_column(alias: impl Into<String>, column: impl Into<String>) -> ColumnRef {
    ColumnRef {
        relation_alias: alias.into(),
        column: column.into(),
        origin: None,
        unchecked: false,
    }
}

pub fn literal(value: impl Into<Literal>) -> Expression {
    Expression::Literal(value.into())
}

/// Raw SQL, emitted verbatim. Nothing is escaped: never pass user input.
pub fn sql(raw: impl Into<String>) -> Expression {
    Expression::RawSql(raw.into())
}

impl ColumnRef {
    /// Opt this reference out of the render-time alias check.
    #[must_use]
    pub fn unchecked(mut self) -> Self {
        self.unchecked = true;
        self
    }

    /// Point this reference at another alias of the same relation, such as an
    /// association join. The property's type information is kept.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.relation_alias = alias.into();
        self
    }

    pub fn eq(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        Expression::from(self.clone()).eq(rhs)
    }

    pub fn ne(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        Expression::from(self.clone()).ne(rhs)
    }

    pub fn lt(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        Expression::from(self.clone()).lt(rhs)
    }

    pub fn le(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        Expression::from(self.clone()).le(rhs)
    }

    pub fn gt(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        Expression::from(self.clone()).gt(rhs)
    }

    pub fn ge(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        Expression::from(self.clone()).ge(rhs)
    }

    pub fn like(&self, pattern: impl Into<String>) -> Result<Expression, QueryBuildError> {
        Expression::from(self.clone()).like(pattern)
    }

    pub fn is_null(&self) -> Expression {
        Expression::from(self.clone()).is_null()
    }

    pub fn is_not_null(&self) -> Expression {
        Expression::from(self.clone()).is_not_null()
    }
}

impl Expression {
    pub fn eq(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        self.compare(BinaryOperator::Eq, rhs.into())
    }

    pub fn ne(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        self.compare(BinaryOperator::NotEq, rhs.into())
    }

    pub fn lt(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        self.compare(BinaryOperator::Lt, rhs.into())
    }

    pub fn le(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        self.compare(BinaryOperator::LtEq, rhs.into())
    }

    pub fn gt(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        self.compare(BinaryOperator::Gt, rhs.into())
    }

    pub fn ge(&self, rhs: impl Into<Expression>) -> Result<Expression, QueryBuildError> {
        self.compare(BinaryOperator::GtEq, rhs.into())
    }

    /// `self LIKE 'pattern'`. The pattern is always a string literal.
    pub fn like(&self, pattern: impl Into<String>) -> Result<Expression, QueryBuildError> {
        self.compare(
            BinaryOperator::Like,
            Expression::Literal(Literal::Text(pattern.into())),
        )
    }

    #[must_use]
    pub fn and(&self, rhs: impl Into<Expression>) -> Expression {
        binary(BinaryOperator::And, self.clone(), rhs.into())
    }

    #[must_use]
    pub fn or(&self, rhs: impl Into<Expression>) -> Expression {
        binary(BinaryOperator::Or, self.clone(), rhs.into())
    }

    #[must_use]
    pub fn negated(&self) -> Expression {
        unary(UnaryOperator::Not, self.clone())
    }

    #[must_use]
    pub fn is_null(&self) -> Expression {
        unary(UnaryOperator::IsNull, self.clone())
    }

    #[must_use]
    pub fn is_not_null(&self) -> Expression {
        unary(UnaryOperator::IsNotNull, self.clone())
    }

    fn compare(&self, op: BinaryOperator, rhs: Expression) -> Result<Expression, QueryBuildError> {
        check_operands(self, &rhs)?;
        Ok(binary(op, self.clone(), rhs))
    }
}

fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn unary(op: UnaryOperator, expr: Expression) -> Expression {
    Expression::UnaryOp {
        op,
        expr: Box::new(expr),
    }
}

/// Typed column against literal, in either order. Anything else is left to
/// the backend.
fn check_operands(left: &Expression, right: &Expression) -> Result<(), QueryBuildError> {
    match (left, right) {
        (Expression::Column(col), Expression::Literal(lit))
        | (Expression::Literal(lit), Expression::Column(col)) => match &col.origin {
            Some(origin) if !fits(&origin.value_type, lit) => Err(QueryBuildError::TypeMismatch {
                property: origin.qualified_name(),
                expected: origin.value_type.clone(),
                found: lit.describe().to_string(),
            }),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

/// Whether `lit` is representable as a value of `value_type`.
pub fn fits(value_type: &ValueType, lit: &Literal) -> bool {
    match (value_type, lit) {
        (ValueType::Optional(_), Literal::Null) => true,
        (ValueType::Optional(inner), other) => fits(inner, other),
        (_, Literal::Null) => false,
        (ValueType::Boolean, Literal::Boolean(_)) => true,
        (
            ValueType::Integer | ValueType::PrimaryKey | ValueType::ForeignKey,
            Literal::Integer(_),
        ) => true,
        (ValueType::Float, Literal::Integer(_) | Literal::Float(_)) => true,
        (ValueType::Text, Literal::Text(_)) => true,
        (ValueType::Timestamp, Literal::Timestamp(_)) => true,
        _ => false,
    }
}

// Operator overloads: `a & b`, `a | b`, `!a`.

impl BitAnd for Expression {
    type Output = Expression;

    fn bitand(self, rhs: Expression) -> Expression {
        binary(BinaryOperator::And, self, rhs)
    }
}

impl BitOr for Expression {
    type Output = Expression;

    fn bitor(self, rhs: Expression) -> Expression {
        binary(BinaryOperator::Or, self, rhs)
    }
}

impl Not for Expression {
    type Output = Expression;

    fn not(self) -> Expression {
        unary(UnaryOperator::Not, self)
    }
}

// Conversions into literals and expressions.

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Boolean(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Integer(i64::from(value))
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Integer(value)
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<NaiveDateTime> for Literal {
    fn from(value: NaiveDateTime) -> Self {
        Literal::Timestamp(value)
    }
}

impl<T: Into<Literal>> From<Option<T>> for Literal {
    fn from(value: Option<T>) -> Self {
        value.map_or(Literal::Null, Into::into)
    }
}

impl From<Literal> for Expression {
    fn from(value: Literal) -> Self {
        Expression::Literal(value)
    }
}

impl From<ColumnRef> for Expression {
    fn from(value: ColumnRef) -> Self {
        Expression::Column(value)
    }
}

impl From<&ColumnRef> for Expression {
    fn from(value: &ColumnRef) -> Self {
        Expression::Column(value.clone())
    }
}

macro_rules! literal_expression {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Expression {
                fn from(value: $ty) -> Self {
                    Expression::Literal(value.into())
                }
            }
        )*
    };
}

literal_expression!(bool, i32, i64, f64, &str, String, NaiveDateTime);
