//! AST → SQL renderer.
//!
//! Rendering is a pure function of a query and a `Dialect` and does no I/O.
//! Identifiers are always quoted and text literals always go through the
//! dialect's escape routine. `RawSql` nodes are the single exception and
//! are emitted verbatim.
use super::dialect::Dialect;
use super::types::*;
use crate::error::{QueryBuildError, Result};

/// Render a complete query.
pub fn compile(query: &Query, dialect: &Dialect) -> Result<String> {
    validate_aliases(query)?;

    let mut parts = Vec::new();

    // SELECT
    let select_list = match &query.projection {
        Some(columns) if !columns.is_empty() => columns
            .iter()
            .map(|c| compile_column(c, dialect))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "*".to_string(),
    };
    parts.push(format!("SELECT {}", select_list));

    // FROM
    parts.push(format!("FROM {}", dialect.quote_identifier(&query.source)));

    // JOINs, in declaration order
    for join in &query.joins {
        parts.push(compile_join(join, dialect)?);
    }

    // WHERE
    if let Some(predicate) = &query.predicate {
        parts.push(format!("WHERE {}", compile_expression(predicate, dialect)?));
    }

    // ORDER BY
    if let Some(order) = &query.order_by {
        let direction = match order.direction {
            OrderDirection::Ascending => "ASC",
            OrderDirection::Descending => "DESC",
        };
        parts.push(format!(
            "ORDER BY {} {}",
            compile_column(&order.column, dialect),
            direction
        ));
    }

    Ok(parts.join(" "))
}

/// Render a single expression.
pub fn compile_expression(expr: &Expression, dialect: &Dialect) -> Result<String> {
    match expr {
        Expression::Column(column) => Ok(compile_column(column, dialect)),
        Expression::Literal(lit) => compile_literal(lit, dialect),
        Expression::RawSql(raw) => Ok(raw.clone()),
        Expression::BinaryOp { op, left, right } => compile_binary(*op, left, right, dialect),
        Expression::UnaryOp { op, expr } => {
            let inner = compile_expression(expr, dialect)?;
            Ok(match op {
                UnaryOperator::Not => format!("NOT ({})", inner),
                UnaryOperator::IsNull => format!("{} IS NULL", parenthesize(expr, inner)),
                UnaryOperator::IsNotNull => format!("{} IS NOT NULL", parenthesize(expr, inner)),
            })
        }
    }
}

/// Compound operands of a comparison or null test keep their own grouping.
fn compile_operand(expr: &Expression, dialect: &Dialect) -> Result<String> {
    let sql = compile_expression(expr, dialect)?;
    Ok(parenthesize(expr, sql))
}

fn parenthesize(expr: &Expression, sql: String) -> String {
    match expr {
        Expression::BinaryOp { .. } | Expression::UnaryOp { .. } => format!("({})", sql),
        _ => sql,
    }
}

fn compile_binary(
    op: BinaryOperator,
    left: &Expression,
    right: &Expression,
    dialect: &Dialect,
) -> Result<String> {
    // NULL never compares equal; rewrite to the null predicates.
    let null = Expression::Literal(Literal::Null);
    let null_operand = if right == &null {
        Some(left)
    } else if left == &null {
        Some(right)
    } else {
        None
    };
    if let Some(operand) = null_operand {
        match op {
            BinaryOperator::Eq => {
                return Ok(format!("{} IS NULL", compile_operand(operand, dialect)?))
            }
            BinaryOperator::NotEq => {
                return Ok(format!("{} IS NOT NULL", compile_operand(operand, dialect)?))
            }
            _ => {}
        }
    }

    let lhs = compile_operand(left, dialect)?;
    let rhs = compile_operand(right, dialect)?;

    let op_str = match op {
        BinaryOperator::Eq => "=",
        BinaryOperator::NotEq => "<>",
        BinaryOperator::Lt => "<",
        BinaryOperator::LtEq => "<=",
        BinaryOperator::Gt => ">",
        BinaryOperator::GtEq => ">=",
        BinaryOperator::Like => "LIKE",
        BinaryOperator::And => "AND",
        BinaryOperator::Or => "OR",
    };

    if op.is_logical() {
        // Compound operands were grouped by compile_operand already.
        let group = |expr: &Expression, sql: String| match expr {
            Expression::BinaryOp { .. } | Expression::UnaryOp { .. } => sql,
            _ => format!("({})", sql),
        };
        Ok(format!("{} {} {}", group(left, lhs), op_str, group(right, rhs)))
    } else {
        Ok(format!("{} {} {}", lhs, op_str, rhs))
    }
}

fn compile_join(join: &Join, dialect: &Dialect) -> Result<String> {
    let type_str = match join.kind {
        JoinKind::Inner => "JOIN",
        JoinKind::Left => "LEFT JOIN",
    };
    Ok(format!(
        "{} {} AS {} ON {}",
        type_str,
        dialect.quote_identifier(&join.relation),
        dialect.quote_identifier(&join.alias),
        compile_expression(&join.on, dialect)?
    ))
}

fn compile_column(column: &ColumnRef, dialect: &Dialect) -> String {
    format!(
        "{}.{}",
        dialect.quote_identifier(&column.relation_alias),
        dialect.quote_identifier(&column.column)
    )
}

fn compile_literal(lit: &Literal, dialect: &Dialect) -> Result<String> {
    Ok(match lit {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(true) => "TRUE".to_string(),
        Literal::Boolean(false) => "FALSE".to_string(),
        Literal::Integer(i) => i.to_string(),
        Literal::Float(f) if f.is_finite() => format!("{:?}", f),
        Literal::Float(f) if f.is_nan() => "'NaN'::float8".to_string(),
        Literal::Float(f) if *f > 0.0 => "'Infinity'::float8".to_string(),
        Literal::Float(_) => "'-Infinity'::float8".to_string(),
        Literal::Text(s) => dialect.string_literal(s)?,
        Literal::Timestamp(ts) => format!(
            "{}::timestamp",
            dialect.string_literal(&ts.format("%Y-%m-%d %H:%M:%S%.f").to_string())?
        ),
    })
}

/// Every checked column must name the source relation or a join alias. A
/// join condition only sees the source and the joins declared up to itself.
fn validate_aliases(query: &Query) -> Result<(), QueryBuildError> {
    let aliases: Vec<&str> = query.aliases().collect();

    for (idx, join) in query.joins.iter().enumerate() {
        check_expression(&join.on, &aliases[..idx + 2])?;
    }
    for column in query.projection.iter().flatten() {
        check_column(column, &aliases)?;
    }
    if let Some(order) = &query.order_by {
        check_column(&order.column, &aliases)?;
    }
    if let Some(predicate) = &query.predicate {
        check_expression(predicate, &aliases)?;
    }
    Ok(())
}

fn check_expression(expr: &Expression, aliases: &[&str]) -> Result<(), QueryBuildError> {
    match expr {
        Expression::Column(column) => check_column(column, aliases),
        Expression::BinaryOp { left, right, .. } => {
            check_expression(left, aliases)?;
            check_expression(right, aliases)
        }
        Expression::UnaryOp { expr, .. } => check_expression(expr, aliases),
        Expression::Literal(_) | Expression::RawSql(_) => Ok(()),
    }
}

fn check_column(column: &ColumnRef, aliases: &[&str]) -> Result<(), QueryBuildError> {
    if column.unchecked || aliases.contains(&column.relation_alias.as_str()) {
        Ok(())
    } else {
        Err(QueryBuildError::UnknownRelationAlias {
            alias: column.relation_alias.clone(),
            column: column.column.clone(),
        })
    }
}
