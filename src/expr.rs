use std::cmp::Ordering;

use crate::ast::{ComparisonOp, Expr, Operand};
use crate::data_type::DataType;
use crate::error::{Error, Result};
use crate::table::Schema;
use crate::value::Value;

/// An [Operand] whose column reference has been resolved to a row position.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundOperand {
    Column(usize),
    Literal(Value),
}

impl BoundOperand {
    pub fn bind(operand: &Operand, schema: &Schema) -> Result<Self> {
        match operand {
            Operand::Column(name) => schema.resolve(name).map(BoundOperand::Column),
            Operand::Literal(value) => Ok(BoundOperand::Literal(value.clone())),
        }
    }

    /// The type every row will produce here: the column's declared type or
    /// the literal's own. `None` for a `NULL` literal.
    pub fn data_type(&self, schema: &Schema) -> Option<DataType> {
        match self {
            BoundOperand::Column(idx) => Some(schema.columns[*idx].data_type),
            BoundOperand::Literal(value) => value.data_type(),
        }
    }

    pub fn value<'a>(&'a self, row: &'a [Value]) -> &'a Value {
        match self {
            BoundOperand::Column(idx) => &row[*idx],
            BoundOperand::Literal(value) => value,
        }
    }
}

/// A `WHERE` clause bound to a schema.
///
/// Binding resolves every column name and type-checks every comparison and
/// bare condition up front, so an unknown column or an impossible comparison
/// fails the statement even when no row is ever looked at.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Comparison {
        left: BoundOperand,
        op: ComparisonOp,
        right: BoundOperand,
    },
    Operand(BoundOperand),
    IsNull {
        operand: BoundOperand,
        negated: bool,
    },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn bind(expr: &Expr, schema: &Schema) -> Result<Self> {
        Ok(match expr {
            Expr::Comparison { left, op, right } => {
                let left = BoundOperand::bind(left, schema)?;
                let right = BoundOperand::bind(right, schema)?;
                check_comparable(left.data_type(schema), right.data_type(schema))?;
                Predicate::Comparison { left, op: *op, right }
            }
            Expr::Operand(operand) => {
                let operand = BoundOperand::bind(operand, schema)?;
                match operand.data_type(schema) {
                    None | Some(DataType::Bool) => Predicate::Operand(operand),
                    Some(other) => {
                        return Err(Error::type_mismatch(format!(
                            "{other} operand used as a condition"
                        )));
                    }
                }
            }
            Expr::IsNull { operand, negated } => Predicate::IsNull {
                operand: BoundOperand::bind(operand, schema)?,
                negated: *negated,
            },
            Expr::Not(inner) => Predicate::Not(Box::new(Self::bind(inner, schema)?)),
            Expr::And { left, right } => Predicate::And(
                Box::new(Self::bind(left, schema)?),
                Box::new(Self::bind(right, schema)?),
            ),
            Expr::Or { left, right } => Predicate::Or(
                Box::new(Self::bind(left, schema)?),
                Box::new(Self::bind(right, schema)?),
            ),
        })
    }

    /// Evaluates the predicate against one row with SQL three-valued logic.
    /// `None` is "unknown".
    ///
    /// # Errors
    /// Returns [Error::TypeMismatch] when comparing incompatible types or when a
    /// bare operand is not a boolean.
    pub fn evaluate(&self, row: &[Value]) -> Result<Option<bool>> {
        match self {
            Predicate::Comparison { left, op, right } => {
                let ordering = left.value(row).sql_cmp(right.value(row))?;
                Ok(ordering.map(|ord| compare(ord, *op)))
            }
            Predicate::Operand(operand) => match operand.value(row) {
                Value::Null => Ok(None),
                Value::Bool(b) => Ok(Some(*b)),
                other => Err(Error::type_mismatch(format!(
                    "{} value {other} used as a condition",
                    other.type_label()
                ))),
            },
            Predicate::IsNull { operand, negated } => {
                Ok(Some(operand.value(row).is_null() != *negated))
            }
            Predicate::Not(inner) => Ok(inner.evaluate(row)?.map(|b| !b)),
            Predicate::And(left, right) => {
                // false wins over unknown
                match left.evaluate(row)? {
                    Some(false) => Ok(Some(false)),
                    l => match right.evaluate(row)? {
                        Some(false) => Ok(Some(false)),
                        r => Ok(l.zip(r).map(|_| true)),
                    },
                }
            }
            Predicate::Or(left, right) => {
                // true wins over unknown
                match left.evaluate(row)? {
                    Some(true) => Ok(Some(true)),
                    l => match right.evaluate(row)? {
                        Some(true) => Ok(Some(true)),
                        r => Ok(l.zip(r).map(|_| false)),
                    },
                }
            }
        }
    }

    /// True only when the predicate is definitely true; unknown rows are excluded.
    pub fn matches(&self, row: &[Value]) -> Result<bool> {
        Ok(self.evaluate(row)? == Some(true))
    }
}

/// Binds an optional `WHERE` clause; no clause matches every row.
pub fn bind_filter(where_clause: Option<&Expr>, schema: &Schema) -> Result<Option<Predicate>> {
    where_clause
        .map(|expr| Predicate::bind(expr, schema))
        .transpose()
}

/// Applies an optional bound filter to a row.
pub fn row_matches(filter: Option<&Predicate>, row: &[Value]) -> Result<bool> {
    match filter {
        Some(predicate) => predicate.matches(row),
        None => Ok(true),
    }
}

/// The same pairs [Value::sql_cmp] accepts: numbers with numbers, otherwise
/// equal types. `NULL` compares with anything.
fn check_comparable(left: Option<DataType>, right: Option<DataType>) -> Result<()> {
    let numeric = |t| matches!(t, DataType::Int | DataType::Float);
    match (left, right) {
        (Some(l), Some(r)) if l != r && !(numeric(l) && numeric(r)) => Err(Error::type_mismatch(
            format!("cannot compare {l} with {r}"),
        )),
        _ => Ok(()),
    }
}

fn compare(ord: Ordering, op: ComparisonOp) -> bool {
    match op {
        ComparisonOp::Eq => ord == Ordering::Equal,
        ComparisonOp::NotEq => ord != Ordering::Equal,
        ComparisonOp::Lt => ord == Ordering::Less,
        ComparisonOp::LtEq => ord != Ordering::Greater,
        ComparisonOp::Gt => ord == Ordering::Greater,
        ComparisonOp::GtEq => ord != Ordering::Less,
    }
}
