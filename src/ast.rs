use std::fmt;

use crate::{ColumnDef, Value};

#[derive(Debug, PartialEq)]
pub enum Statement {
    CreateTable(CreateTable),
    DropTable(DropTable),
    InsertInto(InsertInto),
    Update(Update),
    Delete(Delete),
    Select(Select),
}

#[derive(Debug, PartialEq)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, PartialEq)]
pub struct DropTable {
    pub name: String,
    pub if_exists: bool,
}

#[derive(Debug, PartialEq)]
pub struct InsertInto {
    pub table: String,
    pub columns: Option<Vec<String>>,
    /// One entry per `(...)` tuple after `VALUES`.
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Operand)>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, PartialEq)]
pub struct Delete {
    pub table: String,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, PartialEq)]
pub enum ColumnsSelect {
    Star,
    Columns(Vec<SelectItem>),
    Aggregates(Vec<Aggregate>),
}

#[derive(Debug, PartialEq)]
pub struct SelectItem {
    pub column: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "COUNT" => Some(AggregateFunc::Count),
            "SUM" => Some(AggregateFunc::Sum),
            "AVG" => Some(AggregateFunc::Avg),
            "MIN" => Some(AggregateFunc::Min),
            "MAX" => Some(AggregateFunc::Max),
            _ => None,
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        })
    }
}

/// `FUNC(*)` or `FUNC(column)` with an optional `AS` alias.
#[derive(Debug, PartialEq)]
pub struct Aggregate {
    pub func: AggregateFunc,
    /// `None` stands for `*`.
    pub column: Option<String>,
    pub alias: Option<String>,
}

impl Aggregate {
    /// The result column name: the alias, or the call as written.
    pub fn output_name(&self) -> String {
        match (&self.alias, &self.column) {
            (Some(alias), _) => alias.clone(),
            (None, Some(column)) => format!("{}({column})", self.func),
            (None, None) => format!("{}(*)", self.func),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, PartialEq)]
pub struct OrderByClause {
    pub column: String,
    pub direction: SortDirection,
}

#[derive(Debug, PartialEq)]
pub struct Select {
    pub columns: ColumnsSelect,
    pub table: String,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByClause>,
    pub limit: Option<usize>,
}

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// A column reference or a literal.
#[derive(Debug, PartialEq, Clone)]
pub enum Operand {
    Column(String),
    Literal(Value),
}

/// A `WHERE` predicate.
#[derive(Debug, PartialEq)]
pub enum Expr {
    Comparison {
        left: Operand,
        op: ComparisonOp,
        right: Operand,
    },
    /// A bare operand used as a condition, e.g. `WHERE active`.
    Operand(Operand),
    IsNull {
        operand: Operand,
        negated: bool,
    },
    Not(Box<Expr>),
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
}
