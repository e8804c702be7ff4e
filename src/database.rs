use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;

use allocative::Allocative;
use tracing::debug;

use crate::{
    Value,
    ast::{
        Aggregate, AggregateFunc, ColumnsSelect, CreateTable, Delete, DropTable, InsertInto,
        OrderByClause, Select, SortDirection, Statement, Update,
    },
    catalog::Catalog,
    data_type::DataType,
    error::{Error, Result},
    expr::{BoundOperand, bind_filter, row_matches},
    parser::parse_sql,
    persistence,
    table::{Schema, Table, coerce_for, name_key},
};

/// One database: a [Catalog] and the statements that run against it.
///
/// `Database` is plain single-owner state. Sharing it between threads is the
/// job of [crate::Engine], which wraps it in a read-write lock.
#[derive(Debug, Default, Clone, Allocative)]
pub struct Database {
    catalog: Catalog,
}

/// Represents the result of a successful `SELECT` query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// The names of the columns included in the result set.
    pub columns: Vec<String>,
    /// The actual data, returned as a vector of rows, where each row is a vector of [Value].
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Outcome of one executed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementResult {
    /// `SELECT`
    Query(RowSet),
    /// DDL and DML. DDL always reports 0.
    Mutation { rows_affected: u64 },
}

impl StatementResult {
    fn affected(count: usize) -> Self {
        StatementResult::Mutation {
            rows_affected: count as u64,
        }
    }

    /// Returns the number of rows affected, if this is not a query.
    pub fn rows_affected(&self) -> Option<u64> {
        match self {
            StatementResult::Mutation { rows_affected } => Some(*rows_affected),
            StatementResult::Query(_) => None,
        }
    }

    /// Returns the row set if this is a SELECT.
    pub fn as_query(&self) -> Option<&RowSet> {
        match self {
            StatementResult::Query(rows) => Some(rows),
            StatementResult::Mutation { .. } => None,
        }
    }
}

impl Database {
    /// Creates a new, empty database instance.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_catalog(catalog: Catalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Creates a new table in the database.
    ///
    /// # Errors
    /// Returns an error if a table with the same name already exists.
    pub fn create_table(&mut self, name: String, schema: Schema) -> Result<()> {
        self.catalog.create_table(name, schema)
    }

    /// Removes a table from the database by its name.
    ///
    /// # Errors
    /// Returns an error if the table does not exist.
    pub fn drop_table(&mut self, name: &str) -> Result<()> {
        self.catalog.drop_table(name).map(|_| ())
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.catalog.get_table(name)
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.catalog.get_table_mut(name)
    }

    /// Returns the table names in creation order.
    pub fn list_tables(&self) -> Vec<&str> {
        self.catalog.table_names()
    }

    /// Parses and runs one SQL statement of any kind.
    ///
    /// # Errors
    /// Returns an error if tokenization, parsing, or execution fails. A failed
    /// statement leaves the database as it was.
    ///
    /// # Example
    /// ```
    /// use tinysql::{Database, StatementResult, Value};
    /// let mut db = Database::new();
    /// db.execute("CREATE TABLE users (id INT)").unwrap();
    /// let result = db.execute("INSERT INTO users VALUES (1), (2)").unwrap();
    /// assert_eq!(result, StatementResult::Mutation { rows_affected: 2 });
    /// db.execute("DELETE FROM users WHERE id > 1").unwrap();
    ///
    /// let result = db.query("SELECT * FROM users").unwrap();
    /// assert_eq!(result.rows, vec![vec![Value::Int(1)]]);
    /// ```
    pub fn execute(&mut self, sql: &str) -> Result<StatementResult> {
        let statement = parse_sql(sql)?;
        self.execute_statement(statement)
    }

    /// Runs an already parsed statement.
    pub fn execute_statement(&mut self, statement: Statement) -> Result<StatementResult> {
        debug!(?statement, "executing statement");
        match statement {
            Statement::CreateTable(create) => self.create(create),
            Statement::DropTable(drop) => self.execute_drop(drop),
            Statement::InsertInto(insert) => self.insert(insert),
            Statement::Update(update) => self.update(update),
            Statement::Delete(delete) => self.delete(delete),
            Statement::Select(select) => self.select(&select).map(StatementResult::Query),
        }
    }

    /// Executes a `SELECT` query and returns the resulting data set.
    ///
    /// # Example
    ///
    /// ```
    /// use tinysql::{Database, Value};
    ///
    /// let mut db = Database::new();
    /// db.execute("CREATE TABLE products (name TEXT, price INT)").unwrap();
    /// db.execute("INSERT INTO products VALUES ('Laptop', 1200), ('Mouse', 25)").unwrap();
    ///
    /// // Querying specific columns
    /// let result = db.query("SELECT name FROM products ORDER BY price").unwrap();
    ///
    /// assert_eq!(result.columns, vec!["name"]);
    /// assert_eq!(result.rows[0][0], Value::Text("Mouse".into()));
    /// assert_eq!(result.rows[1][0], Value::Text("Laptop".into()));
    /// ```
    ///
    /// # Errors
    /// Returns an error if the SQL is not a valid `SELECT`, or if the table or
    /// one of the referenced columns does not exist.
    pub fn query(&self, sql: &str) -> Result<RowSet> {
        match parse_sql(sql)? {
            Statement::Select(select) => {
                debug!(?select, "executing query");
                self.select(&select)
            }
            _ => Err(Error::parse("expected a SELECT statement", 0)),
        }
    }

    /// Writes the whole database to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        persistence::save_to_file(&self.catalog, path.as_ref())
    }

    /// Reads a database previously written by [Database::save].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        persistence::load_from_file(path.as_ref()).map(Self::from_catalog)
    }

    /// Approximate heap bytes held by the tables.
    pub fn memory_usage(&self) -> usize {
        allocative::size_of_unique_allocated_data(self)
    }

    fn create(&mut self, create: CreateTable) -> Result<StatementResult> {
        let schema = Schema::new(create.columns)?;
        self.catalog.create_table(create.name, schema)?;
        Ok(StatementResult::affected(0))
    }

    fn execute_drop(&mut self, drop: DropTable) -> Result<StatementResult> {
        if drop.if_exists && !self.catalog.contains(&drop.name) {
            return Ok(StatementResult::affected(0));
        }
        self.catalog.drop_table(&drop.name)?;
        Ok(StatementResult::affected(0))
    }

    /// Maps each tuple onto the schema order (unlisted columns become `NULL`)
    /// and appends all of them, or none if any tuple is rejected.
    fn insert(&mut self, insert: InsertInto) -> Result<StatementResult> {
        let table = self.catalog.get_table_mut(&insert.table)?;

        let rows = match insert.columns {
            None => insert.rows,
            Some(columns) => {
                let mut targets = Vec::with_capacity(columns.len());
                for name in &columns {
                    let idx = table.schema.resolve(name)?;
                    if targets.contains(&idx) {
                        return Err(Error::AlreadyExists {
                            kind: "column",
                            name: name.clone(),
                        });
                    }
                    targets.push(idx);
                }

                insert
                    .rows
                    .into_iter()
                    .map(|values| {
                        if values.len() != targets.len() {
                            return Err(Error::ArityMismatch {
                                expected: targets.len(),
                                found: values.len(),
                            });
                        }
                        let mut row = vec![Value::Null; table.schema.len()];
                        for (&idx, value) in targets.iter().zip(values) {
                            row[idx] = value;
                        }
                        Ok(row)
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };

        let count = table.insert_rows(rows)?;
        Ok(StatementResult::affected(count))
    }

    fn update(&mut self, update: Update) -> Result<StatementResult> {
        let table = self.catalog.get_table_mut(&update.table)?;

        let assignments = update
            .assignments
            .iter()
            .map(|(column, operand)| {
                let idx = table.schema.resolve(column)?;
                let def = &table.schema.columns[idx];
                // Literals are coerced once, so a bad one fails even when no row matches.
                let operand = match BoundOperand::bind(operand, &table.schema)? {
                    BoundOperand::Literal(value) => BoundOperand::Literal(coerce_for(def, value)?),
                    BoundOperand::Column(src) => {
                        let from = table.schema.columns[src].data_type;
                        if from != def.data_type && (from, def.data_type) != (DataType::Int, DataType::Float) {
                            return Err(Error::type_mismatch(format!(
                                "cannot assign {from} column {:?} to {} column {:?}",
                                table.schema.columns[src].name, def.data_type, def.name
                            )));
                        }
                        BoundOperand::Column(src)
                    }
                };
                Ok((idx, operand))
            })
            .collect::<Result<Vec<_>>>()?;
        let filter = bind_filter(update.where_clause.as_ref(), &table.schema)?;

        let count = table.update(|row| {
            if !row_matches(filter.as_ref(), row)? {
                return Ok(None);
            }
            Ok(Some(
                assignments
                    .iter()
                    .map(|(idx, operand)| (*idx, operand.value(row).clone()))
                    .collect(),
            ))
        })?;
        Ok(StatementResult::affected(count))
    }

    fn delete(&mut self, delete: Delete) -> Result<StatementResult> {
        let table = self.catalog.get_table_mut(&delete.table)?;
        let filter = bind_filter(delete.where_clause.as_ref(), &table.schema)?;
        let count = table.delete(|row| row_matches(filter.as_ref(), row))?;
        Ok(StatementResult::affected(count))
    }

    /// Runs a `SELECT` in this order: filter, aggregate or sort, limit, project.
    ///
    /// Sorting happens on full rows, so `ORDER BY` may name columns that are
    /// not projected.
    pub fn select(&self, select: &Select) -> Result<RowSet> {
        let table = self.catalog.get_table(&select.table)?;
        let schema = &table.schema;

        // Resolve the projection: output name + source column
        let projection: Vec<(String, usize)> = match &select.columns {
            ColumnsSelect::Star => schema
                .columns
                .iter()
                .enumerate()
                .map(|(idx, col)| (col.name.clone(), idx))
                .collect(),
            ColumnsSelect::Columns(items) => items
                .iter()
                .map(|item| {
                    let idx = schema.resolve(&item.column)?;
                    let name = item
                        .alias
                        .clone()
                        .unwrap_or_else(|| schema.columns[idx].name.clone());
                    Ok((name, idx))
                })
                .collect::<Result<_>>()?,
            ColumnsSelect::Aggregates(aggregates) => {
                return self.select_aggregates(table, select, aggregates);
            }
        };
        unique_output_names(projection.iter().map(|(name, _)| name))?;

        let sort_keys = select
            .order_by
            .iter()
            .map(|clause| Ok((resolve_sort_key(clause, &projection, schema)?, clause.direction)))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = filter_rows(table, select)?;
        if !sort_keys.is_empty() {
            sort(&mut rows, &sort_keys);
        }

        let rows = rows
            .into_iter()
            .take(select.limit.unwrap_or(usize::MAX))
            .map(|full_row| {
                projection
                    .iter()
                    .map(|(_, idx)| full_row[*idx].clone())
                    .collect()
            })
            .collect();

        Ok(RowSet {
            columns: projection.into_iter().map(|(name, _)| name).collect(),
            rows,
        })
    }

    /// Reduces the filtered rows to a single row, one value per aggregate.
    fn select_aggregates(
        &self,
        table: &Table,
        select: &Select,
        aggregates: &[Aggregate],
    ) -> Result<RowSet> {
        let schema = &table.schema;
        let columns: Vec<String> = aggregates.iter().map(Aggregate::output_name).collect();
        unique_output_names(&columns)?;

        let targets = aggregates
            .iter()
            .map(|agg| agg.column.as_deref().map(|c| schema.resolve(c)).transpose())
            .collect::<Result<Vec<_>>>()?;

        // A single row is already sorted, but the keys must still exist.
        for clause in &select.order_by {
            let key = name_key(&clause.column);
            if !columns.iter().any(|c| name_key(c) == key) {
                schema.resolve(&clause.column)?;
            }
        }

        let rows = filter_rows(table, select)?;
        let values = aggregates
            .iter()
            .zip(&targets)
            .map(|(agg, target)| match target {
                None => Ok(Value::Int(rows.len() as i64)),
                Some(idx) => aggregate(
                    agg.func,
                    schema.columns[*idx].data_type,
                    rows.iter().map(|row| &row[*idx]).filter(|v| !v.is_null()),
                )
                .map_err(|e| match e {
                    Error::TypeMismatch(msg) => Error::TypeMismatch(format!("{msg} in {}", agg.output_name())),
                    other => other,
                }),
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = if select.limit == Some(0) {
            Vec::new()
        } else {
            vec![values]
        };
        Ok(RowSet { columns, rows })
    }
}

/// Scans the table and keeps the rows matching the `WHERE` clause.
fn filter_rows(table: &Table, select: &Select) -> Result<Vec<Vec<Value>>> {
    let filter = bind_filter(select.where_clause.as_ref(), &table.schema)?;
    let mut rows = Vec::new();
    for row in table.scan() {
        if row_matches(filter.as_ref(), &row)? {
            rows.push(row);
        }
    }
    Ok(rows)
}

/// Result rows are keyed by output name, so two outputs may not share one.
fn unique_output_names<'a>(names: impl IntoIterator<Item = &'a String>) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name_key(name)) {
            return Err(Error::AlreadyExists {
                kind: "column",
                name: name.clone(),
            });
        }
    }
    Ok(())
}

/// An `ORDER BY` key names a projection alias first, then any table column.
fn resolve_sort_key(
    clause: &OrderByClause,
    projection: &[(String, usize)],
    schema: &Schema,
) -> Result<usize> {
    let key = name_key(&clause.column);
    if let Some((_, idx)) = projection.iter().find(|(name, _)| name_key(name) == key) {
        return Ok(*idx);
    }
    schema.resolve(&clause.column)
}

/// Sorts the provided rows in-place based on the SQL `ORDER BY` clauses.
///
/// For each row comparison, it iterates through the sort keys: if the first
/// column results in an equal comparison, it moves to the next column, and
/// so on. The sort is stable, so full ties keep their scan order.
fn sort(rows: &mut [Vec<Value>], keys: &[(usize, SortDirection)]) {
    rows.sort_by(|a, b| {
        for (idx, direction) in keys {
            let mut ord = a[*idx].total_cmp(&b[*idx]);

            if *direction == SortDirection::Desc {
                ord = ord.reverse();
            }
            // if it's not equal no need to compare more
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Folds the non-`NULL` values of one column. Empty input gives `NULL`,
/// except for `COUNT`.
fn aggregate<'a>(
    func: AggregateFunc,
    data_type: DataType,
    values: impl Iterator<Item = &'a Value>,
) -> Result<Value> {
    let numeric = matches!(data_type, DataType::Int | DataType::Float);
    if matches!(func, AggregateFunc::Sum | AggregateFunc::Avg) && !numeric {
        return Err(Error::type_mismatch(format!(
            "{func} is not defined for {data_type} values"
        )));
    }

    match func {
        AggregateFunc::Count => Ok(Value::Int(values.count() as i64)),
        AggregateFunc::Sum if data_type == DataType::Int => {
            let mut total: Option<i64> = None;
            for value in values {
                let n = value.as_int().unwrap_or_default();
                total = Some(
                    total
                        .unwrap_or(0)
                        .checked_add(n)
                        .ok_or_else(|| Error::type_mismatch("integer overflow"))?,
                );
            }
            Ok(total.map_or(Value::Null, Value::Int))
        }
        AggregateFunc::Sum | AggregateFunc::Avg => {
            let mut total = 0.0;
            let mut count = 0usize;
            for value in values {
                total += as_f64(value);
                count += 1;
            }
            Ok(match (func, count) {
                (_, 0) => Value::Null,
                (AggregateFunc::Avg, n) => Value::Float(total / n as f64),
                _ => Value::Float(total),
            })
        }
        AggregateFunc::Min => Ok(values.min_by(|a, b| a.total_cmp(b)).cloned().unwrap_or(Value::Null)),
        AggregateFunc::Max => Ok(values.max_by(|a, b| a.total_cmp(b)).cloned().unwrap_or(Value::Null)),
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Int(i) => *i as f64,
        Value::Float(f) => *f,
        _ => 0.0,
    }
}
