use allocative::Allocative;
use bitvec::vec::BitVec;

use crate::column::Column;
use crate::data_type::DataType;
use crate::error::{Error, Result};
use crate::value::Value;

/// Lookup key for table, column and alias names. Identifiers compare
/// case-insensitively under Unicode lowercasing, so `Ä` and `ä` are one name.
pub(crate) fn name_key(name: &str) -> String {
    name.to_lowercase()
}

/// Column definition in the schema
#[derive(Debug, Clone, PartialEq, Allocative)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnDef {
    /// A nullable column, which is what every SQL-declared column is.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Allocative)]
pub struct Schema {
    pub columns: Vec<ColumnDef>,
}

impl Schema {
    /// Builds a schema, rejecting duplicate column names (case-insensitive).
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        let keys: Vec<String> = columns.iter().map(|c| name_key(&c.name)).collect();
        for (i, col) in columns.iter().enumerate() {
            if keys[..i].contains(&keys[i]) {
                return Err(Error::AlreadyExists {
                    kind: "column",
                    name: col.name.clone(),
                });
            }
        }
        Ok(Self { columns })
    }

    /// Position of a column by case-insensitive name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        let key = name_key(name);
        self.columns.iter().position(|c| name_key(&c.name) == key)
    }

    /// Like [Schema::index_of] but reports a missing column as [Error::NotFound].
    pub fn resolve(&self, name: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::column_not_found(name))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// A named table: schema plus one typed [Column] per schema entry.
/// Rows are positional and kept in insertion order.
#[derive(Debug, Clone, Allocative)]
pub struct Table {
    pub name: String,
    pub schema: Schema,
    pub columns: Vec<Column>,
    pub row_count: usize,
}

impl Table {
    pub fn new(name: String, schema: Schema) -> Self {
        let columns = schema
            .columns
            .iter()
            .map(|column| Column::new(column.data_type))
            .collect();
        Self {
            name,
            schema,
            columns,
            row_count: 0,
        }
    }

    /// Checks arity, nullability and types of a row and coerces its values
    /// to the declared column types. Does not touch storage.
    pub fn prepare_row(&self, values: Vec<Value>) -> Result<Vec<Value>> {
        if values.len() != self.schema.len() {
            return Err(Error::ArityMismatch {
                expected: self.schema.len(),
                found: values.len(),
            });
        }
        values
            .into_iter()
            .zip(&self.schema.columns)
            .map(|(value, def)| coerce_for(def, value))
            .collect()
    }

    /// insert a new row
    pub fn insert(&mut self, values: Vec<Value>) -> Result<()> {
        let row = self.prepare_row(values)?;
        self.push_row(row)
    }

    /// Inserts several rows atomically: either every row is valid and all of
    /// them are appended, or the table is left unchanged.
    pub fn insert_rows(&mut self, rows: Vec<Vec<Value>>) -> Result<usize> {
        let prepared = rows
            .into_iter()
            .map(|row| self.prepare_row(row))
            .collect::<Result<Vec<_>>>()?;
        let count = prepared.len();
        for row in prepared {
            self.push_row(row)?;
        }
        Ok(count)
    }

    fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.push(value)?;
        }
        self.row_count += 1;
        Ok(())
    }

    pub fn get_row(&self, row_idx: usize) -> Option<Vec<Value>> {
        if self.row_count <= row_idx {
            return None;
        }
        self.columns
            .iter()
            .map(|col| col.get(row_idx)) // -> Option<Value>
            .collect()
    }

    pub fn get_col(&self, name: &str) -> Option<&Column> {
        self.schema.index_of(name).map(|idx| &self.columns[idx])
    }

    /// Iterates the rows in insertion order. The iterator is lazy and a fresh
    /// call restarts from the first row.
    pub fn scan(&self) -> Rows<'_> {
        Rows {
            table: self,
            next: 0,
        }
    }

    /// Rewrites rows in place.
    ///
    /// `plan` is called once per row with the row's current values and returns
    /// the `(column index, new value)` pairs to write, or `None` to leave the
    /// row alone. Every change is computed and type-checked before the first
    /// write, so assignments only ever see pre-update values and a failing
    /// statement mutates nothing.
    ///
    /// Returns the number of rows rewritten.
    pub fn update<F>(&mut self, mut plan: F) -> Result<usize>
    where
        F: FnMut(&[Value]) -> Result<Option<Vec<(usize, Value)>>>,
    {
        let mut changes = Vec::new();
        for (row_idx, row) in self.scan().enumerate() {
            if let Some(assignments) = plan(&row)? {
                let assignments = assignments
                    .into_iter()
                    .map(|(col_idx, value)| {
                        coerce_for(&self.schema.columns[col_idx], value).map(|v| (col_idx, v))
                    })
                    .collect::<Result<Vec<_>>>()?;
                changes.push((row_idx, assignments));
            }
        }

        for (row_idx, assignments) in &changes {
            for (col_idx, value) in assignments {
                self.columns[*col_idx].set(*row_idx, value)?;
            }
        }
        Ok(changes.len())
    }

    /// Removes every row for which `predicate` returns true and reports how
    /// many were removed. The predicate runs over all rows before any removal.
    pub fn delete<F>(&mut self, mut predicate: F) -> Result<usize>
    where
        F: FnMut(&[Value]) -> Result<bool>,
    {
        let keep = self
            .scan()
            .map(|row| predicate(&row).map(|doomed| !doomed))
            .collect::<Result<BitVec>>()?;
        let removed = keep.count_zeros();
        if removed > 0 {
            for column in &mut self.columns {
                column.retain(&keep)?;
            }
            self.row_count -= removed;
        }
        Ok(removed)
    }
}

pub(crate) fn coerce_for(def: &ColumnDef, value: Value) -> Result<Value> {
    if value.is_null() && !def.nullable {
        return Err(Error::type_mismatch(format!(
            "column {:?} does not accept NULL",
            def.name
        )));
    }
    value.coerce_to(def.data_type).map_err(|e| match e {
        Error::TypeMismatch(msg) => Error::TypeMismatch(format!("{msg} ({:?})", def.name)),
        other => other,
    })
}

/// Lazy row iterator returned by [Table::scan].
pub struct Rows<'a> {
    table: &'a Table,
    next: usize,
}

impl Iterator for Rows<'_> {
    type Item = Vec<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.table.get_row(self.next)?;
        self.next += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.table.row_count.saturating_sub(self.next);
        (left, Some(left))
    }
}

impl ExactSizeIterator for Rows<'_> {}
