//! The response envelope handed to hosts.
//!
//! Internally a [Response] is a tagged variant; it only becomes JSON at the
//! boundary:
//!
//! ```text
//! {"status":"ok","columns":["id"],"rows":[{"id":1}]}   SELECT, metadata
//! {"status":"ok","rows_affected":3}                     DDL / DML
//! {"status":"ok"}                                       save, load, reset
//! {"status":"error","error":"...","kind":"NotFound"}    any failure
//! ```

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::catalog::Catalog;
use crate::database::{RowSet, StatementResult};
use crate::error::{Error, ErrorKind, Result};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Rows(RowSet),
    Affected(u64),
    Done,
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn error(err: &Error) -> Self {
        Response::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        !matches!(self, Response::Error { .. })
    }

    /// Encodes the envelope as one line of JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "status": "error",
                "error": format!("cannot encode response: {e}"),
                "kind": ErrorKind::Format.as_str(),
            })
            .to_string()
        })
    }
}

impl From<Error> for Response {
    fn from(err: Error) -> Self {
        Response::error(&err)
    }
}

impl From<Result<StatementResult>> for Response {
    fn from(result: Result<StatementResult>) -> Self {
        match result {
            Ok(StatementResult::Query(rows)) => Response::Rows(rows),
            Ok(StatementResult::Mutation { rows_affected }) => Response::Affected(rows_affected),
            Err(err) => err.into(),
        }
    }
}

impl From<Result<RowSet>> for Response {
    fn from(result: Result<RowSet>) -> Self {
        result.map_or_else(|err| Response::error(&err), Response::Rows)
    }
}

impl From<Result<()>> for Response {
    fn from(result: Result<()>) -> Self {
        result.map_or_else(|err| Response::error(&err), |()| Response::Done)
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Response::Rows(set) => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("status", "ok")?;
                map.serialize_entry("columns", &set.columns)?;
                map.serialize_entry("rows", &Rows(set))?;
                map.end()
            }
            Response::Affected(count) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("status", "ok")?;
                map.serialize_entry("rows_affected", count)?;
                map.end()
            }
            Response::Done => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("status", "ok")?;
                map.end()
            }
            Response::Error { kind, message } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("status", "error")?;
                map.serialize_entry("error", message)?;
                map.serialize_entry("kind", kind.as_str())?;
                map.end()
            }
        }
    }
}

/// Rows as a sequence of `{column: value}` objects, keys in projection order.
struct Rows<'a>(&'a RowSet);

struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Serialize for Rows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.rows.len()))?;
        for values in &self.0.rows {
            seq.serialize_element(&Row {
                columns: &self.0.columns,
                values,
            })?;
        }
        seq.end()
    }
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

// ─── Catalog metadata (SQLTables / SQLColumns shapes) ──────────────────

/// One row per table, in creation order.
pub fn table_listing(catalog: &Catalog) -> RowSet {
    RowSet {
        columns: vec!["table_name".into(), "table_type".into()],
        rows: catalog
            .table_names()
            .into_iter()
            .map(|name| vec![Value::from(name), Value::from("TABLE")])
            .collect(),
    }
}

/// One row per column of `table`, in declaration order.
///
/// # Errors
/// Returns [Error::NotFound] if the table does not exist.
pub fn column_listing(catalog: &Catalog, table: &str) -> Result<RowSet> {
    let table = catalog.get_table(table)?;
    Ok(RowSet {
        columns: [
            "table_name",
            "column_name",
            "ordinal_position",
            "type_name",
            "column_size",
            "nullable",
        ]
        .map(String::from)
        .to_vec(),
        rows: table
            .schema
            .columns
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                vec![
                    Value::from(table.name.as_str()),
                    Value::from(col.name.as_str()),
                    Value::Int(idx as i64 + 1),
                    Value::from(col.data_type.type_name()),
                    Value::Int(i64::from(col.data_type.column_size())),
                    Value::Bool(col.nullable),
                ]
            })
            .collect(),
    })
}
