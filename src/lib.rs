pub mod ast;
pub mod catalog;
pub mod column;
pub mod config;
pub mod connection;
pub mod data_type;
pub mod database;
pub mod engine;
pub mod error;
pub mod expr;
pub mod ffi;
pub mod parser;
pub mod persistence;
pub mod protocol;
pub mod table;
pub mod tokenizer;
pub mod value;

pub use catalog::Catalog;
pub use column::Column;
pub use config::{Backend, ConnectionConfig};
pub use connection::Connection;
pub use data_type::DataType;
pub use database::{Database, RowSet, StatementResult};
pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use parser::parse_sql;
pub use protocol::Response;
pub use table::{ColumnDef, Schema, Table};
pub use value::Value;
