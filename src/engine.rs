use std::path::Path;
use std::sync::LazyLock;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::{
    ast::Statement,
    database::{Database, RowSet, StatementResult},
    error::Result,
    parser::parse_sql,
    protocol::{self, Response},
};

static GLOBAL: LazyLock<Engine> = LazyLock::new(Engine::new);

/// A [Database] that can be shared between threads.
///
/// Queries take a shared lock and run concurrently. Everything else
/// (DDL, DML, `save`, `load`, `reset`) takes the exclusive lock, so a scan
/// never observes a half-applied statement or a half-replaced database.
///
/// Tests and embedders create their own engines; [Engine::global] is the
/// single instance behind the C ABI.
///
/// # Example
/// ```
/// use tinysql::Engine;
///
/// let engine = Engine::new();
/// engine.exec("CREATE TABLE users (id INT, name TEXT)");
/// engine.exec("INSERT INTO users VALUES (1, 'Alice')");
/// let json = engine.exec("SELECT name FROM users").to_json();
/// assert_eq!(json, r#"{"status":"ok","columns":["name"],"rows":[{"name":"Alice"}]}"#);
/// ```
#[derive(Debug, Default)]
pub struct Engine {
    db: RwLock<Database>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database(db: Database) -> Self {
        Self {
            db: RwLock::new(db),
        }
    }

    /// The process-wide engine used by the C ABI.
    pub fn global() -> &'static Engine {
        &GLOBAL
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// Parses `sql` outside any lock, then runs it under the lock it needs.
    pub fn execute(&self, sql: &str) -> Result<StatementResult> {
        let result = parse_sql(sql).and_then(|statement| match statement {
            Statement::Select(select) => self.db.read().select(&select).map(StatementResult::Query),
            statement => self.db.write().execute_statement(statement),
        });
        if let Err(e) = &result {
            warn!(kind = %e.kind(), error = %e, sql, "statement rejected");
        }
        result
    }

    /// Like [Engine::execute] but returns the envelope.
    pub fn exec(&self, sql: &str) -> Response {
        self.execute(sql).into()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let db = self.db.write();
        db.save(path).inspect_err(|e| warn!(path = %path.display(), error = %e, "save failed"))?;
        info!(path = %path.display(), tables = db.catalog().len(), "database saved");
        Ok(())
    }

    /// Replaces the live database with the one stored at `path`. The file is
    /// decoded before the lock is taken; on failure the live database is kept.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let loaded = Database::load(path)
            .inspect_err(|e| warn!(path = %path.display(), error = %e, "load failed"))?;
        let tables = loaded.catalog().len();
        *self.db.write() = loaded;
        info!(path = %path.display(), tables, "database loaded");
        Ok(())
    }

    /// Drops every table.
    pub fn reset(&self) {
        *self.db.write() = Database::new();
        info!("database reset");
    }

    /// `{table_name, table_type}` rows for driver schema discovery.
    pub fn tables(&self) -> RowSet {
        protocol::table_listing(self.db.read().catalog())
    }

    /// Column metadata rows for one table.
    pub fn columns(&self, table: &str) -> Result<RowSet> {
        protocol::column_listing(self.db.read().catalog(), table)
    }

    pub fn memory_usage(&self) -> usize {
        self.db.read().memory_usage()
    }

    /// Runs `f` with shared access to the database.
    pub fn read<R>(&self, f: impl FnOnce(&Database) -> R) -> R {
        f(&self.db.read())
    }
}
