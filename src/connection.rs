use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use crate::config::{Backend, ConnectionConfig};
use crate::database::{Database, RowSet, StatementResult};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::protocol::Response;

/// A driver-side handle on one database, configured by a connection string.
///
/// File-backed connections load the file on open if it exists. With
/// `auto_flush` on, the file is rewritten on [Connection::commit] and on
/// close (explicit or by drop) whenever a statement changed something since
/// the last write. [Connection::save] always writes.
///
/// # Example
/// ```
/// use tinysql::Connection;
///
/// let dir = tempfile::tempdir().unwrap();
/// let target = format!("file:{}", dir.path().join("app.tsql").display());
///
/// let conn = Connection::connect(&target).unwrap();
/// conn.execute("CREATE TABLE notes (body TEXT)").unwrap();
/// conn.execute("INSERT INTO notes VALUES ('hello')").unwrap();
/// conn.close().unwrap();
///
/// let conn = Connection::connect(&target).unwrap();
/// assert_eq!(conn.query("SELECT * FROM notes").unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct Connection {
    engine: Engine,
    config: ConnectionConfig,
    /// A mutation succeeded since the last write to the backing file.
    dirty: AtomicBool,
    closed: bool,
}

impl Connection {
    /// # Errors
    /// A backing file that exists but cannot be read or decoded fails the
    /// open; it is never silently replaced by an empty database.
    pub fn open(config: ConnectionConfig) -> Result<Self> {
        let db = match &config.backend {
            Backend::File(path) if path.exists() => Database::load(path)?,
            _ => Database::new(),
        };
        info!(backend = %config.backend, auto_flush = config.auto_flush, tables = db.catalog().len(), "connection opened");
        Ok(Self {
            engine: Engine::with_database(db),
            config,
            dirty: AtomicBool::new(false),
            closed: false,
        })
    }

    /// Parses `conn_str` (see [crate::config]) and opens it.
    pub fn connect(conn_str: &str) -> Result<Self> {
        Self::open(ConnectionConfig::parse(conn_str)?)
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn execute(&self, sql: &str) -> Result<StatementResult> {
        let result = self.engine.execute(sql)?;
        if result.rows_affected().is_some() {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(result)
    }

    pub fn exec(&self, sql: &str) -> Response {
        self.execute(sql).into()
    }

    /// Runs a statement that must be a `SELECT`.
    pub fn query(&self, sql: &str) -> Result<RowSet> {
        self.engine.read(|db| db.query(sql))
    }

    pub fn tables(&self) -> RowSet {
        self.engine.tables()
    }

    pub fn columns(&self, table: &str) -> Result<RowSet> {
        self.engine.columns(table)
    }

    /// Writes the database to the connection's file.
    ///
    /// # Errors
    /// In-memory connections have no file; use [Connection::save_to].
    pub fn save(&self) -> Result<()> {
        match &self.config.backend {
            Backend::File(path) => self.write_file(path),
            Backend::Memory => Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "in-memory connection has no backing file",
            ))),
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match &self.config.backend {
            Backend::File(own) if own == path => self.write_file(path),
            _ => self.engine.save(path),
        }
    }

    /// Replaces the connection's data with the database stored at `path`.
    pub fn load_from(&self, path: impl AsRef<Path>) -> Result<()> {
        self.engine.load(path)?;
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Drops every table.
    pub fn reset(&self) {
        self.engine.reset();
        self.dirty.store(true, Ordering::Release);
    }

    /// Flushes pending changes when `auto_flush` is on; otherwise a no-op.
    pub fn commit(&self) -> Result<()> {
        self.flush_if_needed()
    }

    /// Flushes like [Connection::commit] and closes the connection.
    pub fn close(mut self) -> Result<()> {
        let result = self.flush_if_needed();
        self.closed = true;
        info!(backend = %self.config.backend, "connection closed");
        result
    }

    /// Clears the dirty flag before writing, so a mutation that lands while
    /// the save runs marks the connection dirty again instead of being lost.
    fn write_file(&self, path: &Path) -> Result<()> {
        let was_dirty = self.dirty.swap(false, Ordering::AcqRel);
        self.engine.save(path).inspect_err(|_| {
            if was_dirty {
                self.dirty.store(true, Ordering::Release);
            }
        })
    }

    fn flush_if_needed(&self) -> Result<()> {
        match &self.config.backend {
            Backend::File(path) if self.config.auto_flush && self.is_dirty() => {
                self.write_file(path)
            }
            _ => Ok(()),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush_if_needed() {
            warn!(backend = %self.config.backend, error = %e, "flush on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::value::Value;

    fn file_target(dir: &tempfile::TempDir) -> (PathBuf, String) {
        let path = dir.path().join("db.tsql");
        let target = format!("file:{}", path.display());
        (path, target)
    }

    fn seed(conn: &Connection) {
        conn.execute("CREATE TABLE users (id INT, name TEXT)")
            .unwrap();
        conn.execute("INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob')")
            .unwrap();
    }

    #[test]
    fn test_memory_connection() {
        let conn = Connection::connect("DRIVER={tinySQL};SERVER=mem://").unwrap();
        seed(&conn);

        assert_eq!(conn.query("SELECT * FROM users").unwrap().len(), 2);
        assert!(matches!(conn.save(), Err(Error::Io(_))));
        conn.close().unwrap();
    }

    #[test]
    fn test_file_survives_close_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (path, target) = file_target(&dir);

        let conn = Connection::connect(&target).unwrap();
        seed(&conn);
        assert!(conn.is_dirty());
        conn.close().unwrap();
        assert!(path.exists());

        let conn = Connection::connect(&target).unwrap();
        assert!(!conn.is_dirty());
        let rows = conn.query("SELECT name FROM users ORDER BY id").unwrap();
        assert_eq!(
            rows.rows,
            vec![vec![Value::from("Alice")], vec![Value::from("Bob")]]
        );
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let (_, target) = file_target(&dir);

        {
            let conn = Connection::connect(&target).unwrap();
            seed(&conn);
        }

        let conn = Connection::connect(&target).unwrap();
        assert_eq!(conn.tables().len(), 1);
    }

    #[test]
    fn test_reads_do_not_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let (path, target) = file_target(&dir);

        let conn = Connection::connect(&target).unwrap();
        conn.query("SELECT 1 FROM nowhere").unwrap_err();
        conn.execute("SELECT * FROM nowhere").unwrap_err();
        assert!(!conn.is_dirty());
        conn.close().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_commit_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let (path, target) = file_target(&dir);

        let conn = Connection::connect(&target).unwrap();
        seed(&conn);
        conn.commit().unwrap();
        assert!(!conn.is_dirty());

        let other = Database::load(&path).unwrap();
        assert_eq!(other.list_tables(), vec!["users"]);
    }

    #[test]
    fn test_auto_flush_off_needs_explicit_save() {
        let dir = tempfile::tempdir().unwrap();
        let (_, target) = file_target(&dir);
        let target = format!("Database={target};AutoFlush=false");

        let conn = Connection::connect(&target).unwrap();
        seed(&conn);
        conn.close().unwrap();
        let conn = Connection::connect(&target).unwrap();
        assert!(conn.tables().is_empty());

        seed(&conn);
        conn.save().unwrap();
        conn.close().unwrap();
        let conn = Connection::connect(&target).unwrap();
        assert_eq!(conn.tables().len(), 1);
    }

    #[test]
    fn test_failed_flush_stays_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("db.tsql");
        let conn = Connection::connect(&format!("file:{}", path.display())).unwrap();
        seed(&conn);

        assert!(matches!(conn.commit(), Err(Error::Io(_))));
        assert!(conn.is_dirty());

        std::fs::create_dir(dir.path().join("missing")).unwrap();
        conn.commit().unwrap();
        assert!(!conn.is_dirty());
        assert_eq!(Database::load(&path).unwrap().list_tables(), vec!["users"]);
    }

    #[test]
    fn test_mutation_during_flush_is_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let (path, target) = file_target(&dir);
        let conn = Connection::connect(&target).unwrap();
        seed(&conn);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..50 {
                    conn.commit().unwrap();
                    conn.execute(&format!("INSERT INTO users VALUES ({}, 'x')", i + 10))
                        .unwrap();
                }
            });
            s.spawn(|| {
                for _ in 0..50 {
                    conn.commit().unwrap();
                }
            });
        });
        // the last insert happened after every commit in its own thread
        conn.commit().unwrap();
        let saved = Database::load(&path).unwrap();
        assert_eq!(saved.query("SELECT * FROM users").unwrap().len(), 52);
    }

    #[test]
    fn test_corrupt_file_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let (path, target) = file_target(&dir);
        std::fs::write(&path, b"TSQL garbage").unwrap();

        assert!(matches!(
            Connection::connect(&target),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_unknown_dsn() {
        assert!(matches!(
            Connection::connect("DSN=somewhere_else"),
            Err(Error::NotFound { kind: "DSN", .. })
        ));
    }

    #[test]
    fn test_save_to_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let copy = dir.path().join("copy.tsql");

        let conn = Connection::connect("mem://").unwrap();
        seed(&conn);
        conn.save_to(&copy).unwrap();

        let other = Connection::connect(":memory:").unwrap();
        other.load_from(&copy).unwrap();
        assert_eq!(other.columns("users").unwrap().len(), 2);
        assert_eq!(other.exec("SELECT COUNT(*) AS n FROM users").to_json(), r#"{"status":"ok","columns":["n"],"rows":[{"n":2}]}"#);
    }
}
