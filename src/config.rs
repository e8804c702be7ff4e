//! Connection strings.
//!
//! Two forms are accepted:
//!
//! - a bare target: `mem://`, `:memory:`, `file:/path/to/db.tsql`, or empty
//!   for memory;
//! - an ODBC-style `key=value;...` string, e.g.
//!   `DRIVER={tinySQL};SERVER=file:/tmp/app.tsql;AutoFlush=false`.
//!
//! In the second form the target comes from `Database`, then `Server`, then
//! `DSN`, whichever is present first. Keys are case-insensitive and unknown
//! keys (`DRIVER`, `UID`, ...) are ignored.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Names that select an in-memory database.
const MEMORY_ALIASES: &[&str] = &["", "mem://", ":memory:", "tinysql_memory", "tinysql_mem"];

/// Where a connection keeps its data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Backend {
    /// Nothing is persisted unless saved explicitly to a path.
    #[default]
    Memory,
    /// Loaded on open, written back on flush.
    File(PathBuf),
}

impl Backend {
    fn from_target(target: &str) -> Result<Self> {
        let target = target.trim();
        if MEMORY_ALIASES.iter().any(|a| a.eq_ignore_ascii_case(target)) {
            return Ok(Backend::Memory);
        }
        match target.strip_prefix("file:") {
            Some("") => Err(Error::parse("file: target needs a path", 0)),
            Some(path) => Ok(Backend::File(PathBuf::from(path))),
            None => Err(Error::NotFound {
                kind: "DSN",
                name: target.to_string(),
            }),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Memory => f.write_str("mem://"),
            Backend::File(path) => write!(f, "file:{}", path.display()),
        }
    }
}

/// Parsed connection options.
///
/// # Example
///
/// ```
/// use tinysql::config::{Backend, ConnectionConfig};
///
/// let config: ConnectionConfig = "DSN=tinysql_file;Database=file:/tmp/x.tsql".parse().unwrap();
/// assert_eq!(config.backend, Backend::File("/tmp/x.tsql".into()));
/// assert!(config.auto_flush);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub backend: Backend,
    /// Write file-backed databases back on `commit` and `close` after a
    /// mutation.
    pub auto_flush: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            auto_flush: true,
        }
    }
}

impl ConnectionConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: Backend::File(path.into()),
            ..Default::default()
        }
    }

    /// Parses a bare target or a `key=value;...` connection string.
    ///
    /// # Errors
    /// [Error::NotFound] for an unknown DSN name, [Error::Parse] for a
    /// malformed option (the position is the byte offset of the segment).
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if !input.contains('=') {
            return Ok(Self {
                backend: Backend::from_target(input)?,
                ..Default::default()
            });
        }

        let (mut database, mut server, mut dsn) = (None, None, None);
        let mut auto_flush = true;
        let mut offset = 0;
        for segment in input.split(';') {
            let position = offset;
            offset += segment.len() + 1;
            if segment.trim().is_empty() {
                continue;
            }

            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| Error::parse(format!("expected key=value, found {segment:?}"), position))?;
            let value = unbrace(value.trim());

            match key.trim().to_ascii_lowercase().as_str() {
                "database" => database = Some(value),
                "server" => server = Some(value),
                "dsn" => dsn = Some(value),
                "autoflush" => auto_flush = parse_flag(value, position)?,
                _ => {}
            }
        }

        let target = database.or(server).or(dsn).unwrap_or_default();
        Ok(Self {
            backend: Backend::from_target(target)?,
            auto_flush,
        })
    }
}

impl FromStr for ConnectionConfig {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// `{tinySQL}` -> `tinySQL`
fn unbrace(value: &str) -> &str {
    value
        .strip_prefix('{')
        .and_then(|v| v.strip_suffix('}'))
        .unwrap_or(value)
}

fn parse_flag(value: &str, position: usize) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(Error::parse(
            format!("expected a boolean for AutoFlush, found {value:?}"),
            position,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_targets() {
        for memory in ["", "mem://", ":memory:", "tinysql_memory", "MEM://"] {
            assert_eq!(
                ConnectionConfig::parse(memory).unwrap().backend,
                Backend::Memory,
                "{memory:?}"
            );
        }
        assert_eq!(
            ConnectionConfig::parse("file:/tmp/a.tsql").unwrap(),
            ConnectionConfig::file("/tmp/a.tsql")
        );
    }

    #[test]
    fn test_odbc_strings() {
        let config: ConnectionConfig = "DRIVER={tinySQL};SERVER=mem://".parse().unwrap();
        assert_eq!(config, ConnectionConfig::memory());

        let config: ConnectionConfig = "DSN=tinysql_mem".parse().unwrap();
        assert_eq!(config.backend, Backend::Memory);

        let config: ConnectionConfig = "driver={tinySQL};server=file:/data/x.db;autoflush=no;"
            .parse()
            .unwrap();
        assert_eq!(config.backend, Backend::File("/data/x.db".into()));
        assert!(!config.auto_flush);
    }

    #[test]
    fn test_target_priority() {
        let config = ConnectionConfig::parse("DSN=tinysql_memory;Server=file:/s;Database=file:/d").unwrap();
        assert_eq!(config.backend, Backend::File("/d".into()));

        let config = ConnectionConfig::parse("DSN=tinysql_memory;Server=file:/s").unwrap();
        assert_eq!(config.backend, Backend::File("/s".into()));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            ConnectionConfig::parse("DSN=production"),
            Err(Error::NotFound { kind: "DSN", .. })
        ));
        assert!(matches!(
            ConnectionConfig::parse("somewhere"),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            ConnectionConfig::parse("Server=mem://;AutoFlush=maybe"),
            Err(Error::Parse { position: 14, .. })
        ));
        assert!(matches!(
            ConnectionConfig::parse("Server=mem://;garbage"),
            Err(Error::Parse { .. })
        ));
        assert!(ConnectionConfig::parse("file:").is_err());
    }

    #[test]
    fn test_display_round_trips() {
        for config in [
            ConnectionConfig::memory(),
            ConnectionConfig::file("/tmp/db.tsql"),
        ] {
            let text = config.backend.to_string();
            assert_eq!(ConnectionConfig::parse(&text).unwrap(), config);
        }
    }
}
