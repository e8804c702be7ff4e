//! `tinysql [connection-string]`
//!
//! Reads one SQL statement per line from stdin and prints one JSON envelope
//! per line. Lines starting with `.` are shell commands, see `.help`.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use tinysql::{Connection, Error, Response, RowSet};
use tracing::error;
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
.tables             list tables
.columns <table>    list the columns of a table
.save [path]        write the database (to its own file without a path)
.load <path>        replace the database with a saved one
.reset              drop every table
.stats              approximate memory held by the database
.quit               flush and exit";

fn main() -> ExitCode {
    init_logging();

    let target = std::env::args().nth(1).unwrap_or_default();
    let conn = match Connection::connect(&target) {
        Ok(conn) => conn,
        Err(e) => {
            error!(target = %target, error = %e, "cannot open database");
            eprintln!("tinysql: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let result = run(&conn, stdin.lock(), stdout.lock()).and_then(|()| {
        conn.close().map_err(io::Error::other)
    });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tinysql: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tinysql=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(conn: &Connection, input: impl BufRead, mut out: impl Write) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with("--") {
            continue;
        }

        let response = if line.starts_with('.') {
            match command(conn, line) {
                Some(response) => response,
                None => return Ok(()),
            }
        } else {
            conn.exec(line)
        };
        writeln!(out, "{}", response.to_json())?;
    }
    Ok(())
}

/// Runs a dot command. `None` means quit.
fn command(conn: &Connection, line: &str) -> Option<Response> {
    let mut words = line.split_whitespace();
    let name = words.next().unwrap_or_default();
    let arg = words.next();

    let response = match (name, arg) {
        (".quit" | ".exit", _) => return None,
        (".help", _) => Response::Rows(RowSet {
            columns: vec!["help".into()],
            rows: HELP.lines().map(|l| vec![l.into()]).collect(),
        }),
        (".tables", _) => Response::Rows(conn.tables()),
        (".columns", Some(table)) => conn.columns(table).into(),
        (".save", None) => conn.save().into(),
        (".save", Some(path)) => conn.save_to(path).into(),
        (".load", Some(path)) => conn.load_from(path).into(),
        (".reset", _) => {
            conn.reset();
            Response::Done
        }
        (".stats", _) => Response::Rows(RowSet {
            columns: vec!["tables".into(), "memory_bytes".into()],
            rows: vec![vec![
                (conn.tables().len() as i64).into(),
                (conn.engine().memory_usage() as i64).into(),
            ]],
        }),
        _ => Error::parse(format!("unknown command {line:?}, try .help"), 0).into(),
    };
    Some(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(input: &str) -> Vec<serde_json::Value> {
        let conn = Connection::connect("mem://").unwrap();
        let mut out = Vec::new();
        run(&conn, input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_statements_and_commands() {
        let out = session(
            "CREATE TABLE users (id INT, name TEXT);\n\
             -- a comment\n\
             INSERT INTO users VALUES (1, 'Alice');\n\
             .tables\n\
             .columns users\n\
             SELECT name FROM users",
        );

        assert_eq!(out.len(), 5);
        assert_eq!(out[0]["rows_affected"], 0);
        assert_eq!(out[1]["rows_affected"], 1);
        assert_eq!(out[2]["rows"][0]["table_name"], "users");
        assert_eq!(out[3]["rows"][1]["column_name"], "name");
        assert_eq!(out[4]["rows"], serde_json::json!([{"name": "Alice"}]));
    }

    #[test]
    fn test_errors_do_not_stop_the_session() {
        let out = session("SELECT * FROM nope;\n.bogus\n.save\n.quit\nSELECT 1;");

        assert_eq!(out.len(), 3);
        assert_eq!(out[0]["kind"], "NotFound");
        assert_eq!(out[1]["kind"], "ParseError");
        assert_eq!(out[2]["kind"], "IoError");
    }

    #[test]
    fn test_save_and_load_commands() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shell.tsql");
        let out = session(&format!(
            "CREATE TABLE t (x INT);\n.save {p}\n.reset\n.stats\n.load {p}\n.tables",
            p = path.display()
        ));

        assert_eq!(out[1]["status"], "ok");
        assert_eq!(out[3]["rows"][0]["tables"], 0);
        assert_eq!(out[4]["status"], "ok");
        assert_eq!(out[5]["rows"][0]["table_name"], "t");
    }
}
