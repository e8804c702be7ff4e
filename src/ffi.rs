//! C ABI over [Engine::global].
//!
//! Every call that returns `*mut c_char` hands the caller a NUL-terminated
//! JSON envelope (see [crate::protocol]) that must be released with
//! [TinySQLFree]. Releasing is checked: null, foreign and already released
//! pointers are ignored, so a host bug can leak but never double-free.
#![allow(non_snake_case)]

use std::collections::HashSet;
use std::ffi::{CStr, CString, c_char};
use std::sync::LazyLock;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::protocol::Response;

static VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "\0");

/// Addresses of strings handed out and not yet freed.
static LIVE: LazyLock<Mutex<HashSet<usize>>> = LazyLock::new(|| Mutex::new(HashSet::new()));

fn into_raw(response: Response) -> *mut c_char {
    // serde_json escapes control characters, so the JSON never holds a NUL
    let json = CString::new(response.to_json()).unwrap_or_else(|_| {
        CString::from(c"{\"status\":\"error\",\"error\":\"response contained a NUL byte\",\"kind\":\"FormatError\"}")
    });
    let ptr = json.into_raw();
    LIVE.lock().insert(ptr as usize);
    ptr
}

/// Borrows a caller string.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that stays valid
/// for the duration of the call.
unsafe fn borrow_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(Error::parse(format!("{what} is a null pointer"), 0));
    }
    let bytes = unsafe { CStr::from_ptr(ptr) };
    bytes
        .to_str()
        .map_err(|e| Error::parse(format!("{what} is not valid UTF-8: {e}"), e.valid_up_to()))
}

/// Engine version as a static NUL-terminated string. Do not free it.
#[unsafe(no_mangle)]
pub extern "C" fn TinySQLVersion() -> *const c_char {
    VERSION.as_ptr().cast()
}

/// Drops every table of the global database.
#[unsafe(no_mangle)]
pub extern "C" fn TinySQLReset() {
    Engine::global().reset();
}

/// Executes one SQL statement.
///
/// # Safety
/// `sql` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn TinySQLExec(sql: *const c_char) -> *mut c_char {
    let response = match unsafe { borrow_str(sql, "sql") } {
        Ok(sql) => Engine::global().exec(sql),
        Err(e) => e.into(),
    };
    into_raw(response)
}

/// Writes the global database to `path`.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn TinySQLSave(path: *const c_char) -> *mut c_char {
    let result = unsafe { borrow_str(path, "path") }.and_then(|path| Engine::global().save(path));
    into_raw(result.into())
}

/// Replaces the global database with the one stored at `path`.
///
/// # Safety
/// `path` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn TinySQLLoad(path: *const c_char) -> *mut c_char {
    let result = unsafe { borrow_str(path, "path") }.and_then(|path| Engine::global().load(path));
    into_raw(result.into())
}

/// Lists tables as `{table_name, table_type}` rows.
#[unsafe(no_mangle)]
pub extern "C" fn TinySQLTables() -> *mut c_char {
    into_raw(Response::Rows(Engine::global().tables()))
}

/// Lists the columns of `table`.
///
/// # Safety
/// `table` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn TinySQLColumns(table: *const c_char) -> *mut c_char {
    let result = unsafe { borrow_str(table, "table") }.and_then(|table| Engine::global().columns(table));
    into_raw(result.into())
}

/// Releases a string returned by this library.
///
/// # Safety
/// `ptr` must not be used after this call if it came from this library.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn TinySQLFree(ptr: *mut c_char) {
    if ptr.is_null() {
        debug!("free of a null pointer ignored");
        return;
    }
    if !LIVE.lock().remove(&(ptr as usize)) {
        warn!(ptr = ?ptr, "free of an unknown or already freed pointer ignored");
        return;
    }
    drop(unsafe { CString::from_raw(ptr) });
}

#[cfg(test)]
mod tests {
    use super::*;

    // Every test talks to the same global engine and handle registry.
    static SERIAL: Mutex<()> = parking_lot::const_mutex(());

    fn take(ptr: *mut c_char) -> serde_json::Value {
        assert!(!ptr.is_null());
        let json = unsafe { CStr::from_ptr(ptr) }.to_str().unwrap().to_owned();
        unsafe { TinySQLFree(ptr) };
        serde_json::from_str(&json).unwrap()
    }

    fn exec(sql: &str) -> serde_json::Value {
        let sql = CString::new(sql).unwrap();
        take(unsafe { TinySQLExec(sql.as_ptr()) })
    }

    #[test]
    fn test_version() {
        let version = unsafe { CStr::from_ptr(TinySQLVersion()) };
        assert_eq!(version.to_str().unwrap(), env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_exec_round_trip() {
        let _guard = SERIAL.lock();
        TinySQLReset();

        assert_eq!(
            exec("CREATE TABLE users (id INT, name TEXT);"),
            serde_json::json!({"status": "ok", "rows_affected": 0})
        );
        assert_eq!(
            exec("INSERT INTO users VALUES (1,'Alice'),(2,'Bob'),(3,'Carol');")["rows_affected"],
            3
        );
        assert_eq!(
            exec("SELECT COUNT(*) AS total FROM users;")["rows"],
            serde_json::json!([{"total": 3}])
        );

        let error = exec("SELECT * FROM nope");
        assert_eq!(error["status"], "error");
        assert_eq!(error["kind"], "NotFound");
    }

    #[test]
    fn test_save_reset_load() {
        let _guard = SERIAL.lock();
        TinySQLReset();
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("f").to_str().unwrap()).unwrap();

        exec("CREATE TABLE users (id INT, name TEXT)");
        exec("INSERT INTO users VALUES (1, 'Alice')");
        assert_eq!(
            take(unsafe { TinySQLSave(path.as_ptr()) }),
            serde_json::json!({"status": "ok"})
        );

        TinySQLReset();
        assert_eq!(exec("SELECT * FROM users")["kind"], "NotFound");

        assert_eq!(take(unsafe { TinySQLLoad(path.as_ptr()) })["status"], "ok");
        assert_eq!(
            exec("SELECT * FROM users")["rows"],
            serde_json::json!([{"id": 1, "name": "Alice"}])
        );
    }

    #[test]
    fn test_metadata_calls() {
        let _guard = SERIAL.lock();
        TinySQLReset();
        exec("CREATE TABLE t (x FLOAT)");

        let tables = take(TinySQLTables());
        assert_eq!(
            tables["rows"],
            serde_json::json!([{"table_name": "t", "table_type": "TABLE"}])
        );

        let name = CString::new("t").unwrap();
        let columns = take(unsafe { TinySQLColumns(name.as_ptr()) });
        assert_eq!(columns["rows"][0]["type_name"], "FLOAT");
        assert_eq!(columns["rows"][0]["column_size"], 15);
    }

    #[test]
    fn test_bad_input_gives_error_envelope() {
        let _guard = SERIAL.lock();
        let response = take(unsafe { TinySQLExec(std::ptr::null()) });
        assert_eq!(response["status"], "error");

        let invalid = [0xffu8, 0xfe, 0];
        let response = take(unsafe { TinySQLExec(invalid.as_ptr().cast()) });
        assert_eq!(response["kind"], "ParseError");
    }

    #[test]
    fn test_free_is_checked() {
        let _guard = SERIAL.lock();
        let ptr = TinySQLTables();
        unsafe {
            TinySQLFree(ptr);
            // second free and foreign pointers are ignored
            TinySQLFree(ptr);
            TinySQLFree(std::ptr::null_mut());
        }

        let foreign = CString::new("not ours").unwrap().into_raw();
        unsafe { TinySQLFree(foreign) };
        // still ours to release
        drop(unsafe { CString::from_raw(foreign) });
    }
}
