//! Versioned binary snapshot of a whole [Catalog].
//!
//! Layout (all integers little endian):
//!
//! ```text
//! header   "TSQL" | version u8 | flags u8 | reserved u16
//! catalog  table count u32, then per table:
//!            name string | column count u32
//!            per column: name string | type tag u8 | nullable u8
//!            row count u64, then row count * column count tagged values
//! value    tag u8 (0 NULL, 1 INT i64, 2 FLOAT f64, 3 TEXT string, 4 BOOL u8)
//! string   byte length u32 | UTF-8 bytes
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::catalog::Catalog;
use crate::data_type::DataType;
use crate::error::{Error, Result};
use crate::table::{ColumnDef, Schema, Table};
use crate::value::Value;

pub const MAGIC: &[u8; 4] = b"TSQL";

/// Current format version. Files with a higher version are rejected.
pub const VERSION: u8 = 1;

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_BOOL: u8 = 4;

/// Writes `catalog` to `writer`.
pub fn encode<W: Write>(catalog: &Catalog, writer: &mut W) -> Result<()> {
    // Header
    writer.write_all(MAGIC)?;
    writer.write_all(&[VERSION, 0])?;
    writer.write_all(&0u16.to_le_bytes())?;

    write_len(writer, catalog.len())?;
    for table in catalog.tables() {
        write_string(writer, &table.name)?;

        write_len(writer, table.schema.len())?;
        for column in &table.schema.columns {
            write_string(writer, &column.name)?;
            writer.write_all(&[column.data_type.tag(), u8::from(column.nullable)])?;
        }

        writer.write_all(&(table.row_count as u64).to_le_bytes())?;
        for row in table.scan() {
            for value in &row {
                write_value(writer, value)?;
            }
        }
    }
    Ok(())
}

/// Encodes `catalog` into a fresh buffer.
pub fn to_bytes(catalog: &Catalog) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    encode(catalog, &mut buf)?;
    Ok(buf)
}

fn write_len<W: Write>(writer: &mut W, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| Error::format(format!("length {len} exceeds u32")))?;
    writer.write_all(&len.to_le_bytes())?;
    Ok(())
}

fn write_string<W: Write>(writer: &mut W, s: &str) -> Result<()> {
    write_len(writer, s.len())?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

fn write_value<W: Write>(writer: &mut W, value: &Value) -> Result<()> {
    match value {
        Value::Null => writer.write_all(&[TAG_NULL])?,
        Value::Int(i) => {
            writer.write_all(&[TAG_INT])?;
            writer.write_all(&i.to_le_bytes())?;
        }
        Value::Float(f) => {
            writer.write_all(&[TAG_FLOAT])?;
            writer.write_all(&f.to_bits().to_le_bytes())?;
        }
        Value::Text(s) => {
            writer.write_all(&[TAG_TEXT])?;
            write_string(writer, s)?;
        }
        Value::Bool(b) => writer.write_all(&[TAG_BOOL, u8::from(*b)])?,
    }
    Ok(())
}

/// Decodes a complete snapshot. Any structural problem, including bytes left
/// over after the last table, is an [Error::Format].
pub fn decode(bytes: &[u8]) -> Result<Catalog> {
    let mut reader = Reader { bytes, pos: 0 };

    if reader.take(MAGIC.len())? != MAGIC {
        return Err(Error::format("not a tinysql database file (bad magic)"));
    }
    let version = reader.u8()?;
    if version == 0 || version > VERSION {
        return Err(Error::format(format!(
            "unsupported format version {version} (this build reads up to {VERSION})"
        )));
    }
    let _flags = reader.u8()?;
    let _reserved = reader.take(2)?;

    let mut catalog = Catalog::new();
    let table_count = reader.u32()?;
    for _ in 0..table_count {
        let table = read_table(&mut reader)?;
        catalog
            .add_table(table)
            .map_err(|e| Error::format(e.to_string()))?;
    }

    if reader.pos != bytes.len() {
        return Err(Error::format(format!(
            "{} trailing bytes after the last table",
            bytes.len() - reader.pos
        )));
    }
    Ok(catalog)
}

fn read_table(reader: &mut Reader<'_>) -> Result<Table> {
    let name = reader.string()?;

    let column_count = reader.u32()?;
    let mut columns = Vec::new();
    for _ in 0..column_count {
        let column_name = reader.string()?;
        let tag = reader.u8()?;
        let data_type = DataType::from_tag(tag)
            .ok_or_else(|| Error::format(format!("unknown column type tag {tag}")))?;
        let nullable = reader.bool()?;
        columns.push(ColumnDef {
            name: column_name,
            data_type,
            nullable,
        });
    }
    let schema = Schema::new(columns).map_err(|e| Error::format(e.to_string()))?;

    let mut table = Table::new(name, schema);
    let row_count = reader.u64()?;
    for row_idx in 0..row_count {
        let mut row = Vec::with_capacity(table.schema.len());
        for def in &table.schema.columns {
            let value = reader.value()?;
            let fits = match value.data_type() {
                None => def.nullable,
                Some(ty) => ty == def.data_type,
            };
            if !fits {
                return Err(Error::format(format!(
                    "row {row_idx} of table {:?}: {} value in {} column {:?}",
                    table.name,
                    value.type_label(),
                    def.data_type,
                    def.name
                )));
            }
            row.push(value);
        }
        table
            .insert(row)
            .map_err(|e| Error::format(e.to_string()))?;
    }
    Ok(table)
}

/// Bounds-checked cursor over the input; running out of bytes is a format
/// error, not an I/O error.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| Error::format(format!("truncated file at byte {}", self.pos)))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::format(format!("invalid boolean byte {other}"))),
        }
    }

    fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::format(format!("invalid UTF-8: {e}")))
    }

    fn value(&mut self) -> Result<Value> {
        match self.u8()? {
            TAG_NULL => Ok(Value::Null),
            TAG_INT => self.array().map(|b| Value::Int(i64::from_le_bytes(b))),
            TAG_FLOAT => self
                .array()
                .map(|b| Value::Float(f64::from_bits(u64::from_le_bytes(b)))),
            TAG_TEXT => self.string().map(|s| Value::Text(s.into())),
            TAG_BOOL => self.bool().map(Value::Bool),
            tag => Err(Error::format(format!("unknown value tag {tag}"))),
        }
    }
}

/// Saves through a sibling temporary file renamed over `path`, so a crash
/// mid-write never leaves a half-written database behind.
pub fn save_to_file(catalog: &Catalog, path: &Path) -> Result<()> {
    let bytes = to_bytes(catalog)?;
    let tmp = temp_sibling(path);

    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(&bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    debug!(path = %path.display(), bytes = bytes.len(), tables = catalog.len(), "database saved");
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<Catalog> {
    let bytes = fs::read(path)?;
    let catalog = decode(&bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), tables = catalog.len(), "database loaded");
    Ok(catalog)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
