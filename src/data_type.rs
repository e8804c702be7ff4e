use std::fmt;

use allocative::Allocative;

/// Represents the supported data types in the database schema.
/// These types define the structure of columns and the expected format of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Allocative)]
pub enum DataType {
    /// A 64-bit signed integer.
    Int,
    /// A 64-bit floating-point number. `DECIMAL` columns use this type too.
    Float,
    /// A variable-length UTF-8 character string.
    Text,
    /// A boolean value (true or false).
    Bool,
}

impl DataType {
    /// Maps a declared SQL type name (case-insensitive) to a [DataType].
    pub fn from_sql_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" => Some(DataType::Int),
            "FLOAT" | "DECIMAL" | "REAL" | "DOUBLE" | "NUMERIC" => Some(DataType::Float),
            "TEXT" | "VARCHAR" | "CHAR" | "STRING" => Some(DataType::Text),
            "BOOL" | "BOOLEAN" => Some(DataType::Bool),
            _ => None,
        }
    }

    /// The canonical type name reported to drivers.
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::Float => "FLOAT",
            DataType::Text => "TEXT",
            DataType::Bool => "BOOL",
        }
    }

    /// Display size / precision hint used by catalog discovery.
    pub fn column_size(&self) -> u32 {
        match self {
            DataType::Int => 19,
            DataType::Float => 15,
            DataType::Text => 255,
            DataType::Bool => 1,
        }
    }

    /// Tag used by the persistence codec.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            DataType::Int => 1,
            DataType::Float => 2,
            DataType::Text => 3,
            DataType::Bool => 4,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(DataType::Int),
            2 => Some(DataType::Float),
            3 => Some(DataType::Text),
            4 => Some(DataType::Bool),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sql_name() {
        assert_eq!(DataType::from_sql_name("int"), Some(DataType::Int));
        assert_eq!(DataType::from_sql_name("Decimal"), Some(DataType::Float));
        assert_eq!(DataType::from_sql_name("VARCHAR"), Some(DataType::Text));
        assert_eq!(DataType::from_sql_name("boolean"), Some(DataType::Bool));
        assert_eq!(DataType::from_sql_name("BLOB"), None);
    }

    #[test]
    fn test_tags_are_stable() {
        for ty in [DataType::Int, DataType::Float, DataType::Text, DataType::Bool] {
            assert_eq!(DataType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(DataType::from_tag(0), None);
    }
}
