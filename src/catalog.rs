use std::collections::HashMap;

use allocative::Allocative;

use crate::error::{Error, Result};
use crate::table::{Schema, Table, name_key};

/// The set of tables of one database.
///
/// Names are unique and matched case-insensitively, but each table keeps the
/// casing it was declared with. Tables are kept in creation order, which is
/// also the order [Catalog::table_names] reports them in.
#[derive(Debug, Clone, Default, Allocative)]
pub struct Catalog {
    tables: Vec<Table>,
    /// lowercased name -> position in `tables`
    index: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table.
    ///
    /// # Errors
    /// Returns [Error::AlreadyExists] if a table with the same name exists.
    pub fn create_table(&mut self, name: String, schema: Schema) -> Result<()> {
        self.add_table(Table::new(name, schema))
    }

    /// Adds an already populated table (used when decoding a saved database).
    pub fn add_table(&mut self, table: Table) -> Result<()> {
        let key = name_key(&table.name);
        if self.index.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: "table",
                name: table.name,
            });
        }
        self.index.insert(key, self.tables.len());
        self.tables.push(table);
        Ok(())
    }

    /// Removes a table by name and returns it.
    ///
    /// # Errors
    /// Returns [Error::NotFound] if the table does not exist.
    pub fn drop_table(&mut self, name: &str) -> Result<Table> {
        let pos = self
            .index
            .remove(&name_key(name))
            .ok_or_else(|| Error::table_not_found(name))?;
        let table = self.tables.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Ok(table)
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.index
            .get(&name_key(name))
            .map(|&pos| &self.tables[pos])
            .ok_or_else(|| Error::table_not_found(name))
    }

    pub fn get_table_mut(&mut self, name: &str) -> Result<&mut Table> {
        match self.index.get(&name_key(name)) {
            Some(&pos) => Ok(&mut self.tables[pos]),
            None => Err(Error::table_not_found(name)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name_key(name))
    }

    /// Declared table names, in creation order.
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_type::DataType;
    use crate::table::ColumnDef;

    fn simple_schema() -> Schema {
        Schema::new(vec![
            ColumnDef::new("id", DataType::Int),
            ColumnDef::new("name", DataType::Text),
        ])
        .unwrap()
    }

    #[test]
    fn test_create_and_drop_table() {
        let mut catalog = Catalog::new();

        catalog
            .create_table("users".to_string(), simple_schema())
            .unwrap();
        assert!(catalog.get_table("users").is_ok());

        let dropped = catalog.drop_table("users").unwrap();
        assert_eq!(dropped.name, "users");
        assert!(matches!(
            catalog.get_table("users"),
            Err(Error::NotFound { kind: "table", .. })
        ));
    }

    #[test]
    fn test_duplicate_table_error() {
        let mut catalog = Catalog::new();

        catalog
            .create_table("Users".to_string(), simple_schema())
            .unwrap();
        let err = catalog
            .create_table("USERS".to_string(), simple_schema())
            .unwrap_err();

        assert!(matches!(err, Error::AlreadyExists { kind: "table", .. }));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_drop_nonexistent_table() {
        let mut catalog = Catalog::new();
        assert!(catalog.drop_table("unknown").is_err());
    }

    #[test]
    fn test_lookup_is_case_insensitive_but_preserves_casing() {
        let mut catalog = Catalog::new();
        catalog
            .create_table("CamelCase".to_string(), simple_schema())
            .unwrap();

        assert_eq!(catalog.get_table("camelcase").unwrap().name, "CamelCase");
        assert!(catalog.contains("CAMELCASE"));
        assert_eq!(catalog.table_names(), vec!["CamelCase"]);
    }

    #[test]
    fn test_table_names_keep_creation_order() {
        let mut catalog = Catalog::new();
        for name in ["zeta", "alpha", "mid"] {
            catalog.create_table(name.into(), simple_schema()).unwrap();
        }
        catalog.drop_table("alpha").unwrap();
        catalog.create_table("omega".into(), simple_schema()).unwrap();

        assert_eq!(catalog.table_names(), vec!["zeta", "mid", "omega"]);
        assert_eq!(catalog.get_table("mid").unwrap().name, "mid");
        assert_eq!(catalog.get_table("omega").unwrap().name, "omega");
    }
}
