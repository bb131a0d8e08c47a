use std::collections::BTreeMap;
use std::sync::RwLock;

use serde_json::Value;

/// One stored row: column name to JSON value.
pub type TableRow = BTreeMap<String, Value>;

/// Shared in-memory row store backing the in-memory adapters.
///
/// The query backend reads tables the grant repository (or a test fixture)
/// writes; both sides address tables and columns exactly as the schema
/// catalog describes them.
#[derive(Default)]
pub struct InMemoryDatabase {
    tables: RwLock<BTreeMap<String, Vec<TableRow>>>,
}

impl InMemoryDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one row to a table, creating the table on first use.
    pub fn insert_row(&self, table: &str, row: TableRow) {
        let mut tables = match self.tables.write() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        };
        tables.entry(table.to_owned()).or_default().push(row);
    }

    /// Returns a snapshot of a table's rows; unknown tables are empty.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<TableRow> {
        let tables = match self.tables.read() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        };
        tables.get(table).cloned().unwrap_or_default()
    }

    /// Removes every row of a table whose column equals the value.
    pub fn remove_rows(&self, table: &str, column: &str, value: &Value) {
        let mut tables = match self.tables.write() {
            Ok(tables) => tables,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(rows) = tables.get_mut(table) {
            rows.retain(|row| row.get(column) != Some(value));
        }
    }
}
