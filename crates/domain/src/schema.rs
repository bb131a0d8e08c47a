use std::collections::BTreeMap;

use recordgate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Column linking a dedicated field table back to its entity's base table.
pub const ENTITY_REF_COLUMN: &str = "entity_id";

/// Storage descriptor for one field of one entity kind.
///
/// A field either shares the entity's data table (`dedicated_table` is
/// `None`) or owns a per-value table carrying the [`ENTITY_REF_COLUMN`]
/// linking column. `columns` maps every declared property name to its
/// physical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldStorageShape {
    dedicated_table: Option<String>,
    columns: BTreeMap<String, String>,
    main_property: String,
}

impl FieldStorageShape {
    /// Creates a validated storage shape.
    pub fn new(
        dedicated_table: Option<String>,
        columns: BTreeMap<String, String>,
        main_property: impl Into<String>,
    ) -> AppResult<Self> {
        let main_property = main_property.into();

        if columns.is_empty() {
            return Err(AppError::Validation(
                "field storage shape requires at least one column".to_owned(),
            ));
        }

        for (property, column) in &columns {
            if property.trim().is_empty() || column.trim().is_empty() {
                return Err(AppError::Validation(
                    "field storage properties and columns must not be empty".to_owned(),
                ));
            }
        }

        if !columns.contains_key(main_property.as_str()) {
            return Err(AppError::Validation(format!(
                "main property '{main_property}' is not a declared column property"
            )));
        }

        if let Some(table) = &dedicated_table
            && table.trim().is_empty()
        {
            return Err(AppError::Validation(
                "dedicated table name must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            dedicated_table,
            columns,
            main_property,
        })
    }

    /// Creates a single-property shape stored on the entity's data table.
    pub fn scalar_shared(property: impl Into<String>, column: impl Into<String>) -> AppResult<Self> {
        let property = property.into();
        let columns = BTreeMap::from([(property.clone(), column.into())]);
        Self::new(None, columns, property)
    }

    /// Creates a single-property shape stored in a dedicated table.
    pub fn scalar_dedicated(
        table: impl Into<String>,
        property: impl Into<String>,
        column: impl Into<String>,
    ) -> AppResult<Self> {
        let property = property.into();
        let columns = BTreeMap::from([(property.clone(), column.into())]);
        Self::new(Some(table.into()), columns, property)
    }

    /// Returns the dedicated table name, when the field owns one.
    #[must_use]
    pub fn dedicated_table(&self) -> Option<&str> {
        self.dedicated_table.as_deref()
    }

    /// Returns the property-to-column map.
    #[must_use]
    pub fn columns(&self) -> &BTreeMap<String, String> {
        &self.columns
    }

    /// Returns the declared main property name.
    #[must_use]
    pub fn main_property(&self) -> &str {
        self.main_property.as_str()
    }

    /// Returns the column backing the main property.
    #[must_use]
    pub fn main_column(&self) -> &str {
        self.columns
            .get(self.main_property.as_str())
            .map(String::as_str)
            .unwrap_or(self.main_property.as_str())
    }

    /// Returns the column for a property, when declared.
    #[must_use]
    pub fn column_for(&self, property: &str) -> Option<&str> {
        self.columns.get(property).map(String::as_str)
    }

    /// Returns whether the shape declares more than one property.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        self.columns.len() > 1
    }
}
