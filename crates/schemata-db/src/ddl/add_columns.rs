use schemata_common::{Error, Result};

use super::column::ColumnDefinition;
use super::{reject_duplicate_columns, validate_identifier};
use crate::dialect::Dialect;

/// Adds columns to an existing table.
#[derive(Debug, Clone)]
pub struct AddColumnsBuilder {
    dialect: Dialect,
    table: String,
    columns: Vec<ColumnDefinition>,
}

impl AddColumnsBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn add_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn build(&self) -> Result<Vec<String>> {
        validate_identifier(self.dialect, "table", &self.table)?;
        if self.columns.is_empty() {
            return Err(Error::Validation(format!(
                "no column to add on table {}",
                self.table
            )));
        }
        for column in &self.columns {
            column.validate()?;
            validate_identifier(self.dialect, "column", &column.name)?;
        }
        reject_duplicate_columns("add columns", self.columns.iter().map(|c| c.name.as_str()))?;

        self.dialect.add_columns_sql(&self.table, &self.columns)
    }
}
