use schemata_common::{Error, Result};

use super::column::ColumnDefinition;
use super::{reject_duplicate_columns, validate_identifier};
use crate::dialect::Dialect;

/// Builds `CREATE TABLE`, with an optional primary key constraint named
/// `pk_<table>`.
#[derive(Debug, Clone)]
pub struct CreateTableBuilder {
    dialect: Dialect,
    table: String,
    columns: Vec<ColumnDefinition>,
    primary_key: Vec<String>,
}

impl CreateTableBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    pub fn add_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Add a column and make it part of the primary key. Primary key columns
    /// are always NOT NULL.
    pub fn add_pk_column(mut self, column: ColumnDefinition) -> Self {
        self.primary_key.push(column.name.clone());
        self.columns.push(column.not_null());
        self
    }

    pub fn build(&self) -> Result<Vec<String>> {
        validate_identifier(self.dialect, "table", &self.table)?;
        if self.columns.is_empty() {
            return Err(Error::Validation(format!(
                "table {} must have at least one column",
                self.table
            )));
        }
        for column in &self.columns {
            column.validate()?;
            validate_identifier(self.dialect, "column", &column.name)?;
        }
        reject_duplicate_columns(
            &format!("table {}", self.table),
            self.columns.iter().map(|c| c.name.as_str()),
        )?;

        let d = self.dialect;
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| d.column_definition_sql(c))
            .collect();
        if !self.primary_key.is_empty() {
            let pk_name = format!("pk_{}", self.table);
            validate_identifier(d, "constraint", &pk_name)?;
            let cols: Vec<String> = self.primary_key.iter().map(|c| d.identifier(c)).collect();
            parts.push(format!(
                "CONSTRAINT {} PRIMARY KEY ({})",
                d.identifier(&pk_name),
                cols.join(", ")
            ));
        }

        let mut sql = format!("CREATE TABLE {} ({})", d.identifier(&self.table), parts.join(", "));
        if let Some(options) = d.table_options() {
            sql.push(' ');
            sql.push_str(options);
        }
        Ok(vec![sql])
    }
}
