use schemata_common::{Error, Result};

use super::column::{ColumnDefinition, ColumnType};
use super::{reject_duplicate_columns, validate_identifier};
use crate::dialect::Dialect;

#[derive(Debug, Clone)]
struct IndexColumn {
    name: String,
    column_type: Option<ColumnType>,
}

/// Builds `CREATE [UNIQUE] INDEX name ON table (columns...)`.
#[derive(Debug, Clone)]
pub struct CreateIndexBuilder {
    dialect: Dialect,
    table: String,
    name: String,
    unique: bool,
    columns: Vec<IndexColumn>,
}

impl CreateIndexBuilder {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            table: String::new(),
            name: String::new(),
            unique: false,
            columns: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Add a column by definition. The type is used for dialect-specific
    /// index limits.
    pub fn add_column(mut self, column: &ColumnDefinition) -> Self {
        self.columns.push(IndexColumn {
            name: column.name.clone(),
            column_type: Some(column.column_type.clone()),
        });
        self
    }

    pub fn add_column_name(mut self, name: impl Into<String>) -> Self {
        self.columns.push(IndexColumn {
            name: name.into(),
            column_type: None,
        });
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(self.dialect, "table", &self.table)?;
        validate_identifier(self.dialect, "index", &self.name)?;
        if self.columns.is_empty() {
            return Err(Error::Validation(format!(
                "index {} must have at least one column",
                self.name
            )));
        }
        for column in &self.columns {
            validate_identifier(self.dialect, "column", &column.name)?;
        }
        reject_duplicate_columns(
            &format!("index {}", self.name),
            self.columns.iter().map(|c| c.name.as_str()),
        )
    }

    pub fn build(&self) -> Result<Vec<String>> {
        self.validate()?;
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| self.dialect.index_column_sql(&c.name, c.column_type.as_ref()))
            .collect();
        Ok(vec![self.dialect.create_index_sql(
            &self.table,
            &self.name,
            self.unique,
            &columns,
        )])
    }
}
