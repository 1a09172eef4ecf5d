use schemata_common::{Error, Result};

use super::column::ColumnDefinition;
use super::{reject_duplicate_columns, validate_identifier};
use crate::dialect::Dialect;

#[derive(Debug, Clone)]
struct ColumnChange {
    from: Option<ColumnDefinition>,
    to: ColumnDefinition,
}

/// Changes type, size or nullability of existing columns.
///
/// ```
/// use schemata_db::{AlterColumnsBuilder, ColumnDefinition, Dialect, UUID_SIZE};
///
/// let sql = AlterColumnsBuilder::new(Dialect::MySql, "events")
///     .update_column(ColumnDefinition::varchar("uuid", UUID_SIZE).not_null())
///     .build()
///     .unwrap();
/// assert_eq!(sql, vec!["ALTER TABLE events MODIFY COLUMN uuid VARCHAR (40) NOT NULL"]);
/// ```
#[derive(Debug, Clone)]
pub struct AlterColumnsBuilder {
    dialect: Dialect,
    table: String,
    changes: Vec<ColumnChange>,
}

impl AlterColumnsBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            changes: Vec::new(),
        }
    }

    /// Bring a column to the given shape without stating its current one.
    pub fn update_column(mut self, column: ColumnDefinition) -> Self {
        self.changes.push(ColumnChange {
            from: None,
            to: column,
        });
        self
    }

    /// Like [`update_column`](Self::update_column) but with the current
    /// shape known, which lets `build()` refuse unsafe combinations.
    pub fn change_column(mut self, from: ColumnDefinition, to: ColumnDefinition) -> Self {
        self.changes.push(ColumnChange {
            from: Some(from),
            to,
        });
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Target shapes in the order they were added.
    pub fn columns(&self) -> Vec<ColumnDefinition> {
        self.changes.iter().map(|c| c.to.clone()).collect()
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier(self.dialect, "table", &self.table)?;
        if self.changes.is_empty() {
            return Err(Error::Validation(format!(
                "no column to alter on table {}",
                self.table
            )));
        }

        for change in &self.changes {
            let to = &change.to;
            to.validate()?;
            validate_identifier(self.dialect, "column", &to.name)?;
            if to.default.is_some() {
                return Err(Error::Validation(format!(
                    "column {}: default values cannot be changed by ALTER COLUMN",
                    to.name
                )));
            }

            if let Some(from) = &change.from {
                if !from.name.eq_ignore_ascii_case(&to.name) {
                    return Err(Error::Validation(format!(
                        "column change must keep the name ({} -> {})",
                        from.name, to.name
                    )));
                }
                if !to.nullable && from.column_type.narrows_to(&to.column_type) {
                    return Err(Error::Validation(format!(
                        "column {}: narrowing the type while adding NOT NULL needs an intermediate step",
                        to.name
                    )));
                }
                if self.dialect == Dialect::Oracle
                    && from.column_type.family() != to.column_type.family()
                {
                    return Err(Error::unsupported(
                        self.dialect.id(),
                        format!(
                            "changing column {} from {:?} to {:?}",
                            to.name, from.column_type, to.column_type
                        ),
                    ));
                }
            }
        }

        reject_duplicate_columns(
            "alter columns",
            self.changes.iter().map(|c| c.to.name.as_str()),
        )
    }

    pub fn build(&self) -> Result<Vec<String>> {
        self.validate()?;
        self.dialect
            .alter_columns_sql(&self.table, &self.columns())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddl::column::{DefaultValue, UUID_SIZE};

    fn uuid() -> ColumnDefinition {
        ColumnDefinition::varchar("uuid", UUID_SIZE).not_null()
    }

    #[test]
    fn postgres_alters_type_and_nullability_in_one_statement() {
        let sql = AlterColumnsBuilder::new(Dialect::PostgreSql, "events")
            .update_column(uuid())
            .build()
            .unwrap();
        assert_eq!(
            sql,
            vec!["ALTER TABLE events ALTER COLUMN uuid TYPE VARCHAR (40), ALTER COLUMN uuid SET NOT NULL"]
        );
    }

    #[test]
    fn relaxing_to_nullable_on_postgres() {
        let sql = AlterColumnsBuilder::new(Dialect::PostgreSql, "events")
            .update_column(ColumnDefinition::varchar("name", 400))
            .build()
            .unwrap();
        assert!(sql[0].ends_with("ALTER COLUMN name DROP NOT NULL"));
    }

    #[test]
    fn rejects_empty_column_list() {
        let err = AlterColumnsBuilder::new(Dialect::H2, "events")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("no column to alter"));
    }

    #[test]
    fn rejects_column_without_name() {
        let err = AlterColumnsBuilder::new(Dialect::H2, "events")
            .update_column(ColumnDefinition::varchar("", 10))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn rejects_blank_table() {
        assert!(AlterColumnsBuilder::new(Dialect::H2, "")
            .update_column(uuid())
            .build()
            .is_err());
    }

    #[test]
    fn rejects_defaults_and_duplicates() {
        let with_default = ColumnDefinition::boolean("enabled")
            .not_null()
            .default_value(DefaultValue::Boolean(false));
        assert!(AlterColumnsBuilder::new(Dialect::MySql, "rules")
            .update_column(with_default)
            .build()
            .is_err());

        assert!(AlterColumnsBuilder::new(Dialect::MySql, "events")
            .update_column(uuid())
            .update_column(uuid())
            .build()
            .is_err());
    }

    #[test]
    fn rejects_narrowing_combined_with_not_null() {
        let err = AlterColumnsBuilder::new(Dialect::PostgreSql, "events")
            .change_column(
                ColumnDefinition::varchar("uuid", 50),
                ColumnDefinition::varchar("uuid", 40).not_null(),
            )
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("intermediate step"));

        // widening while tightening is fine
        assert!(AlterColumnsBuilder::new(Dialect::PostgreSql, "events")
            .change_column(
                ColumnDefinition::varchar("uuid", 40),
                ColumnDefinition::varchar("uuid", 50).not_null(),
            )
            .build()
            .is_ok());
    }

    #[test]
    fn oracle_refuses_type_family_change() {
        let err = AlterColumnsBuilder::new(Dialect::Oracle, "issues")
            .change_column(
                ColumnDefinition::varchar("message", 4000),
                ColumnDefinition::clob("message"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation { .. }));
    }

    #[test]
    fn sqlite_validates_then_reports_unsupported() {
        let builder = AlterColumnsBuilder::new(Dialect::Sqlite, "events").update_column(uuid());
        assert!(builder.validate().is_ok());
        assert!(matches!(
            builder.build(),
            Err(Error::UnsupportedOperation { .. })
        ));
    }
}
