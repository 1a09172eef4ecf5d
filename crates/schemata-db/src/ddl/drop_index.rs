use schemata_common::Result;

use super::validate_identifier;
use crate::dialect::Dialect;

#[derive(Debug, Clone)]
pub struct DropIndexBuilder {
    dialect: Dialect,
    table: String,
    name: String,
}

impl DropIndexBuilder {
    pub fn new(dialect: Dialect, table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            dialect,
            table: table.into(),
            name: name.into(),
        }
    }

    pub fn build(&self) -> Result<Vec<String>> {
        validate_identifier(self.dialect, "table", &self.table)?;
        validate_identifier(self.dialect, "index", &self.name)?;
        Ok(vec![self.dialect.drop_index_sql(&self.table, &self.name)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_index_per_dialect() {
        let sql = DropIndexBuilder::new(Dialect::PostgreSql, "events", "events_uuid")
            .build()
            .unwrap();
        assert_eq!(sql, vec!["DROP INDEX events_uuid"]);
        assert!(DropIndexBuilder::new(Dialect::PostgreSql, "events", "")
            .build()
            .is_err());
    }
}
