//! SQL dialect adapter.
//!
//! Every statement the builders produce goes through a [`Dialect`] value that
//! the caller passes in explicitly. Nothing in this crate detects the
//! database product on its own.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use schemata_common::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::ddl::column::{ColumnDefinition, ColumnType, DefaultValue};

static SIMPLE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static regex"));

/// Words that collide with keywords on at least one supported product.
const RESERVED_WORDS: &[&str] = &[
    "all", "and", "as", "asc", "between", "by", "check", "column", "comment", "constraint",
    "create", "date", "default", "delete", "desc", "distinct", "drop", "exists", "from", "group",
    "having", "in", "index", "insert", "into", "is", "key", "level", "like", "not", "null",
    "number", "of", "on", "or", "order", "primary", "references", "select", "session", "set",
    "size", "table", "to", "uid", "union", "unique", "update", "user", "value", "values", "where",
];

/// Database products the engine knows how to target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    H2,
    PostgreSql,
    MySql,
    Oracle,
    MsSql,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 6] = [
        Dialect::H2,
        Dialect::PostgreSql,
        Dialect::MySql,
        Dialect::Oracle,
        Dialect::MsSql,
        Dialect::Sqlite,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::H2 => "h2",
            Self::PostgreSql => "postgresql",
            Self::MySql => "mysql",
            Self::Oracle => "oracle",
            Self::MsSql => "mssql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Detect the dialect from a connection URL. Accepts both plain URL
    /// schemes (`postgres://`) and JDBC-style prefixes (`jdbc:postgresql:`).
    pub fn from_url(url: &str) -> Result<Self> {
        let lower = url.trim().to_ascii_lowercase();
        let rest = lower.strip_prefix("jdbc:").unwrap_or(&lower);
        let scheme = rest.split(':').next().unwrap_or_default();
        match scheme {
            "h2" => Ok(Self::H2),
            "postgres" | "postgresql" => Ok(Self::PostgreSql),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "oracle" => Ok(Self::Oracle),
            "sqlserver" | "mssql" => Ok(Self::MsSql),
            "sqlite" | "file" => Ok(Self::Sqlite),
            _ => Err(Error::Config(format!(
                "cannot detect database dialect from url: {url}"
            ))),
        }
    }

    /// Whether DDL participates in transactions. MySQL and Oracle commit
    /// implicitly around every DDL statement.
    pub fn supports_transactional_ddl(self) -> bool {
        !matches!(self, Self::MySql | Self::Oracle)
    }

    /// Statement opening an explicit transaction in a rendered script.
    pub fn begin_transaction_sql(self) -> &'static str {
        match self {
            Self::MsSql => "BEGIN TRANSACTION",
            _ => "BEGIN",
        }
    }

    /// SQLite cannot change an existing column; the table has to be rebuilt.
    pub fn supports_alter_column(self) -> bool {
        self != Self::Sqlite
    }

    pub fn max_identifier_length(self) -> usize {
        match self {
            Self::Oracle => 30,
            Self::PostgreSql => 63,
            Self::MySql => 64,
            Self::MsSql => 128,
            Self::H2 => 256,
            Self::Sqlite => 1024,
        }
    }

    /// Quote unconditionally, doubling any embedded quote character.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Self::MySql => format!("`{}`", name.replace('`', "``")),
            Self::MsSql => format!("[{}]", name.replace(']', "]]")),
            _ => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// Render an identifier. Plain lowercase names that are not keywords are
    /// emitted bare so that case-folding products (Oracle, H2) resolve them
    /// the same way as unquoted DDL written by hand.
    pub fn identifier(self, name: &str) -> String {
        if is_simple_identifier(name) {
            name.to_string()
        } else {
            self.quote_identifier(name)
        }
    }

    pub fn column_type_sql(self, column_type: &ColumnType) -> String {
        match column_type {
            ColumnType::Varchar { limit } => match self {
                Self::Oracle => format!("VARCHAR2 ({limit} CHAR)"),
                Self::MsSql => format!("NVARCHAR ({limit})"),
                _ => format!("VARCHAR ({limit})"),
            },
            ColumnType::Integer => match self {
                Self::Oracle => "NUMBER(38,0)".to_string(),
                Self::MsSql => "INT".to_string(),
                _ => "INTEGER".to_string(),
            },
            ColumnType::BigInteger => match self {
                Self::Oracle => "NUMBER (38)".to_string(),
                _ => "BIGINT".to_string(),
            },
            ColumnType::Boolean => match self {
                Self::MySql => "TINYINT(1)".to_string(),
                Self::Oracle => "NUMBER(1)".to_string(),
                Self::MsSql => "BIT".to_string(),
                _ => "BOOLEAN".to_string(),
            },
            ColumnType::Decimal { precision, scale } => match self {
                Self::Oracle => format!("NUMBER ({precision},{scale})"),
                Self::MySql | Self::MsSql => format!("DECIMAL ({precision},{scale})"),
                _ => format!("NUMERIC ({precision},{scale})"),
            },
            ColumnType::Clob => {
                let sql = match self {
                    Self::H2 => "CLOB(2147483647)",
                    Self::PostgreSql | Self::Sqlite => "TEXT",
                    Self::MySql => "LONGTEXT",
                    Self::Oracle => "CLOB",
                    Self::MsSql => "NVARCHAR (MAX)",
                };
                sql.to_string()
            }
            ColumnType::Blob => {
                let sql = match self {
                    Self::PostgreSql => "BYTEA",
                    Self::MySql => "LONGBLOB",
                    Self::MsSql => "VARBINARY(MAX)",
                    Self::H2 | Self::Oracle | Self::Sqlite => "BLOB",
                };
                sql.to_string()
            }
        }
    }

    pub fn default_value_sql(self, value: &DefaultValue) -> String {
        match value {
            DefaultValue::Boolean(b) => match self {
                Self::H2 | Self::PostgreSql => b.to_string(),
                _ => (if *b { "1" } else { "0" }).to_string(),
            },
            DefaultValue::Integer(i) => i.to_string(),
            DefaultValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// `name TYPE [DEFAULT x] NULL|NOT NULL`
    pub fn column_definition_sql(self, column: &ColumnDefinition) -> String {
        let mut sql = format!(
            "{} {}",
            self.identifier(&column.name),
            self.column_type_sql(&column.column_type)
        );
        if let Some(default) = &column.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&self.default_value_sql(default));
        }
        sql.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
        sql
    }

    /// Statements that bring every column to its target type and
    /// nullability. Columns must already be validated.
    pub fn alter_columns_sql(self, table: &str, columns: &[ColumnDefinition]) -> Result<Vec<String>> {
        let table = self.identifier(table);
        match self {
            Self::PostgreSql => {
                let clauses: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let name = self.identifier(&c.name);
                        format!(
                            "ALTER COLUMN {name} TYPE {}, ALTER COLUMN {name} {}",
                            self.column_type_sql(&c.column_type),
                            if c.nullable { "DROP NOT NULL" } else { "SET NOT NULL" }
                        )
                    })
                    .collect();
                Ok(vec![format!("ALTER TABLE {table} {}", clauses.join(", "))])
            }
            Self::MySql => {
                let clauses: Vec<String> = columns
                    .iter()
                    .map(|c| format!("MODIFY COLUMN {}", self.column_definition_sql(c)))
                    .collect();
                Ok(vec![format!("ALTER TABLE {table} {}", clauses.join(", "))])
            }
            Self::Oracle => {
                let clauses: Vec<String> = columns
                    .iter()
                    .map(|c| self.column_definition_sql(c))
                    .collect();
                Ok(vec![format!(
                    "ALTER TABLE {table} MODIFY ({})",
                    clauses.join(", ")
                )])
            }
            Self::H2 | Self::MsSql => Ok(columns
                .iter()
                .map(|c| {
                    format!(
                        "ALTER TABLE {table} ALTER COLUMN {}",
                        self.column_definition_sql(c)
                    )
                })
                .collect()),
            Self::Sqlite => Err(Error::unsupported(
                self.id(),
                "ALTER COLUMN (rebuild the table instead)",
            )),
        }
    }

    /// Statements adding new columns to an existing table.
    pub fn add_columns_sql(self, table: &str, columns: &[ColumnDefinition]) -> Result<Vec<String>> {
        let table = self.identifier(table);
        let defs: Vec<String> = columns
            .iter()
            .map(|c| self.column_definition_sql(c))
            .collect();
        match self {
            Self::PostgreSql | Self::MySql | Self::H2 => {
                let clauses: Vec<String> =
                    defs.iter().map(|d| format!("ADD COLUMN {d}")).collect();
                Ok(vec![format!("ALTER TABLE {table} {}", clauses.join(", "))])
            }
            Self::MsSql => Ok(vec![format!("ALTER TABLE {table} ADD {}", defs.join(", "))]),
            Self::Oracle => Ok(vec![format!(
                "ALTER TABLE {table} ADD ({})",
                defs.join(", ")
            )]),
            Self::Sqlite => {
                if let Some(col) = columns
                    .iter()
                    .find(|c| !c.nullable && c.default.is_none())
                {
                    return Err(Error::unsupported(
                        self.id(),
                        format!("ADD COLUMN {} NOT NULL without a default value", col.name),
                    ));
                }
                Ok(defs
                    .into_iter()
                    .map(|d| format!("ALTER TABLE {table} ADD COLUMN {d}"))
                    .collect())
            }
        }
    }

    /// One column reference inside `CREATE INDEX (...)`. MySQL cannot index
    /// more than 767 bytes of a varchar, so long columns get a prefix length.
    pub fn index_column_sql(self, name: &str, column_type: Option<&ColumnType>) -> String {
        let ident = self.identifier(name);
        match (self, column_type) {
            (Self::MySql, Some(ColumnType::Varchar { limit })) if *limit > 255 => {
                format!("{ident}(255)")
            }
            _ => ident,
        }
    }

    pub fn create_index_sql(self, table: &str, name: &str, unique: bool, columns: &[String]) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            self.identifier(name),
            self.identifier(table),
            columns.join(", ")
        )
    }

    pub fn drop_index_sql(self, table: &str, name: &str) -> String {
        let table = self.identifier(table);
        let name = self.identifier(name);
        match self {
            Self::MySql => format!("DROP INDEX {name} ON {table}"),
            Self::MsSql => format!("DROP INDEX {table}.{name}"),
            _ => format!("DROP INDEX {name}"),
        }
    }

    /// Suffix appended to `CREATE TABLE`.
    pub fn table_options(self) -> Option<&'static str> {
        match self {
            Self::MySql => Some("ENGINE=InnoDB CHARACTER SET utf8mb4 COLLATE utf8mb4_bin"),
            _ => None,
        }
    }
}

fn is_simple_identifier(name: &str) -> bool {
    SIMPLE_IDENTIFIER.is_match(name) && !RESERVED_WORDS.contains(&name)
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        match needle.as_str() {
            "postgres" | "pg" => return Ok(Self::PostgreSql),
            "sqlserver" => return Ok(Self::MsSql),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|d| d.id() == needle)
            .ok_or_else(|| Error::Config(format!("unknown dialect: {s}")))
    }
}
