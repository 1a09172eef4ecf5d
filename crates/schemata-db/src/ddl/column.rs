use serde::{Deserialize, Serialize};

use schemata_common::{Error, Result};

/// Width reserved for identifier columns holding a UUID.
pub const UUID_SIZE: u32 = 40;
/// Width for columns that reference a UUID together with a short prefix.
pub const UUID_VARCHAR_SIZE: u32 = 50;
/// Largest varchar accepted on every supported dialect.
pub const MAX_VARCHAR_SIZE: u32 = 4000;
pub const MAX_DECIMAL_PRECISION: u32 = 38;

/// Logical column type, rendered per dialect by [`crate::Dialect::column_type_sql`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Varchar { limit: u32 },
    Integer,
    BigInteger,
    Boolean,
    Decimal { precision: u32, scale: u32 },
    Clob,
    Blob,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeFamily {
    Text,
    Numeric,
    Boolean,
    Lob,
}

impl ColumnType {
    pub(crate) fn family(&self) -> TypeFamily {
        match self {
            Self::Varchar { .. } => TypeFamily::Text,
            Self::Integer | Self::BigInteger | Self::Decimal { .. } => TypeFamily::Numeric,
            Self::Boolean => TypeFamily::Boolean,
            Self::Clob | Self::Blob => TypeFamily::Lob,
        }
    }

    /// True when converting `self` into `target` can lose data.
    pub fn narrows_to(&self, target: &ColumnType) -> bool {
        match (self, target) {
            (Self::Varchar { limit: from }, Self::Varchar { limit: to }) => to < from,
            (
                Self::Decimal {
                    precision: p1,
                    scale: s1,
                },
                Self::Decimal {
                    precision: p2,
                    scale: s2,
                },
            ) => p2 < p1 || s2 < s1,
            (Self::BigInteger, Self::Integer) => true,
            _ => false,
        }
    }

    fn validate(&self, column: &str) -> Result<()> {
        match *self {
            Self::Varchar { limit } if limit == 0 || limit > MAX_VARCHAR_SIZE => {
                Err(Error::Validation(format!(
                    "column {column}: varchar limit must be between 1 and {MAX_VARCHAR_SIZE}, got {limit}"
                )))
            }
            Self::Decimal { precision, scale }
                if precision == 0 || precision > MAX_DECIMAL_PRECISION || scale > precision =>
            {
                Err(Error::Validation(format!(
                    "column {column}: invalid decimal precision/scale ({precision},{scale})"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Literal default value for a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefaultValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
}

/// Shape of one column, either the target of a change or part of a new table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            default: None,
        }
    }

    pub fn varchar(name: impl Into<String>, limit: u32) -> Self {
        Self::new(name, ColumnType::Varchar { limit })
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn big_integer(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::BigInteger)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Boolean)
    }

    pub fn decimal(name: impl Into<String>, precision: u32, scale: u32) -> Self {
        Self::new(name, ColumnType::Decimal { precision, scale })
    }

    pub fn clob(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Clob)
    }

    pub fn blob(name: impl Into<String>) -> Self {
        Self::new(name, ColumnType::Blob)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Checks the parts that do not depend on a dialect: a non-empty name,
    /// sane type parameters, and a default that matches the type.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("column name must not be empty".into()));
        }
        self.column_type.validate(&self.name)?;

        match (&self.default, &self.column_type) {
            (None, _)
            | (Some(DefaultValue::Boolean(_)), ColumnType::Boolean)
            | (
                Some(DefaultValue::Integer(_)),
                ColumnType::Integer | ColumnType::BigInteger | ColumnType::Decimal { .. },
            ) => Ok(()),
            (Some(DefaultValue::Text(text)), ColumnType::Varchar { limit }) => {
                if text.chars().count() > *limit as usize {
                    Err(Error::Validation(format!(
                        "column {}: default value longer than {limit} characters",
                        self.name
                    )))
                } else {
                    Ok(())
                }
            }
            (Some(default), column_type) => Err(Error::Validation(format!(
                "column {}: default {default:?} does not fit type {column_type:?}",
                self.name
            ))),
        }
    }
}
