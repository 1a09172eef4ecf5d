use serde::{Deserialize, Serialize};

use schemata_common::{Error, Result};

use super::column::ColumnDefinition;
use super::{reject_duplicate_columns, validate_identifier};
use crate::dialect::Dialect;

/// A column as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingColumn {
    pub name: String,
    /// Declared type exactly as stored; may be empty on SQLite.
    pub declared_type: String,
    pub not_null: bool,
    /// Default expression as SQL text.
    pub default_sql: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingIndex {
    pub name: String,
    pub unique: bool,
    /// The original `CREATE INDEX` statement.
    pub sql: String,
}

/// Introspected shape of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    /// The `CREATE TABLE` statement as stored by the database.
    pub sql: String,
    pub columns: Vec<ExistingColumn>,
    /// Explicitly created indexes. Indexes backing inline constraints are
    /// part of `sql`.
    pub indexes: Vec<ExistingIndex>,
    /// `CREATE TRIGGER` statements attached to the table.
    pub triggers: Vec<String>,
}

impl TableDefinition {
    pub fn column(&self, name: &str) -> Option<&ExistingColumn> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn index(&self, name: &str) -> Option<&ExistingIndex> {
        self.indexes
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }
}

/// Keywords that open a table-level constraint inside `CREATE TABLE (...)`.
const TABLE_CONSTRAINTS: &[&str] = &["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"];

/// Keywords that end the type name of a column definition.
const COLUMN_CONSTRAINTS: &[&str] = &[
    "CONSTRAINT",
    "PRIMARY",
    "NOT",
    "NULL",
    "UNIQUE",
    "CHECK",
    "DEFAULT",
    "COLLATE",
    "REFERENCES",
    "GENERATED",
    "AS",
];

/// Changes columns on SQLite by copying the table, following SQLite's
/// documented procedure: create a replacement from the stored `CREATE TABLE`
/// with only the updated column definitions rewritten, copy every row, drop
/// the original, rename the replacement, then recreate indexes and triggers.
///
/// Every other clause of the original definition (UNIQUE, CHECK, foreign
/// keys, COLLATE, AUTOINCREMENT, table options) is carried over verbatim.
/// Foreign key enforcement must be off while this runs, otherwise dropping the
/// original fires `ON DELETE` actions in child tables; `SqliteDatabase`
/// switches it off for the duration of each transaction. Views that reference
/// the table are not recreated.
#[derive(Debug, Clone)]
pub struct TableRebuildBuilder {
    table: TableDefinition,
    updates: Vec<ColumnDefinition>,
}

impl TableRebuildBuilder {
    const DIALECT: Dialect = Dialect::Sqlite;

    pub fn new(table: TableDefinition) -> Self {
        Self {
            table,
            updates: Vec::new(),
        }
    }

    pub fn update_column(mut self, column: ColumnDefinition) -> Self {
        self.updates.push(column);
        self
    }

    pub fn update_columns(mut self, columns: impl IntoIterator<Item = ColumnDefinition>) -> Self {
        self.updates.extend(columns);
        self
    }

    fn rebuild_name(&self) -> String {
        format!("{}__rebuild", self.table.name)
    }

    pub fn build(&self) -> Result<Vec<String>> {
        let d = Self::DIALECT;
        validate_identifier(d, "table", &self.table.name)?;
        if self.updates.is_empty() {
            return Err(Error::Validation(format!(
                "no column to alter on table {}",
                self.table.name
            )));
        }
        for update in &self.updates {
            update.validate()?;
            if self.table.column(&update.name).is_none() {
                return Err(Error::Validation(format!(
                    "table {} has no column {}",
                    self.table.name, update.name
                )));
            }
        }
        reject_duplicate_columns("rebuild", self.updates.iter().map(|c| c.name.as_str()))?;

        let (body, tail) = split_create_table(&self.table.sql).ok_or_else(|| {
            Error::unsupported(
                d.id(),
                format!("cannot parse definition of table {}", self.table.name),
            )
        })?;

        let mut found = vec![false; self.updates.len()];
        let mut parts = Vec::new();
        for part in split_top_level(body, ',') {
            let part = part.trim();
            let tokens = tokenize(part);
            let target = tokens
                .first()
                .filter(|first| !TABLE_CONSTRAINTS.contains(&keyword(first).as_str()))
                .and_then(|first| {
                    let name = unquote(first);
                    self.updates
                        .iter()
                        .position(|u| u.name.eq_ignore_ascii_case(name))
                });
            match target {
                Some(i) => {
                    found[i] = true;
                    parts.push(self.rewrite_column(&tokens, &self.updates[i])?);
                }
                None => parts.push(part.to_string()),
            }
        }
        if let Some(i) = found.iter().position(|f| !f) {
            return Err(Error::unsupported(
                d.id(),
                format!(
                    "cannot locate column {} in the definition of table {}",
                    self.updates[i].name, self.table.name
                ),
            ));
        }

        let table = d.identifier(&self.table.name);
        let rebuild = d.identifier(&self.rebuild_name());
        let column_list = self
            .table
            .columns
            .iter()
            .map(|c| d.identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut statements = vec![
            format!("CREATE TABLE {rebuild} ({}){tail}", parts.join(", ")),
            format!("INSERT INTO {rebuild} ({column_list}) SELECT {column_list} FROM {table}"),
            format!("DROP TABLE {table}"),
            format!("ALTER TABLE {rebuild} RENAME TO {table}"),
        ];
        statements.extend(self.table.indexes.iter().map(|i| i.sql.clone()));
        statements.extend(self.table.triggers.iter().cloned());
        Ok(statements)
    }

    /// New type and nullability; every other column constraint is kept.
    fn rewrite_column(&self, tokens: &[&str], update: &ColumnDefinition) -> Result<String> {
        let d = Self::DIALECT;
        let rest = &tokens[1..];
        let type_len = rest
            .iter()
            .position(|t| COLUMN_CONSTRAINTS.contains(&keyword(t).as_str()))
            .unwrap_or(rest.len());
        let constraints = &rest[type_len..];

        if constraints.iter().any(|t| keyword(t) == "CONSTRAINT") {
            return Err(Error::unsupported(
                d.id(),
                format!(
                    "rewriting column {} of table {} with named column constraints",
                    update.name, self.table.name
                ),
            ));
        }

        let mut kept: Vec<&str> = Vec::new();
        let mut i = 0;
        while i < constraints.len() {
            let kw = keyword(constraints[i]);
            let next = constraints.get(i + 1).map(|t| keyword(t));
            if kw == "NOT" && next.as_deref() == Some("NULL") {
                i += 2;
                if constraints.get(i).map(|t| keyword(t)).as_deref() == Some("ON") {
                    // ON CONFLICT <resolution>
                    i += 3;
                }
                continue;
            }
            let after_default = kept.last().is_some_and(|prev| keyword(prev) == "DEFAULT");
            if kw == "NULL" && !after_default {
                i += 1;
                continue;
            }
            kept.push(constraints[i]);
            i += 1;
        }

        let mut sql = format!("{} {}", tokens[0], d.column_type_sql(&update.column_type));
        for token in kept {
            sql.push(' ');
            sql.push_str(token);
        }
        if !update.nullable {
            sql.push_str(" NOT NULL");
        }
        Ok(sql)
    }
}

/// Split `CREATE TABLE name (body) tail` into `body` and `tail`.
fn split_create_table(sql: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = None;
    for (i, c) in sql.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => {
                    if depth == 0 && start.is_none() {
                        start = Some(i);
                    }
                    depth += 1;
                }
                ')' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        let start = start?;
                        return Some((&sql[start + 1..i], &sql[i + 1..]));
                    }
                }
                _ => {}
            },
        }
    }
    None
}

/// Split on `sep` outside parentheses and quotes.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                c if c == sep && depth == 0 => {
                    parts.push(&s[start..i]);
                    start = i + c.len_utf8();
                }
                _ => {}
            },
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Whitespace-separated tokens; parenthesized groups and quoted strings stay
/// inside their token.
fn tokenize(s: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        if quote.is_none() && depth == 0 && c.is_whitespace() {
            if let Some(st) = start.take() {
                tokens.push(&s[st..i]);
            }
            continue;
        }
        if start.is_none() {
            start = Some(i);
        }
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                '[' => quote = Some(']'),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            },
        }
    }
    if let Some(st) = start {
        tokens.push(&s[st..]);
    }
    tokens
}

/// Upper-cased leading word of a token, so `CHECK(x>0)` reads as `CHECK`.
fn keyword(token: &str) -> String {
    token
        .split('(')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

fn unquote(token: &str) -> &str {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if matches!((first, last), (b'"', b'"') | (b'`', b'`') | (b'[', b']') | (b'\'', b'\'')) {
            return &token[1..token.len() - 1];
        }
    }
    token
}
