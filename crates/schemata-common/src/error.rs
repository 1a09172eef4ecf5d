use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed step or builder input, detected before any SQL is issued.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported operation for dialect {dialect}: {operation}")]
    UnsupportedOperation { dialect: String, operation: String },

    /// The database rejected a statement.
    #[error("execution error: {message} (sql: {sql})")]
    Execution { sql: String, message: String },

    #[error("migration {version} ({name}) failed: {source}")]
    StepFailed {
        version: u64,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("resume inconsistency: {0}")]
    ResumeInconsistency(String),

    #[error("migration lock held: {0}")]
    Locked(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn unsupported(dialect: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            dialect: dialect.into(),
            operation: operation.into(),
        }
    }

    pub fn execution(sql: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Execution {
            sql: sql.into(),
            message: message.to_string(),
        }
    }

    /// Walk through `StepFailed` wrappers to the error the database or
    /// builder actually raised.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::StepFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
