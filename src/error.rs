//! Error types for the mail merge.

use std::path::PathBuf;

/// Top-level error type for a merge job.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Error computing {location}: {source}")]
    Field {
        location: String,
        #[source]
        source: ExprError,
    },

    #[error("Error rendering {template}: {source}")]
    Template {
        template: String,
        #[source]
        source: TemplateError,
    },

    #[error("Address error in {field}: {source}")]
    Address {
        field: String,
        #[source]
        source: AddressError,
    },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Row {row} has no integer 'id' field, required for updates")]
    MissingRowId { row: usize },

    #[error("Failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn field(location: impl Into<String>, source: ExprError) -> Self {
        Error::Field {
            location: location.into(),
            source,
        }
    }

    pub(crate) fn template(template: impl Into<String>, source: TemplateError) -> Self {
        Error::Template {
            template: template.into(),
            source,
        }
    }
}

/// Job-description and startup errors. All fatal before any row is read.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse job file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("{required} parameters required, {supplied} supplied")]
    ParameterCount { required: usize, supplied: usize },

    #[error("Unknown timezone '{0}'")]
    UnknownTimezone(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors from parsing or running a computed-field snippet.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("name '{0}' is not defined")]
    Undefined(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("value error: {0}")]
    Value(String),

    #[error("division by zero")]
    ZeroDivision,
}

/// Template compile and render errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("template syntax error: {0}")]
    Syntax(String),

    #[error("'{0}' is undefined")]
    Undefined(String),

    /// Any other render failure: a failing filter, an unknown filter, a
    /// type error inside an expression, or a failed `q()` query.
    #[error("{0}")]
    Render(String),
}

/// Recipient resolution errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AddressError {
    #[error("invalid address '{address}': {reason}")]
    Invalid { address: String, reason: String },

    #[error("{names} names but {emails} email addresses in semicolon-separated list")]
    CountMismatch { names: usize, emails: usize },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Data-source errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Mail transport errors. Row-local: a failed send never aborts the job.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write message to {program}: {source}")]
    Write {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit { program: PathBuf, status: String },
}

/// Result type alias for merge jobs.
pub type Result<T> = std::result::Result<T, Error>;
