use std::fmt;

use crate::types::ColType;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    /// The input violates a precondition of the operation (missing columns, duplicate tables).
    FailedPrecondition,
    /// The caller passed malformed arguments.
    Invalid,
    /// The engine was wired inconsistently; indicates a bug rather than bad input.
    Internal,
    Unimplemented,
    Canceled,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::FailedPrecondition => "failed precondition",
            Code::Invalid => "invalid",
            Code::Internal => "internal error",
            Code::Unimplemented => "unimplemented",
            Code::Canceled => "canceled",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("duplicate table with key: {key}")]
    DuplicateTable { key: String },
    #[error("missing column {label:?}")]
    MissingColumn { label: String },
    #[error("missing time column {label:?}")]
    MissingTimeColumn { label: String },
    #[error("group key column {label} not found in output table")]
    MissingKeyColumn { label: String },
    #[error("column {label:?} is of type {actual}, expected {expected}")]
    ColumnTypeMismatch {
        label: String,
        expected: ColType,
        actual: ColType,
    },
    #[error("schema collision detected: column \"{label}\" is both of type {existing} and {incoming}")]
    SchemaCollision {
        label: String,
        existing: ColType,
        incoming: ColType,
    },

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("invalid time: {0}")]
    InvalidTime(String),
    #[error("{0}")]
    InvalidWindow(String),
    #[error("nil bounds passed to window; use range to set the window range")]
    NilBounds,
    #[error("table builder already has column with label {label}")]
    DuplicateColumn { label: String },
    #[error("unsupported column type {col_type} for {operation}")]
    UnsupportedType {
        operation: &'static str,
        col_type: ColType,
    },
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid spec type {actual}, expected {expected}")]
    InvalidSpecType {
        expected: &'static str,
        actual: String,
    },
    #[error("unknown procedure kind {0:?}")]
    UnknownProcedure(String),
    #[error("duplicate registration for procedure kind {0:?}")]
    DuplicateProcedure(String),
    #[error("group key has {cols} columns but {values} values")]
    GroupKeyArity { cols: usize, values: usize },
    #[error("mismatched column lengths: column {label:?} has {actual} rows, expected {expected}")]
    MismatchedColumnLengths {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("column {label:?} is declared as {declared} but holds {actual} data")]
    ColumnDataMismatch {
        label: String,
        declared: ColType,
        actual: ColType,
    },
    #[error("chunk schema for {key} does not match the buffered table")]
    ChunkSchemaMismatch { key: String },
    #[error("chunk has {actual} columns, schema declares {expected}")]
    ColumnCountMismatch { expected: usize, actual: usize },
    #[error("column index {index} out of range for {len} columns")]
    ColumnOutOfRange { index: usize, len: usize },
    #[error("row {row} out of range for {len} rows")]
    RowOutOfRange { row: usize, len: usize },
    #[error("table not found with key {key}")]
    TableNotFound { key: String },
    #[error("table already read")]
    TableAlreadyRead,
    #[error("fan-in consumer is gone")]
    Disconnected,
    #[error("failed to spawn fan-in consumer: {0}")]
    Spawn(String),

    #[error("{0} is not implemented")]
    Unimplemented(String),
    #[error("execution canceled")]
    Canceled,
}

impl Error {
    pub fn code(&self) -> Code {
        match self {
            Error::DuplicateTable { .. }
            | Error::MissingColumn { .. }
            | Error::MissingTimeColumn { .. }
            | Error::MissingKeyColumn { .. }
            | Error::ColumnTypeMismatch { .. }
            | Error::SchemaCollision { .. } => Code::FailedPrecondition,

            Error::InvalidDuration(_)
            | Error::InvalidTime(_)
            | Error::InvalidWindow(_)
            | Error::NilBounds
            | Error::DuplicateColumn { .. }
            | Error::UnsupportedType { .. }
            | Error::Config(_) => Code::Invalid,

            Error::InvalidSpecType { .. }
            | Error::UnknownProcedure(_)
            | Error::DuplicateProcedure(_)
            | Error::GroupKeyArity { .. }
            | Error::MismatchedColumnLengths { .. }
            | Error::ColumnDataMismatch { .. }
            | Error::ChunkSchemaMismatch { .. }
            | Error::ColumnCountMismatch { .. }
            | Error::ColumnOutOfRange { .. }
            | Error::RowOutOfRange { .. }
            | Error::TableNotFound { .. }
            | Error::TableAlreadyRead
            | Error::Disconnected
            | Error::Spawn(_) => Code::Internal,

            Error::Unimplemented(_) => Code::Unimplemented,
            Error::Canceled => Code::Canceled,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}
