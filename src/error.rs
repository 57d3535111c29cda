//! Typed errors and stable error codes.

use serde::Serialize;
use thiserror::Error;

/// Fatal schema errors raised while loading or compiling records and output plans.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("record {record}: invalid field {field}: {reason}")]
    InvalidField {
        record: String,
        field: String,
        reason: String,
    },
    #[error("record {record}: duplicate field {field}")]
    DuplicateField { record: String, field: String },
    #[error("record {record}: invalid primary key: {reason}")]
    InvalidPrimaryKey { record: String, reason: String },
    #[error("circular reference amongst: {}", .0.join(" -> "))]
    CircularReference(Vec<String>),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("record {0} is not writable; add/update/delete are not possible")]
    NotWritable(String),
    #[error("record {0} does not define a primary key")]
    NoPrimaryKey(String),
    #[error("record {0} does not have a parent key field")]
    NoParentKey(String),
    #[error("record {0} does not allow select-all; supply at least one filter criterion")]
    SelectAllNotAllowed(String),
    #[error("record {0}: data was changed by someone else; redo the operation with latest data")]
    ConcurrencyConflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::NotWritable(_) | AppError::NoPrimaryKey(_) | AppError::NoParentKey(_) => {
                "unsupported_operation"
            }
            AppError::SelectAllNotAllowed(_) => "select_all_not_allowed",
            AppError::ConcurrencyConflict(_) => "conflict",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    "not_found"
                } else {
                    "database_error"
                }
            }
            AppError::BadRequest(_) => "bad_request",
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::ConcurrencyConflict(_))
    }
}

/// A recoverable, field-scoped validation message collected during extraction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldMessage {
    pub record: String,
    pub field: String,
    pub message: String,
}

impl FieldMessage {
    pub fn new(record: &str, field: &str, message: impl Into<String>) -> Self {
        FieldMessage {
            record: record.to_string(),
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}: {}", self.record, self.field, self.message)
    }
}
