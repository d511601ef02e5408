// Error taxonomy for ingestion, storage and catalog mutations
//
// File-level problems (ParseError) abort an upload. Row-level problems
// (RowError, ReferenceError) are collected into the import summary and never
// cross the pipeline boundary as Err values.

use crate::entities::EntityType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// FILE-LEVEL ERRORS
// ============================================================================

/// The uploaded file cannot be processed at all.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("file is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("file has no header row")]
    NoHeader,

    #[error("file has a header but no data rows")]
    NoDataRows,

    #[error("file is {size} bytes, upload limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("file has more than {limit} data rows")]
    TooManyRows { limit: usize },

    #[error("unsupported file format: {0} (expected .csv)")]
    UnsupportedFormat(String),

    #[error("unknown entity type: {0}")]
    UnknownEntity(String),

    #[error("CSV parse failed: {0}")]
    Csv(#[from] csv::Error),
}

// ============================================================================
// ROW-LEVEL ERRORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowErrorKind {
    MissingColumn,
    NotNumeric,
    NonPositive,
    Negative,
    EmptyField,
    InvalidDate,
    OutOfRange,
    MalformedRecord,
    UnknownReference,
    DuplicateId,
}

/// A schema violation tied to one data row (1-based, header excluded).
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("row {row}: {message}")]
pub struct RowError {
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub kind: RowErrorKind,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, column: &str, kind: RowErrorKind, message: impl Into<String>) -> Self {
        RowError {
            row,
            column: Some(column.to_string()),
            kind,
            message: message.into(),
        }
    }

    pub fn missing_column(row: usize, column: &str) -> Self {
        Self::new(
            row,
            column,
            RowErrorKind::MissingColumn,
            format!("required column '{}' is missing", column),
        )
    }

    pub fn malformed(row: usize, message: impl Into<String>) -> Self {
        RowError {
            row,
            column: None,
            kind: RowErrorKind::MalformedRecord,
            message: message.into(),
        }
    }

    pub fn duplicate_id(row: usize, entity: EntityType, id: i64) -> Self {
        Self::new(
            row,
            "id",
            RowErrorKind::DuplicateId,
            format!("{} {} already exists", entity.singular(), id),
        )
    }
}

/// A foreign key that does not resolve against the store.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("row {row}: {column} {missing_id} does not reference an existing {}", .entity.singular())]
pub struct ReferenceError {
    pub row: usize,
    pub column: &'static str,
    pub entity: EntityType,
    pub missing_id: i64,
}

impl From<ReferenceError> for RowError {
    fn from(err: ReferenceError) -> Self {
        RowError::new(
            err.row,
            err.column,
            RowErrorKind::UnknownReference,
            err.to_string(),
        )
    }
}

// ============================================================================
// OPERATION-LEVEL ERRORS
// ============================================================================

/// A single mutation would break a store invariant.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConflictError {
    #[error("product {product_id} is referenced by {sales} sale(s)")]
    ProductHasSales { product_id: i64, sales: usize },

    #[error("category {category_id} is referenced by {products} product(s)")]
    CategoryHasProducts { category_id: i64, products: usize },

    #[error("a category named '{0}' already exists")]
    DuplicateCategoryName(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt {column} value '{value}' in {table}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        value: String,
    },

    #[error("sum of {column} overflows")]
    Overflow { column: &'static str },
}

/// Errors that abort an import before or during commit.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for ImportError {
    fn from(err: rusqlite::Error) -> Self {
        ImportError::Store(StoreError::Sqlite(err))
    }
}

/// Errors from the catalog pass-through operations.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for CatalogError {
    fn from(err: rusqlite::Error) -> Self {
        CatalogError::Store(StoreError::Sqlite(err))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid value '{value}' for {key}: {message}")]
pub struct ConfigError {
    pub key: String,
    pub value: String,
    pub message: String,
}
