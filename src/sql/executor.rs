//! The SQL-executing collaborator. Statements use positional `?` placeholders bound from
//! `Value`s in order.

use crate::error::AppError;
use crate::sheet::DataSheet;
use crate::value::Value;
use async_trait::async_trait;

/// How the database produces generated primary keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyGeneration {
    /// Key column is left out of INSERT; the executor returns generated keys.
    ReturnedKeys,
    /// Key column is filled from a sequence expression in INSERT.
    Sequence,
}

/// SQL flavour details needed when compiling record statements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialect {
    /// Expression for the server clock, used for time-stamp fields.
    pub timestamp_expr: String,
    pub key_generation: KeyGeneration,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect {
            timestamp_expr: "CURRENT_TIMESTAMP".to_string(),
            key_generation: KeyGeneration::ReturnedKeys,
        }
    }
}

impl Dialect {
    /// Sequence expression for generated keys: `<sequence>.NEXTVAL`, or `<table>_SEQ.NEXTVAL`.
    pub fn sequence_expr(&self, sequence_name: Option<&str>, table: &str) -> String {
        match sequence_name {
            Some(s) if !s.is_empty() => format!("{}.NEXTVAL", s),
            _ => format!("{}_SEQ.NEXTVAL", table),
        }
    }
}

#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Run a statement and return the affected row count. With `treat_sql_error_as_no_result`
    /// a database error is logged and reported as 0 rows.
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError>;

    /// Run one statement per parameter row, in a single transaction. Returns the affected
    /// count per row. With `every_row_must_match` a statement that affects no row rolls the
    /// whole batch back, and the counts end with that row's 0.
    async fn execute_batch(
        &self,
        sql: &str,
        rows: &[Vec<Value>],
        treat_sql_error_as_no_result: bool,
        every_row_must_match: bool,
    ) -> Result<Vec<u64>, AppError>;

    /// Run a query and append result rows to `out`, mapping result columns to sheet columns
    /// by position. With `single_row` at most one row is read. Returns rows read.
    async fn extract(
        &self,
        sql: &str,
        params: &[Value],
        out: &mut dyn DataSheet,
        single_row: bool,
    ) -> Result<usize, AppError>;

    /// Run an INSERT and return the affected count with the generated values of `key_columns`.
    async fn insert_and_get_keys(
        &self,
        sql: &str,
        params: &[Value],
        key_columns: &[String],
        treat_sql_error_as_no_result: bool,
    ) -> Result<(u64, Vec<i64>), AppError>;

    /// Whether the query returns at least one row.
    async fn exists(&self, sql: &str, params: &[Value]) -> Result<bool, AppError>;
}
