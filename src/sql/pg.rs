//! `SqlExecutor` on a sqlx PostgreSQL pool. The pool is owned by the caller.

use crate::error::AppError;
use crate::sheet::DataSheet;
use crate::sql::{Dialect, PgBindValue, SqlExecutor};
use crate::value::{Value, ValueType};
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};

#[derive(Clone, Debug)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        PgExecutor { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// PostgreSQL has `CURRENT_TIMESTAMP` and returns generated keys with `RETURNING`.
    pub fn dialect(&self) -> Dialect {
        Dialect::default()
    }

    fn bind<'q>(sql: &'q str, params: &[Value]) -> Query<'q, Postgres, PgArguments> {
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(PgBindValue::from_value(p));
        }
        query
    }
}

/// Rewrite positional `?` markers to `$1, $2, ..`. Quoted text and identifiers are left alone.
pub fn to_pg_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n = 0;
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
                out.push(c);
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    out.push(c);
                }
                '?' => {
                    n += 1;
                    out.push('$');
                    out.push_str(&n.to_string());
                }
                _ => out.push(c),
            },
        }
    }
    out
}

fn tolerate(err: sqlx::Error, sql: &str, treat_sql_error_as_no_result: bool) -> Result<u64, AppError> {
    if treat_sql_error_as_no_result {
        tracing::warn!(sql = %sql, error = %err, "sql error treated as no result");
        Ok(0)
    } else {
        Err(AppError::Db(err))
    }
}

fn decode_cell(row: &PgRow, idx: usize, value_type: ValueType) -> Value {
    let int = || {
        row.try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .or_else(|| row.try_get::<Option<i32>, _>(idx).ok().flatten().map(i64::from))
            .or_else(|| row.try_get::<Option<i16>, _>(idx).ok().flatten().map(i64::from))
    };
    let float = || {
        row.try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .or_else(|| row.try_get::<Option<f32>, _>(idx).ok().flatten().map(f64::from))
    };
    let value = match value_type {
        ValueType::Text => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .or_else(|| int().map(|n| n.to_string()))
            .or_else(|| float().map(|d| d.to_string()))
            .map(Value::Text),
        ValueType::Integer => int().map(Value::Integer),
        ValueType::Decimal => float()
            .or_else(|| int().map(|n| n as f64))
            .map(Value::Decimal),
        ValueType::Boolean => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Boolean),
        ValueType::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Date),
        ValueType::Timestamp => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .or_else(|| {
                row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                    .ok()
                    .flatten()
                    .map(|t| t.naive_utc())
            })
            .map(Value::Timestamp),
    };
    value.unwrap_or(Value::Unknown(value_type))
}

fn row_values(row: &PgRow, types: &[ValueType]) -> Vec<Value> {
    let width = row.len();
    types
        .iter()
        .enumerate()
        .map(|(i, t)| {
            if i < width {
                decode_cell(row, i, *t)
            } else {
                Value::Unknown(*t)
            }
        })
        .collect()
}

#[async_trait]
impl SqlExecutor for PgExecutor {
    async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError> {
        let sql = to_pg_placeholders(sql);
        tracing::debug!(sql = %sql, params = ?params, "execute");
        match Self::bind(&sql, params).execute(&self.pool).await {
            Ok(done) => Ok(done.rows_affected()),
            Err(e) => tolerate(e, &sql, treat_sql_error_as_no_result),
        }
    }

    async fn execute_batch(
        &self,
        sql: &str,
        rows: &[Vec<Value>],
        treat_sql_error_as_no_result: bool,
        every_row_must_match: bool,
    ) -> Result<Vec<u64>, AppError> {
        let sql = to_pg_placeholders(sql);
        tracing::debug!(sql = %sql, rows = rows.len(), "execute batch (tx)");
        let mut tx = self.pool.begin().await?;
        let mut counts = Vec::with_capacity(rows.len());
        for params in rows {
            match Self::bind(&sql, params).execute(&mut *tx).await {
                Ok(done) if done.rows_affected() == 0 && every_row_must_match => {
                    tracing::warn!(sql = %sql, row = counts.len(), "no row affected, batch rolled back");
                    tx.rollback().await?;
                    counts.push(0);
                    return Ok(counts);
                }
                Ok(done) => counts.push(done.rows_affected()),
                Err(e) => {
                    tolerate(e, &sql, treat_sql_error_as_no_result)?;
                    // the transaction is rolled back on drop
                    return Ok(vec![0; rows.len()]);
                }
            }
        }
        tx.commit().await?;
        Ok(counts)
    }

    async fn extract(
        &self,
        sql: &str,
        params: &[Value],
        out: &mut dyn DataSheet,
        single_row: bool,
    ) -> Result<usize, AppError> {
        let sql = to_pg_placeholders(sql);
        tracing::debug!(sql = %sql, params = ?params, "query");
        let types = out.value_types().to_vec();
        let rows = if single_row {
            Self::bind(&sql, params)
                .fetch_optional(&self.pool)
                .await?
                .into_iter()
                .collect::<Vec<_>>()
        } else {
            Self::bind(&sql, params).fetch_all(&self.pool).await?
        };
        for row in &rows {
            out.add_row(row_values(row, &types))?;
        }
        Ok(rows.len())
    }

    async fn insert_and_get_keys(
        &self,
        sql: &str,
        params: &[Value],
        key_columns: &[String],
        treat_sql_error_as_no_result: bool,
    ) -> Result<(u64, Vec<i64>), AppError> {
        let sql = format!("{} RETURNING {}", to_pg_placeholders(sql), key_columns.join(", "));
        tracing::debug!(sql = %sql, params = ?params, "insert returning keys");
        let rows = match Self::bind(&sql, params).fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) => {
                tolerate(e, &sql, treat_sql_error_as_no_result)?;
                return Ok((0, Vec::new()));
            }
        };
        let mut keys = Vec::with_capacity(rows.len() * key_columns.len());
        for row in &rows {
            for i in 0..key_columns.len() {
                if let Value::Integer(k) = decode_cell(row, i, ValueType::Integer) {
                    keys.push(k);
                }
            }
        }
        Ok((rows.len() as u64, keys))
    }

    async fn exists(&self, sql: &str, params: &[Value]) -> Result<bool, AppError> {
        let sql = to_pg_placeholders(sql);
        tracing::debug!(sql = %sql, params = ?params, "exists");
        let row = Self::bind(&sql, params).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_placeholders_skip_quoted_text() {
        assert_eq!(
            to_pg_placeholders("SELECT a \"why?\" FROM t WHERE x=? AND y LIKE ? ESCAPE '!' AND z='?'"),
            "SELECT a \"why?\" FROM t WHERE x=$1 AND y LIKE $2 ESCAPE '!' AND z='?'"
        );
        assert_eq!(to_pg_placeholders("a IN (?,?,?)"), "a IN ($1,$2,$3)");
    }
}
