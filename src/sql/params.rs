//! Convert `Value` to a type sqlx can bind, with the PostgreSQL type of each value.

use crate::value::{Value, ValueType};
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A value bound to a PostgreSQL query. Unknown values bind as a typed NULL.
#[derive(Clone, Debug, PartialEq)]
pub struct PgBindValue(pub Value);

impl PgBindValue {
    pub fn from_value(v: &Value) -> Self {
        PgBindValue(v.clone())
    }
}

pub(crate) fn pg_type(value_type: ValueType) -> PgTypeInfo {
    match value_type {
        ValueType::Text => PgTypeInfo::with_name("TEXT"),
        ValueType::Integer => PgTypeInfo::with_name("INT8"),
        ValueType::Decimal => PgTypeInfo::with_name("FLOAT8"),
        ValueType::Boolean => PgTypeInfo::with_name("BOOL"),
        ValueType::Date => PgTypeInfo::with_name("DATE"),
        ValueType::Timestamp => PgTypeInfo::with_name("TIMESTAMP"),
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match &self.0 {
            Value::Unknown(_) => IsNull::Yes,
            Value::Text(s) => {
                let s_ref: &str = s.as_str();
                <&str as Encode<Postgres>>::encode_by_ref(&s_ref, buf)?
            }
            Value::Integer(n) => <i64 as Encode<Postgres>>::encode_by_ref(n, buf)?,
            Value::Decimal(d) => <f64 as Encode<Postgres>>::encode_by_ref(d, buf)?,
            Value::Boolean(b) => <bool as Encode<Postgres>>::encode_by_ref(b, buf)?,
            Value::Date(d) => <NaiveDate as Encode<Postgres>>::encode_by_ref(d, buf)?,
            Value::Timestamp(t) => <NaiveDateTime as Encode<Postgres>>::encode_by_ref(t, buf)?,
        })
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(pg_type(self.0.value_type()))
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
