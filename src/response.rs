//! Standard response envelope helpers.

use crate::error::{AppError, FieldMessage};
use crate::sheet::DataSheet;
use serde::Serialize;

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: MetaCount,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

/// Rows of a sheet as `{"data": [{..}, ..], "meta": {"count": n}}`.
pub fn success_sheet(sheet: &dyn DataSheet) -> serde_json::Value {
    let names = sheet.column_names();
    let data: Vec<serde_json::Value> = sheet
        .rows()
        .map(|row| {
            names
                .iter()
                .zip(row)
                .map(|(n, v)| (n.clone(), v.to_json()))
                .collect::<serde_json::Map<_, _>>()
                .into()
        })
        .collect();
    let count = data.len() as u64;
    serde_json::to_value(SuccessMany {
        data,
        meta: MetaCount { count },
    })
    .unwrap_or(serde_json::Value::Null)
}

pub fn error_body(code: &str, message: String, details: Option<serde_json::Value>) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

impl AppError {
    pub fn to_body(&self) -> serde_json::Value {
        error_body(self.code(), self.to_string(), None)
    }
}

/// Validation messages collected during extraction.
pub fn messages_body(messages: &[FieldMessage]) -> serde_json::Value {
    error_body(
        "validation_error",
        format!("{} invalid field value(s)", messages.len()),
        serde_json::to_value(messages).ok(),
    )
}
