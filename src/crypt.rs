//! Reversible transform applied to encrypted fields on their way to and from the database.
//! Standard Base64 (RFC 4648, padded) over the UTF-8 text.

use crate::value::Value;
use base64::prelude::*;

pub fn encrypt(text: &str) -> String {
    BASE64_STANDARD.encode(text.as_bytes())
}

/// Reverse of [`encrypt`]. `None` if the text is not valid Base64 of UTF-8 text.
pub fn decrypt(text: &str) -> Option<String> {
    let bytes = BASE64_STANDARD.decode(text.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

/// Encrypt a text value; other values pass through.
pub fn encrypt_value(value: &Value) -> Value {
    match value {
        Value::Text(s) => Value::Text(encrypt(s)),
        v => v.clone(),
    }
}

/// Decrypt a text value read from the database. Text that does not decode is left as is.
pub fn decrypt_value(value: &Value) -> Value {
    match value {
        Value::Text(s) => match decrypt(s) {
            Some(plain) => Value::Text(plain),
            None => {
                tracing::warn!(len = s.len(), "encrypted column value does not decode");
                value.clone()
            }
        },
        v => v.clone(),
    }
}
