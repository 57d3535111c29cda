//! Builds parameterized SQL from compiled records. Statements a record always runs are
//! compiled once into `RecordSql`; statements that depend on the request (filters,
//! selective updates, batched key reads) are assembled per call into a `QueryBuf`.
//! Identifiers only come from config; every value is a `?` parameter.

use crate::config::{Field, FieldType, ListSql, Record, RecordConfig, RecordSql, SuggestSql};
use crate::crypt;
use crate::error::{AppError, ConfigError};
use crate::sheet::Fields;
use crate::sql::{Dialect, KeyGeneration};
use crate::value::{Value, ValueType};
use regex::Regex;

/// Suffix of the input field holding the comparator for a filter field.
pub const OPERATOR_SUFFIX: &str = "Operator";
/// Suffix of the input field holding the upper bound of a BETWEEN filter.
pub const TO_SUFFIX: &str = "To";
/// Input field with the ORDER BY list of a filter.
pub const SORT_COLUMNS: &str = "_sortColumns";
/// Escape character used in LIKE patterns.
pub const LIKE_ESCAPE: char = '!';

const SORT_PATTERN: &str = r"^\s*[A-Za-z_][A-Za-z0-9_]*(\s+(?i:asc|desc))?\s*(,\s*[A-Za-z_][A-Za-z0-9_]*(\s+(?i:asc|desc))?\s*)*$";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new(sql: impl Into<String>) -> Self {
        QueryBuf {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) {
        self.params.push(v);
    }
}

/// Quote an alias (field name) for the select list.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

fn select_list(record: &Record) -> String {
    record
        .column_fields()
        .map(|f| format!("{} {}", f.column_name, quoted(&f.name)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn where_of<'a>(fields: impl Iterator<Item = &'a Field>) -> String {
    fields
        .map(|f| format!("{}=?", f.column_name))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn concurrency_clause(record: &Record) -> String {
    match record.modified_stamp_field() {
        Some(f) if record.use_timestamp_for_concurrency => format!(" AND {}=?", f.column_name),
        _ => String::new(),
    }
}

pub(crate) fn compile_record_sql(
    record: &Record,
    cfg: &RecordConfig,
    dialect: &Dialect,
) -> Result<RecordSql, ConfigError> {
    let table = &record.table_name;
    let filter = format!("SELECT {} FROM {} WHERE ", select_list(record), table);
    let primary_where = where_of(record.primary_key_fields());
    let has_key = record.has_primary_key();
    let mut sql = RecordSql {
        read: has_key.then(|| format!("{}{}", filter, primary_where)),
        filter,
        primary_where,
        timestamp_expr: dialect.timestamp_expr.clone(),
        ..Default::default()
    };

    if record.is_writable() {
        sql.insert = Some(insert_sql(record, dialect));
        if has_key {
            let where_clause = format!("{}{}", sql.primary_where, concurrency_clause(record));
            sql.update = update_sql(record, dialect)
                .map(|set| format!("UPDATE {} SET {} WHERE {}", table, set, where_clause));
            sql.delete = Some(format!("DELETE FROM {} WHERE {}", table, where_clause));
        }
        if record.has_parent_key() {
            sql.delete_for_parent = Some(format!(
                "DELETE FROM {} WHERE {}",
                table,
                where_of(record.parent_key_fields())
            ));
        }
    }

    if let Some(name) = &cfg.list_field_name {
        sql.list = Some(list_sql(record, name, cfg.list_group_key_name.as_deref())?);
    }
    if let Some(key) = &cfg.suggestion_key_name {
        sql.suggest = Some(suggest_sql(record, key, &cfg.suggestion_output_names)?);
    }
    Ok(sql)
}

fn insert_sql(record: &Record, dialect: &Dialect) -> String {
    let mut cols = Vec::new();
    let mut vals = Vec::new();
    for f in record.column_fields() {
        let val = match f.field_type {
            FieldType::CreatedTimeStamp | FieldType::ModifiedTimeStamp => dialect.timestamp_expr.clone(),
            t if t.is_primary_key() && record.key_to_be_generated => match dialect.key_generation {
                KeyGeneration::Sequence => {
                    dialect.sequence_expr(record.sequence_name.as_deref(), &record.table_name)
                }
                KeyGeneration::ReturnedKeys => continue,
            },
            _ if f.can_insert => "?".to_string(),
            _ => continue,
        };
        cols.push(f.column_name.as_str());
        vals.push(val);
    }
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        record.table_name,
        cols.join(", "),
        vals.join(", ")
    )
}

fn update_sql(record: &Record, dialect: &Dialect) -> Option<String> {
    let sets: Vec<String> = record
        .column_fields()
        .filter_map(|f| {
            if f.field_type == FieldType::ModifiedTimeStamp {
                Some(format!("{}={}", f.column_name, dialect.timestamp_expr))
            } else if f.can_update {
                Some(format!("{}=?", f.column_name))
            } else {
                None
            }
        })
        .collect();
    (!sets.is_empty()).then(|| sets.join(", "))
}

fn invalid_name(record: &Record, attr: &str, name: &str) -> ConfigError {
    ConfigError::InvalidField {
        record: record.qualified_name.clone(),
        field: name.to_string(),
        reason: format!("{} refers to a field that is not in the record", attr),
    }
}

fn list_sql(record: &Record, name: &str, group: Option<&str>) -> Result<ListSql, ConfigError> {
    let field = record
        .field(name)
        .ok_or_else(|| invalid_name(record, "list_field_name", name))?;
    let keys: Vec<&Field> = record.primary_key_fields().collect();
    let mut sql = String::from("SELECT ");
    let mut encrypted = Vec::new();
    let (names, types) = match keys.as_slice() {
        [key] if key.name != field.name => {
            sql.push_str(&format!("{} id, ", key.column_name));
            if key.encrypted {
                encrypted.push("id".to_string());
            }
            (
                vec!["id".to_string(), "value".to_string()],
                vec![key.value_type(), field.value_type()],
            )
        }
        _ => (vec!["value".to_string()], vec![field.value_type()]),
    };
    if field.encrypted {
        encrypted.push("value".to_string());
    }
    sql.push_str(&format!("{} value FROM {}", field.column_name, record.table_name));
    let group_type = match group {
        Some(g) => {
            let gf = record
                .field(g)
                .ok_or_else(|| invalid_name(record, "list_group_key_name", g))?;
            sql.push_str(&format!(" WHERE {}=?", gf.column_name));
            Some(gf.value_type())
        }
        None => None,
    };
    Ok(ListSql {
        sql,
        names,
        types,
        group_type,
        encrypted,
    })
}

fn suggest_sql(record: &Record, key: &str, outputs: &[String]) -> Result<SuggestSql, ConfigError> {
    let key_field = record
        .field(key)
        .ok_or_else(|| invalid_name(record, "suggestion_key_name", key))?;
    if outputs.is_empty() {
        return Err(ConfigError::InvalidField {
            record: record.qualified_name.clone(),
            field: key.to_string(),
            reason: "suggestion key given without suggestion output names".into(),
        });
    }
    let mut cols = Vec::with_capacity(outputs.len());
    let mut types = Vec::with_capacity(outputs.len());
    for name in outputs {
        let f = record
            .field(name)
            .ok_or_else(|| invalid_name(record, "suggestion_output_names", name))?;
        cols.push(format!("{} {}", f.column_name, quoted(&f.name)));
        types.push(f.value_type());
    }
    Ok(SuggestSql {
        sql: format!(
            "SELECT {} FROM {} WHERE {} LIKE ? ESCAPE '{}'",
            cols.join(", "),
            record.table_name,
            key_field.column_name,
            LIKE_ESCAPE
        ),
        names: outputs.to_vec(),
        types,
    })
}

/// Escape LIKE wildcards (and the escape character itself) in user text.
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

fn bind_value(field: &Field, value: Value) -> Value {
    if field.encrypted {
        crypt::encrypt_value(&value)
    } else {
        value
    }
}

fn value_or_unknown(field: &Field, fields: &dyn Fields) -> Value {
    fields
        .get_value(&field.name)
        .cloned()
        .unwrap_or_else(|| field.unknown())
}

/// Values of the given fields; `None` when any one is missing or unknown.
pub fn key_values<'a>(keys: impl Iterator<Item = &'a Field>, fields: &dyn Fields) -> Option<Vec<Value>> {
    keys.map(|f| match fields.get_value(&f.name) {
        Some(v) if !v.is_unknown() => Some(v.clone()),
        _ => None,
    })
    .collect()
}

/// Parameters of the compiled INSERT. User fields are stamped with `user`.
pub fn insert_params(record: &Record, fields: &dyn Fields, user: &Value) -> Vec<Value> {
    record
        .insert_fields()
        .map(|f| match f.field_type {
            FieldType::CreatedByUser | FieldType::ModifiedByUser => user.clone(),
            _ => bind_value(f, value_or_unknown(f, fields)),
        })
        .collect()
}

/// Parameters of the compiled UPDATE: SET values, keys, then the modification stamp when the
/// record is concurrency-tracked. `None` when a key is missing.
pub fn update_params(record: &Record, fields: &dyn Fields, user: &Value) -> Option<Vec<Value>> {
    let mut params: Vec<Value> = record
        .update_fields()
        .map(|f| match f.field_type {
            FieldType::ModifiedByUser => user.clone(),
            _ => bind_value(f, value_or_unknown(f, fields)),
        })
        .collect();
    params.extend(key_values(record.primary_key_fields(), fields)?);
    push_stamp(record, fields, &mut params);
    Some(params)
}

/// Parameters of the compiled DELETE.
pub fn delete_params(record: &Record, fields: &dyn Fields) -> Option<Vec<Value>> {
    let mut params = key_values(record.primary_key_fields(), fields)?;
    push_stamp(record, fields, &mut params);
    Some(params)
}

fn push_stamp(record: &Record, fields: &dyn Fields, params: &mut Vec<Value>) {
    if !record.use_timestamp_for_concurrency {
        return;
    }
    if let Some(f) = record.modified_stamp_field() {
        params.push(value_or_unknown(f, fields));
    }
}

/// UPDATE that sets only the fields present in `fields`, plus the modification stamps.
/// `None` when a key is missing or there is nothing to set.
pub fn selective_update(record: &Record, fields: &dyn Fields, user: &Value) -> Option<QueryBuf> {
    let keys = key_values(record.primary_key_fields(), fields)?;
    let mut sets = Vec::new();
    let mut q = QueryBuf::default();
    for f in record.column_fields() {
        match f.field_type {
            FieldType::ModifiedTimeStamp => {
                sets.push(format!("{}={}", f.column_name, record.sql.timestamp_expr));
            }
            FieldType::ModifiedByUser => {
                sets.push(format!("{}=?", f.column_name));
                q.push_param(user.clone());
            }
            _ if f.can_update => {
                if let Some(v) = fields.get_value(&f.name) {
                    sets.push(format!("{}=?", f.column_name));
                    q.push_param(bind_value(f, v.clone()));
                }
            }
            _ => {}
        }
    }
    if sets.is_empty() {
        return None;
    }
    for k in keys {
        q.push_param(k);
    }
    push_stamp(record, fields, &mut q.params);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {}{}",
        record.table_name,
        sets.join(", "),
        record.sql.primary_where,
        concurrency_clause(record)
    );
    Some(q)
}

/// Append `cols` matching any of `rows` to `base`: `c IN (?,..)` for one column,
/// `(c1=? AND c2=?) OR (..)` for several.
pub fn keys_query(base: &str, cols: &[&Field], rows: Vec<Vec<Value>>) -> QueryBuf {
    let mut q = QueryBuf::new(base);
    if let [col] = cols {
        let marks = vec!["?"; rows.len()].join(",");
        q.sql.push_str(&format!("{} IN ({})", col.column_name, marks));
        for mut row in rows {
            if let Some(v) = row.pop() {
                q.push_param(v);
            }
        }
        return q;
    }
    let one = format!("({})", where_of(cols.iter().copied()));
    q.sql.push_str(&vec![one; rows.len()].join(" OR "));
    for row in rows {
        q.params.extend(row);
    }
    q
}

/// SELECT with a WHERE clause built from the filter conventions of `criteria`.
/// A comparison operand in the field's own type. Criteria that arrive as text are parsed.
fn operand(record: &Record, field: &Field, value: &Value) -> Result<Value, AppError> {
    if value.value_type() == field.value_type() {
        return Ok(value.clone());
    }
    field.parse_value(&value.to_text()).ok_or_else(|| {
        AppError::BadRequest(format!(
            "{} is not a valid {} for field {} of record {}",
            value.to_text(),
            field.value_type(),
            field.name,
            record.qualified_name
        ))
    })
}

pub fn filter_query(record: &Record, criteria: &dyn Fields) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new(record.sql.filter.clone());
    let mut conditions = Vec::new();
    for f in record.column_fields() {
        let value = match criteria.get_value(&f.name) {
            Some(v) if !v.is_empty() => v,
            _ => continue,
        };
        let op = criteria
            .get_value(&format!("{}{}", f.name, OPERATOR_SUFFIX))
            .filter(|v| !v.is_empty())
            .map(|v| v.to_text().trim().to_string())
            .unwrap_or_else(|| "=".to_string());
        let col = &f.column_name;
        match op.as_str() {
            "=" | "!=" | ">" | ">=" | "<" | "<=" => {
                let sql_op = if op == "!=" { "<>" } else { op.as_str() };
                conditions.push(format!("{}{}?", col, sql_op));
                q.push_param(operand(record, f, value)?);
            }
            "~" => {
                conditions.push(format!("{} LIKE ? ESCAPE '{}'", col, LIKE_ESCAPE));
                q.push_param(Value::Text(format!("%{}%", escape_like(&value.to_text()))));
            }
            "^" => {
                conditions.push(format!("{} LIKE ? ESCAPE '{}'", col, LIKE_ESCAPE));
                q.push_param(Value::Text(format!("{}%", escape_like(&value.to_text()))));
            }
            "><" => {
                let to = criteria
                    .get_value(&format!("{}{}", f.name, TO_SUFFIX))
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| {
                        AppError::BadRequest(format!(
                            "to value not supplied for field {} of record {}",
                            f.name, record.qualified_name
                        ))
                    })?;
                conditions.push(format!("{} BETWEEN ? AND ?", col));
                q.push_param(operand(record, f, value)?);
                q.push_param(operand(record, f, to)?);
            }
            "@" => {
                let text = value.to_text();
                let values = Value::parse_all(text.split(','), f.value_type()).ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "{} is not a valid comma separated list for field {}",
                        text, f.name
                    ))
                })?;
                conditions.push(format!("{} IN ({})", col, vec!["?"; values.len()].join(",")));
                q.params.extend(values);
            }
            other => {
                return Err(AppError::BadRequest(format!(
                    "{} is not a valid comparator for field {}",
                    other, f.name
                )))
            }
        }
    }
    if conditions.is_empty() {
        if !record.ok_to_select_all {
            return Err(AppError::SelectAllNotAllowed(record.qualified_name.clone()));
        }
        q.sql.push_str("1=1");
    } else {
        q.sql.push_str(&conditions.join(" AND "));
    }
    if let Some(sort) = criteria.get_value(SORT_COLUMNS).filter(|v| !v.is_empty()) {
        q.sql.push_str(" ORDER BY ");
        q.sql.push_str(&order_by(record, &sort.to_text())?);
    }
    Ok(q)
}

/// Validate a sort list and map field names to their columns.
fn order_by(record: &Record, text: &str) -> Result<String, AppError> {
    let re = Regex::new(SORT_PATTERN)
        .map_err(|e| AppError::BadRequest(format!("invalid sort pattern: {}", e)))?;
    if !re.is_match(text) {
        return Err(AppError::BadRequest(format!(
            "{} is not a valid list of sort columns",
            text
        )));
    }
    let parts: Vec<String> = text
        .split(',')
        .map(|part| {
            let mut words = part.split_whitespace();
            let name = words.next().unwrap_or_default();
            let col = record
                .field(name)
                .map(|f| f.column_name.as_str())
                .unwrap_or(name);
            match words.next() {
                Some(dir) => format!("{} {}", col, dir.to_uppercase()),
                None => col.to_string(),
            }
        })
        .collect();
    Ok(parts.join(", "))
}

/// Parameter for a suggestion lookup.
pub fn suggest_param(text: &str, match_starting: bool) -> Value {
    let escaped = escape_like(text);
    if match_starting {
        Value::Text(format!("{}%", escaped))
    } else {
        Value::Text(format!("%{}%", escaped))
    }
}

/// Parse a list group key into its declared type.
pub fn group_value(list: &ListSql, text: &str) -> Option<Value> {
    Value::parse(text, list.group_type.unwrap_or(ValueType::Text))
}
