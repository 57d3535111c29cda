//! Row-level CRUD over compiled records. Every statement goes through the injected
//! `SqlExecutor`; calls are awaited one after another.

use crate::config::{Field, Record};
use crate::crypt;
use crate::error::AppError;
use crate::sheet::{ChildSheets, DataSheet, Fields, MultiRowsSheet, SheetRow};
use crate::sql::{
    delete_params, filter_query, group_value, insert_params, key_values, keys_query,
    selective_update as selective_update_query, suggest_param, update_params, SqlExecutor,
};
use crate::value::Value;

/// Input field that carries the save action of a row.
pub const SAVE_ACTION: &str = "_saveAction";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveActionType {
    Add,
    Modify,
    Delete,
    /// Add or modify, whichever applies.
    Save,
}

impl SaveActionType {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "add" => Some(SaveActionType::Add),
            "modify" => Some(SaveActionType::Modify),
            "delete" => Some(SaveActionType::Delete),
            "save" => Some(SaveActionType::Save),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SaveActionType::Add => "add",
            SaveActionType::Modify => "modify",
            SaveActionType::Delete => "delete",
            SaveActionType::Save => "save",
        }
    }
}

pub struct CrudService;

impl CrudService {
    /// Read the row with the primary key in `in_fields`. Returns 0 without a query when any
    /// key value is missing.
    pub async fn read_one(
        record: &Record,
        exec: &dyn SqlExecutor,
        in_fields: &dyn Fields,
        out: &mut dyn DataSheet,
    ) -> Result<usize, AppError> {
        let sql = Self::read_sql(record)?;
        let Some(keys) = key_values(record.primary_key_fields(), in_fields) else {
            tracing::debug!(record = %record.qualified_name, "key value missing, nothing to read");
            return Ok(0);
        };
        let n = exec.extract(sql, &keys, &mut *out, true).await?;
        decrypt_rows(record, out, n)?;
        Ok(n)
    }

    /// Read rows for every key row of `in_sheet` with one query.
    pub async fn read_many(
        record: &Record,
        exec: &dyn SqlExecutor,
        in_sheet: &dyn DataSheet,
        out: &mut dyn DataSheet,
    ) -> Result<usize, AppError> {
        Self::read_sql(record)?;
        match in_sheet.len() {
            0 => Ok(0),
            1 => Self::read_one(record, exec, &in_sheet.row_fields(0), &mut *out).await,
            n => {
                let mut rows = Vec::with_capacity(n);
                for i in 0..n {
                    match key_values(record.primary_key_fields(), &in_sheet.row_fields(i)) {
                        Some(keys) => rows.push(keys),
                        None => {
                            tracing::debug!(record = %record.qualified_name, row = i, "key value missing, nothing to read");
                            return Ok(0);
                        }
                    }
                }
                let cols: Vec<&Field> = record.primary_key_fields().collect();
                let q = keys_query(&record.sql.filter, &cols, rows);
                let n = exec.extract(&q.sql, &q.params, &mut *out, false).await?;
                decrypt_rows(record, out, n)?;
                Ok(n)
            }
        }
    }

    /// Whether a row with the primary key in `fields` exists.
    pub async fn row_exists(
        record: &Record,
        exec: &dyn SqlExecutor,
        fields: &dyn Fields,
    ) -> Result<bool, AppError> {
        let sql = Self::read_sql(record)?;
        match key_values(record.primary_key_fields(), fields) {
            Some(keys) => exec.exists(sql, &keys).await,
            None => Ok(false),
        }
    }

    /// Add, modify or delete one row as asked by its `_saveAction`, inferring add or modify
    /// when the action is absent or `save`. A generated key is written back into `row`.
    pub async fn save_one(
        record: &Record,
        exec: &dyn SqlExecutor,
        row: &mut dyn Fields,
        user: &Value,
        treat_sql_error_as_no_result: bool,
    ) -> Result<SaveActionType, AppError> {
        check_writable(record)?;
        check_primary_key(record)?;
        if let Some(f) = record.modified_user_field() {
            row.set_value(&f.name, user.clone());
        }
        let asked = row
            .get_value(SAVE_ACTION)
            .and_then(|v| SaveActionType::parse(&v.to_text()));
        let action = match asked {
            Some(SaveActionType::Save) | None => Self::infer_action(record, exec, &*row).await?,
            Some(a) => a,
        };
        tracing::debug!(record = %record.qualified_name, action = action.name(), "save row");

        match action {
            SaveActionType::Add | SaveActionType::Save => {
                if let Some(f) = record.created_user_field() {
                    row.set_value(&f.name, user.clone());
                }
                Self::insert_one(record, exec, row, user, treat_sql_error_as_no_result).await?;
            }
            SaveActionType::Modify => {
                let n = Self::update_one(record, exec, &*row, user, treat_sql_error_as_no_result).await?;
                if n == 0 {
                    return Err(AppError::ConcurrencyConflict(record.qualified_name.clone()));
                }
            }
            SaveActionType::Delete => {
                Self::delete_one(record, exec, &*row, treat_sql_error_as_no_result).await?;
            }
        }
        Ok(action)
    }

    async fn infer_action(
        record: &Record,
        exec: &dyn SqlExecutor,
        row: &dyn Fields,
    ) -> Result<SaveActionType, AppError> {
        let exists = if record.key_to_be_generated {
            key_values(record.primary_key_fields(), row).is_some()
        } else {
            Self::row_exists(record, exec, row).await?
        };
        Ok(if exists {
            SaveActionType::Modify
        } else {
            SaveActionType::Add
        })
    }

    pub async fn save_many(
        record: &Record,
        exec: &dyn SqlExecutor,
        sheet: &mut dyn DataSheet,
        user: &Value,
        treat_sql_error_as_no_result: bool,
    ) -> Result<Vec<SaveActionType>, AppError> {
        check_writable(record)?;
        check_primary_key(record)?;
        let mut actions = Vec::with_capacity(sheet.len());
        for i in 0..sheet.len() {
            let mut row = SheetRow::new(&mut *sheet, i);
            actions.push(Self::save_one(record, exec, &mut row, user, treat_sql_error_as_no_result).await?);
        }
        Ok(actions)
    }

    /// Save every row of `sheet` under the parent in `parent_row`. Parent key values are
    /// copied into each row first; a missing parent key saves nothing.
    pub async fn save_with_parent(
        record: &Record,
        exec: &dyn SqlExecutor,
        sheet: &mut dyn DataSheet,
        parent_row: &dyn Fields,
        user: &Value,
    ) -> Result<usize, AppError> {
        check_writable(record)?;
        check_parent_key(record)?;
        if !copy_parent_keys(record, parent_row, sheet)? {
            return Ok(0);
        }
        Self::save_many(record, exec, sheet, user, false).await?;
        Ok(sheet.len())
    }

    /// Save parent rows, each followed by the child rows linked to it. Child rows are bucketed
    /// by their parent key values as they arrive, before any key is generated.
    pub async fn save_with_children(
        parent: &Record,
        child: &Record,
        exec: &dyn SqlExecutor,
        parent_sheet: &mut dyn DataSheet,
        child_sheet: &dyn DataSheet,
        user: &Value,
    ) -> Result<Vec<SaveActionType>, AppError> {
        check_parent_key(child)?;
        let (parent_keys, child_keys): (Vec<String>, Vec<String>) = child
            .parent_key_fields()
            .map(|f| (referred_name(f).to_string(), f.name.clone()))
            .unzip();
        let buckets = ChildSheets::new(&parent_keys, &child_keys, &*parent_sheet, child_sheet)?;

        let mut actions = Vec::with_capacity(parent_sheet.len());
        for i in 0..parent_sheet.len() {
            let mut kids = parent_sheet
                .row(i)
                .and_then(|r| buckets.child_sheet(r))
                .cloned();
            let mut row = SheetRow::new(&mut *parent_sheet, i);
            actions.push(Self::save_one(parent, exec, &mut row, user, false).await?);
            if let Some(kids) = kids.as_mut() {
                Self::save_with_parent(child, exec, kids, &row, user).await?;
            }
        }
        Ok(actions)
    }

    /// Insert one row. A generated key is written back into `fields`.
    pub async fn insert_one(
        record: &Record,
        exec: &dyn SqlExecutor,
        fields: &mut dyn Fields,
        user: &Value,
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError> {
        let sql = Self::insert_sql(record)?;
        let params = insert_params(record, &*fields, user);
        if !record.key_to_be_generated {
            return exec.execute(sql, &params, treat_sql_error_as_no_result).await;
        }
        let key = record
            .primary_key_fields()
            .next()
            .ok_or_else(|| AppError::NoPrimaryKey(record.qualified_name.clone()))?;
        let (n, keys) = exec
            .insert_and_get_keys(sql, &params, &[key.column_name.clone()], treat_sql_error_as_no_result)
            .await?;
        match keys.first() {
            Some(k) if *k > 0 => fields.set_value(&key.name, Value::Integer(*k)),
            _ => tracing::debug!(record = %record.qualified_name, "no generated key returned"),
        }
        Ok(n)
    }

    /// Insert all rows of `sheet`. Generated keys are added as the key column.
    pub async fn insert(
        record: &Record,
        exec: &dyn SqlExecutor,
        sheet: &mut dyn DataSheet,
        user: &Value,
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError> {
        let sql = Self::insert_sql(record)?;
        let n = sheet.len();
        if n == 0 {
            return Ok(0);
        }
        if n == 1 || record.key_to_be_generated {
            let mut total = 0;
            for i in 0..n {
                let mut row = SheetRow::new(&mut *sheet, i);
                total += Self::insert_one(record, exec, &mut row, user, treat_sql_error_as_no_result).await?;
            }
            return Ok(total);
        }
        let rows: Vec<Vec<Value>> = (0..n)
            .map(|i| insert_params(record, &sheet.row_fields(i), user))
            .collect();
        let counts = exec.execute_batch(sql, &rows, treat_sql_error_as_no_result, false).await?;
        Ok(counts.iter().sum())
    }

    pub async fn insert_with_parent(
        record: &Record,
        exec: &dyn SqlExecutor,
        sheet: &mut dyn DataSheet,
        parent_row: &dyn Fields,
        user: &Value,
    ) -> Result<u64, AppError> {
        check_writable(record)?;
        check_parent_key(record)?;
        if !copy_parent_keys(record, parent_row, sheet)? {
            return Ok(0);
        }
        Self::insert(record, exec, sheet, user, false).await
    }

    /// Update all updatable fields of one row. A concurrency-tracked record that updates
    /// nothing was changed by someone else.
    pub async fn update_one(
        record: &Record,
        exec: &dyn SqlExecutor,
        fields: &dyn Fields,
        user: &Value,
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError> {
        let sql = Self::update_sql(record)?;
        let params = update_params(record, fields, user).ok_or_else(|| missing_key(record))?;
        let n = exec.execute(sql, &params, treat_sql_error_as_no_result).await?;
        check_stamp(record, n)?;
        Ok(n)
    }

    pub async fn update(
        record: &Record,
        exec: &dyn SqlExecutor,
        sheet: &dyn DataSheet,
        user: &Value,
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError> {
        let sql = Self::update_sql(record)?;
        match sheet.len() {
            0 => Ok(0),
            1 => Self::update_one(record, exec, &sheet.row_fields(0), user, treat_sql_error_as_no_result).await,
            n => {
                let rows = (0..n)
                    .map(|i| update_params(record, &sheet.row_fields(i), user).ok_or_else(|| missing_key(record)))
                    .collect::<Result<Vec<_>, _>>()?;
                let counts = exec
                    .execute_batch(sql, &rows, treat_sql_error_as_no_result, record.use_timestamp_for_concurrency)
                    .await?;
                for c in &counts {
                    check_stamp(record, *c)?;
                }
                Ok(counts.iter().sum())
            }
        }
    }

    pub async fn delete_one(
        record: &Record,
        exec: &dyn SqlExecutor,
        fields: &dyn Fields,
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError> {
        let sql = Self::delete_sql(record)?;
        let params = delete_params(record, fields).ok_or_else(|| missing_key(record))?;
        let n = exec.execute(sql, &params, treat_sql_error_as_no_result).await?;
        check_stamp(record, n)?;
        Ok(n)
    }

    pub async fn delete(
        record: &Record,
        exec: &dyn SqlExecutor,
        sheet: &dyn DataSheet,
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError> {
        let sql = Self::delete_sql(record)?;
        match sheet.len() {
            0 => Ok(0),
            1 => Self::delete_one(record, exec, &sheet.row_fields(0), treat_sql_error_as_no_result).await,
            n => {
                let rows = (0..n)
                    .map(|i| delete_params(record, &sheet.row_fields(i)).ok_or_else(|| missing_key(record)))
                    .collect::<Result<Vec<_>, _>>()?;
                let counts = exec
                    .execute_batch(sql, &rows, treat_sql_error_as_no_result, record.use_timestamp_for_concurrency)
                    .await?;
                for c in &counts {
                    check_stamp(record, *c)?;
                }
                Ok(counts.iter().sum())
            }
        }
    }

    /// Delete every child row of the parent in `parent_row`.
    pub async fn delete_with_parent(
        record: &Record,
        exec: &dyn SqlExecutor,
        parent_row: &dyn Fields,
    ) -> Result<u64, AppError> {
        check_writable(record)?;
        check_parent_key(record)?;
        let Some(values) = parent_key_values(record, parent_row) else {
            tracing::debug!(record = %record.qualified_name, "parent key is null, nothing to delete");
            return Ok(0);
        };
        let sql = record
            .sql
            .delete_for_parent
            .as_deref()
            .ok_or_else(|| AppError::NoParentKey(record.qualified_name.clone()))?;
        exec.execute(sql, &values, false).await
    }

    /// Update only the fields present in `fields`.
    pub async fn selective_update(
        record: &Record,
        exec: &dyn SqlExecutor,
        fields: &dyn Fields,
        user: &Value,
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError> {
        check_writable(record)?;
        check_primary_key(record)?;
        let Some(q) = selective_update_query(record, fields, user) else {
            tracing::debug!(record = %record.qualified_name, "key missing or nothing to update");
            return Ok(0);
        };
        let n = exec.execute(&q.sql, &q.params, treat_sql_error_as_no_result).await?;
        check_stamp(record, n)?;
        Ok(n)
    }

    pub async fn selective_update_many(
        record: &Record,
        exec: &dyn SqlExecutor,
        sheet: &dyn DataSheet,
        user: &Value,
        treat_sql_error_as_no_result: bool,
    ) -> Result<u64, AppError> {
        let mut total = 0;
        for i in 0..sheet.len() {
            total += Self::selective_update(record, exec, &sheet.row_fields(i), user, treat_sql_error_as_no_result).await?;
        }
        Ok(total)
    }

    /// Rows matching the filter conventions of `criteria`.
    pub async fn filter(
        record: &Record,
        exec: &dyn SqlExecutor,
        criteria: &dyn Fields,
    ) -> Result<MultiRowsSheet, AppError> {
        let q = filter_query(record, criteria)?;
        let mut out = record.new_multi_sheet();
        let n = exec.extract(&q.sql, &q.params, &mut out, false).await?;
        decrypt_rows(record, &mut out, n)?;
        Ok(out)
    }

    /// Child rows of every parent row in `parent_sheet`. Parent rows without a key value are
    /// skipped.
    pub async fn filter_for_parents(
        record: &Record,
        exec: &dyn SqlExecutor,
        parent_sheet: &dyn DataSheet,
    ) -> Result<MultiRowsSheet, AppError> {
        check_parent_key(record)?;
        let rows: Vec<Vec<Value>> = (0..parent_sheet.len())
            .filter_map(|i| parent_key_values(record, &parent_sheet.row_fields(i)))
            .collect();
        Self::filter_by_parent_keys(record, exec, rows).await
    }

    /// Child rows of one parent, given its key values in parent key order.
    pub async fn filter_for_a_parent(
        record: &Record,
        exec: &dyn SqlExecutor,
        parent_keys: &[Value],
    ) -> Result<MultiRowsSheet, AppError> {
        check_parent_key(record)?;
        if parent_keys.iter().any(Value::is_unknown) {
            return Ok(record.new_multi_sheet());
        }
        Self::filter_by_parent_keys(record, exec, vec![parent_keys.to_vec()]).await
    }

    async fn filter_by_parent_keys(
        record: &Record,
        exec: &dyn SqlExecutor,
        rows: Vec<Vec<Value>>,
    ) -> Result<MultiRowsSheet, AppError> {
        let mut out = record.new_multi_sheet();
        if rows.is_empty() {
            return Ok(out);
        }
        let cols: Vec<&Field> = record.parent_key_fields().collect();
        if rows.iter().any(|r| r.len() != cols.len()) {
            return Err(AppError::BadRequest(format!(
                "record {} has {} parent key fields",
                record.qualified_name,
                cols.len()
            )));
        }
        let q = keys_query(&record.sql.filter, &cols, rows);
        let n = exec.extract(&q.sql, &q.params, &mut out, false).await?;
        decrypt_rows(record, &mut out, n)?;
        Ok(out)
    }

    /// Value list of the record, for the group `key` when the list is grouped. `None` when a
    /// grouped list is asked for without a key.
    pub async fn list(
        record: &Record,
        exec: &dyn SqlExecutor,
        key: Option<&str>,
    ) -> Result<Option<MultiRowsSheet>, AppError> {
        let list = record.sql.list.as_ref().ok_or_else(|| {
            AppError::BadRequest(format!("record {} has no value list", record.qualified_name))
        })?;
        let mut params = Vec::new();
        if list.group_type.is_some() {
            let Some(text) = key.filter(|k| !k.trim().is_empty()) else {
                return Ok(None);
            };
            let value = group_value(list, text).ok_or_else(|| {
                AppError::BadRequest(format!("{} is not a valid list key for {}", text, record.qualified_name))
            })?;
            params.push(value);
        }
        let mut out = MultiRowsSheet::new(list.names.clone(), list.types.clone());
        let n = exec.extract(&list.sql, &params, &mut out, false).await?;
        decrypt_columns(&mut out, list.encrypted.iter().map(String::as_str), n)?;
        Ok(Some(out))
    }

    /// Rows whose suggestion key contains (or starts with) `text`.
    pub async fn suggest(
        record: &Record,
        exec: &dyn SqlExecutor,
        text: &str,
        match_starting: bool,
    ) -> Result<MultiRowsSheet, AppError> {
        let suggest = record.sql.suggest.as_ref().ok_or_else(|| {
            AppError::BadRequest(format!("record {} has no suggestion key", record.qualified_name))
        })?;
        let mut out = MultiRowsSheet::new(suggest.names.clone(), suggest.types.clone());
        let n = exec
            .extract(&suggest.sql, &[suggest_param(text, match_starting)], &mut out, false)
            .await?;
        decrypt_rows(record, &mut out, n)?;
        Ok(out)
    }

    fn read_sql(record: &Record) -> Result<&str, AppError> {
        record
            .sql
            .read
            .as_deref()
            .ok_or_else(|| AppError::NoPrimaryKey(record.qualified_name.clone()))
    }

    fn insert_sql(record: &Record) -> Result<&str, AppError> {
        check_writable(record)?;
        record
            .sql
            .insert
            .as_deref()
            .ok_or_else(|| AppError::NotWritable(record.qualified_name.clone()))
    }

    fn update_sql(record: &Record) -> Result<&str, AppError> {
        check_writable(record)?;
        check_primary_key(record)?;
        record.sql.update.as_deref().ok_or_else(|| {
            AppError::BadRequest(format!("record {} has no updatable fields", record.qualified_name))
        })
    }

    fn delete_sql(record: &Record) -> Result<&str, AppError> {
        check_writable(record)?;
        check_primary_key(record)?;
        record
            .sql
            .delete
            .as_deref()
            .ok_or_else(|| AppError::NoPrimaryKey(record.qualified_name.clone()))
    }
}

fn check_writable(record: &Record) -> Result<(), AppError> {
    if record.is_writable() {
        Ok(())
    } else {
        Err(AppError::NotWritable(record.qualified_name.clone()))
    }
}

fn check_primary_key(record: &Record) -> Result<(), AppError> {
    if record.has_primary_key() {
        Ok(())
    } else {
        Err(AppError::NoPrimaryKey(record.qualified_name.clone()))
    }
}

fn check_parent_key(record: &Record) -> Result<(), AppError> {
    if record.has_parent_key() {
        Ok(())
    } else {
        Err(AppError::NoParentKey(record.qualified_name.clone()))
    }
}

fn check_stamp(record: &Record, affected: u64) -> Result<(), AppError> {
    if affected == 0 && record.use_timestamp_for_concurrency {
        Err(AppError::ConcurrencyConflict(record.qualified_name.clone()))
    } else {
        Ok(())
    }
}

fn missing_key(record: &Record) -> AppError {
    AppError::BadRequest(format!(
        "primary key value missing for record {}",
        record.qualified_name
    ))
}

/// Name of the parent field a parent key field takes its value from.
fn referred_name(field: &Field) -> &str {
    field.referred_field.as_deref().unwrap_or(&field.name)
}

fn parent_key_values(record: &Record, parent_row: &dyn Fields) -> Option<Vec<Value>> {
    record
        .parent_key_fields()
        .map(|f| match parent_row.get_value(referred_name(f)) {
            Some(v) if !v.is_unknown() => Some(v.clone()),
            _ => None,
        })
        .collect()
}

/// Copy the parent's key values into every row of `sheet`. False when the parent has none.
fn copy_parent_keys(
    record: &Record,
    parent_row: &dyn Fields,
    sheet: &mut dyn DataSheet,
) -> Result<bool, AppError> {
    let Some(values) = parent_key_values(record, parent_row) else {
        tracing::debug!(record = %record.qualified_name, "parent key is null, no rows for parent");
        return Ok(false);
    };
    if sheet.is_empty() {
        return Ok(true);
    }
    for (f, v) in record.parent_key_fields().zip(values) {
        sheet.add_column_with_value(&f.name, v)?;
    }
    Ok(true)
}

/// Decrypt encrypted columns of the last `n` rows of `sheet`.
fn decrypt_rows(record: &Record, sheet: &mut dyn DataSheet, n: usize) -> Result<(), AppError> {
    decrypt_columns(sheet, record.encrypted_fields().map(|f| f.name.as_str()), n)
}

/// Decrypt the named columns of the last `n` rows. Columns the sheet lacks are skipped.
fn decrypt_columns<'a>(
    sheet: &mut dyn DataSheet,
    columns: impl Iterator<Item = &'a str>,
    n: usize,
) -> Result<(), AppError> {
    let len = sheet.len();
    let from = len.saturating_sub(n);
    for name in columns {
        if sheet.col_idx(name).is_none() {
            continue;
        }
        for i in from..len {
            let plain = match sheet.column_value(name, i) {
                Some(v) if !v.is_unknown() => crypt::decrypt_value(v),
                _ => continue,
            };
            sheet.set_column_value(name, i, plain)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_save_action_parse() {
        assert_eq!(SaveActionType::parse(" Modify "), Some(SaveActionType::Modify));
        assert_eq!(SaveActionType::parse("ADD"), Some(SaveActionType::Add));
        assert_eq!(SaveActionType::parse("delete"), Some(SaveActionType::Delete));
        assert_eq!(SaveActionType::parse("save").map(|a| a.name()), Some("save"));
        assert_eq!(SaveActionType::parse("upsert"), None);
    }
}
