//! In-memory tabular store. `DataSheet` is the shared capability; `SingleRowSheet` and
//! `MultiRowsSheet` are its two variants, picked by expected cardinality.

mod child;
mod multi;
mod single;

pub use child::ChildSheets;
pub use multi::MultiRowsSheet;
pub use single::SingleRowSheet;

use crate::error::AppError;
use crate::value::{Value, ValueType};
use std::collections::HashMap;
use std::fmt;

/// Separates link-column texts in composite bucket keys.
pub const KEY_SEPARATOR: char = '\u{1F}';

/// A named collection of values: a request's field bag, a single-row sheet, or one row of a
/// multi-row sheet.
pub trait Fields: Send + Sync {
    fn get_value(&self, name: &str) -> Option<&Value>;

    /// Store a value under `name`, adding it if absent.
    fn set_value(&mut self, name: &str, value: Value);

    fn has_value(&self, name: &str) -> bool {
        self.get_value(name).is_some()
    }
}

/// Plain field bag keyed by field name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldValues {
    values: HashMap<String, Value>,
}

impl FieldValues {
    pub fn new() -> Self {
        FieldValues::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.values.remove(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

impl Fields for FieldValues {
    fn get_value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    fn set_value(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }
}

impl FromIterator<(String, Value)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        FieldValues {
            values: iter.into_iter().collect(),
        }
    }
}

/// Column-oriented table of values. As a `Fields`, a sheet exposes its first row.
pub trait DataSheet: Fields + fmt::Debug {
    fn column_names(&self) -> &[String];

    fn value_types(&self) -> &[ValueType];

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn width(&self) -> usize {
        self.column_names().len()
    }

    fn col_idx(&self, name: &str) -> Option<usize> {
        self.column_names().iter().position(|c| c == name)
    }

    fn row(&self, idx: usize) -> Option<&[Value]>;

    fn rows(&self) -> Box<dyn Iterator<Item = &[Value]> + '_>;

    /// Append a row (single-row sheets replace their only row).
    fn add_row(&mut self, row: Vec<Value>) -> Result<(), AppError>;

    fn column_value(&self, name: &str, row: usize) -> Option<&Value> {
        let idx = self.col_idx(name)?;
        self.row(row).and_then(|r| r.get(idx))
    }

    /// Set a value in an existing column; the value must match the column type or be unknown.
    fn set_column_value(&mut self, name: &str, row: usize, value: Value) -> Result<(), AppError>;

    /// Set a value, adding the column (back-filled with unknowns) when it is missing.
    fn put_value(&mut self, name: &str, row: usize, value: Value);

    fn column_values(&self, name: &str) -> Option<Vec<Value>> {
        let idx = self.col_idx(name)?;
        Some(self.rows().map(|r| r[idx].clone()).collect())
    }

    /// Add (or replace) a column. `values` shorter than the row count are padded with
    /// unknowns.
    fn add_column(
        &mut self,
        name: &str,
        value_type: ValueType,
        values: Vec<Value>,
    ) -> Result<(), AppError>;

    /// Add (or replace) a column holding the same value in every row.
    fn add_column_with_value(&mut self, name: &str, value: Value) -> Result<(), AppError> {
        let values = vec![value.clone(); self.len().max(1)];
        self.add_column(name, value.value_type(), values)
    }

    /// Append every row of `other`, mapping columns by name. Returns rows appended.
    fn append_rows(&mut self, other: &dyn DataSheet) -> Result<usize, AppError> {
        let mapping: Vec<Option<usize>> = self
            .column_names()
            .iter()
            .map(|c| other.col_idx(c))
            .collect();
        let types = self.value_types().to_vec();
        let mut n = 0;
        for row in other.rows() {
            let values = mapping
                .iter()
                .zip(types.iter())
                .map(|(m, t)| m.map(|i| row[i].clone()).unwrap_or(Value::Unknown(*t)))
                .collect();
            self.add_row(values)?;
            n += 1;
        }
        Ok(n)
    }

    /// Copy the given rows into a new multi-row sheet with the same columns.
    fn copy_rows(&self, indexes: &[usize]) -> MultiRowsSheet {
        let mut out = MultiRowsSheet::new(self.column_names().to_vec(), self.value_types().to_vec());
        for idx in indexes {
            if let Some(row) = self.row(*idx) {
                out.push_unchecked(row.to_vec());
            }
        }
        out
    }

    /// Snapshot one row as a field bag.
    fn row_fields(&self, idx: usize) -> FieldValues {
        match self.row(idx) {
            Some(row) => self
                .column_names()
                .iter()
                .cloned()
                .zip(row.iter().cloned())
                .collect(),
            None => FieldValues::new(),
        }
    }
}

/// Create a sheet for the expected cardinality.
pub fn new_sheet(names: Vec<String>, types: Vec<ValueType>, single_row: bool) -> Box<dyn DataSheet> {
    if single_row {
        Box::new(SingleRowSheet::new(names, types))
    } else {
        Box::new(MultiRowsSheet::new(names, types))
    }
}

/// Mutable view of one row of a sheet as a field collection.
pub struct SheetRow<'a> {
    sheet: &'a mut dyn DataSheet,
    idx: usize,
}

impl<'a> SheetRow<'a> {
    pub fn new(sheet: &'a mut dyn DataSheet, idx: usize) -> Self {
        SheetRow { sheet, idx }
    }

    pub fn index(&self) -> usize {
        self.idx
    }
}

impl Fields for SheetRow<'_> {
    fn get_value(&self, name: &str) -> Option<&Value> {
        self.sheet.column_value(name, self.idx)
    }

    fn set_value(&mut self, name: &str, value: Value) {
        self.sheet.put_value(name, self.idx, value);
    }
}

/// Bucket key built from the given columns of a row. `None` when any of them is unknown:
/// an unknown link matches nothing, as NULL never equals NULL in SQL.
pub fn key_of(row: &[Value], indexes: &[usize]) -> Option<String> {
    if indexes.iter().any(|i| row[*i].is_unknown()) {
        return None;
    }
    if let [idx] = indexes {
        return Some(row[*idx].to_text());
    }
    let mut key = String::new();
    for (i, idx) in indexes.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(&row[*idx].to_text());
    }
    Some(key)
}

/// Resolve column names to indexes, failing on the first unknown name.
pub fn column_indexes(sheet: &dyn DataSheet, names: &[String], sheet_name: &str) -> Result<Vec<usize>, AppError> {
    names
        .iter()
        .map(|n| {
            sheet.col_idx(n).ok_or_else(|| {
                AppError::BadRequest(format!("column {} is not found in sheet {}", n, sheet_name))
            })
        })
        .collect()
}

pub(crate) fn check_row(names: &[String], types: &[ValueType], row: &[Value]) -> Result<(), AppError> {
    if row.len() != types.len() {
        return Err(AppError::Validation(format!(
            "row has {} values but sheet has {} columns",
            row.len(),
            types.len()
        )));
    }
    for ((name, t), v) in names.iter().zip(types).zip(row) {
        check_value(name, *t, v)?;
    }
    Ok(())
}

pub(crate) fn check_value(name: &str, value_type: ValueType, value: &Value) -> Result<(), AppError> {
    if value.is_unknown() || value.value_type() == value_type {
        return Ok(());
    }
    Err(AppError::Validation(format!(
        "column {} holds {} values; got {}",
        name,
        value_type,
        value.value_type()
    )))
}

/// Fit a value to a column type: matching and unknown values pass, others are re-parsed
/// from their text. A value that does not parse is stored as unknown.
pub(crate) fn coerce_value(name: &str, value_type: ValueType, value: Value) -> Value {
    if value.is_unknown() {
        return Value::Unknown(value_type);
    }
    if value.value_type() == value_type {
        return value;
    }
    Value::parse(&value.to_text(), value_type).unwrap_or_else(|| {
        tracing::warn!(column = name, expected = %value_type, got = %value.value_type(), "value does not fit column");
        Value::Unknown(value_type)
    })
}
