//! Fixed-width text rows. Each field takes exactly its declared width, in declaration order.

use crate::config::Record;
use crate::error::{AppError, FieldMessage};
use crate::service::parse_field;
use crate::sheet::{DataSheet, MultiRowsSheet};
use crate::value::Value;

fn check_fixed(record: &Record) -> Result<(), AppError> {
    if record.for_fixed_width_row {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "record {} is not designed for fixed-width rows",
            record.qualified_name
        )))
    }
}

/// Format one row, values in field order. Each value is padded with spaces or truncated to
/// its field's width; unknown values are blank.
pub fn format_fixed_line(record: &Record, row: &[Value]) -> Result<String, AppError> {
    check_fixed(record)?;
    if row.len() != record.fields.len() {
        return Err(AppError::BadRequest(format!(
            "record {} has {} fields but the row has {} values",
            record.qualified_name,
            record.fields.len(),
            row.len()
        )));
    }
    let mut line = String::with_capacity(record.row_width());
    for (field, value) in record.fields.iter().zip(row) {
        let width = field.width as usize;
        let text = value.to_text();
        let len = text.chars().count();
        if len > width {
            tracing::debug!(field = %field.name, width, "value truncated to field width");
            line.extend(text.chars().take(width));
        } else {
            line.push_str(&text);
            line.extend(std::iter::repeat(' ').take(width - len));
        }
    }
    Ok(line)
}

/// Parse one line into values in field order. A line of the wrong length is an error; bad
/// field values are reported as messages and read as unknown.
pub fn parse_fixed_line(record: &Record, text: &str) -> Result<(Vec<Value>, Vec<FieldMessage>), AppError> {
    check_fixed(record)?;
    let chars: Vec<char> = text.chars().collect();
    let expected = record.row_width();
    if chars.len() != expected {
        return Err(AppError::BadRequest(format!(
            "fixed-width line has {} characters while {} are expected for record {}",
            chars.len(),
            expected,
            record.qualified_name
        )));
    }
    let mut messages = Vec::new();
    let mut values = Vec::with_capacity(record.fields.len());
    let mut start = 0;
    for field in &record.fields {
        let end = start + field.width as usize;
        let slice: String = chars[start..end].iter().collect();
        let value = parse_field(record, field, Some(&slice), false, &mut messages)
            .unwrap_or_else(|| field.unknown());
        values.push(value);
        start = end;
    }
    Ok((values, messages))
}

/// Parse every line of `text`. Blank lines are skipped.
pub fn parse_fixed_lines(record: &Record, text: &str) -> Result<(MultiRowsSheet, Vec<FieldMessage>), AppError> {
    let names = record.fields.iter().map(|f| f.name.clone()).collect();
    let types = record.fields.iter().map(|f| f.value_type()).collect();
    let mut sheet = MultiRowsSheet::new(names, types);
    let mut messages = Vec::new();
    for line in text.lines().filter(|l| !l.is_empty()) {
        let (values, mut msgs) = parse_fixed_line(record, line)?;
        messages.append(&mut msgs);
        sheet.push_unchecked(values);
    }
    Ok((sheet, messages))
}

/// Format every row of `sheet`, mapping fields to columns by name, one line each.
pub fn format_fixed_lines(record: &Record, sheet: &dyn DataSheet) -> Result<String, AppError> {
    let mut out = String::new();
    for i in 0..sheet.len() {
        let row: Vec<Value> = record
            .fields
            .iter()
            .map(|f| sheet.column_value(&f.name, i).cloned().unwrap_or_else(|| f.unknown()))
            .collect();
        out.push_str(&format_fixed_line(record, &row)?);
        out.push('\n');
    }
    Ok(out)
}
