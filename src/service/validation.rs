//! Text input to typed values, with field-scoped messages.

use super::crud::{SaveActionType, SAVE_ACTION};
use crate::config::{Field, Record};
use crate::error::FieldMessage;
use crate::sheet::{DataSheet, Fields, MultiRowsSheet};
use crate::sql::{OPERATOR_SUFFIX, SORT_COLUMNS, TO_SUFFIX};
use crate::value::{Value, ValueType};
use std::collections::HashMap;

/// What the extracted values are for. Decides which fields are taken and whether required
/// fields are enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtractionPurpose {
    /// Primary keys only.
    Read,
    /// Any fields; none required.
    Subset,
    /// All fields plus the save action.
    Save,
    /// Filter values with their comparators.
    Filter,
}

pub struct InputExtractor;

impl InputExtractor {
    /// Extract `record`'s fields from `input` into `out`. Every field is attempted; the
    /// returned messages are empty when all input was valid.
    pub fn extract_fields(
        record: &Record,
        input: &HashMap<String, String>,
        purpose: ExtractionPurpose,
        out: &mut dyn Fields,
    ) -> Vec<FieldMessage> {
        let mut messages = Vec::new();
        if purpose == ExtractionPurpose::Filter {
            for f in record.column_fields() {
                extract_filter(record, f, input, out, &mut messages);
            }
            if let Some(sort) = input.get(SORT_COLUMNS).map(|s| s.trim()).filter(|s| !s.is_empty()) {
                out.set_value(SORT_COLUMNS, Value::text(sort));
            }
            return messages;
        }

        let optional = purpose == ExtractionPurpose::Subset;
        for f in fields_for(record, purpose) {
            let text = input.get(&f.name).map(String::as_str);
            if let Some(v) = parse_field(record, f, text, optional, &mut messages) {
                out.set_value(&f.name, v);
            }
        }
        if purpose == ExtractionPurpose::Save {
            if let Some(action) = save_action(record, input.get(SAVE_ACTION).map(String::as_str), &mut messages) {
                out.set_value(SAVE_ACTION, Value::text(action.name()));
            }
        }
        messages
    }

    /// Extract rows of text, `header` naming the input columns. The sheet has one column per
    /// extractable field (and the save action when saving); a missing input column reads as
    /// empty text.
    pub fn extract_sheet(
        record: &Record,
        header: &[String],
        rows: &[Vec<String>],
        purpose: ExtractionPurpose,
    ) -> (MultiRowsSheet, Vec<FieldMessage>) {
        let fields: Vec<&Field> = fields_for(record, purpose)
            .filter(|f| f.can_extract)
            .collect();
        let mut names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
        let mut types: Vec<ValueType> = fields.iter().map(|f| f.value_type()).collect();
        let with_action = purpose == ExtractionPurpose::Save;
        if with_action {
            names.push(SAVE_ACTION.to_string());
            types.push(ValueType::Text);
        }
        let positions: Vec<Option<usize>> = names
            .iter()
            .map(|n| header.iter().position(|h| h == n))
            .collect();

        let optional = purpose == ExtractionPurpose::Subset;
        let mut messages = Vec::new();
        let mut sheet = MultiRowsSheet::new(names, types);
        for row in rows {
            let text_at = |i: usize| positions[i].and_then(|p| row.get(p)).map(String::as_str);
            let mut values: Vec<Value> = fields
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    parse_field(record, f, text_at(i), optional, &mut messages)
                        .unwrap_or_else(|| f.unknown())
                })
                .collect();
            if with_action {
                values.push(
                    save_action(record, text_at(fields.len()), &mut messages)
                        .map(|a| Value::text(a.name()))
                        .unwrap_or(Value::Unknown(ValueType::Text)),
                );
            }
            sheet.push_unchecked(values);
        }
        tracing::debug!(record = %record.qualified_name, rows = sheet.len(), errors = messages.len(), "extracted sheet");
        (sheet, messages)
    }
}

fn fields_for(record: &Record, purpose: ExtractionPurpose) -> Box<dyn Iterator<Item = &Field> + '_> {
    match purpose {
        ExtractionPurpose::Read => Box::new(record.primary_key_fields()),
        _ => Box::new(record.fields.iter()),
    }
}

pub(crate) fn parse_field(
    record: &Record,
    field: &Field,
    text: Option<&str>,
    optional: bool,
    messages: &mut Vec<FieldMessage>,
) -> Option<Value> {
    if !field.can_extract {
        return None;
    }
    let text = text.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        if field.default_value.is_some() {
            return field.default_value.clone();
        }
        if field.is_required && !optional {
            messages.push(FieldMessage::new(&record.qualified_name, &field.name, "value is required"));
        }
        return None;
    }
    let Some(value) = field.parse_value(text) else {
        messages.push(FieldMessage::new(
            &record.qualified_name,
            &field.name,
            format!("{} is not a valid {}", text, field.value_type()),
        ));
        return None;
    };
    if let Some(msg) = field.check(&value) {
        messages.push(FieldMessage::new(&record.qualified_name, &field.name, msg));
        return None;
    }
    Some(value)
}

fn save_action(
    record: &Record,
    text: Option<&str>,
    messages: &mut Vec<FieldMessage>,
) -> Option<SaveActionType> {
    let text = text.map(str::trim).filter(|t| !t.is_empty())?;
    let action = SaveActionType::parse(text);
    if action.is_none() {
        messages.push(FieldMessage::new(
            &record.qualified_name,
            SAVE_ACTION,
            format!("{} is not a valid save action", text),
        ));
    }
    action
}

/// A filter value with its comparator, and the upper bound for BETWEEN. An IN list is kept
/// as text once every element parses.
fn extract_filter(
    record: &Record,
    field: &Field,
    input: &HashMap<String, String>,
    out: &mut dyn Fields,
    messages: &mut Vec<FieldMessage>,
) {
    let Some(text) = input.get(&field.name).map(|s| s.trim()).filter(|s| !s.is_empty()) else {
        return;
    };
    let op_name = format!("{}{}", field.name, OPERATOR_SUFFIX);
    let op = input
        .get(&op_name)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("=");
    let vt = field.value_type();
    let invalid = |messages: &mut Vec<FieldMessage>, name: &str, text: &str| {
        messages.push(FieldMessage::new(
            &record.qualified_name,
            name,
            format!("{} is not a valid {}", text, vt),
        ));
    };

    if op == "@" {
        if !matches!(vt, ValueType::Text | ValueType::Integer | ValueType::Decimal) {
            messages.push(FieldMessage::new(
                &record.qualified_name,
                &field.name,
                "in-list condition is valid for numeric and text fields only",
            ));
            return;
        }
        if Value::parse_all(text.split(','), vt).is_none() {
            invalid(messages, &field.name, text);
            return;
        }
        out.set_value(&field.name, Value::text(text));
        out.set_value(&op_name, Value::text(op));
        return;
    }

    let value = if matches!(op, "~" | "^") {
        Some(Value::text(text))
    } else {
        Value::parse(text, vt)
    };
    match value {
        Some(v) => out.set_value(&field.name, v),
        None => invalid(messages, &field.name, text),
    }
    out.set_value(&op_name, Value::text(op));
    if op != "><" {
        return;
    }
    let to_name = format!("{}{}", field.name, TO_SUFFIX);
    let to_text = input.get(&to_name).map(|s| s.trim()).unwrap_or_default();
    match Value::parse(to_text, vt) {
        Some(v) => out.set_value(&to_name, v),
        None => invalid(messages, &to_name, to_text),
    }
}
