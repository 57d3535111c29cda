//! Compiled field: one column's metadata with its value type resolved and its
//! insert/update/extract capabilities derived from the role.

use crate::config::types::{FieldConfig, FieldType, ValidationRule};
use crate::error::ConfigError;
use crate::value::{Value, ValueType};
use regex::Regex;

/// Validation rule with its pattern compiled.
#[derive(Clone, Debug)]
pub struct FieldRule {
    pub max_length: Option<u32>,
    pub min_length: Option<u32>,
    pub pattern: Option<Regex>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl FieldRule {
    fn compile(record: &str, field: &str, rule: &ValidationRule) -> Result<Self, ConfigError> {
        let pattern = match &rule.pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| ConfigError::InvalidField {
                record: record.to_string(),
                field: field.to_string(),
                reason: format!("invalid pattern: {}", e),
            })?),
            None => None,
        };
        Ok(FieldRule {
            max_length: rule.max_length,
            min_length: rule.min_length,
            pattern,
            minimum: rule.minimum,
            maximum: rule.maximum,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    /// `None` only for nested (record / array) fields.
    pub value_type: Option<ValueType>,
    pub column_name: String,
    pub is_required: bool,
    pub default_value: Option<Value>,
    pub referred_record: Option<String>,
    pub referred_field: Option<String>,
    pub width: u32,
    pub encrypted: bool,
    pub value_list: Vec<Value>,
    pub rule: Option<FieldRule>,
    pub can_insert: bool,
    pub can_update: bool,
    pub can_extract: bool,
}

/// Inputs that come from the owning record.
pub(crate) struct FieldContext<'a> {
    pub record: &'a str,
    pub is_view: bool,
    pub key_to_be_generated: bool,
    /// Field this one copies its definition from, already resolved.
    pub referred: Option<&'a Field>,
    /// Qualified name of the record `referred` belongs to.
    pub referred_record: Option<&'a str>,
}

impl Field {
    pub(crate) fn compile(cfg: &FieldConfig, ctx: &FieldContext<'_>) -> Result<Field, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidField {
            record: ctx.record.to_string(),
            field: cfg.name.clone(),
            reason,
        };
        if cfg.name.trim().is_empty() {
            return Err(invalid("field name is empty".into()));
        }

        let field_type = match cfg.field_type {
            FieldType::Data if ctx.is_view => FieldType::View,
            FieldType::View if !ctx.is_view => FieldType::Data,
            t => t,
        };

        let declared = match &cfg.data_type {
            Some(name) => Some(
                ValueType::from_name(name)
                    .ok_or_else(|| invalid(format!("unknown data type {}", name)))?,
            ),
            None => None,
        };
        let value_type = if field_type.is_nested() {
            None
        } else {
            let t = declared
                .or_else(|| ctx.referred.and_then(|f| f.value_type))
                .ok_or_else(|| invalid("no data type declared or inherited".into()))?;
            Some(t)
        };

        let default_text = cfg
            .default_value
            .clone()
            .or_else(|| ctx.referred.and_then(|f| f.default_value.as_ref().map(|v| v.to_text())));
        let default_value = match (default_text, value_type) {
            (Some(text), Some(t)) => Some(
                Value::parse(&text, t)
                    .ok_or_else(|| invalid(format!("invalid default value {}", text)))?,
            ),
            _ => None,
        };

        let value_list = match value_type {
            Some(t) if !cfg.value_list.is_empty() => Value::parse_all(cfg.value_list.iter().map(String::as_str), t)
                .ok_or_else(|| invalid("value list has an entry of the wrong type".into()))?,
            _ => ctx.referred.map(|f| f.value_list.clone()).unwrap_or_default(),
        };

        let rule = match &cfg.validation {
            Some(r) => Some(FieldRule::compile(ctx.record, &cfg.name, r)?),
            None => ctx.referred.and_then(|f| f.rule.clone()),
        };

        let mut field = Field {
            name: cfg.name.clone(),
            field_type,
            value_type,
            column_name: cfg.column_name.clone().unwrap_or_else(|| cfg.name.clone()),
            is_required: cfg.is_required,
            default_value,
            referred_record: ctx
                .referred_record
                .map(str::to_string)
                .or_else(|| cfg.referred_record.clone()),
            referred_field: cfg.referred_field.clone(),
            width: if cfg.width == 0 {
                ctx.referred.map(|f| f.width).unwrap_or(0)
            } else {
                cfg.width
            },
            encrypted: cfg.encrypted,
            value_list,
            rule,
            can_insert: true,
            can_update: true,
            can_extract: true,
        };
        field.set_ables(ctx.key_to_be_generated);
        Ok(field)
    }

    fn set_ables(&mut self, key_to_be_generated: bool) {
        match self.field_type {
            FieldType::CreatedByUser => {
                self.can_update = false;
                self.can_extract = false;
                self.is_required = false;
            }
            FieldType::CreatedTimeStamp => {
                self.can_insert = false;
                self.can_update = false;
                self.can_extract = false;
                self.is_required = false;
            }
            FieldType::ModifiedByUser => {
                self.can_extract = false;
            }
            FieldType::ModifiedTimeStamp => {
                self.can_insert = false;
                self.can_update = false;
                self.is_required = false;
            }
            FieldType::ParentKey => {
                self.can_update = false;
            }
            FieldType::PrimaryKey | FieldType::PrimaryAndParentKey => {
                self.can_update = false;
                if key_to_be_generated {
                    self.can_insert = false;
                    self.is_required = false;
                }
            }
            FieldType::View | FieldType::Temp => {
                self.can_insert = false;
                self.can_update = false;
            }
            FieldType::Record | FieldType::RecordArray | FieldType::ValueArray => {
                self.can_insert = false;
                self.can_update = false;
                self.can_extract = false;
            }
            FieldType::Data => {}
        }
    }

    pub fn is_column(&self) -> bool {
        self.field_type.is_column()
    }

    /// Value type for scalar fields; nested fields are treated as text.
    pub fn value_type(&self) -> ValueType {
        self.value_type.unwrap_or(ValueType::Text)
    }

    pub fn unknown(&self) -> Value {
        Value::Unknown(self.value_type())
    }

    pub fn parse_value(&self, text: &str) -> Option<Value> {
        Value::parse(text, self.value_type())
    }

    /// Check a parsed value against the value list and validation rule. Returns the
    /// violation message, if any.
    pub fn check(&self, value: &Value) -> Option<String> {
        if value.is_unknown() {
            return None;
        }
        if !self.value_list.is_empty() && !self.value_list.contains(value) {
            return Some(format!(
                "{} is not one of the valid values for {}",
                value, self.name
            ));
        }
        let rule = self.rule.as_ref()?;
        if let Value::Text(s) = value {
            let len = s.chars().count();
            if let Some(max) = rule.max_length {
                if len > max as usize {
                    return Some(format!("{} must be at most {} characters", self.name, max));
                }
            }
            if let Some(min) = rule.min_length {
                if len < min as usize {
                    return Some(format!("{} must be at least {} characters", self.name, min));
                }
            }
            if let Some(re) = &rule.pattern {
                if !re.is_match(s) {
                    return Some(format!("{} does not match required pattern", self.name));
                }
            }
        }
        if let Some(n) = value.as_f64() {
            if let Some(min) = rule.minimum {
                if n < min {
                    return Some(format!("{} must be at least {}", self.name, min));
                }
            }
            if let Some(max) = rule.maximum {
                if n > max {
                    return Some(format!("{} must be at most {}", self.name, max));
                }
            }
        }
        None
    }
}
