//! Config validation: names, duplicates and output-sheet link shapes. Cross-record
//! references are checked while compiling.

use crate::config::FullConfig;
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut record_names = HashSet::new();
    for r in &config.records {
        if r.name.trim().is_empty() {
            return Err(ConfigError::Validation("record name must not be empty".into()));
        }
        if r.fields.is_empty() {
            return Err(ConfigError::Validation(format!(
                "record {} has no fields",
                r.qualified_name()
            )));
        }
        if !record_names.insert(r.qualified_name()) {
            return Err(ConfigError::Validation(format!(
                "record {} is defined more than once",
                r.qualified_name()
            )));
        }
        if let Some(t) = &r.table_name {
            if t.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "record {} has an empty table name",
                    r.qualified_name()
                )));
            }
        }
    }

    let mut sheet_names = HashSet::new();
    for s in &config.output_sheets {
        if !sheet_names.insert(s.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "output sheet {} is declared more than once",
                s.name
            )));
        }
        if let Some(rec) = &s.record_name {
            if !record_names.contains(rec) {
                return Err(ConfigError::MissingReference {
                    kind: "record",
                    id: rec.clone(),
                });
            }
        }
        if s.parent_sheet_name.is_some() {
            if s.child_key_names.is_empty() || s.child_key_names.len() != s.parent_key_names.len() {
                return Err(ConfigError::Validation(format!(
                    "output sheet {} needs the same number (at least one) of child and parent link columns",
                    s.name
                )));
            }
        } else if !s.child_key_names.is_empty() || !s.parent_key_names.is_empty() {
            return Err(ConfigError::Validation(format!(
                "output sheet {} has link columns but no parent sheet",
                s.name
            )));
        }
    }
    Ok(())
}
