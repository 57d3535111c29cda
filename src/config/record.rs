//! Compiled record: ordered fields plus table identity, with SQL text and key lists derived
//! once at load.

use crate::config::field::{Field, FieldContext};
use crate::config::types::{qualified_name, FieldType, RecordConfig, RecordType};
use crate::error::ConfigError;
use crate::sheet::{new_sheet, DataSheet, MultiRowsSheet};
use crate::sql::{self, Dialect};
use crate::value::ValueType;
use std::collections::HashMap;
use std::sync::Arc;

/// SQL compiled for a record. Statements a record cannot run are `None`.
#[derive(Clone, Debug, Default)]
pub struct RecordSql {
    /// `SELECT col "name", ... FROM table WHERE `; criteria are appended.
    pub filter: String,
    /// `k1=? AND k2=?`; empty without a primary key.
    pub primary_where: String,
    pub read: Option<String>,
    pub insert: Option<String>,
    pub update: Option<String>,
    pub delete: Option<String>,
    /// `DELETE FROM table WHERE p1=?` for records with parent keys.
    pub delete_for_parent: Option<String>,
    pub list: Option<ListSql>,
    pub suggest: Option<SuggestSql>,
    /// Server clock expression of the dialect the record was compiled for.
    pub timestamp_expr: String,
}

#[derive(Clone, Debug)]
pub struct ListSql {
    pub sql: String,
    /// Output columns: `["id", "value"]` or `["value"]`.
    pub names: Vec<String>,
    pub types: Vec<ValueType>,
    /// Type of the group key when the list is grouped.
    pub group_type: Option<ValueType>,
    /// Output columns read from encrypted fields.
    pub encrypted: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct SuggestSql {
    pub sql: String,
    pub names: Vec<String>,
    pub types: Vec<ValueType>,
}

#[derive(Debug)]
pub struct Record {
    pub name: String,
    pub module_name: Option<String>,
    pub qualified_name: String,
    pub record_type: RecordType,
    pub table_name: String,
    pub key_to_be_generated: bool,
    pub sequence_name: Option<String>,
    pub ok_to_select_all: bool,
    pub read_only: bool,
    pub use_timestamp_for_concurrency: bool,
    pub default_sheet_name: String,
    pub for_fixed_width_row: bool,
    pub fields: Vec<Field>,
    index: HashMap<String, usize>,
    primary_keys: Vec<usize>,
    parent_keys: Vec<usize>,
    encrypted: Vec<usize>,
    modified_stamp: Option<usize>,
    created_user: Option<usize>,
    modified_user: Option<usize>,
    pub sql: RecordSql,
}

impl Record {
    /// Compile a record. `refs` holds every already-compiled record this one refers to,
    /// keyed by qualified name.
    pub(crate) fn compile(
        cfg: &RecordConfig,
        refs: &HashMap<String, Arc<Record>>,
        dialect: &Dialect,
    ) -> Result<Record, ConfigError> {
        let qname = cfg.qualified_name();
        let is_view = cfg.record_type == RecordType::View;

        let mut fields: Vec<Field> = Vec::with_capacity(cfg.fields.len());
        let mut index = HashMap::new();
        for fc in &cfg.fields {
            if index.contains_key(&fc.name) {
                return Err(ConfigError::DuplicateField {
                    record: qname.clone(),
                    field: fc.name.clone(),
                });
            }
            let ref_name = if fc.field_type.is_nested() || fc.field_type == FieldType::Temp {
                None
            } else {
                fc.referred_record
                    .as_deref()
                    .or(cfg.default_ref_record.as_deref())
                    .map(|r| resolve_name(cfg.module_name.as_deref(), r, refs, &qname))
            };
            let ref_field_name = fc.referred_field.clone().unwrap_or_else(|| fc.name.clone());
            let referred: Option<&Field> = match &ref_name {
                Some(r) if *r == qname => Some(
                    index
                        .get(&ref_field_name)
                        .map(|i: &usize| &fields[*i])
                        .ok_or_else(|| ConfigError::MissingReference {
                            kind: "field",
                            id: format!("{}.{}", r, ref_field_name),
                        })?,
                ),
                Some(r) => {
                    let rec = refs.get(r).ok_or_else(|| ConfigError::MissingReference {
                        kind: "record",
                        id: r.clone(),
                    })?;
                    Some(rec.field(&ref_field_name).ok_or_else(|| {
                        ConfigError::MissingReference {
                            kind: "field",
                            id: format!("{}.{}", r, ref_field_name),
                        }
                    })?)
                }
                None => None,
            };
            let ctx = FieldContext {
                record: &qname,
                is_view,
                key_to_be_generated: cfg.key_to_be_generated,
                referred,
                referred_record: ref_name.as_deref(),
            };
            let mut field = Field::compile(fc, &ctx)?;
            if field.referred_record.is_some() && field.referred_field.is_none() {
                field.referred_field = Some(ref_field_name);
            }
            index.insert(field.name.clone(), fields.len());
            fields.push(field);
        }

        let find = |ft: FieldType| -> Result<Option<usize>, ConfigError> {
            let found: Vec<usize> = (0..fields.len())
                .filter(|i| fields[*i].field_type == ft)
                .collect();
            if found.len() > 1 {
                return Err(ConfigError::Validation(format!(
                    "record {} has more than one {:?} field",
                    qname, ft
                )));
            }
            Ok(found.first().copied())
        };
        let modified_stamp = find(FieldType::ModifiedTimeStamp)?;
        let created_user = find(FieldType::CreatedByUser)?;
        let modified_user = find(FieldType::ModifiedByUser)?;
        find(FieldType::CreatedTimeStamp)?;

        let primary_keys: Vec<usize> = (0..fields.len())
            .filter(|i| fields[*i].field_type.is_primary_key())
            .collect();
        let parent_keys: Vec<usize> = (0..fields.len())
            .filter(|i| fields[*i].field_type.is_parent_key())
            .collect();
        let encrypted: Vec<usize> = (0..fields.len()).filter(|i| fields[*i].encrypted).collect();

        if cfg.key_to_be_generated {
            if primary_keys.len() != 1 {
                return Err(ConfigError::InvalidPrimaryKey {
                    record: qname,
                    reason: format!(
                        "a generated key needs exactly one primary key field, found {}",
                        primary_keys.len()
                    ),
                });
            }
            if fields[primary_keys[0]].value_type != Some(ValueType::Integer) {
                return Err(ConfigError::InvalidPrimaryKey {
                    record: qname,
                    reason: "a generated key must be an integer".into(),
                });
            }
        }
        if cfg.use_timestamp_for_concurrency {
            let ok = modified_stamp
                .map(|i| fields[i].value_type == Some(ValueType::Timestamp))
                .unwrap_or(false);
            if !ok {
                return Err(ConfigError::Validation(format!(
                    "record {} uses time-stamp for concurrency but has no timestamp-typed modified time-stamp field",
                    qname
                )));
            }
        }
        if cfg.for_fixed_width_row {
            if let Some(f) = fields.iter().find(|f| f.width == 0) {
                return Err(ConfigError::InvalidField {
                    record: qname,
                    field: f.name.clone(),
                    reason: "fixed-width records need a width for every field".into(),
                });
            }
        }

        let mut record = Record {
            name: cfg.name.clone(),
            module_name: cfg.module_name.clone(),
            table_name: cfg.table_name.clone().unwrap_or_else(|| cfg.name.clone()),
            record_type: cfg.record_type,
            key_to_be_generated: cfg.key_to_be_generated,
            sequence_name: cfg.sequence_name.clone(),
            ok_to_select_all: cfg.ok_to_select_all,
            read_only: cfg.read_only || is_view,
            use_timestamp_for_concurrency: cfg.use_timestamp_for_concurrency,
            default_sheet_name: cfg.default_sheet_name.clone().unwrap_or_else(|| cfg.name.clone()),
            for_fixed_width_row: cfg.for_fixed_width_row,
            fields,
            index,
            primary_keys,
            parent_keys,
            encrypted,
            modified_stamp,
            created_user,
            modified_user,
            sql: RecordSql::default(),
            qualified_name: qname,
        };
        record.sql = sql::compile_record_sql(&record, cfg, dialect)?;
        tracing::debug!(record = %record.qualified_name, table = %record.table_name, "compiled record");
        Ok(record)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|i| &self.fields[*i])
    }

    pub fn is_writable(&self) -> bool {
        !self.read_only
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_keys.is_empty()
    }

    pub fn primary_key_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.primary_keys.iter().map(move |i| &self.fields[*i])
    }

    pub fn parent_key_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.parent_keys.iter().map(move |i| &self.fields[*i])
    }

    pub fn has_parent_key(&self) -> bool {
        !self.parent_keys.is_empty()
    }

    pub fn encrypted_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.encrypted.iter().map(move |i| &self.fields[*i])
    }

    pub fn modified_stamp_field(&self) -> Option<&Field> {
        self.modified_stamp.map(|i| &self.fields[i])
    }

    pub fn created_user_field(&self) -> Option<&Field> {
        self.created_user.map(|i| &self.fields[i])
    }

    pub fn modified_user_field(&self) -> Option<&Field> {
        self.modified_user.map(|i| &self.fields[i])
    }

    /// Fields that are table or view columns, in declaration order.
    pub fn column_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.fields.iter().filter(|f| f.is_column())
    }

    /// Fields bound as INSERT parameters, in order.
    pub fn insert_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.column_fields().filter(|f| f.can_insert)
    }

    /// Fields bound in the SET list of UPDATE, in order.
    pub fn update_fields(&self) -> impl Iterator<Item = &Field> + '_ {
        self.column_fields().filter(|f| f.can_update)
    }

    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_key_fields().map(|f| f.name.clone()).collect()
    }

    /// Column names and types of a sheet holding this record's selected columns.
    pub fn sheet_columns(&self) -> (Vec<String>, Vec<ValueType>) {
        self.column_fields()
            .map(|f| (f.name.clone(), f.value_type()))
            .unzip()
    }

    /// Empty sheet for rows selected from this record.
    pub fn new_sheet(&self, single_row: bool) -> Box<dyn DataSheet> {
        let (names, types) = self.sheet_columns();
        new_sheet(names, types, single_row)
    }

    pub fn new_multi_sheet(&self) -> MultiRowsSheet {
        let (names, types) = self.sheet_columns();
        MultiRowsSheet::new(names, types)
    }

    /// Sum of field widths of a fixed-width row.
    pub fn row_width(&self) -> usize {
        self.fields.iter().map(|f| f.width as usize).sum()
    }
}

/// Resolve a record reference: names are qualified, or relative to the referring module.
fn resolve_name(
    module: Option<&str>,
    name: &str,
    refs: &HashMap<String, Arc<Record>>,
    own: &str,
) -> String {
    if name == own || refs.contains_key(name) {
        return name.to_string();
    }
    let local = qualified_name(module, name);
    if local == own || refs.contains_key(&local) {
        local
    } else {
        name.to_string()
    }
}
