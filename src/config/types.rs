//! Raw config types matching the JSON record files.

use serde::{Deserialize, Serialize};

/// Role a field plays in its record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    #[default]
    Data,
    View,
    Temp,
    PrimaryKey,
    ParentKey,
    PrimaryAndParentKey,
    CreatedByUser,
    CreatedTimeStamp,
    ModifiedByUser,
    ModifiedTimeStamp,
    Record,
    RecordArray,
    ValueArray,
}

impl FieldType {
    pub fn is_primary_key(&self) -> bool {
        matches!(self, FieldType::PrimaryKey | FieldType::PrimaryAndParentKey)
    }

    pub fn is_parent_key(&self) -> bool {
        matches!(self, FieldType::ParentKey | FieldType::PrimaryAndParentKey)
    }

    /// Nested structures carry no scalar data type.
    pub fn is_nested(&self) -> bool {
        matches!(
            self,
            FieldType::Record | FieldType::RecordArray | FieldType::ValueArray
        )
    }

    /// Whether the field maps to a table or view column.
    pub fn is_column(&self) -> bool {
        !self.is_nested() && *self != FieldType::Temp
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    #[default]
    Storage,
    View,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub field_type: FieldType,
    /// Value type name (`text`, `integer`, `decimal`, `boolean`, `date`, `timestamp`).
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub column_name: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub default_value: Option<String>,
    /// Record to copy this field's definition from (`module.name`).
    #[serde(default)]
    pub referred_record: Option<String>,
    /// Field in `referred_record` (defaults to this field's name). For a parent key, the
    /// field in the parent record that it links to.
    #[serde(default)]
    pub referred_field: Option<String>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub value_list: Vec<String>,
    #[serde(default)]
    pub validation: Option<ValidationRule>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecordConfig {
    pub name: String,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub record_type: RecordType,
    /// Table or view name; defaults to the record name.
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub key_to_be_generated: bool,
    #[serde(default)]
    pub sequence_name: Option<String>,
    #[serde(default)]
    pub ok_to_select_all: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Default record that fields without their own `referred_record` copy from.
    #[serde(default)]
    pub default_ref_record: Option<String>,
    #[serde(default)]
    pub use_timestamp_for_concurrency: bool,
    #[serde(default)]
    pub list_field_name: Option<String>,
    #[serde(default)]
    pub list_group_key_name: Option<String>,
    #[serde(default)]
    pub suggestion_key_name: Option<String>,
    #[serde(default)]
    pub suggestion_output_names: Vec<String>,
    #[serde(default)]
    pub default_sheet_name: Option<String>,
    #[serde(default)]
    pub for_fixed_width_row: bool,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl RecordConfig {
    pub fn qualified_name(&self) -> String {
        qualified_name(self.module_name.as_deref(), &self.name)
    }
}

pub fn qualified_name(module: Option<&str>, name: &str) -> String {
    match module {
        Some(m) if !m.is_empty() => format!("{}.{}", m, name),
        _ => name.to_string(),
    }
}

/// One declared output sheet of a hierarchical response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputSheetConfig {
    pub name: String,
    /// Record whose fields are emitted when the sheet was never populated.
    #[serde(default)]
    pub record_name: Option<String>,
    #[serde(default)]
    pub parent_sheet_name: Option<String>,
    /// Link columns in this sheet.
    #[serde(default)]
    pub child_key_names: Vec<String>,
    /// Matching link columns in the parent sheet.
    #[serde(default)]
    pub parent_key_names: Vec<String>,
}

/// All config types in one struct for in-memory loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub records: Vec<RecordConfig>,
    #[serde(default)]
    pub output_sheets: Vec<OutputSheetConfig>,
}
