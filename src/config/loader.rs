//! Load record config from JSON files and compile it into a `Schema`.

use crate::config::record::Record;
use crate::config::resolved::Schema;
use crate::config::types::{qualified_name, FieldType, FullConfig, RecordConfig};
use crate::config::validate;
use crate::error::ConfigError;
use crate::output::OutputPlan;
use crate::sql::Dialect;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Validate and compile a full config.
pub fn resolve(config: &FullConfig, dialect: &Dialect) -> Result<Schema, ConfigError> {
    validate(config)?;
    let records = compile_records(&config.records, dialect)?;
    let output = OutputPlan::new(&config.output_sheets)?;
    tracing::info!(
        records = records.len(),
        output_sheets = config.output_sheets.len(),
        "schema compiled"
    );
    Ok(Schema::new(records, output))
}

/// Compile every record, referenced records first. A reference chain that comes back to a
/// record still being compiled is a fatal error naming the records on the cycle.
pub fn compile_records(
    configs: &[RecordConfig],
    dialect: &Dialect,
) -> Result<HashMap<String, Arc<Record>>, ConfigError> {
    let mut ctx = CompileContext {
        configs: configs.iter().map(|c| (c.qualified_name(), c)).collect(),
        dialect,
        pending: Vec::new(),
        finished: HashMap::new(),
    };
    for c in configs {
        ctx.compile(&c.qualified_name())?;
    }
    Ok(ctx.finished)
}

struct CompileContext<'a> {
    configs: HashMap<String, &'a RecordConfig>,
    dialect: &'a Dialect,
    /// Records whose compilation has started but not finished, outermost first.
    pending: Vec<String>,
    finished: HashMap<String, Arc<Record>>,
}

impl CompileContext<'_> {
    fn compile(&mut self, qname: &str) -> Result<Arc<Record>, ConfigError> {
        if let Some(done) = self.finished.get(qname) {
            return Ok(Arc::clone(done));
        }
        if let Some(pos) = self.pending.iter().position(|p| p == qname) {
            let mut cycle = self.pending[pos..].to_vec();
            cycle.push(qname.to_string());
            return Err(ConfigError::CircularReference(cycle));
        }
        let cfg = *self
            .configs
            .get(qname)
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "record",
                id: qname.to_string(),
            })?;

        self.pending.push(qname.to_string());
        let mut refs = HashMap::new();
        for name in self.references(cfg, qname) {
            let rec = self.compile(&name)?;
            refs.insert(name, rec);
        }
        let record = Arc::new(Record::compile(cfg, &refs, self.dialect)?);
        self.pending.pop();
        self.finished.insert(qname.to_string(), Arc::clone(&record));
        Ok(record)
    }

    /// Other records `cfg` copies field definitions from.
    fn references(&self, cfg: &RecordConfig, own: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for f in &cfg.fields {
            if f.field_type.is_nested() || f.field_type == FieldType::Temp {
                continue;
            }
            let Some(name) = f
                .referred_record
                .as_deref()
                .or(cfg.default_ref_record.as_deref())
            else {
                continue;
            };
            let resolved = if self.configs.contains_key(name) {
                name.to_string()
            } else {
                qualified_name(cfg.module_name.as_deref(), name)
            };
            if resolved != own && !out.contains(&resolved) {
                out.push(resolved);
            }
        }
        out
    }
}

/// Parse one JSON document: either `{ "records": [...], "output_sheets": [...] }` or a single
/// record object.
pub fn load_from_str(json: &str) -> Result<FullConfig, ConfigError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    let is_full = value
        .as_object()
        .map(|o| o.contains_key("records") || o.contains_key("output_sheets"))
        .unwrap_or(false);
    if is_full {
        serde_json::from_value(value).map_err(|e| ConfigError::Load(e.to_string()))
    } else {
        let record: RecordConfig =
            serde_json::from_value(value).map_err(|e| ConfigError::Load(e.to_string()))?;
        Ok(FullConfig {
            records: vec![record],
            ..Default::default()
        })
    }
}

/// Load and merge every `*.json` file of a directory, in file-name order.
pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ConfigError::Load(e.to_string()))?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut config = FullConfig::default();
    for path in paths {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let part = load_from_str(&text)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(file = %path.display(), records = part.records.len(), "loaded config file");
        config.records.extend(part.records);
        config.output_sheets.extend(part.output_sheets);
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use pretty_assertions::assert_eq;

    fn field(name: &str, dt: Option<&str>) -> FieldConfig {
        FieldConfig {
            name: name.into(),
            data_type: dt.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_view_inherits_from_base_record() {
        let base = RecordConfig {
            name: "customer".into(),
            module_name: Some("crm".into()),
            fields: vec![
                FieldConfig {
                    field_type: FieldType::PrimaryKey,
                    ..field("id", Some("integer"))
                },
                field("name", Some("text")),
            ],
            ..Default::default()
        };
        let view = RecordConfig {
            name: "customerView".into(),
            module_name: Some("crm".into()),
            record_type: crate::config::RecordType::View,
            default_ref_record: Some("customer".into()),
            fields: vec![field("id", None), field("name", None)],
            ..Default::default()
        };
        let records = compile_records(&[view, base], &Dialect::default()).unwrap();
        let v = &records["crm.customerView"];
        assert_eq!(v.field("name").unwrap().value_type, Some(crate::value::ValueType::Text));
        assert_eq!(v.field("id").unwrap().referred_record.as_deref(), Some("crm.customer"));
    }

    #[test]
    fn test_two_record_cycle_names_both() {
        let a = RecordConfig {
            name: "a".into(),
            default_ref_record: Some("b".into()),
            fields: vec![field("x", None)],
            ..Default::default()
        };
        let b = RecordConfig {
            name: "b".into(),
            default_ref_record: Some("a".into()),
            fields: vec![field("x", None)],
            ..Default::default()
        };
        let err = compile_records(&[a, b], &Dialect::default()).unwrap_err();
        match &err {
            ConfigError::CircularReference(names) => {
                assert_eq!(names, &vec!["a".to_string(), "b".to_string(), "a".to_string()]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        let msg = err.to_string();
        assert!(msg.contains('a') && msg.contains('b'));
    }

    #[test]
    fn test_missing_reference() {
        let a = RecordConfig {
            name: "a".into(),
            fields: vec![FieldConfig {
                referred_record: Some("nowhere".into()),
                ..field("x", None)
            }],
            ..Default::default()
        };
        assert!(matches!(
            compile_records(&[a], &Dialect::default()),
            Err(ConfigError::MissingReference { kind: "record", .. })
        ));
    }

    #[test]
    fn test_load_from_str_both_shapes() {
        let one = load_from_str(r#"{"name": "r", "fields": [{"name": "a", "data_type": "text"}]}"#).unwrap();
        assert_eq!(one.records.len(), 1);
        let full = load_from_str(
            r#"{"records": [{"name": "r", "fields": [{"name": "a", "data_type": "text"}]}],
                "output_sheets": [{"name": "r"}]}"#,
        )
        .unwrap();
        assert_eq!(full.output_sheets.len(), 1);
        assert!(load_from_str("[1, 2]").is_err());
    }

    #[test]
    fn test_resolve_builds_schema() {
        let config = load_from_str(
            r#"{"records": [{"name": "r", "ok_to_select_all": true,
                 "fields": [{"name": "id", "field_type": "PRIMARY_KEY", "data_type": "integer"}]}]}"#,
        )
        .unwrap();
        let schema = resolve(&config, &Dialect::default()).unwrap();
        assert!(schema.record("r").is_some());
        assert!(schema.record("s").is_none());
    }
}
