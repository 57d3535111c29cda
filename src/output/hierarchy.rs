//! Parent-child composition of flat sheets into a nested output tree.

use super::writer::ResponseWriter;
use super::ResponseData;
use crate::config::{OutputSheetConfig, Schema};
use crate::error::{AppError, ConfigError};
use crate::sheet::{column_indexes, key_of, DataSheet, Fields};
use std::collections::{HashMap, HashSet};

#[derive(Clone, Debug)]
pub struct OutputSheet {
    pub name: String,
    pub record_name: Option<String>,
    pub parent: Option<String>,
    pub child_keys: Vec<String>,
    pub parent_keys: Vec<String>,
}

/// Declared output sheets with their parent links, checked for cycles at load.
#[derive(Debug, Default)]
pub struct OutputPlan {
    sheets: Vec<OutputSheet>,
    by_name: HashMap<String, usize>,
    children: HashMap<String, Vec<usize>>,
    top: Vec<usize>,
}

impl OutputPlan {
    pub fn new(configs: &[OutputSheetConfig]) -> Result<Self, ConfigError> {
        let sheets: Vec<OutputSheet> = configs
            .iter()
            .map(|c| OutputSheet {
                name: c.name.clone(),
                record_name: c.record_name.clone(),
                parent: c.parent_sheet_name.clone(),
                child_keys: c.child_key_names.clone(),
                parent_keys: c.parent_key_names.clone(),
            })
            .collect();
        let by_name: HashMap<String, usize> = sheets
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.clone(), i))
            .collect();

        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        let mut top = Vec::new();
        for (i, s) in sheets.iter().enumerate() {
            match &s.parent {
                Some(p) => {
                    if !by_name.contains_key(p) {
                        return Err(ConfigError::MissingReference {
                            kind: "output sheet",
                            id: p.clone(),
                        });
                    }
                    children.entry(p.clone()).or_default().push(i);
                }
                None => top.push(i),
            }
        }

        for s in &sheets {
            let mut visited = HashSet::new();
            let mut chain = vec![s.name.clone()];
            visited.insert(s.name.as_str());
            let mut parent = s.parent.as_deref();
            while let Some(p) = parent {
                chain.push(p.to_string());
                if !visited.insert(p) {
                    let start = chain.iter().position(|c| c == p).unwrap_or(0);
                    return Err(ConfigError::CircularReference(chain[start..].to_vec()));
                }
                parent = by_name.get(p).and_then(|i| sheets[*i].parent.as_deref());
            }
        }

        Ok(OutputPlan {
            sheets,
            by_name,
            children,
            top,
        })
    }

    pub fn sheet(&self, name: &str) -> Option<&OutputSheet> {
        self.by_name.get(name).map(|i| &self.sheets[*i])
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    fn children_of(&self, name: &str) -> &[usize] {
        self.children.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Write the whole response: one member per top-level sheet.
    pub fn write(
        &self,
        schema: &Schema,
        data: &ResponseData,
        writer: &mut dyn ResponseWriter,
    ) -> Result<(), AppError> {
        writer.begin_object();
        for idx in &self.top {
            self.write_top(*idx, schema, data, writer)?;
        }
        writer.end_object();
        Ok(())
    }

    fn write_top(
        &self,
        idx: usize,
        schema: &Schema,
        data: &ResponseData,
        writer: &mut dyn ResponseWriter,
    ) -> Result<(), AppError> {
        let decl = &self.sheets[idx];
        if data.sheet(&decl.name).is_some() {
            let tree = HierarchicalSheet::build(self, idx, data)?;
            if let Some(tree) = tree {
                writer.key(&decl.name);
                tree.write_rows(writer);
            }
            return Ok(());
        }
        // never populated: flat fields from the response, then the children on their own
        if let Some(record) = decl.record_name.as_deref().and_then(|r| schema.record(r)) {
            for f in &record.fields {
                if let Some(v) = data.fields.get_value(&f.name) {
                    writer.key(&f.name);
                    writer.value(v);
                }
            }
        } else {
            tracing::debug!(sheet = %decl.name, "output sheet has no data");
        }
        for child in self.children_of(&decl.name) {
            self.write_top(*child, schema, data, writer)?;
        }
        Ok(())
    }
}

/// A populated sheet with each child sheet bucketed by the link to this sheet.
pub struct HierarchicalSheet<'a> {
    name: &'a str,
    sheet: &'a dyn DataSheet,
    children: Vec<ChildIndex<'a>>,
}

struct ChildIndex<'a> {
    parent_indexes: Vec<usize>,
    buckets: HashMap<String, Vec<usize>>,
    child: HierarchicalSheet<'a>,
}

impl<'a> HierarchicalSheet<'a> {
    /// Build the tree under declared sheet `idx`. `None` when that sheet has no data.
    pub fn build(
        plan: &'a OutputPlan,
        idx: usize,
        data: &'a ResponseData,
    ) -> Result<Option<Self>, AppError> {
        let decl = &plan.sheets[idx];
        let Some(sheet) = data.sheet(&decl.name) else {
            return Ok(None);
        };
        let mut children = Vec::new();
        for child_idx in plan.children_of(&decl.name) {
            let child_decl = &plan.sheets[*child_idx];
            let Some(child) = HierarchicalSheet::build(plan, *child_idx, data)? else {
                continue;
            };
            let parent_indexes = column_indexes(sheet, &child_decl.parent_keys, &decl.name)?;
            let child_indexes = column_indexes(child.sheet, &child_decl.child_keys, &child_decl.name)?;
            let mut buckets: HashMap<String, Vec<usize>> = HashMap::new();
            for (i, row) in child.sheet.rows().enumerate() {
                if let Some(key) = key_of(row, &child_indexes) {
                    buckets.entry(key).or_default().push(i);
                }
            }
            children.push(ChildIndex {
                parent_indexes,
                buckets,
                child,
            });
        }
        Ok(Some(HierarchicalSheet {
            name: &decl.name,
            sheet,
            children,
        }))
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Write every row as an array of objects.
    pub fn write_rows(&self, writer: &mut dyn ResponseWriter) {
        writer.begin_array();
        for i in 0..self.sheet.len() {
            self.write_row(i, writer);
        }
        writer.end_array();
    }

    fn write_row(&self, idx: usize, writer: &mut dyn ResponseWriter) {
        let Some(row) = self.sheet.row(idx) else {
            return;
        };
        writer.begin_object();
        for (name, value) in self.sheet.column_names().iter().zip(row) {
            writer.key(name);
            writer.value(value);
        }
        for ci in &self.children {
            writer.key(ci.child.name);
            writer.begin_array();
            let bucket = key_of(row, &ci.parent_indexes).and_then(|k| ci.buckets.get(&k));
            if let Some(rows) = bucket {
                for r in rows {
                    ci.child.write_row(*r, writer);
                }
            }
            writer.end_array();
        }
        writer.end_object();
    }
}
