use super::{column_indexes, key_of, DataSheet, MultiRowsSheet};
use crate::error::AppError;
use crate::value::Value;
use std::collections::HashMap;

/// Child rows bucketed by their link to a parent sheet. Built once, then each parent row
/// finds its children in constant time. A row with an unknown link value is in no bucket.
#[derive(Debug)]
pub struct ChildSheets {
    parent_indexes: Vec<usize>,
    children: HashMap<String, MultiRowsSheet>,
}

impl ChildSheets {
    pub fn new(
        parent_keys: &[String],
        child_keys: &[String],
        parent: &dyn DataSheet,
        child: &dyn DataSheet,
    ) -> Result<Self, AppError> {
        if parent_keys.is_empty() || parent_keys.len() != child_keys.len() {
            return Err(AppError::BadRequest(format!(
                "{} parent link columns and {} child link columns",
                parent_keys.len(),
                child_keys.len()
            )));
        }
        let parent_indexes = column_indexes(parent, parent_keys, "parent")?;
        let child_indexes = column_indexes(child, child_keys, "child")?;

        let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in child.rows().enumerate() {
            if let Some(key) = key_of(row, &child_indexes) {
                groups.entry(key).or_default().push(i);
            }
        }
        let children = groups
            .into_iter()
            .map(|(key, idxs)| (key, child.copy_rows(&idxs)))
            .collect();

        Ok(ChildSheets {
            parent_indexes,
            children,
        })
    }

    pub fn child_sheet(&self, parent_row: &[Value]) -> Option<&MultiRowsSheet> {
        self.children.get(&key_of(parent_row, &self.parent_indexes)?)
    }

    /// Number of distinct parent keys that have children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
