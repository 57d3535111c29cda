//! Response assembly: named sheets plus loose fields, written as a nested tree.

mod hierarchy;
mod writer;

pub use hierarchy::{HierarchicalSheet, OutputPlan, OutputSheet};
pub use writer::{JsonWriter, ResponseWriter};

use crate::sheet::{DataSheet, FieldValues};
use std::collections::HashMap;

/// Everything a request produced for output.
#[derive(Debug, Default)]
pub struct ResponseData {
    pub fields: FieldValues,
    sheets: HashMap<String, Box<dyn DataSheet>>,
}

impl ResponseData {
    pub fn new() -> Self {
        ResponseData::default()
    }

    pub fn put_sheet(&mut self, name: &str, sheet: Box<dyn DataSheet>) {
        self.sheets.insert(name.to_string(), sheet);
    }

    pub fn sheet(&self, name: &str) -> Option<&dyn DataSheet> {
        self.sheets.get(name).map(|s| s.as_ref())
    }

    pub fn remove_sheet(&mut self, name: &str) -> Option<Box<dyn DataSheet>> {
        self.sheets.remove(name)
    }
}
