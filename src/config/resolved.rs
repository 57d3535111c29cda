//! Compiled schema: every record by qualified name plus the output plan. Immutable once built;
//! a reload swaps the whole schema.

use crate::config::record::Record;
use crate::error::AppError;
use crate::output::OutputPlan;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
pub struct Schema {
    records: HashMap<String, Arc<Record>>,
    output: OutputPlan,
}

impl Schema {
    pub fn new(records: HashMap<String, Arc<Record>>, output: OutputPlan) -> Self {
        Schema { records, output }
    }

    pub fn record(&self, qualified_name: &str) -> Option<Arc<Record>> {
        self.records.get(qualified_name).cloned()
    }

    /// Like [`Schema::record`], as an error when the record is not defined.
    pub fn get_record(&self, qualified_name: &str) -> Result<Arc<Record>, AppError> {
        self.record(qualified_name)
            .ok_or_else(|| AppError::NotFound(format!("record {}", qualified_name)))
    }

    pub fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.values()
    }

    pub fn output_plan(&self) -> &OutputPlan {
        &self.output
    }
}

/// Holds the current schema. Readers take a cheap `Arc` snapshot; `replace` swaps in a newly
/// compiled schema without disturbing requests still using the old one.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    current: RwLock<Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new(schema: Schema) -> Self {
        SchemaRegistry {
            current: RwLock::new(Arc::new(schema)),
        }
    }

    pub fn current(&self) -> Arc<Schema> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, schema: Schema) {
        let schema = Arc::new(schema);
        match self.current.write() {
            Ok(mut guard) => *guard = schema,
            Err(poisoned) => *poisoned.into_inner() = schema,
        }
        tracing::info!("schema replaced");
    }
}
