//! Schema records: declarative record metadata compiled to parameterized SQL, row-level CRUD
//! with composite keys and optimistic concurrency, and hierarchical output of flat sheets.

pub mod config;
pub mod crypt;
pub mod error;
pub mod flat;
pub mod output;
pub mod response;
pub mod service;
pub mod sheet;
pub mod sql;
pub mod state;
pub mod value;

pub use config::{load_from_dir, load_from_str, resolve, FullConfig, Record, Schema, SchemaRegistry};
pub use error::{AppError, ConfigError, FieldMessage};
pub use output::{JsonWriter, OutputPlan, ResponseData, ResponseWriter};
pub use response::{error_body, messages_body, success_sheet};
pub use service::{CrudService, ExtractionPurpose, InputExtractor, SaveActionType};
pub use sheet::{DataSheet, FieldValues, Fields, MultiRowsSheet, SingleRowSheet};
pub use sql::{Dialect, PgExecutor, SqlExecutor};
pub use state::{init_tracing, AppState, Settings};
pub use value::{Value, ValueType};
