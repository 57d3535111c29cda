pub mod types;
pub mod field;
pub mod record;
pub mod loader;
pub mod validator;
pub mod resolved;

pub use types::*;
pub use field::{Field, FieldRule};
pub use record::{ListSql, Record, RecordSql, SuggestSql};
pub use loader::*;
pub use validator::*;
pub use resolved::*;
