//! Record services: CRUD execution and input extraction.

mod crud;
mod validation;
pub(crate) use validation::parse_field;
pub use crud::{CrudService, SaveActionType, SAVE_ACTION};
pub use validation::{ExtractionPurpose, InputExtractor};
