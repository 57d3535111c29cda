//! Safe SQL builder: identifiers from config only, values as parameters.

mod builder;
mod executor;
pub mod params;
mod pg;
pub use builder::*;
pub use executor::{Dialect, KeyGeneration, SqlExecutor};
pub use params::*;
pub use pg::{to_pg_placeholders, PgExecutor};
