//! Example consumer: compiles the records in `RECORDS_DIR`, then filters one of them and
//! prints the rows as JSON.
//!
//! Run from repo root: `cargo run -p example-consumer -- <record> [field=value ...]`

use schema_records::{
    init_tracing, success_sheet, AppState, CrudService, ExtractionPurpose, FieldValues,
    InputExtractor, Settings,
};
use std::collections::HashMap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("schema_records=info,example_consumer=info");
    let settings = Settings::from_env();
    let state = AppState::connect(&settings).await?;

    let mut args = std::env::args().skip(1);
    let Some(record_name) = args.next() else {
        let schema = state.schemas.current();
        for record in schema.records() {
            tracing::info!(record = %record.qualified_name, table = %record.table_name, "record");
        }
        return Ok(());
    };
    let input: HashMap<String, String> = args
        .filter_map(|a| a.split_once('=').map(|(k, v)| (k.to_string(), v.to_string())))
        .collect();

    let schema = state.schemas.current();
    let record = schema.get_record(&record_name)?;
    let mut criteria = FieldValues::new();
    let messages = InputExtractor::extract_fields(&record, &input, ExtractionPurpose::Filter, &mut criteria);
    if !messages.is_empty() {
        println!("{}", schema_records::messages_body(&messages));
        return Ok(());
    }
    match CrudService::filter(&record, state.executor.as_ref(), &criteria).await {
        Ok(rows) => println!("{}", success_sheet(&rows)),
        Err(e) => println!("{}", e.to_body()),
    }
    Ok(())
}
