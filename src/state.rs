//! Runtime settings and shared state. The schema is reloadable without restart.

use crate::config::{load_from_dir, resolve, SchemaRegistry};
use crate::error::AppError;
use crate::sql::{PgExecutor, SqlExecutor};
use std::path::PathBuf;
use std::sync::Arc;

/// Settings read from the environment (and `.env` when present).
#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    /// Directory of JSON record files.
    pub records_dir: PathBuf,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Settings {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/records".into()),
            records_dir: std::env::var("RECORDS_DIR")
                .unwrap_or_else(|_| "records".into())
                .into(),
            max_connections: std::env::var("MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        }
    }
}

/// Install the fmt subscriber, filtered by `RUST_LOG` or `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    // a subscriber may already be installed (tests, embedding apps)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<dyn SqlExecutor>,
    pub schemas: Arc<SchemaRegistry>,
    records_dir: PathBuf,
}

impl AppState {
    /// Connect the pool and compile the records found in `settings.records_dir`.
    pub async fn connect(settings: &Settings) -> Result<Self, AppError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .connect(&settings.database_url)
            .await?;
        let executor = PgExecutor::new(pool);
        let config = load_from_dir(&settings.records_dir)?;
        let schema = resolve(&config, &executor.dialect())?;
        tracing::info!(dir = %settings.records_dir.display(), "records loaded");
        Ok(AppState {
            executor: Arc::new(executor),
            schemas: Arc::new(SchemaRegistry::new(schema)),
            records_dir: settings.records_dir.clone(),
        })
    }

    pub fn with_executor(executor: Arc<dyn SqlExecutor>, schemas: SchemaRegistry) -> Self {
        AppState {
            executor,
            schemas: Arc::new(schemas),
            records_dir: PathBuf::new(),
        }
    }

    /// Recompile the records directory and swap the schema in. The old schema stays in use
    /// when loading fails.
    pub fn reload(&self, dialect: &crate::sql::Dialect) -> Result<(), AppError> {
        let config = load_from_dir(&self.records_dir)?;
        let schema = resolve(&config, dialect)?;
        self.schemas.replace(schema);
        tracing::info!(dir = %self.records_dir.display(), "records reloaded");
        Ok(())
    }
}
