//! CLI command handlers.

pub mod config;
pub mod report;
pub mod run;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::adapters::sqlite::create_pool;
use crate::adapters::store::SqliteReportStore;
use crate::domain::models::Config;

/// Open the configured report database, creating and migrating it if needed.
pub(crate) async fn open_report_store(config: &Config) -> Result<Arc<SqliteReportStore>> {
    let pool = create_pool(&config.database)
        .await
        .with_context(|| format!("Failed to open report database at {}", config.database.path))?;
    let store = SqliteReportStore::migrated(pool)
        .await
        .context("Failed to migrate report database")?;
    Ok(Arc::new(store))
}
