//! SQLite implementation of the ReportStore.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{all_embedded_migrations, Migrator};
use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::TerminalReport;
use crate::domain::ports::ReportStore;

#[derive(Clone)]
pub struct SqliteReportStore {
    pool: SqlitePool,
}

impl SqliteReportStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Wrap `pool` after bringing its schema up to date.
    pub async fn migrated(pool: SqlitePool) -> BuildResult<Self> {
        Migrator::new(pool.clone())
            .run_embedded_migrations(all_embedded_migrations())
            .await
            .map_err(|e| BuildError::Store(e.to_string()))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn decode(rows: Vec<(String,)>) -> BuildResult<Vec<TerminalReport>> {
    rows.into_iter()
        .map(|(document,)| serde_json::from_str(&document).map_err(BuildError::from))
        .collect()
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl ReportStore for SqliteReportStore {
    async fn save(&self, report: &TerminalReport) -> BuildResult<()> {
        let document = serde_json::to_string(report)?;

        sqlx::query(
            r#"INSERT INTO terminal_reports (build_id, project_id, user_id, phase, error_kind, partial, total_cost_usd, created_at, completed_at, document)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(build_id) DO UPDATE SET
                   phase = excluded.phase,
                   error_kind = excluded.error_kind,
                   partial = excluded.partial,
                   total_cost_usd = excluded.total_cost_usd,
                   completed_at = excluded.completed_at,
                   document = excluded.document"#,
        )
        .bind(report.build_id.to_string())
        .bind(&report.project_id)
        .bind(&report.user_id)
        .bind(report.phase.as_str())
        .bind(report.error_kind.map(|k| k.as_str()))
        .bind(report.partial)
        .bind(report.total_cost_usd)
        .bind(report.created_at.to_rfc3339())
        .bind(report.completed_at.to_rfc3339())
        .bind(&document)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, build_id: Uuid) -> BuildResult<Option<TerminalReport>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT document FROM terminal_reports WHERE build_id = ?")
            .bind(build_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(document,)| serde_json::from_str(&document).map_err(BuildError::from))
            .transpose()
    }

    async fn list_recent(&self, limit: usize) -> BuildResult<Vec<TerminalReport>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT document FROM terminal_reports ORDER BY completed_at DESC, build_id LIMIT ?",
        )
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        decode(rows)
    }

    async fn list_for_project(&self, project_id: &str, limit: usize) -> BuildResult<Vec<TerminalReport>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT document FROM terminal_reports WHERE project_id = ? ORDER BY completed_at DESC, build_id LIMIT ?",
        )
        .bind(project_id)
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        decode(rows)
    }
}
