//! Report store port - persistence for terminal build reports.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::BuildResult;
use crate::domain::models::TerminalReport;

/// Durable storage for terminal reports, read back by build history views.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Insert or replace the report for its build id.
    async fn save(&self, report: &TerminalReport) -> BuildResult<()>;

    async fn get(&self, build_id: Uuid) -> BuildResult<Option<TerminalReport>>;

    /// Most recently completed first.
    async fn list_recent(&self, limit: usize) -> BuildResult<Vec<TerminalReport>>;

    /// Reports for one project, most recent first.
    async fn list_for_project(&self, project_id: &str, limit: usize) -> BuildResult<Vec<TerminalReport>>;
}
