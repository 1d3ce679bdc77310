//! In-memory report store.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::BuildResult;
use crate::domain::models::TerminalReport;
use crate::domain::ports::ReportStore;

#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<Uuid, TerminalReport>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.reports.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.reports.read().await.is_empty()
    }
}

fn most_recent_first(mut reports: Vec<TerminalReport>, limit: usize) -> Vec<TerminalReport> {
    reports.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(a.build_id.cmp(&b.build_id)));
    reports.truncate(limit);
    reports
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save(&self, report: &TerminalReport) -> BuildResult<()> {
        self.reports.write().await.insert(report.build_id, report.clone());
        Ok(())
    }

    async fn get(&self, build_id: Uuid) -> BuildResult<Option<TerminalReport>> {
        Ok(self.reports.read().await.get(&build_id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> BuildResult<Vec<TerminalReport>> {
        let all = self.reports.read().await.values().cloned().collect();
        Ok(most_recent_first(all, limit))
    }

    async fn list_for_project(&self, project_id: &str, limit: usize) -> BuildResult<Vec<TerminalReport>> {
        let matching = self
            .reports
            .read()
            .await
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        Ok(most_recent_first(matching, limit))
    }
}
