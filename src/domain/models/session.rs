//! Build session domain model.
//!
//! A build session is one end-to-end attempt to satisfy one prompt. It owns
//! its intent contract, agent tasks and the merge/verification reports, and
//! enforces forward-only phase progression.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::agent_task::{AgentTask, AgentTaskStatus};
use super::intent::IntentContract;
use super::merge::MergeReport;
use super::phase::BuildPhase;
use super::verification::VerificationReport;
use crate::domain::errors::{BuildError, BuildResult, ErrorKind};

/// Inbound request to start a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub prompt: String,
    pub project_id: String,
    pub user_id: String,
}

impl BuildRequest {
    pub fn new(prompt: impl Into<String>, project_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            project_id: project_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// One recorded phase change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: BuildPhase,
    pub to: BuildPhase,
    pub at: DateTime<Utc>,
}

/// One end-to-end attempt to satisfy one user prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSession {
    pub id: Uuid,
    pub project_id: String,
    pub user_id: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
    phase: BuildPhase,
    history: Vec<PhaseTransition>,
    intent_contract: Option<IntentContract>,
    pub agent_tasks: Vec<AgentTask>,
    merge_report: Option<MergeReport>,
    verification_report: Option<VerificationReport>,
    pub intent_satisfaction: BTreeMap<String, bool>,
    /// Error that ended the session, in process only.
    #[serde(skip)]
    pub failure: Option<BuildError>,
    #[serde(default)]
    failure_kind: Option<ErrorKind>,
    #[serde(default)]
    failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl BuildSession {
    pub fn new(request: &BuildRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id: request.project_id.clone(),
            user_id: request.user_id.clone(),
            prompt: request.prompt.clone(),
            created_at: Utc::now(),
            phase: BuildPhase::IntentLock,
            history: Vec::new(),
            intent_contract: None,
            agent_tasks: Vec::new(),
            merge_report: None,
            verification_report: None,
            intent_satisfaction: BTreeMap::new(),
            failure: None,
            failure_kind: None,
            failure_reason: None,
            completed_at: None,
        }
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.history
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Move to `to`, rejecting any transition that is not forward-only.
    pub fn transition_to(&mut self, to: BuildPhase) -> BuildResult<()> {
        if !self.phase.can_transition_to(to) {
            return Err(BuildError::InvalidStateTransition { from: self.phase, to });
        }
        self.history.push(PhaseTransition {
            from: self.phase,
            to,
            at: Utc::now(),
        });
        self.phase = to;
        if to.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Advance to the next pipeline phase.
    pub fn advance(&mut self) -> BuildResult<BuildPhase> {
        let next = self.phase.next().ok_or(BuildError::InvalidStateTransition {
            from: self.phase,
            to: self.phase,
        })?;
        self.transition_to(next)?;
        Ok(next)
    }

    /// Terminate the session because of `error`. Cancellation ends in
    /// CANCELLED, everything else in FAILED.
    pub fn terminate(&mut self, error: BuildError) -> BuildResult<BuildPhase> {
        let target = if error.is_cancellation() {
            BuildPhase::Cancelled
        } else {
            BuildPhase::Failed
        };
        self.transition_to(target)?;
        self.failure_kind = Some(error.kind());
        self.failure_reason = Some(error.to_string());
        self.failure = Some(error);
        Ok(target)
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure_kind
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn intent_contract(&self) -> Option<&IntentContract> {
        self.intent_contract.as_ref()
    }

    /// Attach the locked contract. Only one contract per session.
    pub fn set_intent_contract(&mut self, contract: IntentContract) -> BuildResult<()> {
        if self.intent_contract.is_some() {
            return Err(BuildError::ContractLocked);
        }
        self.intent_contract = Some(contract);
        Ok(())
    }

    pub fn merge_report(&self) -> Option<&MergeReport> {
        self.merge_report.as_ref()
    }

    /// Record the merge report. Written once; later writes are ignored.
    pub fn set_merge_report(&mut self, report: MergeReport) {
        if self.merge_report.is_none() {
            self.merge_report = Some(report);
        }
    }

    pub fn verification_report(&self) -> Option<&VerificationReport> {
        self.verification_report.as_ref()
    }

    /// Record the verification report. Written once; later writes are ignored.
    pub fn set_verification_report(&mut self, report: VerificationReport) {
        if self.verification_report.is_none() {
            self.verification_report = Some(report);
        }
    }

    pub fn tasks_with_status(&self, status: AgentTaskStatus) -> usize {
        self.agent_tasks.iter().filter(|t| t.status == status).count()
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.agent_tasks.iter().map(|t| t.cost_usd).sum()
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.created_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> BuildSession {
        BuildSession::new(&BuildRequest::new("add a page", "proj-1", "user-1"))
    }

    #[test]
    fn advances_through_pipeline() {
        let mut s = session();
        for expected in &BuildPhase::PIPELINE[1..] {
            assert_eq!(s.advance().unwrap(), *expected);
        }
        assert_eq!(s.advance().unwrap(), BuildPhase::Done);
        assert!(s.is_terminal());
        assert!(s.completed_at.is_some());
        assert_eq!(s.history().len(), 7);
    }

    #[test]
    fn rejects_skipping_and_going_back() {
        let mut s = session();
        s.advance().unwrap();
        let err = s.transition_to(BuildPhase::IntegrationCheck).unwrap_err();
        assert!(matches!(err, BuildError::InvalidStateTransition { .. }));
        assert!(s.transition_to(BuildPhase::IntentLock).is_err());
        assert_eq!(s.phase(), BuildPhase::Initialization);
    }

    #[test]
    fn terminal_session_is_frozen() {
        let mut s = session();
        s.terminate(BuildError::CancellationRequested).unwrap();
        assert_eq!(s.phase(), BuildPhase::Cancelled);
        assert!(s.terminate(BuildError::EmptyIntent).is_err());
        assert!(s.advance().is_err());
        assert!(matches!(s.failure, Some(BuildError::CancellationRequested)));
    }

    #[test]
    fn failure_survives_serialization() {
        let mut s = session();
        s.advance().unwrap();
        s.terminate(BuildError::PhaseTimeout(BuildPhase::Initialization)).unwrap();

        let json = serde_json::to_string(&s).unwrap();
        let restored: BuildSession = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.phase(), BuildPhase::Failed);
        assert!(restored.failure.is_none());
        assert_eq!(restored.failure_kind(), Some(ErrorKind::PhaseTimeout));
        assert_eq!(restored.failure_reason(), s.failure_reason());
        assert_eq!(restored.history(), s.history());
    }

    #[test]
    fn reports_are_write_once() {
        let mut s = session();
        s.set_merge_report(MergeReport::new(vec![], vec!["a".into()], vec![]));
        s.set_merge_report(MergeReport::new(vec![], vec![], vec![]));
        assert_eq!(s.merge_report().unwrap().merged_paths, vec!["a".to_string()]);
    }
}
