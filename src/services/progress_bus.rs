//! ProgressBus service for streaming build progress to external consumers.
//!
//! Provides a broadcast-based event stream with sequence numbering and a
//! per-build replay history. Emitting never blocks on consumers: slow
//! subscribers that lag behind the channel are caught up from history.
//! History is kept for running builds and the most recently finished ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::{AgentTaskStatus, BuildPhase, DiscoveryKind};

/// Monotonically increasing sequence number assigned by the ProgressBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Typed progress payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProgressPayload {
    BuildStarted {
        project_id: String,
    },
    PhaseChanged {
        from: BuildPhase,
        to: BuildPhase,
    },
    ContractLocked {
        criteria: usize,
    },
    SandboxOpened {
        sandbox_id: String,
    },
    SandboxClosed {
        sandbox_id: String,
    },
    TasksPartitioned {
        count: usize,
    },
    AgentStatusChanged {
        agent_id: String,
        partition: String,
        status: AgentTaskStatus,
        reason: Option<String>,
    },
    AgentRetrying {
        agent_id: String,
        attempt: u32,
        max_attempts: u32,
    },
    ContextPublished {
        agent_id: String,
        kind: DiscoveryKind,
        summary: String,
    },
    BudgetExceeded {
        spent_usd: f64,
        limit_usd: f64,
    },
    MergeCompleted {
        conflicts: usize,
        unresolved: usize,
        success: bool,
    },
    CheckCompleted {
        name: String,
        passed: bool,
        blocking: bool,
    },
    VerificationCompleted {
        passed: bool,
        checks: usize,
    },
    IntentEvaluated {
        satisfied: usize,
        total: usize,
    },
    DemoReady {
        files: usize,
    },
    BuildFinished {
        phase: BuildPhase,
        partial: bool,
        failure_reason: Option<String>,
    },
}

impl ProgressPayload {
    fn severity(&self) -> EventSeverity {
        match self {
            Self::AgentStatusChanged {
                status: AgentTaskStatus::Failed,
                ..
            } => EventSeverity::Error,
            Self::AgentRetrying { .. } | Self::BudgetExceeded { .. } => EventSeverity::Warning,
            Self::CheckCompleted { passed: false, .. } => EventSeverity::Warning,
            Self::MergeCompleted { success: false, .. } => EventSeverity::Error,
            Self::BuildFinished { phase, .. } if *phase != BuildPhase::Done => EventSeverity::Error,
            Self::ContextPublished { .. } => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::BuildFinished { .. })
    }
}

/// Progress event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: Uuid,
    pub sequence: SequenceNumber,
    pub build_id: Uuid,
    /// Phase of the build when the event was emitted.
    pub phase: BuildPhase,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub payload: ProgressPayload,
}

/// Configuration for the ProgressBus.
#[derive(Debug, Clone)]
pub struct ProgressBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
    /// Maximum number of events kept per build for replay.
    pub history_limit: usize,
    /// Finished builds whose history is kept for late subscribers.
    pub finished_retention: usize,
}

impl Default for ProgressBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            history_limit: 4096,
            finished_retention: 64,
        }
    }
}

#[derive(Debug, Default)]
struct BuildStream {
    phase: BuildPhase,
    history: VecDeque<ProgressEvent>,
}

#[derive(Debug, Default)]
struct BusState {
    next_sequence: u64,
    builds: HashMap<Uuid, BuildStream>,
    /// Finished builds still holding history, oldest first.
    finished: VecDeque<Uuid>,
    /// Builds whose history was dropped, with their last phase. Bounded.
    retired: VecDeque<(Uuid, BuildPhase)>,
}

impl BusState {
    fn retired_phase(&self, build_id: Uuid) -> Option<BuildPhase> {
        self.retired
            .iter()
            .find(|(id, _)| *id == build_id)
            .map(|(_, phase)| *phase)
    }

    /// Drop history of the oldest finished builds beyond `retention`.
    fn evict(&mut self, retention: usize) {
        while self.finished.len() > retention {
            let Some(build_id) = self.finished.pop_front() else {
                break;
            };
            if let Some(stream) = self.builds.remove(&build_id) {
                self.retired.push_back((build_id, stream.phase));
            }
            while self.retired.len() > retention.max(RETIRED_LIMIT) {
                self.retired.pop_front();
            }
        }
    }
}

const RETIRED_LIMIT: usize = 1024;

/// Central bus for broadcasting progress events to subscribers.
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
    state: Arc<Mutex<BusState>>,
    config: ProgressBusConfig,
}

impl ProgressBus {
    /// Create a new ProgressBus with the given configuration.
    pub fn new(config: ProgressBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            state: Arc::new(Mutex::new(BusState::default())),
            config,
        }
    }

    /// Emit an event for a build. Sequence assignment, phase stamping and the
    /// broadcast happen under one lock so every subscriber sees the same order.
    pub fn emit(&self, build_id: Uuid, payload: ProgressPayload) -> SequenceNumber {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let sequence = SequenceNumber(state.next_sequence);
        state.next_sequence += 1;

        // Stragglers for a retired build are broadcast but not recorded.
        let retired = state.retired_phase(build_id);
        let phase = match retired {
            Some(phase) => phase,
            None => {
                let stream = state.builds.entry(build_id).or_default();
                if let ProgressPayload::PhaseChanged { to, .. } = &payload {
                    stream.phase = *to;
                }
                stream.phase
            }
        };

        let event = ProgressEvent {
            id: Uuid::new_v4(),
            sequence,
            build_id,
            phase,
            timestamp: Utc::now(),
            severity: payload.severity(),
            payload,
        };

        tracing::debug!(
            build_id = %build_id,
            sequence = sequence.0,
            phase = %event.phase,
            severity = %event.severity,
            "progress event"
        );

        if retired.is_none() {
            if let Some(stream) = state.builds.get_mut(&build_id) {
                stream.history.push_back(event.clone());
                while stream.history.len() > self.config.history_limit {
                    stream.history.pop_front();
                }
            }
            if event.payload.is_terminal() && !state.finished.contains(&build_id) {
                state.finished.push_back(build_id);
                state.evict(self.config.finished_retention);
            }
        }

        // No subscribers is fine.
        let _ = self.sender.send(event);
        sequence
    }

    /// Subscribe to one build's events. Events already emitted for the build
    /// are replayed first. A build whose history was already dropped yields
    /// an empty, finished subscription.
    pub fn subscribe(&self, build_id: Uuid) -> BuildSubscription {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let finished = state.retired_phase(build_id).is_some();
        let pending = state
            .builds
            .get(&build_id)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default();
        let receiver = self.sender.subscribe();
        drop(state);

        BuildSubscription {
            build_id,
            receiver,
            pending,
            last_sequence: None,
            finished,
            state: Arc::clone(&self.state),
        }
    }

    /// Subscribe to every build's events.
    pub fn subscribe_all(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Events recorded for a build, oldest first.
    pub fn history(&self, build_id: Uuid) -> Vec<ProgressEvent> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .builds
            .get(&build_id)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of builds currently holding replay history.
    pub fn tracked_builds(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.builds.len()
    }

    /// Get the next sequence number to be assigned.
    pub fn current_sequence(&self) -> SequenceNumber {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        SequenceNumber(state.next_sequence)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(ProgressBusConfig::default())
    }
}

/// Stream of one build's progress events, ending after `BuildFinished`.
pub struct BuildSubscription {
    build_id: Uuid,
    receiver: broadcast::Receiver<ProgressEvent>,
    pending: VecDeque<ProgressEvent>,
    last_sequence: Option<SequenceNumber>,
    finished: bool,
    state: Arc<Mutex<BusState>>,
}

impl BuildSubscription {
    pub fn build_id(&self) -> Uuid {
        self.build_id
    }

    /// Next event for this build, or `None` once the build has finished or
    /// the bus is gone.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        loop {
            if self.finished {
                return None;
            }
            if let Some(event) = self.pending.pop_front() {
                if self.is_new(&event) {
                    return Some(self.deliver(event));
                }
                continue;
            }
            match self.receiver.recv().await {
                Ok(event) => {
                    if event.build_id == self.build_id && self.is_new(&event) {
                        return Some(self.deliver(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(build_id = %self.build_id, skipped, "progress subscriber lagged; replaying history");
                    self.catch_up();
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn is_new(&self, event: &ProgressEvent) -> bool {
        self.last_sequence.map_or(true, |last| event.sequence > last)
    }

    fn deliver(&mut self, event: ProgressEvent) -> ProgressEvent {
        self.last_sequence = Some(event.sequence);
        if event.payload.is_terminal() {
            self.finished = true;
        }
        event
    }

    fn catch_up(&mut self) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stream) = state.builds.get(&self.build_id) {
            let last = self.last_sequence;
            self.pending = stream
                .history
                .iter()
                .filter(|e| last.map_or(true, |l| e.sequence > l))
                .cloned()
                .collect();
        }
    }
}
