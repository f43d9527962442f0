use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PipelineError;

/// Lifecycle of one ingestion job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Source handed over, nothing run yet
    Staged,

    /// Metadata extracted
    Probed,

    /// Acceptance rules passed
    Validated,

    /// Thumbnail and transcode tasks in flight
    Processing,

    Completed,

    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Forward edges of the job state machine; any live state may fail
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Staged, Probed) | (Probed, Validated) | (Validated, Processing) | (Processing, Completed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: JobState,
    pub to: JobState,
    pub at: DateTime<Utc>,
}

/// Tracks the current state of a job and every transition it has made
#[derive(Debug, Clone)]
pub struct JobStateMachine {
    current: JobState,
    history: Vec<StateTransition>,
}

impl JobStateMachine {
    pub fn new() -> Self {
        Self {
            current: JobState::Staged,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> JobState {
        self.current
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// States visited so far, starting with `Staged`
    pub fn visited(&self) -> Vec<JobState> {
        std::iter::once(JobState::Staged)
            .chain(self.history.iter().map(|t| t.to))
            .collect()
    }

    pub fn advance(&mut self, next: JobState) -> Result<(), PipelineError> {
        if !self.current.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        debug!("Job state {:?} -> {:?}", self.current, next);
        self.history.push(StateTransition {
            from: self.current,
            to: next,
            at: Utc::now(),
        });
        self.current = next;
        Ok(())
    }

    /// Move to `Failed`; a no-op once the job is already terminal
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            // Failed is reachable from every live state
            let _ = self.advance(JobState::Failed);
        }
    }
}

impl Default for JobStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
