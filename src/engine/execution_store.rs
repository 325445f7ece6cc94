use {
    crate::{
        config::{DF, pipeline::execution_fields},
        domain::{ExecutionState, ExecutionSummary, RawExecutionRecord},
        shared::Revisioned,
    },
    serde::Serialize,
    strum_macros::Display,
};

/// Coarse phase of the watched run, for headers and CLI output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum ExecutionPhase {
    Idle,
    Initializing,
    Running,
    Completed,
    Partial,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// No execution loaded yet; there is nothing to merge onto.
    Dropped,
    Applied,
    /// The run already finished; only this many finish-metadata keys were taken.
    FinishMetadataOnly(usize),
}

/// The watched execution: its raw row (for merges) and the typed summary rebuilt from it.
#[derive(Debug, Default, Serialize)]
pub struct ExecutionStore {
    #[serde(skip)]
    raw: Option<RawExecutionRecord>,
    summary: Option<ExecutionSummary>,
    error: Option<String>,
    revision: u64,
}

impl Revisioned for ExecutionStore {
    fn revision(&self) -> u64 {
        self.revision
    }
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full snapshot from a poll or an initial-state message.
    ///
    /// A finished run is frozen: a snapshot for the same execution only contributes
    /// finish metadata. A snapshot for a different execution replaces everything.
    pub fn replace(&mut self, raw: RawExecutionRecord) -> MergeOutcome {
        let incoming = ExecutionSummary::from_raw(&raw);
        if let Some(current) = &self.summary {
            if current.state.is_terminal() && current.execution_id == incoming.execution_id {
                return self.merge(&raw);
            }
        }
        self.log_transition(&incoming);
        self.raw = Some(raw);
        self.summary = Some(incoming);
        self.revision += 1;
        MergeOutcome::Applied
    }

    /// Shallow merge of a partial update onto the current row.
    pub fn merge(&mut self, partial: &RawExecutionRecord) -> MergeOutcome {
        let (Some(raw), Some(summary)) = (self.raw.as_mut(), self.summary.as_ref()) else {
            log::debug!("ExecutionStore: update without a loaded execution, dropped");
            return MergeOutcome::Dropped;
        };
        if partial.is_empty() {
            return MergeOutcome::Applied;
        }

        if summary.state.is_terminal() {
            let applied = raw.merge_keys(partial, execution_fields::FINISH_METADATA);
            if applied > 0 {
                self.summary = Some(ExecutionSummary::from_raw(raw));
                self.revision += 1;
            }
            return MergeOutcome::FinishMetadataOnly(applied);
        }

        raw.merge(partial);
        let next = ExecutionSummary::from_raw(raw);
        self.log_transition(&next);
        self.summary = Some(next);
        self.revision += 1;
        MergeOutcome::Applied
    }

    pub fn clear(&mut self) {
        if self.summary.is_none() && self.error.is_none() {
            return;
        }
        self.raw = None;
        self.summary = None;
        self.error = None;
        self.revision += 1;
    }

    pub fn set_error(&mut self, error: Option<String>) {
        if self.error != error {
            self.error = error;
            self.revision += 1;
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn summary(&self) -> Option<&ExecutionSummary> {
        self.summary.as_ref()
    }

    pub fn raw(&self) -> Option<&RawExecutionRecord> {
        self.raw.as_ref()
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.summary.as_ref().map(|s| s.execution_id.as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.summary.as_ref().is_some_and(|s| s.state.is_terminal())
    }

    pub fn overall_progress(&self) -> u32 {
        self.summary.as_ref().map_or(0, ExecutionSummary::overall_progress)
    }

    /// Wall time of the run: start to finish, or start to `now_ms` while it is still going.
    pub fn elapsed_ms(&self, now_ms: i64) -> Option<i64> {
        let summary = self.summary.as_ref()?;
        let start = summary.started_at?;
        let end = summary.finished_at.unwrap_or(now_ms);
        Some((end - start).max(0))
    }

    pub fn execution_phase(&self) -> ExecutionPhase {
        match self.summary.as_ref().map(|s| &s.state) {
            None => ExecutionPhase::Idle,
            Some(ExecutionState::Initializing) => ExecutionPhase::Initializing,
            Some(ExecutionState::Running) | Some(ExecutionState::Other(_)) => {
                ExecutionPhase::Running
            }
            Some(ExecutionState::Completed) => ExecutionPhase::Completed,
            Some(ExecutionState::Partial) => ExecutionPhase::Partial,
            Some(ExecutionState::Error) => ExecutionPhase::Error,
        }
    }

    fn log_transition(&self, next: &ExecutionSummary) {
        if !DF.log_execution_updates {
            return;
        }
        let prev_state = self.summary.as_ref().map(|s| &s.state);
        if prev_state != Some(&next.state) {
            log::info!(
                "Execution {}: {} -> {} ({}%)",
                next.execution_id,
                prev_state.map_or("-".to_string(), |s| s.to_string()),
                next.state,
                next.overall_progress()
            );
        }
    }
}
