use {
    crate::{
        domain::{FundStatus, StageState, StageStatus},
        models::NormalizedFund,
    },
    serde::Serialize,
    std::{borrow::Borrow, collections::HashMap, hash::BuildHasher},
    strum_macros::{Display, EnumIter},
};

pub const ANIMATION_STATUS_MS: u64 = 800;
pub const ANIMATION_STAGE_MS: u64 = 500;
pub const ANIMATION_OTHER_MS: u64 = 300;

#[cfg(test)]
thread_local! {
    /// Counts full field walks, so tests can assert the hash short-circuit skipped them.
    pub(crate) static FIELD_WALKS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Scalar fields compared by the detailed walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumIter)]
pub enum FundField {
    #[strum(to_string = "status")]
    Status,
    #[strum(to_string = "hasError")]
    HasError,
    #[strum(to_string = "hasWarning")]
    HasWarning,
    #[strum(to_string = "isProcessing")]
    IsProcessing,
    #[strum(to_string = "startTime")]
    StartTime,
    #[strum(to_string = "endTime")]
    EndTime,
    #[strum(to_string = "duration")]
    Duration,
    #[strum(to_string = "flags")]
    Flags,
    #[strum(to_string = "names")]
    Names,
    #[strum(to_string = "errorInfo")]
    ErrorInfo,
}

/// What changed between two versions of the same fund. Ephemeral: consumed once, then dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeInfo {
    pub has_changes: bool,
    /// No previous version existed.
    pub is_new: bool,
    pub changed_fields: Vec<FundField>,
    /// Indices into `stages` whose state differs.
    pub changed_stages: Vec<usize>,
    pub status_changed: bool,
    pub stages_changed: bool,
    pub error_changed: bool,
    pub timing_changed: bool,
}

impl ChangeInfo {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn new_fund() -> Self {
        Self {
            has_changes: true,
            is_new: true,
            ..Self::default()
        }
    }
}

pub fn detect_changes(previous: Option<&NormalizedFund>, next: &NormalizedFund) -> ChangeInfo {
    let Some(prev) = previous else {
        return ChangeInfo::new_fund();
    };
    if prev.content_hash == next.content_hash {
        return ChangeInfo::unchanged();
    }

    #[cfg(test)]
    FIELD_WALKS.with(|c| c.set(c.get() + 1));

    let changed_fields = changed_fields(prev, next);
    let changed_stages = changed_stage_indices(&prev.stages, &next.stages);

    ChangeInfo {
        has_changes: true,
        is_new: false,
        status_changed: prev.overall_status != next.overall_status,
        stages_changed: !changed_stages.is_empty(),
        error_changed: prev.has_error != next.has_error
            || (next.has_error && prev.error_info != next.error_info),
        timing_changed: prev.start_time != next.start_time
            || prev.end_time != next.end_time
            || prev.duration != next.duration,
        changed_fields,
        changed_stages,
    }
}

fn changed_fields(prev: &NormalizedFund, next: &NormalizedFund) -> Vec<FundField> {
    let checks = [
        (FundField::Status, prev.overall_status != next.overall_status),
        (FundField::HasError, prev.has_error != next.has_error),
        (FundField::HasWarning, prev.has_warning != next.has_warning),
        (FundField::IsProcessing, prev.is_processing != next.is_processing),
        (FundField::StartTime, prev.start_time != next.start_time),
        (FundField::EndTime, prev.end_time != next.end_time),
        (FundField::Duration, prev.duration != next.duration),
        (FundField::Flags, prev.flags != next.flags),
        (
            FundField::Names,
            prev.display_name != next.display_name || prev.short_name != next.short_name,
        ),
        (FundField::ErrorInfo, prev.error_info != next.error_info),
    ];
    checks
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
}

fn changed_stage_indices(prev: &[StageStatus], next: &[StageStatus]) -> Vec<usize> {
    if prev.len() != next.len() {
        return Vec::new();
    }
    prev.iter()
        .zip(next)
        .enumerate()
        .filter(|(_, (a, b))| a.state != b.state)
        .map(|(i, _)| i)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
pub enum StageTransition {
    None,
    Started,
    Failed,
    Completed,
    Changed,
}

/// Classifies one stage's move. Failed is tested before Completed since Error is terminal too.
pub fn stage_transition(old: &StageState, new: &StageState) -> StageTransition {
    if old == new {
        StageTransition::None
    } else if *old == StageState::Pending && *new == StageState::Running {
        StageTransition::Started
    } else if *new == StageState::Error {
        StageTransition::Failed
    } else if !old.is_terminal() && new.is_terminal() {
        StageTransition::Completed
    } else {
        StageTransition::Changed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusChangeCounts {
    pub to_ok: usize,
    pub to_error: usize,
    pub to_warning: usize,
    pub to_running: usize,
}

/// Snapshot-to-snapshot summary of a batch update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeMetrics {
    pub total: usize,
    pub changed: usize,
    pub added: usize,
    pub removed: usize,
    pub stages_changed: usize,
    pub status_changes: StatusChangeCounts,
}

pub fn compute_change_metrics<V, S>(
    old: &HashMap<String, V, S>,
    new: &HashMap<String, V, S>,
) -> ChangeMetrics
where
    V: Borrow<NormalizedFund>,
    S: BuildHasher,
{
    let mut metrics = ChangeMetrics {
        total: new.len(),
        ..ChangeMetrics::default()
    };

    for (id, next) in new {
        let next: &NormalizedFund = next.borrow();
        let Some(prev) = old.get(id) else {
            metrics.added += 1;
            continue;
        };
        let prev: &NormalizedFund = prev.borrow();
        let changes = detect_changes(Some(prev), next);
        if changes.has_changes {
            metrics.changed += 1;
        }
        metrics.stages_changed += changes.changed_stages.len();
        if changes.status_changed {
            let counts = &mut metrics.status_changes;
            match next.overall_status {
                FundStatus::Ok => counts.to_ok += 1,
                FundStatus::Error => counts.to_error += 1,
                FundStatus::Warning => counts.to_warning += 1,
                FundStatus::Running => counts.to_running += 1,
                _ => {}
            }
        }
    }

    metrics.removed = old.keys().filter(|id| !new.contains_key(*id)).count();
    metrics
}

pub fn should_animate(change: &ChangeInfo) -> bool {
    change.has_changes && (change.status_changed || change.stages_changed)
}

/// Highlight length in ms: status changes longest, then stage changes, then anything else.
pub fn animation_duration(change: &ChangeInfo) -> u64 {
    if !change.has_changes {
        0
    } else if change.status_changed {
        ANIMATION_STATUS_MS
    } else if change.stages_changed {
        ANIMATION_STAGE_MS
    } else {
        ANIMATION_OTHER_MS
    }
}
