mod change;
mod filters;
mod fund;
mod stats;

#[cfg(test)]
pub(crate) use change::FIELD_WALKS;

pub use {
    change::{
        ANIMATION_OTHER_MS, ANIMATION_STAGE_MS, ANIMATION_STATUS_MS, ChangeInfo, ChangeMetrics,
        FundField, StageTransition, StatusChangeCounts, animation_duration, compute_change_metrics,
        detect_changes, should_animate, stage_transition,
    },
    filters::{FundFilter, SortDirection, SortKey, StatusFilter, filtered_and_sorted},
    fund::{
        ErrorInfo, NormalizedFund, content_hash, derive_overall_status, normalize, normalize_all,
        parse_all_sub_stages, parse_sub_stages,
    },
    stats::{
        FilterCounts, GeneralStats, StageCount, StageStats, active_stages, filter_counts,
        general_stats, stage_progress, stage_stats, stage_with_most_errors,
        stage_with_most_warnings,
    },
};
