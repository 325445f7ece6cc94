//! Debugging feature flags.

#[allow(dead_code)]
pub struct LogFlags {
    /// Log every poll tick (fetch start, fund count, terminal detection).
    pub log_poll_ticks: bool,

    /// Log every inbound stream frame and connection lifecycle transition.
    pub log_stream_frames: bool,

    /// Log store mutations (batch sizes, change-set sizes).
    pub log_store_updates: bool,

    /// Log execution summary merges.
    pub log_execution_updates: bool,

    /// Log launch / reprocess actions.
    pub log_actions: bool,
}

pub const DF: LogFlags = LogFlags {
    log_poll_ticks: false,
    log_stream_frames: false,
    log_store_updates: false,
    log_execution_updates: true,
    log_actions: true,
};

/// Enables `trace_time!` stage budgets (snapshot normalization in the fund store).
pub const LOG_PERFORMANCE: bool = false;
