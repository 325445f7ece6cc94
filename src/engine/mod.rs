mod core;
mod execution_store;
mod fund_store;
mod ui_state;

pub use {
    core::PipelineMonitor,
    execution_store::{ExecutionPhase, ExecutionStore, MergeOutcome},
    fund_store::{ChangeFlag, FundStore},
    ui_state::UiState,
};
