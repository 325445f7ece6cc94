// Domain types and value objects
mod execution;
mod flags;
mod raw;
mod stage;
mod status;

// Re-export commonly used types to the world
pub use execution::{ExecutionState, ExecutionSummary};
pub use flags::FundFlags;
pub use raw::{RawExecutionRecord, RawFundRecord, RawRecord};
pub use stage::{STAGE_COUNT, StageId, StageState, StageStatus, SubStageStatus};
pub use status::FundStatus;
