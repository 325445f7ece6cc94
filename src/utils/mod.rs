mod perf;
mod time_utils;

pub use perf::report_slow_stage;
pub use time_utils::{
    MS_IN_H, MS_IN_MIN, MS_IN_S, epoch_ms_to_utc, format_duration, now_ms, parse_timestamp_ms,
};
