use std::time::Duration;

/// Runs `$body` and, when `LOG_PERFORMANCE` is on, reports it under the `$scope` log
/// target if it overran `$budget_micros`. Evaluates to the body's value.
#[macro_export]
macro_rules! trace_time {
    ($scope:expr, $stage:expr, $budget_micros:expr, $body:expr) => {{
        if $crate::config::LOG_PERFORMANCE {
            let started = std::time::Instant::now();
            let value = $body;
            $crate::utils::report_slow_stage($scope, $stage, started.elapsed(), $budget_micros);
            value
        } else {
            $body
        }
    }};
}

/// Warns when `elapsed` exceeds the stage budget. Returns whether it did.
pub fn report_slow_stage(scope: &str, stage: &str, elapsed: Duration, budget_micros: u64) -> bool {
    let micros = elapsed.as_micros();
    if micros <= u128::from(budget_micros) {
        return false;
    }
    log::warn!(
        target: scope,
        "{} over budget: {:.3}ms (budget {:.3}ms, {} build)",
        stage,
        micros as f64 / 1000.0,
        budget_micros as f64 / 1000.0,
        if cfg!(debug_assertions) { "debug" } else { "release" }
    );
    true
}
