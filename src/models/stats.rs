use {
    crate::{
        domain::{ExecutionSummary, FundStatus, STAGE_COUNT, StageId, StageState},
        models::NormalizedFund,
    },
    serde::Serialize,
};

/// Per-stage state counts across all funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageStats {
    pub stage: StageId,
    pub ok: usize,
    pub error: usize,
    pub warning: usize,
    pub running: usize,
    pub pending: usize,
    pub skipped: usize,
    pub not_applicable: usize,
    pub total: usize,
}

impl StageStats {
    fn empty(stage: StageId) -> Self {
        Self {
            stage,
            ok: 0,
            error: 0,
            warning: 0,
            running: 0,
            pending: 0,
            skipped: 0,
            not_applicable: 0,
            total: 0,
        }
    }

    pub fn completed(&self) -> usize {
        self.ok + self.error + self.warning
    }

    /// `round(100 * (ok + error + warning) / total)`, 0 for an empty stage.
    pub fn progress(&self) -> u32 {
        percent(self.completed(), self.total)
    }
}

/// Fund counts by overall status, with shares of the completed funds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GeneralStats {
    pub total: usize,
    pub ok: usize,
    pub error: usize,
    pub warning: usize,
    pub running: usize,
    pub pending: usize,
    pub partial: usize,
    pub skipped: usize,
    /// Ok + Error + Warning + Partial.
    pub completed: usize,
    pub success_pct: u32,
    pub error_pct: u32,
    pub warning_pct: u32,
}

impl GeneralStats {
    /// `round(100 * completed / total)`, 0 when there are no funds.
    pub fn completion_pct(&self) -> u32 {
        percent(self.completed, self.total)
    }

    fn with_percentages(mut self) -> Self {
        self.success_pct = percent(self.ok, self.completed);
        self.error_pct = percent(self.error, self.completed);
        self.warning_pct = percent(self.warning, self.completed);
        self
    }
}

/// A stage singled out by a count (most errors, most warnings, running funds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageCount {
    pub stage: StageId,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub all: usize,
    pub ok: usize,
    pub error: usize,
    pub warning: usize,
    pub running: usize,
    pub partial: usize,
}

pub(crate) fn percent(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (100.0 * part as f64 / whole as f64).round() as u32
}

pub fn stage_stats<'a>(
    funds: impl IntoIterator<Item = &'a NormalizedFund>,
) -> [StageStats; STAGE_COUNT] {
    let mut stats = StageId::ALL.map(StageStats::empty);
    for fund in funds {
        for (slot, stage) in stats.iter_mut().zip(&fund.stages) {
            slot.total += 1;
            match stage.state {
                StageState::Ok => slot.ok += 1,
                StageState::Error => slot.error += 1,
                StageState::Warning => slot.warning += 1,
                StageState::Running => slot.running += 1,
                StageState::Pending => slot.pending += 1,
                StageState::Skipped => slot.skipped += 1,
                StageState::NotApplicable => slot.not_applicable += 1,
                StageState::Other(_) => {}
            }
        }
    }
    stats
}

/// Counts by overall status. With no funds loaded yet, falls back to the execution's
/// own counters so the summary is not blank while the first snapshot is in flight.
pub fn general_stats<'a>(
    funds: impl IntoIterator<Item = &'a NormalizedFund>,
    execution: Option<&ExecutionSummary>,
) -> GeneralStats {
    let mut stats = GeneralStats::default();
    for fund in funds {
        stats.total += 1;
        match fund.overall_status {
            FundStatus::Ok => stats.ok += 1,
            FundStatus::Error => stats.error += 1,
            FundStatus::Warning => stats.warning += 1,
            FundStatus::Partial => stats.partial += 1,
            FundStatus::Running => stats.running += 1,
            FundStatus::Pending => stats.pending += 1,
            FundStatus::Skipped => stats.skipped += 1,
        }
        if fund.overall_status.is_finished() {
            stats.completed += 1;
        }
    }

    if stats.total == 0 {
        if let Some(exec) = execution {
            let ok = exec.success_count as usize;
            let error = exec.failed_count as usize;
            let warning = exec.warning_count as usize;
            stats = GeneralStats {
                total: exec.total_funds as usize,
                ok,
                error,
                warning,
                skipped: exec.skipped_count as usize,
                completed: ok + error + warning,
                ..GeneralStats::default()
            };
        }
    }

    stats.with_percentages()
}

pub fn stage_progress(stats: &[StageStats; STAGE_COUNT]) -> [u32; STAGE_COUNT] {
    stats.map(|s| s.progress())
}

/// First stage (pipeline order) holding the strictly highest error count; `None` if no errors.
pub fn stage_with_most_errors(stats: &[StageStats]) -> Option<StageCount> {
    stage_with_max(stats, |s| s.error)
}

pub fn stage_with_most_warnings(stats: &[StageStats]) -> Option<StageCount> {
    stage_with_max(stats, |s| s.warning)
}

fn stage_with_max(stats: &[StageStats], count: impl Fn(&StageStats) -> usize) -> Option<StageCount> {
    let mut best: Option<StageCount> = None;
    for s in stats {
        let n = count(s);
        if n > best.map_or(0, |b| b.count) {
            best = Some(StageCount { stage: s.stage, count: n });
        }
    }
    best
}

/// Stages with at least one fund currently running, in pipeline order.
pub fn active_stages(stats: &[StageStats]) -> Vec<StageCount> {
    stats
        .iter()
        .filter(|s| s.running > 0)
        .map(|s| StageCount {
            stage: s.stage,
            count: s.running,
        })
        .collect()
}

pub fn filter_counts<'a>(funds: impl IntoIterator<Item = &'a NormalizedFund>) -> FilterCounts {
    let mut counts = FilterCounts::default();
    for fund in funds {
        counts.all += 1;
        match fund.overall_status {
            FundStatus::Ok => counts.ok += 1,
            FundStatus::Error => counts.error += 1,
            FundStatus::Warning => counts.warning += 1,
            FundStatus::Running => counts.running += 1,
            FundStatus::Partial => counts.partial += 1,
            FundStatus::Pending | FundStatus::Skipped => {}
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RawRecord;
    use serde_json::{Value, json};

    fn fund(id: &str, states: [&str; STAGE_COUNT]) -> NormalizedFund {
        let mut v = json!({"ID_Fund": id});
        for (stage, s) in StageId::ALL.iter().zip(states) {
            v[stage.db_field()] = Value::from(s);
        }
        NormalizedFund::from_raw(&RawRecord::from_value(v).expect("object"))
    }

    fn sample() -> Vec<NormalizedFund> {
        vec![
            fund("1", ["OK"; STAGE_COUNT]),
            fund("2", ["OK", "ERROR", "PENDIENTE", "PENDIENTE", "PENDIENTE", "PENDIENTE", "PENDIENTE", "PENDIENTE"]),
            fund("3", ["OK", "OK", "EN_PROGRESO", "PENDIENTE", "PENDIENTE", "PENDIENTE", "PENDIENTE", "PENDIENTE"]),
            fund("4", ["OK", "WARNING", "OK", "OK", "N/A", "OK", "OMITIDO", "OK"]),
        ]
    }

    #[test]
    fn stage_counts_and_progress() {
        let funds = sample();
        let stats = stage_stats(&funds);
        assert_eq!(stats[0].ok, 4);
        assert_eq!(stats[0].progress(), 100);
        assert_eq!(stats[1].error, 1);
        assert_eq!(stats[1].warning, 1);
        assert_eq!(stats[2].running, 1);
        assert_eq!(stats[4].not_applicable, 1);
        assert_eq!(stats[6].skipped, 1);
        assert!(stats.iter().all(|s| s.total == 4));

        let progress = stage_progress(&stats);
        assert_eq!(progress[1], 100);
        assert_eq!(progress[2], 50);
        assert_eq!(progress[7], 50);
    }

    #[test]
    fn most_errors_warnings_and_active() {
        let funds = sample();
        let stats = stage_stats(&funds);
        let errors = stage_with_most_errors(&stats).expect("one error");
        assert_eq!(errors.stage, StageId::Validation);
        assert_eq!(errors.count, 1);
        assert_eq!(
            stage_with_most_warnings(&stats).map(|s| s.stage),
            Some(StageId::Validation)
        );
        let active = active_stages(&stats);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].stage, StageId::ProcessIpa);

        let clean = stage_stats(&funds[..1]);
        assert_eq!(stage_with_most_errors(&clean), None);
        assert!(active_stages(&clean).is_empty());
    }

    #[test]
    fn general_stats_and_percentages() {
        let funds = sample();
        let g = general_stats(&funds, None);
        assert_eq!(g.total, 4);
        assert_eq!((g.ok, g.error, g.running, g.warning), (1, 1, 1, 1));
        assert_eq!(g.completed, 3);
        assert_eq!(g.success_pct, 33);
        assert_eq!(g.error_pct, 33);
        assert_eq!(g.completion_pct(), 75);

        let counts = filter_counts(&funds);
        assert_eq!(counts.all, 4);
        assert_eq!(counts.warning, 1);
        assert_eq!(counts.partial, 0);
    }

    #[test]
    fn empty_map_falls_back_to_execution_counters() {
        let exec = ExecutionSummary {
            total_funds: 10,
            success_count: 6,
            failed_count: 2,
            ..ExecutionSummary::default()
        };
        let no_funds: Vec<NormalizedFund> = Vec::new();
        let g = general_stats(&no_funds, Some(&exec));
        assert_eq!(g.total, 10);
        assert_eq!(g.completed, 8);
        assert_eq!(g.success_pct, 75);
        assert_eq!(g.completion_pct(), 80);

        let none = general_stats(&no_funds, None);
        assert_eq!(none, GeneralStats::default());
        assert_eq!(none.completion_pct(), 0);
    }
}
