use {
    crate::{
        domain::{STAGE_COUNT, StageState},
        engine::{ExecutionPhase, PipelineMonitor},
        models::{ChangeInfo, GeneralStats, NormalizedFund, StageStats, stage_with_most_errors},
        utils::{format_duration, now_ms},
    },
    itertools::Itertools,
    tabled::{Table, Tabled, settings::Style},
};

#[derive(Tabled)]
struct FundRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Fund")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Stages")]
    stages: String,
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Error")]
    error: String,
}

#[derive(Tabled)]
struct StageRow {
    #[tabled(rename = "Stage")]
    stage: &'static str,
    #[tabled(rename = "OK")]
    ok: usize,
    #[tabled(rename = "Err")]
    error: usize,
    #[tabled(rename = "Warn")]
    warning: usize,
    #[tabled(rename = "Run")]
    running: usize,
    #[tabled(rename = "Pend")]
    pending: usize,
    #[tabled(rename = "%")]
    progress: u32,
}

/// One character per stage: `.` pending, `>` running, `+` ok, `x` error, `!` warning,
/// `-` skipped or not applicable, `?` unknown.
pub fn stage_glyphs(fund: &NormalizedFund) -> String {
    fund.stages
        .iter()
        .map(|s| match s.state {
            StageState::Pending => '.',
            StageState::Running => '>',
            StageState::Ok => '+',
            StageState::Error => 'x',
            StageState::Warning => '!',
            StageState::Skipped | StageState::NotApplicable => '-',
            StageState::Other(_) => '?',
        })
        .collect()
}

fn fund_row(fund: &NormalizedFund, now: i64) -> FundRow {
    let elapsed = fund.duration.or_else(|| fund.elapsed_ms(now));
    FundRow {
        id: fund.id.clone(),
        name: fund.short_name.clone(),
        status: fund.overall_status.to_string(),
        stages: stage_glyphs(fund),
        time: elapsed.map(format_duration).unwrap_or_default(),
        error: fund
            .error_info
            .as_ref()
            .map(|e| format!("[{}] {}", e.step, truncate(&e.message, 60)))
            .unwrap_or_default(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// The visible funds, in display order.
pub fn render_funds(monitor: &PipelineMonitor) -> String {
    let now = now_ms();
    let rows = monitor
        .visible_funds()
        .iter()
        .map(|f| fund_row(f, now))
        .collect_vec();
    if rows.is_empty() {
        return "(no funds match)".to_string();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_stage_stats(stats: &[StageStats; STAGE_COUNT]) -> String {
    let rows = stats.iter().map(|s| StageRow {
        stage: s.stage.label(),
        ok: s.ok,
        error: s.error,
        warning: s.warning,
        running: s.running,
        pending: s.pending,
        progress: s.progress(),
    });
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Single status line: phase, progress and counters.
pub fn render_header(monitor: &PipelineMonitor) -> String {
    let phase = monitor.execution().read(|e| e.execution_phase());
    let progress = monitor.execution().read(|e| e.overall_progress());
    let elapsed = monitor.execution().read(|e| e.elapsed_ms(now_ms()));
    let id = monitor
        .summary()
        .map(|s| s.execution_id)
        .unwrap_or_else(|| "-".to_string());
    let stats = monitor.general_stats();

    let mut line = format!(
        "Execution {} [{}] {}% | {}",
        id,
        phase,
        progress,
        counters(&stats)
    );
    if let Some(ms) = elapsed {
        line.push_str(&format!(" | {}", format_duration(ms)));
    }
    if phase == ExecutionPhase::Running {
        if let Some(worst) = stage_with_most_errors(&monitor.stage_stats()) {
            line.push_str(&format!(" | most errors: {} ({})", worst.stage.label(), worst.count));
        }
    }
    if let Some(err) = monitor.execution().read(|e| e.error().map(str::to_string)) {
        line.push_str(&format!(" | last error: {}", err));
    }
    line
}

fn counters(stats: &GeneralStats) -> String {
    format!(
        "{} funds: {} ok, {} err, {} warn, {} running, {} pending",
        stats.total, stats.ok, stats.error, stats.warning, stats.running, stats.pending
    )
}

/// One line per flagged fund, e.g. `~ 12 ALPHA  EN_PROGRESO -> ERROR [status, stages]`.
pub fn render_change(fund: &NormalizedFund, info: &ChangeInfo) -> String {
    let marker = if info.is_new { '+' } else { '~' };
    let fields = info.changed_fields.iter().map(|f| f.to_string()).join(", ");
    format!(
        "{} {} {}  {} {}  [{}]",
        marker,
        fund.id,
        fund.short_name,
        fund.overall_status,
        stage_glyphs(fund),
        fields
    )
}
