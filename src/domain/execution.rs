use {
    crate::{
        config::pipeline::execution_fields as f,
        domain::{RawExecutionRecord, StageId},
    },
    serde::{Deserialize, Serialize},
    std::fmt,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExecutionState {
    #[default]
    Initializing,
    Running,
    Completed,
    Partial,
    Error,
    /// Unrecognized backend state, carried upper-cased. Treated as non-terminal.
    Other(String),
}

impl ExecutionState {
    pub fn parse(raw: Option<&str>) -> Self {
        let normalized = match raw.map(str::trim) {
            None | Some("") => return Self::Initializing,
            Some(s) => s.to_uppercase(),
        };
        match normalized.as_str() {
            "INICIALIZANDO" => Self::Initializing,
            "EN_PROGRESO" => Self::Running,
            "COMPLETADO" => Self::Completed,
            "PARCIAL" => Self::Partial,
            "ERROR" => Self::Error,
            _ => Self::Other(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Initializing => "INICIALIZANDO",
            Self::Running => "EN_PROGRESO",
            Self::Completed => "COMPLETADO",
            Self::Partial => "PARCIAL",
            Self::Error => "ERROR",
            Self::Other(s) => s,
        }
    }

    /// Completed, Partial or Error.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Error)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view of one pipeline run, rebuilt from the raw execution row after every update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ExecutionSummary {
    pub execution_id: String,
    pub report_date: Option<String>,
    pub state: ExecutionState,
    pub current_stage: Option<StageId>,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub total_duration: Option<i64>,
    pub total_funds: u32,
    pub success_count: u32,
    pub failed_count: u32,
    pub warning_count: u32,
    pub skipped_count: u32,
}

impl ExecutionSummary {
    pub fn from_raw(raw: &RawExecutionRecord) -> Self {
        // Negative counts read as 0, oversized ones saturate.
        let count =
            |keys: &[&str]| raw.integer(keys).map_or(0, |n| u32::try_from(n.max(0)).unwrap_or(u32::MAX));
        Self {
            execution_id: raw.text(f::EXECUTION_ID).unwrap_or_default(),
            report_date: raw.text(f::REPORT_DATE),
            state: ExecutionState::parse(raw.text(f::STATE).as_deref()),
            current_stage: raw
                .text(f::CURRENT_STAGE)
                .and_then(|m| StageId::from_current_stage(&m)),
            started_at: raw.timestamp_ms(f::STARTED_AT),
            finished_at: raw.timestamp_ms(f::FINISHED_AT),
            total_duration: raw.integer(f::TOTAL_DURATION),
            total_funds: count(f::TOTAL_FUNDS),
            success_count: count(f::SUCCESS_COUNT),
            failed_count: count(f::FAILED_COUNT),
            warning_count: count(f::WARNING_COUNT),
            skipped_count: count(f::SKIPPED_COUNT),
        }
    }

    /// `round(100 * (success + failed) / total)`, 0 when there are no funds.
    pub fn overall_progress(&self) -> u32 {
        if self.total_funds == 0 {
            return 0;
        }
        let completed = (u64::from(self.success_count) + u64::from(self.failed_count)) as f64;
        (100.0 * completed / self.total_funds as f64).round() as u32
    }
}
