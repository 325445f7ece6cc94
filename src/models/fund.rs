use {
    crate::{
        config::pipeline::fields,
        domain::{
            FundFlags, FundStatus, RawFundRecord, RawRecord, STAGE_COUNT, StageId, StageState,
            StageStatus, SubStageStatus,
        },
    },
    serde::Serialize,
    serde_json::Value,
    std::fmt::Write,
};

const UNKNOWN_ERROR_STEP: &str = "Unknown";
const UNKNOWN_ERROR_MESSAGE: &str = "Error without message";
const UNNAMED_FUND: &str = "Unnamed";
const UNCODED_FUND: &str = "NO_CODE";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ErrorInfo {
    pub step: String,
    pub message: String,
}

/// Typed, change-detectable view of one fund's row in a pipeline run.
///
/// Built only through [`NormalizedFund::from_raw`] (or [`normalize`]), so the derived
/// fields (`overall_status`, the three booleans, `error_info`, `content_hash`) always
/// agree with `stages` and the raw error columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedFund {
    pub id: String,
    pub display_name: String,
    pub short_name: String,
    pub stages: [StageStatus; STAGE_COUNT],
    pub overall_status: FundStatus,
    pub has_error: bool,
    pub has_warning: bool,
    pub is_processing: bool,
    /// Present iff `has_error`.
    pub error_info: Option<ErrorInfo>,
    pub flags: FundFlags,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub duration: Option<i64>,
    pub content_hash: String,
}

impl NormalizedFund {
    /// Best-effort normalization. Missing or odd fields fall back to defaults; never fails.
    pub fn from_raw(raw: &RawFundRecord) -> Self {
        let stages = parse_stages(raw);
        let explicit_error =
            raw.text(fields::ERROR_MESSAGE).is_some() || raw.text(fields::ERROR_STEP).is_some();
        let overall_status = derive_overall_status(explicit_error, &stages);

        let has_error = overall_status == FundStatus::Error;
        let error_info = has_error.then(|| ErrorInfo {
            step: raw
                .text(fields::ERROR_STEP)
                .unwrap_or_else(|| UNKNOWN_ERROR_STEP.to_string()),
            message: raw
                .text(fields::ERROR_MESSAGE)
                .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string()),
        });

        let name = raw.text(fields::FUND_NAME);
        let short = raw.text(fields::FUND_SHORT_NAME);

        let id = raw.text(fields::FUND_ID).unwrap_or_else(|| {
            log::debug!("Fund record without {}, using empty id", fields::FUND_ID[0]);
            String::new()
        });

        let mut fund = Self {
            id,
            display_name: name
                .clone()
                .or_else(|| short.clone())
                .unwrap_or_else(|| UNNAMED_FUND.to_string()),
            short_name: short
                .or(name)
                .unwrap_or_else(|| UNCODED_FUND.to_string()),
            stages,
            overall_status,
            has_error,
            has_warning: overall_status == FundStatus::Warning,
            is_processing: overall_status == FundStatus::Running,
            error_info,
            flags: parse_flags(raw),
            start_time: raw.timestamp_ms(fields::START_TIME),
            end_time: raw.timestamp_ms(fields::END_TIME),
            duration: raw.integer(fields::DURATION_MS).filter(|d| *d != 0),
            content_hash: String::new(),
        };
        fund.content_hash = content_hash(&fund);
        fund
    }

    pub fn stage(&self, stage: StageId) -> &StageStatus {
        &self.stages[stage.index()]
    }

    /// Running time: explicit duration, else end - start, else now - start while running.
    pub fn elapsed_ms(&self, now_ms: i64) -> Option<i64> {
        if let Some(d) = self.duration {
            return Some(d);
        }
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).max(0)),
            (Some(start), None) if self.is_processing => Some((now_ms - start).max(0)),
            _ => None,
        }
    }
}

/// `None` only when there is no record at all.
pub fn normalize(raw: Option<&RawFundRecord>) -> Option<NormalizedFund> {
    raw.map(NormalizedFund::from_raw)
}

/// Normalizes a backend `fondos` array. Null entries are skipped.
pub fn normalize_all(values: &[Value]) -> Vec<NormalizedFund> {
    values
        .iter()
        .filter_map(|v| RawRecord::from_value(v.clone()))
        .map(|raw| NormalizedFund::from_raw(&raw))
        .collect()
}

fn parse_stages(raw: &RawFundRecord) -> [StageStatus; STAGE_COUNT] {
    StageId::ALL.map(|id| {
        let state = StageState::parse(raw.text(&[id.db_field()]).as_deref());
        StageStatus::new(id, state)
    })
}

fn parse_flags(raw: &RawFundRecord) -> FundFlags {
    let mut flags = FundFlags::empty();
    flags.set(FundFlags::REQUIRES_DERIVATIVES, raw.flag(fields::REQUIRES_DERIVATIVES));
    flags.set(FundFlags::SPECIAL_CLASS, raw.flag(fields::SPECIAL_CLASS));
    flags.set(FundFlags::REPROCESS_ELIGIBLE, raw.flag(fields::REPROCESS_ELIGIBLE));
    flags.set(FundFlags::SPECIAL_SOURCE, raw.flag(fields::SPECIAL_SOURCE));
    flags.set(FundFlags::INCLUDE_IN_CUBE, raw.flag(fields::INCLUDE_IN_CUBE));
    flags
}

/// Overall fund status from its stages, in fixed precedence:
/// explicit error, any Error, any Running, any Pending, Warning with some terminal stage,
/// all terminal (Ok), some terminal (Partial), otherwise Pending.
///
/// Skipped, NotApplicable and unrecognized states do not count toward any bucket, so a
/// fund whose stages are all skipped reads as Pending.
pub fn derive_overall_status(explicit_error: bool, stages: &[StageStatus]) -> FundStatus {
    if explicit_error {
        return FundStatus::Error;
    }

    let mut any_error = false;
    let mut any_warning = false;
    let mut any_running = false;
    let mut any_pending = false;
    let mut terminal = 0usize;

    for stage in stages {
        match stage.state {
            StageState::Error => {
                any_error = true;
                terminal += 1;
            }
            StageState::Warning => {
                any_warning = true;
                terminal += 1;
            }
            StageState::Ok => terminal += 1,
            StageState::Running => any_running = true,
            StageState::Pending => any_pending = true,
            StageState::Skipped | StageState::NotApplicable | StageState::Other(_) => {}
        }
    }

    if any_error {
        FundStatus::Error
    } else if any_running {
        FundStatus::Running
    } else if any_pending {
        FundStatus::Pending
    } else if any_warning && terminal > 0 {
        FundStatus::Warning
    } else if terminal == stages.len() {
        FundStatus::Ok
    } else if terminal > 0 {
        FundStatus::Partial
    } else {
        FundStatus::Pending
    }
}

/// Fingerprint of every semantic field of a fund (everything except the hash itself).
///
/// Each part is written as `<len>:<text>;`, so the encoding is injective even when a
/// pass-through state string contains separator characters: equal hashes mean equal funds.
pub fn content_hash(fund: &NormalizedFund) -> String {
    let mut h = String::with_capacity(160);
    let mut part = |s: &str| {
        let _ = write!(h, "{}:{};", s.len(), s);
    };
    let opt = |v: Option<i64>| v.map_or_else(|| "-".to_string(), |n| n.to_string());

    part(&fund.id);
    part(&fund.display_name);
    part(&fund.short_name);
    part(&fund.overall_status.to_string());
    for stage in &fund.stages {
        part(&stage.stage_id.to_string());
        part(stage.state.as_str());
    }
    part(if fund.has_error { "1" } else { "0" });
    part(if fund.has_warning { "1" } else { "0" });
    part(if fund.is_processing { "1" } else { "0" });
    match &fund.error_info {
        Some(e) => {
            part(&e.step);
            part(&e.message);
        }
        None => part("-"),
    }
    part(&fund.flags.bits().to_string());
    part(&opt(fund.start_time));
    part(&opt(fund.end_time));
    part(&opt(fund.duration));
    h
}

/// Sub-stage detail for one processing phase, `None` for stages without sub-stages.
pub fn parse_sub_stages(raw: &RawFundRecord, stage: StageId) -> Option<Vec<SubStageStatus>> {
    let defs = stage.sub_stage_defs();
    if defs.is_empty() {
        return None;
    }
    Some(
        defs.iter()
            .map(|def| SubStageStatus {
                key: def.key,
                label: def.label,
                order: def.order,
                state: StageState::parse(raw.text(&[def.key]).as_deref()),
            })
            .collect(),
    )
}

/// Sub-stages of all five processing phases, in pipeline order.
pub fn parse_all_sub_stages(raw: &RawFundRecord) -> Vec<(StageId, Vec<SubStageStatus>)> {
    StageId::ALL
        .iter()
        .filter_map(|&stage| parse_sub_stages(raw, stage).map(|subs| (stage, subs)))
        .collect()
}
