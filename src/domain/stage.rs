use {
    crate::config::{
        PIPELINE_STAGES, SubStageDef,
        pipeline::{
            CAPM_SUB_STAGES, DERIVATIVES_SUB_STAGES, IPA_SUB_STAGES, PNL_SUB_STAGES, UBS_SUB_STAGES,
        },
    },
    serde::{Deserialize, Serialize},
    std::fmt,
    strum_macros::{Display, EnumIter},
};

/// One of the 8 top-level pipeline steps, in pipeline order.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    Ord,
    PartialOrd,
)]
pub enum StageId {
    #[strum(to_string = "EXTRACCION")]
    Extraction,
    #[strum(to_string = "VALIDACION")]
    Validation,
    #[strum(to_string = "PROCESS_IPA")]
    ProcessIpa,
    #[strum(to_string = "PROCESS_CAPM")]
    ProcessCapm,
    #[strum(to_string = "PROCESS_DERIVADOS")]
    ProcessDerivatives,
    #[strum(to_string = "PROCESS_PNL")]
    ProcessPnl,
    #[strum(to_string = "PROCESS_UBS")]
    ProcessUbs,
    #[strum(to_string = "CONCATENAR")]
    Consolidation,
}

pub const STAGE_COUNT: usize = 8;

impl StageId {
    pub const ALL: [StageId; STAGE_COUNT] = [
        StageId::Extraction,
        StageId::Validation,
        StageId::ProcessIpa,
        StageId::ProcessCapm,
        StageId::ProcessDerivatives,
        StageId::ProcessPnl,
        StageId::ProcessUbs,
        StageId::Consolidation,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Backend column holding this stage's status string.
    pub fn db_field(self) -> &'static str {
        PIPELINE_STAGES[self.index()].db_field
    }

    pub fn label(self) -> &'static str {
        PIPELINE_STAGES[self.index()].label
    }

    pub fn from_db_field(field: &str) -> Option<Self> {
        PIPELINE_STAGES
            .iter()
            .find(|def| def.db_field == field)
            .map(|def| def.id)
    }

    /// Maps the execution's `Etapa_Actual` marker onto a stage.
    /// Initialization and error markers have no stage.
    pub fn from_current_stage(marker: &str) -> Option<Self> {
        match marker.trim().to_uppercase().as_str() {
            "EXTRACCION" => Some(Self::Extraction),
            "VALIDACION" => Some(Self::Validation),
            "PROCESS_IPA" => Some(Self::ProcessIpa),
            "PROCESS_CAPM" => Some(Self::ProcessCapm),
            "PROCESS_DERIVADOS" => Some(Self::ProcessDerivatives),
            "PROCESS_PNL" => Some(Self::ProcessPnl),
            "PROCESS_UBS" => Some(Self::ProcessUbs),
            "CONCATENAR" | "FINALIZANDO" => Some(Self::Consolidation),
            _ => None,
        }
    }

    pub fn sub_stage_defs(self) -> &'static [SubStageDef] {
        match self {
            Self::ProcessIpa => IPA_SUB_STAGES,
            Self::ProcessCapm => CAPM_SUB_STAGES,
            Self::ProcessDerivatives => DERIVATIVES_SUB_STAGES,
            Self::ProcessPnl => PNL_SUB_STAGES,
            Self::ProcessUbs => UBS_SUB_STAGES,
            Self::Extraction | Self::Validation | Self::Consolidation => &[],
        }
    }

    pub fn has_sub_stages(self) -> bool {
        !self.sub_stage_defs().is_empty()
    }

    pub fn is_after(self, other: StageId) -> bool {
        self.index() > other.index()
    }
}

/// Status of a single stage or sub-stage.
///
/// Unknown backend strings are carried through upper-cased in `Other` so that new
/// backend states render instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum StageState {
    #[default]
    Pending,
    Running,
    Ok,
    Error,
    Warning,
    Skipped,
    NotApplicable,
    Other(String),
}

impl StageState {
    /// Case/whitespace-insensitive parse of a backend status string. Never fails.
    pub fn parse(raw: Option<&str>) -> Self {
        let normalized = match raw.map(str::trim) {
            None | Some("") => return Self::Pending,
            Some(s) => s.to_uppercase(),
        };

        match normalized.as_str() {
            "N/A" | "NA" => Self::NotApplicable,
            "OMITIDO" | "SKIP" => Self::Skipped,
            "PENDIENTE" => Self::Pending,
            "EN_PROGRESO" => Self::Running,
            "OK" => Self::Ok,
            "ERROR" => Self::Error,
            "WARNING" => Self::Warning,
            _ => Self::Other(normalized),
        }
    }

    /// Backend spelling.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDIENTE",
            Self::Running => "EN_PROGRESO",
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Skipped => "OMITIDO",
            Self::NotApplicable => "N/A",
            Self::Other(s) => s,
        }
    }

    /// Ok, Error or Warning: will not change further within a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Error | Self::Warning)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StageStatus {
    pub stage_id: StageId,
    pub state: StageState,
}

impl StageStatus {
    pub fn new(stage_id: StageId, state: StageState) -> Self {
        Self { stage_id, state }
    }

    pub fn index(&self) -> usize {
        self.stage_id.index()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubStageStatus {
    pub key: &'static str,
    pub label: &'static str,
    pub order: u8,
    pub state: StageState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        assert_eq!(StageState::parse(Some("  ok ")), StageState::Ok);
        assert_eq!(StageState::parse(Some("en_progreso")), StageState::Running);
        assert_eq!(StageState::parse(Some("n/a")), StageState::NotApplicable);
        assert_eq!(StageState::parse(Some("NA")), StageState::NotApplicable);
        assert_eq!(StageState::parse(Some("skip")), StageState::Skipped);
        assert_eq!(StageState::parse(Some("OMITIDO")), StageState::Skipped);
    }

    #[test]
    fn parse_missing_or_empty_is_pending() {
        assert_eq!(StageState::parse(None), StageState::Pending);
        assert_eq!(StageState::parse(Some("")), StageState::Pending);
        assert_eq!(StageState::parse(Some("   ")), StageState::Pending);
    }

    #[test]
    fn parse_passes_unknown_states_through() {
        let state = StageState::parse(Some(" standby "));
        assert_eq!(state, StageState::Other("STANDBY".to_string()));
        assert_eq!(state.as_str(), "STANDBY");
        assert!(!state.is_terminal());
    }

    #[test]
    fn stage_table_matches_enum_order() {
        for (i, stage) in StageId::iter().enumerate() {
            assert_eq!(stage.index(), i);
            assert_eq!(PIPELINE_STAGES[i].id, stage);
            assert_eq!(StageId::from_db_field(stage.db_field()), Some(stage));
        }
    }

    #[test]
    fn sub_stage_counts_per_phase() {
        let counts: Vec<usize> = StageId::ALL
            .iter()
            .map(|s| s.sub_stage_defs().len())
            .collect();
        assert_eq!(counts, vec![0, 0, 7, 3, 4, 5, 3, 0]);
        assert_eq!(counts.iter().sum::<usize>(), 22);
    }

    #[test]
    fn current_stage_marker_mapping() {
        assert_eq!(StageId::from_current_stage("FINALIZANDO"), Some(StageId::Consolidation));
        assert_eq!(StageId::from_current_stage("process_pnl"), Some(StageId::ProcessPnl));
        assert_eq!(StageId::from_current_stage("INICIALIZACION"), None);
        assert_eq!(StageId::from_current_stage("ERROR"), None);
        assert!(StageId::Consolidation.is_after(StageId::Extraction));
    }
}
