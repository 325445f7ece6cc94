use {
    serde::{Deserialize, Serialize},
    strum_macros::{Display, EnumIter},
};

/// Derived overall status of a fund. Never set directly; see `models::derive_overall_status`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter, Default,
)]
pub enum FundStatus {
    #[default]
    #[strum(to_string = "PENDIENTE")]
    Pending,
    #[strum(to_string = "EN_PROGRESO")]
    Running,
    #[strum(to_string = "OK")]
    Ok,
    #[strum(to_string = "WARNING")]
    Warning,
    #[strum(to_string = "ERROR")]
    Error,
    #[strum(to_string = "PARCIAL")]
    Partial,
    #[strum(to_string = "OMITIDO")]
    Skipped,
}

impl FundStatus {
    /// Backend ordinal, used for status sorting.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Ok => 2,
            Self::Warning => 3,
            Self::Error => 4,
            Self::Partial => 5,
            Self::Skipped => 6,
        }
    }

    /// Funds that reached an end state within the run (counted as "completed" in stats).
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Ok | Self::Error | Self::Warning | Self::Partial)
    }
}
