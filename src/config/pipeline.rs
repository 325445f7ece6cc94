//! Static layout of the ETL pipeline: the 8 top-level stages and the sub-stages of the
//! five processing phases, keyed by the backend column that carries each status string.

use crate::domain::StageId;

pub struct StageDef {
    pub id: StageId,
    pub db_field: &'static str,
    pub label: &'static str,
}

pub struct SubStageDef {
    pub key: &'static str,
    pub label: &'static str,
    pub order: u8,
}

/// Pipeline order. `StageId as usize` indexes into this table.
pub const PIPELINE_STAGES: [StageDef; 8] = [
    StageDef {
        id: StageId::Extraction,
        db_field: "Estado_Extraccion",
        label: "Extracción",
    },
    StageDef {
        id: StageId::Validation,
        db_field: "Estado_Validacion",
        label: "Validación",
    },
    StageDef {
        id: StageId::ProcessIpa,
        db_field: "Estado_Process_IPA",
        label: "IPA",
    },
    StageDef {
        id: StageId::ProcessCapm,
        db_field: "Estado_Process_CAPM",
        label: "CAPM",
    },
    StageDef {
        id: StageId::ProcessDerivatives,
        db_field: "Estado_Process_Derivados",
        label: "Derivados",
    },
    StageDef {
        id: StageId::ProcessPnl,
        db_field: "Estado_Process_PNL",
        label: "PNL",
    },
    StageDef {
        id: StageId::ProcessUbs,
        db_field: "Estado_Process_UBS",
        label: "UBS",
    },
    StageDef {
        id: StageId::Consolidation,
        db_field: "Estado_Concatenar",
        label: "Cubo",
    },
];

pub const IPA_SUB_STAGES: &[SubStageDef] = &[
    SubStageDef { key: "Estado_IPA_01_RescatarLocalPrice", label: "Rescatar LocalPrice", order: 1 },
    SubStageDef { key: "Estado_IPA_02_AjusteSONA", label: "Ajuste SONA", order: 2 },
    SubStageDef { key: "Estado_IPA_03_RenombrarCxCCxP", label: "Renombrar CxC/CxP", order: 3 },
    SubStageDef { key: "Estado_IPA_04_TratamientoSuciedades", label: "Tratamiento Suciedades", order: 4 },
    SubStageDef { key: "Estado_IPA_05_EliminarCajasMTM", label: "Eliminar Cajas MTM", order: 5 },
    SubStageDef { key: "Estado_IPA_06_CrearDimensiones", label: "Crear Dimensiones", order: 6 },
    SubStageDef { key: "Estado_IPA_07_AgruparRegistros", label: "Agrupar Registros", order: 7 },
];

pub const CAPM_SUB_STAGES: &[SubStageDef] = &[
    SubStageDef { key: "Estado_CAPM_01_Ajuste", label: "Ajuste CAPM", order: 1 },
    SubStageDef { key: "Estado_CAPM_02_ExtractTransform", label: "Extract & Transform", order: 2 },
    SubStageDef { key: "Estado_CAPM_03_CargaFinal", label: "Carga Final", order: 3 },
];

pub const DERIVATIVES_SUB_STAGES: &[SubStageDef] = &[
    SubStageDef { key: "Estado_DERIV_01_Posiciones", label: "Posiciones Long/Short", order: 1 },
    SubStageDef { key: "Estado_DERIV_02_Dimensiones", label: "Dimensiones", order: 2 },
    SubStageDef { key: "Estado_DERIV_03_Ajuste", label: "Ajuste", order: 3 },
    SubStageDef { key: "Estado_DERIV_04_Paridad", label: "Paridad", order: 4 },
];

pub const PNL_SUB_STAGES: &[SubStageDef] = &[
    SubStageDef { key: "Estado_PNL_01_Dimensiones", label: "Dimensiones", order: 1 },
    SubStageDef { key: "Estado_PNL_02_Ajuste", label: "Ajuste", order: 2 },
    SubStageDef { key: "Estado_PNL_03_Agrupacion", label: "Agrupación", order: 3 },
    SubStageDef { key: "Estado_PNL_04_AjusteIPA", label: "Ajuste vs IPA", order: 4 },
    SubStageDef { key: "Estado_PNL_05_Consolidar", label: "Consolidar", order: 5 },
];

pub const UBS_SUB_STAGES: &[SubStageDef] = &[
    SubStageDef { key: "Estado_UBS_01_Tratamiento", label: "Tratamiento Fondos", order: 1 },
    SubStageDef { key: "Estado_UBS_02_Derivados", label: "Derivados MLCCII", order: 2 },
    SubStageDef { key: "Estado_UBS_03_Cartera", label: "Cartera MLCCII", order: 3 },
];

/// Raw fund columns. Each entry lists the backend spelling first, then accepted aliases.
pub mod fields {
    pub const FUND_ID: &[&str] = &["ID_Fund"];
    pub const FUND_NAME: &[&str] = &["FundName"];
    pub const FUND_SHORT_NAME: &[&str] = &["FundShortName"];
    pub const ERROR_STEP: &[&str] = &["Paso_Con_Error", "PasoError"];
    pub const ERROR_MESSAGE: &[&str] = &["Mensaje_Error", "MensajeError"];
    pub const START_TIME: &[&str] = &["Inicio_Procesamiento"];
    pub const END_TIME: &[&str] = &["Fin_Procesamiento"];
    pub const DURATION_MS: &[&str] = &["Duracion_Ms"];

    pub const REQUIRES_DERIVATIVES: &[&str] = &["Requiere_Derivados", "RequiereDerivados"];
    pub const SPECIAL_CLASS: &[&str] = &["Es_MLCCII", "EsMLCCII"];
    pub const REPROCESS_ELIGIBLE: &[&str] = &["Elegible_Reproceso", "ElegibleReproceso"];
    pub const SPECIAL_SOURCE: &[&str] = &["Flag_UBS", "FlagUBS"];
    pub const INCLUDE_IN_CUBE: &[&str] = &["Incluir_En_Cubo", "IncluirEnCubo"];
}

/// Raw execution columns.
pub mod execution_fields {
    pub const EXECUTION_ID: &[&str] = &["ID_Ejecucion"];
    pub const REPORT_DATE: &[&str] = &["FechaReporte"];
    pub const STATE: &[&str] = &["Estado"];
    pub const CURRENT_STAGE: &[&str] = &["Etapa_Actual"];
    pub const STARTED_AT: &[&str] = &["IniciadoEn", "FechaInicio"];
    pub const FINISHED_AT: &[&str] = &["FinalizadoEn", "FechaFin"];
    pub const TOTAL_FUNDS: &[&str] = &["TotalFondos"];
    pub const SUCCESS_COUNT: &[&str] = &["FondosExitosos"];
    pub const FAILED_COUNT: &[&str] = &["FondosFallidos"];
    pub const WARNING_COUNT: &[&str] = &["FondosWarning"];
    pub const SKIPPED_COUNT: &[&str] = &["FondosOmitidos"];
    pub const TOTAL_DURATION: &[&str] = &["DuracionTotal", "TiempoTotal_Segundos"];

    /// Keys a finished execution still accepts on merge.
    pub const FINISH_METADATA: &[&str] = &[
        "FinalizadoEn",
        "FechaFin",
        "DuracionTotal",
        "TiempoTotal_Segundos",
    ];
}
