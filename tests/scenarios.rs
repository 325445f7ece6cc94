use {
    pipeline_monitor::{
        PipelineMonitor, PollResponse, StreamMessage,
        domain::{FundStatus, StageState},
        engine::ExecutionPhase,
        models::{ErrorInfo, SortDirection, SortKey, StatusFilter},
    },
    serde_json::{Value, json},
};

const STAGE_COLUMNS: [&str; 8] = [
    "Estado_Extraccion",
    "Estado_Validacion",
    "Estado_Process_IPA",
    "Estado_Process_CAPM",
    "Estado_Process_Derivados",
    "Estado_Process_PNL",
    "Estado_Process_UBS",
    "Estado_Concatenar",
];

fn fund_row(id: u32, name: &str, states: [&str; 8]) -> Value {
    let mut row = json!({"ID_Fund": id, "FundShortName": name});
    for (column, state) in STAGE_COLUMNS.iter().zip(states) {
        row[*column] = Value::from(state);
    }
    row
}

fn snapshot(funds: Vec<Value>) -> PollResponse {
    PollResponse::from_body(json!({
        "ejecucion": {"ID_Ejecucion": 11, "Estado": "EN_PROGRESO", "TotalFondos": funds.len()},
        "fondos": funds,
    }))
    .expect("snapshot")
}

fn frame(kind: &str, data: Value) -> StreamMessage {
    StreamMessage::parse(&json!({"type": kind, "data": data}).to_string()).expect("frame")
}

#[test]
fn extraction_done_and_validation_running_is_a_running_fund() {
    let monitor = PipelineMonitor::default();
    let mut states = ["PENDIENTE"; 8];
    states[0] = "OK";
    states[1] = "EN_PROGRESO";
    monitor.apply_snapshot(&snapshot(vec![fund_row(1, "ALPHA", states)]));

    let fund = monitor.fund("1").expect("fund");
    assert_eq!(fund.overall_status, FundStatus::Running);
    assert!(fund.is_processing);
    assert!(!fund.has_error);
    assert_eq!(fund.stages.len(), 8);
    assert_eq!(fund.stages[1].state, StageState::Running);
}

#[test]
fn explicit_error_overrides_all_ok_stages() {
    let monitor = PipelineMonitor::default();
    let mut row = fund_row(2, "BETA", ["OK"; 8]);
    row["Mensaje_Error"] = json!("timeout");
    row["Paso_Con_Error"] = json!("VALIDACION");
    monitor.apply_snapshot(&snapshot(vec![row]));

    let fund = monitor.fund("2").expect("fund");
    assert_eq!(fund.overall_status, FundStatus::Error);
    assert!(fund.has_error);
    assert_eq!(
        fund.error_info,
        Some(ErrorInfo {
            step: "VALIDACION".to_string(),
            message: "timeout".to_string(),
        })
    );
    assert_eq!(monitor.failed_fund_ids(), vec!["2".to_string()]);
}

#[test]
fn unfiltered_view_keeps_arrival_order() {
    let monitor = PipelineMonitor::default();
    monitor
        .ui()
        .update(|ui| ui.set_sorting(SortKey::Arrival, SortDirection::Asc));
    monitor.apply_snapshot(&snapshot(vec![
        fund_row(30, "ZETA", ["OK"; 8]),
        fund_row(10, "ALPHA", ["ERROR"; 8]),
        fund_row(20, "MU", ["PENDIENTE"; 8]),
    ]));
    // Later arrivals go to the end, known ids keep their place.
    monitor.handle_stream_message(frame("FUND_UPDATE", json!({"ID_Fund": 5, "FundShortName": "NEW"})));
    monitor.handle_stream_message(frame(
        "FUND_UPDATE",
        json!({"ID_Fund": 30, "Estado_Concatenar": "ERROR"}),
    ));

    let expected: Vec<String> = ["30", "10", "20", "5"].map(String::from).to_vec();
    assert_eq!(monitor.visible_fund_ids(), expected);
    assert_eq!(monitor.funds().read(|s| s.order().to_vec()), expected);
}

#[test]
fn filters_and_sorting_reorder_the_view_only() {
    let monitor = PipelineMonitor::default();
    monitor.apply_snapshot(&snapshot(vec![
        fund_row(1, "CHARLIE", ["OK"; 8]),
        fund_row(2, "alpha", ["ERROR"; 8]),
        fund_row(3, "Bravo", ["OK"; 8]),
    ]));
    let funds_revision = monitor.funds().revision();

    // Sorted by name from the start.
    assert_eq!(monitor.visible_fund_ids(), ["2", "3", "1"].map(String::from).to_vec());
    monitor.ui().update(|ui| ui.update_sorting(SortKey::Status));
    monitor.ui().update(|ui| ui.update_sorting(SortKey::Status));
    monitor.ui().update(|ui| ui.update_sorting(SortKey::FundName));
    assert_eq!(
        monitor.ui().read(|ui| ui.sort_direction()),
        SortDirection::Asc
    );
    assert_eq!(monitor.visible_fund_ids(), ["2", "3", "1"].map(String::from).to_vec());

    monitor.ui().update(|ui| ui.update_sorting(SortKey::FundName));
    assert_eq!(
        monitor.ui().read(|ui| ui.sort_direction()),
        SortDirection::Desc
    );
    assert_eq!(monitor.visible_fund_ids(), ["1", "3", "2"].map(String::from).to_vec());

    monitor.ui().update(|ui| {
        ui.set_status_filter(StatusFilter::Ok);
        ui.set_search("brav");
    });
    assert_eq!(monitor.visible_fund_ids(), vec!["3".to_string()]);
    assert_eq!(monitor.funds().revision(), funds_revision, "ui changes leave funds alone");

    let counts = monitor.filter_counts();
    assert_eq!((counts.all, counts.ok, counts.error), (3, 2, 1));
}

#[test]
fn fund_churn_does_not_touch_ui_state() {
    let monitor = PipelineMonitor::default();
    let ui_revision = monitor.ui().revision();
    let mut ui_rx = monitor.ui().subscribe();

    monitor.apply_snapshot(&snapshot(vec![fund_row(1, "A", ["EN_PROGRESO"; 8])]));
    monitor.handle_stream_message(frame(
        "FUND_UPDATE",
        json!({"ID_Fund": 1, "Estado_Extraccion": "OK"}),
    ));

    assert_eq!(monitor.ui().revision(), ui_revision);
    assert!(!ui_rx.has_changed().expect("sender alive"));
}

#[test]
fn stream_session_of_one_execution() {
    let monitor = PipelineMonitor::default();
    monitor.handle_stream_message(frame(
        "INITIAL_STATE",
        json!({
            "ejecucion": {"ID_Ejecucion": 11, "Estado": "EN_PROGRESO", "TotalFondos": 2},
            "fondos": [
                {"ID_Fund": 1, "FundShortName": "A", "Estado_Extraccion": "EN_PROGRESO"},
                {"ID_Fund": 2, "FundShortName": "B", "Estado_Extraccion": "OK"}
            ]
        }),
    ));
    assert_eq!(
        monitor.execution().read(|e| e.execution_phase()),
        ExecutionPhase::Running
    );

    monitor.handle_stream_message(frame(
        "FUND_UPDATE",
        json!({"ID_Fund": 1, "Estado_Extraccion": "ERROR", "Mensaje_Error": "bad file"}),
    ));
    let fund = monitor.fund("1").expect("fund");
    assert_eq!(fund.overall_status, FundStatus::Error);
    // Fields absent from the partial frame survive the merge.
    assert_eq!(fund.short_name, "A");
    assert!(monitor.funds().read(|s| s.has_changes("1")));

    monitor.handle_stream_message(frame(
        "EXECUTION_UPDATE",
        json!({"FondosFallidos": 1, "Etapa_Actual": "VALIDACION"}),
    ));
    monitor.handle_stream_message(frame("EXECUTION_COMPLETE", json!({"FondosExitosos": 1})));

    assert_eq!(
        monitor.execution().read(|e| e.execution_phase()),
        ExecutionPhase::Completed
    );
    let summary = monitor.summary().expect("summary");
    assert_eq!(summary.execution_id, "11");

    // A late progress frame cannot reopen a finished run.
    monitor.handle_stream_message(frame("EXECUTION_UPDATE", json!({"Estado": "EN_PROGRESO"})));
    assert!(monitor.execution().read(|e| e.is_complete()));
}

#[test]
fn noise_frames_leave_the_state_alone() {
    let monitor = PipelineMonitor::default();
    monitor.apply_snapshot(&snapshot(vec![fund_row(1, "A", ["OK"; 8])]));
    let revisions = (monitor.funds().revision(), monitor.execution().revision());

    monitor.handle_stream_message(frame("PONG", Value::Null));
    monitor.handle_stream_message(frame("CONNECTED", json!({"clientId": "x"})));
    monitor.handle_stream_message(frame("SUBSCRIBED", json!({"ID_Ejecucion": 11})));
    assert!(StreamMessage::parse("{not json").is_err());
    assert!(StreamMessage::parse(r#"{"type":"MYSTERY"}"#).is_err());

    assert_eq!(
        (monitor.funds().revision(), monitor.execution().revision()),
        revisions
    );
}

#[test]
fn identical_snapshot_flags_nothing() {
    let monitor = PipelineMonitor::default();
    let rows = vec![fund_row(1, "A", ["OK"; 8]), fund_row(2, "B", ["EN_PROGRESO"; 8])];
    let first = monitor.apply_snapshot(&snapshot(rows.clone())).expect("metrics");
    assert_eq!(first.added, 2);

    monitor.funds().update(|s| s.clear_change_flags());
    let second = monitor.apply_snapshot(&snapshot(rows)).expect("metrics");
    assert_eq!(second.changed, 0);
    assert_eq!(second.added, 0);
    assert!(monitor.funds().read(|s| s.change_flags().is_empty()));
}
