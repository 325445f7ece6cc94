use {
    crate::{
        config::{DF, pipeline::{execution_fields, fields}},
        data::{
            ExecutionLauncher, LaunchReceipt, PollObserver, PollResponse, StreamError,
            StreamHandler, StreamMessage,
        },
        domain::{ExecutionSummary, RawExecutionRecord, RawFundRecord, RawRecord, StageId, SubStageStatus},
        engine::{
            execution_store::{ExecutionStore, MergeOutcome},
            fund_store::FundStore,
            ui_state::UiState,
        },
        models::{
            ChangeInfo, ChangeMetrics, FilterCounts, GeneralStats, NormalizedFund, StageStats,
            filter_counts, filtered_and_sorted, general_stats, parse_sub_stages, stage_stats,
        },
        shared::Observable,
        trace_time,
        utils::now_ms,
    },
    anyhow::{Result, anyhow},
    chrono::NaiveDate,
    serde_json::Value,
    std::{
        collections::HashMap,
        sync::{Arc, Mutex, MutexGuard, PoisonError},
    },
};

/// Live view of one pipeline execution.
///
/// Both channels (poller and stream) feed the same three containers: funds, execution
/// and presentation state. Each container notifies its own subscribers, so fund churn
/// never wakes UI-only consumers.
pub struct PipelineMonitor {
    funds: Observable<FundStore>,
    execution: Observable<ExecutionStore>,
    ui: Observable<UiState>,
    /// Last full raw row per fund. Partial FUND_UPDATE frames are merged onto these.
    raw_cache: Mutex<HashMap<String, RawFundRecord>>,
    launcher: Option<Arc<dyn ExecutionLauncher>>,
}

impl Default for PipelineMonitor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PipelineMonitor {
    pub fn new(launcher: Option<Arc<dyn ExecutionLauncher>>) -> Self {
        Self {
            funds: Observable::new(FundStore::new()),
            execution: Observable::new(ExecutionStore::new()),
            ui: Observable::new(UiState::new()),
            raw_cache: Mutex::new(HashMap::new()),
            launcher,
        }
    }

    pub fn funds(&self) -> &Observable<FundStore> {
        &self.funds
    }

    pub fn execution(&self) -> &Observable<ExecutionStore> {
        &self.execution
    }

    pub fn ui(&self) -> &Observable<UiState> {
        &self.ui
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<String, RawFundRecord>> {
        self.raw_cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Ingestion ---

    /// Applies a full snapshot (poll response or INITIAL_STATE).
    ///
    /// The fund map is replaced only when the payload carried a fund list; the execution
    /// only when it carried an execution row.
    pub fn apply_snapshot(&self, response: &PollResponse) -> Option<ChangeMetrics> {
        if let Some(execution) = &response.execution {
            self.execution.update(|store| {
                store.replace(execution.clone());
                store.set_error(None);
            });
        }

        let rows = response.funds.as_ref()?;
        let (keyed, unkeyed): (Vec<RawFundRecord>, Vec<RawFundRecord>) = rows
            .iter()
            .filter_map(|v| RawRecord::from_value(v.clone()))
            .partition(|raw| raw.text(fields::FUND_ID).is_some());
        if !unkeyed.is_empty() {
            log::warn!("Snapshot: {} fund row(s) without ID_Fund, dropped", unkeyed.len());
        }
        let normalized: Vec<NormalizedFund> = trace_time!(
            "fund_store",
            "normalize snapshot",
            5_000,
            keyed.iter().map(NormalizedFund::from_raw).collect()
        );

        // The cache guard doubles as the ingestion lock: held until the store is updated.
        let mut cache = self.cache();
        cache.clear();
        for (raw, fund) in keyed.into_iter().zip(&normalized) {
            cache.insert(fund.id.clone(), raw);
        }
        Some(self.funds.update(|store| store.upsert_many(normalized)))
    }

    /// Merges a partial fund row onto the cached raw row and re-normalizes.
    /// Unknown funds are added. Returns `None` when nothing visible changed.
    pub fn apply_fund_update(&self, partial: &RawFundRecord) -> Option<ChangeInfo> {
        let Some(id) = partial.text(fields::FUND_ID) else {
            log::warn!("FUND_UPDATE without ID_Fund, dropped");
            return None;
        };
        let mut cache = self.cache();
        let raw = cache.entry(id).or_default();
        raw.merge(partial);
        let fund = NormalizedFund::from_raw(raw);
        self.funds.update(|store| store.upsert_one(fund))
    }

    pub fn apply_execution_update(&self, partial: &RawExecutionRecord) -> MergeOutcome {
        self.execution.update(|store| store.merge(partial))
    }

    /// Completion frames imply `COMPLETADO` unless they carry their own state.
    pub fn apply_execution_complete(&self, partial: &RawExecutionRecord) -> MergeOutcome {
        let mut completion = RawRecord::new();
        if let Some(state_key) = execution_fields::STATE.first() {
            completion.insert(*state_key, Value::from("COMPLETADO"));
        }
        completion.merge(partial);
        self.apply_execution_update(&completion)
    }

    pub fn handle_stream_message(&self, message: StreamMessage) {
        match message {
            StreamMessage::InitialState(snapshot) => {
                self.apply_snapshot(&snapshot);
            }
            StreamMessage::FundUpdate(partial) => {
                self.apply_fund_update(&partial);
            }
            StreamMessage::ExecutionUpdate(partial) => {
                if self.apply_execution_update(&partial) == MergeOutcome::Dropped {
                    log::warn!("EXECUTION_UPDATE before any execution was loaded, dropped");
                }
            }
            StreamMessage::ExecutionComplete(partial) => {
                if self.apply_execution_complete(&partial) == MergeOutcome::Dropped {
                    log::warn!("EXECUTION_COMPLETE before any execution was loaded, dropped");
                }
            }
            StreamMessage::Connected { client_id } => {
                log::info!("Stream connected (client {})", client_id.as_deref().unwrap_or("?"));
            }
            StreamMessage::Subscribed { execution_id } => {
                log::info!(
                    "Subscribed to execution {}",
                    execution_id.as_deref().unwrap_or("?")
                );
            }
            StreamMessage::Pong => {}
            StreamMessage::Error(e) => log::error!("Server reported: {}", e),
        }
    }

    /// Forgets everything: funds, execution, raw rows and presentation state.
    pub fn reset(&self) {
        self.cache().clear();
        self.funds.update(FundStore::clear);
        self.execution.update(ExecutionStore::clear);
        self.ui.update(UiState::reset);
    }

    pub fn expire_change_flags(&self, max_age_ms: i64) -> usize {
        self.funds
            .update(|store| store.expire_change_flags(now_ms(), max_age_ms))
    }

    // --- Selectors ---

    pub fn fund(&self, id: &str) -> Option<Arc<NormalizedFund>> {
        self.funds.read(|store| store.get(id).cloned())
    }

    pub fn raw_fund(&self, id: &str) -> Option<RawFundRecord> {
        self.cache().get(id).cloned()
    }

    pub fn sub_stages(&self, id: &str, stage: StageId) -> Option<Vec<SubStageStatus>> {
        self.cache().get(id).and_then(|raw| parse_sub_stages(raw, stage))
    }

    pub fn summary(&self) -> Option<ExecutionSummary> {
        self.execution.read(|store| store.summary().cloned())
    }

    /// Ids of the funds to display, with the current filter and sorting applied.
    pub fn visible_fund_ids(&self) -> Vec<String> {
        let (filter, key, direction) = self
            .ui
            .read(|ui| (ui.filter().clone(), ui.sort_key(), ui.sort_direction()));
        self.funds.read(|store| {
            filtered_and_sorted(store.funds(), store.order(), &filter, key, direction)
        })
    }

    pub fn visible_funds(&self) -> Vec<Arc<NormalizedFund>> {
        let ids = self.visible_fund_ids();
        self.funds
            .read(|store| ids.iter().filter_map(|id| store.get(id).cloned()).collect())
    }

    pub fn stage_stats(&self) -> [StageStats; crate::domain::STAGE_COUNT] {
        self.funds.read(|store| stage_stats(store.iter()))
    }

    pub fn general_stats(&self) -> GeneralStats {
        let summary = self.summary();
        self.funds
            .read(|store| general_stats(store.iter(), summary.as_ref()))
    }

    pub fn filter_counts(&self) -> FilterCounts {
        self.funds.read(|store| filter_counts(store.iter()))
    }

    pub fn failed_fund_ids(&self) -> Vec<String> {
        self.funds.read(|store| {
            store
                .iter()
                .filter(|f| f.has_error)
                .map(|f| f.id.clone())
                .collect()
        })
    }

    /// Opens sub-stage detail for every errored fund.
    pub fn expand_errored_sub_stages(&self) -> usize {
        self.funds.read(|store| {
            self.ui
                .update(|ui| ui.expand_sub_stages_where(store.iter(), |f| f.has_error))
        })
    }

    pub fn expand_warning_sub_stages(&self) -> usize {
        self.funds.read(|store| {
            self.ui
                .update(|ui| ui.expand_sub_stages_where(store.iter(), |f| f.has_warning))
        })
    }

    pub fn expand_processing_sub_stages(&self) -> usize {
        self.funds.read(|store| {
            self.ui
                .update(|ui| ui.expand_sub_stages_where(store.iter(), |f| f.is_processing))
        })
    }

    // --- Actions ---

    fn launcher(&self) -> Result<&Arc<dyn ExecutionLauncher>> {
        self.launcher
            .as_ref()
            .ok_or_else(|| anyhow!("no backend configured for actions"))
    }

    fn current_execution_id(&self) -> Result<String> {
        self.execution
            .read(|store| store.execution_id().map(str::to_string))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("no execution loaded"))
    }

    /// Starts a new run. On success the monitor switches to it; on failure nothing changes.
    pub async fn launch(&self, report_date: NaiveDate) -> Result<LaunchReceipt> {
        let receipt = self.launcher()?.launch(report_date).await?;
        if DF.log_actions {
            log::info!(
                "Launched execution {} for {}",
                receipt.execution_id,
                report_date
            );
        }
        self.cache().clear();
        self.funds.update(FundStore::clear);
        self.execution.update(|store| {
            store.replace(receipt.execution.clone());
            store.set_error(None);
        });
        Ok(receipt)
    }

    pub async fn reprocess(&self, fund_id: &str) -> Result<Value> {
        let execution_id = self.current_execution_id()?;
        let response = self
            .launcher()?
            .reprocess_fund(&execution_id, fund_id)
            .await?;
        if DF.log_actions {
            log::info!("Reprocess requested for fund {} in execution {}", fund_id, execution_id);
        }
        Ok(response)
    }

    pub async fn reprocess_failed(&self) -> Result<Value> {
        let execution_id = self.current_execution_id()?;
        let response = self.launcher()?.reprocess_failed(&execution_id).await?;
        if DF.log_actions {
            log::info!("Reprocess requested for failed funds of execution {}", execution_id);
        }
        Ok(response)
    }
}

impl PollObserver for PipelineMonitor {
    fn on_update(&self, response: &PollResponse) {
        self.apply_snapshot(response);
    }

    fn on_complete(&self, response: &PollResponse) {
        if let Some(state) = response.execution_state() {
            log::info!("Execution finished: {}", state);
        }
    }

    fn on_error(&self, error: &anyhow::Error, consecutive: u32) {
        let message = format!("{:#}", error);
        if consecutive > 1 {
            log::debug!("Poll error #{}: {}", consecutive, message);
        }
        self.execution
            .update(|store| store.set_error(Some(message)));
    }
}

impl StreamHandler for PipelineMonitor {
    fn on_message(&self, message: StreamMessage) {
        self.handle_stream_message(message);
    }

    fn on_error(&self, error: &StreamError) {
        self.execution
            .update(|store| store.set_error(Some(error.to_string())));
    }
}
