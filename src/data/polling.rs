use {
    crate::{
        config::{BACKEND, DF},
        data::{messages::PollResponse, provider::StatusSource},
        utils::now_ms,
    },
    serde::Serialize,
    std::{
        sync::{Arc, Mutex, MutexGuard, PoisonError},
        time::Duration,
    },
    tokio::{
        sync::watch,
        task::JoinHandle,
        time::{MissedTickBehavior, interval},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    pub interval: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(BACKEND.polling.interval_ms),
            max_consecutive_errors: BACKEND.polling.max_consecutive_errors,
        }
    }
}

/// Published after every state change of the poller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStatus {
    pub is_polling: bool,
    pub error_count: u32,
    pub last_error: Option<String>,
    /// Epoch ms of the last successful fetch.
    pub last_update: Option<i64>,
    pub max_errors_reached: bool,
}

/// Callbacks fired from the polling task, under the poller's lock: once `stop` returns
/// no callback of the stopped run can fire. Observers must not call back into the poller.
pub trait PollObserver: Send + Sync {
    fn on_update(&self, _response: &PollResponse) {}

    /// Fired once, after the update that carried a terminal execution state.
    fn on_complete(&self, _response: &PollResponse) {}

    fn on_error(&self, _error: &anyhow::Error, _consecutive: u32) {}
}

#[derive(Clone)]
struct PollTarget {
    execution_id: String,
    options: PollOptions,
    observer: Arc<dyn PollObserver>,
}

#[derive(Default)]
struct PollerState {
    /// Bumped on every start/stop. A task whose run id is no longer current must not
    /// touch the status or call back.
    run_id: u64,
    task: Option<JoinHandle<()>>,
    last_target: Option<PollTarget>,
}

/// Fixed-rate status poller. One immediate fetch on start, then one per interval.
/// Fetches are sequential: a slow fetch delays the next tick and missed ticks are skipped.
pub struct Poller {
    source: Arc<dyn StatusSource>,
    state: Arc<Mutex<PollerState>>,
    status: Arc<watch::Sender<PollStatus>>,
}

impl Poller {
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        let (status, _) = watch::channel(PollStatus::default());
        Self {
            source,
            state: Arc::new(Mutex::new(PollerState::default())),
            status: Arc::new(status),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> PollStatus {
        self.status.borrow().clone()
    }

    pub fn is_polling(&self) -> bool {
        self.status.borrow().is_polling
    }

    /// Starts polling. Returns `false` (and does nothing) when already polling.
    /// Must be called from within a tokio runtime.
    pub fn start(
        &self,
        execution_id: impl Into<String>,
        options: PollOptions,
        observer: Arc<dyn PollObserver>,
    ) -> bool {
        let target = PollTarget {
            execution_id: execution_id.into(),
            options,
            observer,
        };
        let mut state = lock(&self.state);
        if state.task.is_some() {
            return false;
        }
        self.launch(&mut state, target);
        true
    }

    fn launch(&self, state: &mut PollerState, target: PollTarget) {
        state.run_id += 1;
        let run_id = state.run_id;
        state.last_target = Some(target.clone());

        if DF.log_poll_ticks {
            log::info!(
                "Poller: starting for execution {} every {:?}",
                target.execution_id,
                target.options.interval
            );
        }
        self.status.send_replace(PollStatus {
            is_polling: true,
            ..PollStatus::default()
        });

        let run = PollRun {
            source: self.source.clone(),
            state: self.state.clone(),
            status: self.status.clone(),
            run_id,
        };
        state.task = Some(tokio::spawn(run.run(target)));
    }

    /// Idempotent. Safe before any start and after an auto-stop.
    pub fn stop(&self) {
        let mut state = lock(&self.state);
        Self::halt(&mut state, &self.status);
    }

    fn halt(state: &mut PollerState, status: &watch::Sender<PollStatus>) {
        let Some(task) = state.task.take() else {
            return;
        };
        state.run_id += 1;
        task.abort();
        status.send_modify(|s| s.is_polling = false);
        if DF.log_poll_ticks {
            log::info!("Poller: stopped");
        }
    }

    /// Stops, zeroes the error counter and restarts with the last target.
    /// Returns `false` when nothing was ever started.
    pub fn reset(&self) -> bool {
        let mut state = lock(&self.state);
        Self::halt(&mut state, &self.status);
        self.status.send_modify(|s| {
            s.error_count = 0;
            s.last_error = None;
            s.max_errors_reached = false;
        });
        match state.last_target.clone() {
            Some(target) => {
                self.launch(&mut state, target);
                true
            }
            None => false,
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}

fn lock(state: &Mutex<PollerState>) -> MutexGuard<'_, PollerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The spawned half of a poller run.
struct PollRun {
    source: Arc<dyn StatusSource>,
    state: Arc<Mutex<PollerState>>,
    status: Arc<watch::Sender<PollStatus>>,
    run_id: u64,
}

impl PollRun {
    fn is_current(&self) -> bool {
        lock(&self.state).run_id == self.run_id
    }

    /// Runs `f` only while this run is current, holding the lock so `stop` waits for it.
    fn deliver(&self, f: impl FnOnce()) -> bool {
        let state = lock(&self.state);
        if state.run_id != self.run_id {
            return false;
        }
        f();
        true
    }

    /// Ends this run from the inside. Returns `false` if it was already superseded.
    fn finish(&self, max_errors_reached: bool) -> bool {
        let mut state = lock(&self.state);
        if state.run_id != self.run_id {
            return false;
        }
        state.run_id += 1;
        // Dropping our own handle detaches; the task returns right after this.
        state.task = None;
        self.status.send_modify(|s| {
            s.is_polling = false;
            s.max_errors_reached = max_errors_reached;
        });
        true
    }

    async fn run(self, target: PollTarget) {
        let PollTarget {
            execution_id,
            options,
            observer,
        } = target;
        let mut ticker = interval(options.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut consecutive_errors = 0u32;

        loop {
            ticker.tick().await;
            if !self.is_current() {
                return;
            }
            if DF.log_poll_ticks {
                log::info!("Poller: fetching execution {}", execution_id);
            }

            let result = self.source.fetch_status(&execution_id).await;

            match result {
                Ok(response) => {
                    consecutive_errors = 0;
                    let delivered = self.deliver(|| {
                        self.status.send_modify(|s| {
                            s.error_count = 0;
                            s.last_error = None;
                            s.last_update = Some(now_ms());
                        });
                        observer.on_update(&response);
                    });
                    if !delivered {
                        return;
                    }

                    if response.is_terminal() {
                        if DF.log_poll_ticks {
                            log::info!("Poller: execution {} reached a terminal state", execution_id);
                        }
                        if self.finish(false) {
                            observer.on_complete(&response);
                        }
                        return;
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if !self.is_current() {
                        return;
                    }
                    log::warn!(
                        "Poller: fetch {} failed ({}/{}): {:#}",
                        execution_id,
                        consecutive_errors,
                        options.max_consecutive_errors,
                        e
                    );
                    let delivered = self.deliver(|| {
                        self.status.send_modify(|s| {
                            s.error_count = consecutive_errors;
                            s.last_error = Some(format!("{:#}", e));
                        });
                        observer.on_error(&e, consecutive_errors);
                    });
                    if !delivered {
                        return;
                    }

                    if consecutive_errors >= options.max_consecutive_errors {
                        log::error!(
                            "Poller: stopping after {} consecutive errors",
                            consecutive_errors
                        );
                        self.finish(true);
                        return;
                    }
                }
            }
        }
    }
}
