use {
    crate::{
        ChannelMode, Cli,
        app::report::{render_change, render_funds, render_header, render_stage_stats},
        config::BackendApiConfig,
        data::{
            ExecutionLauncher, HttpBackend, LinkState, PollOptions, Poller, SessionOptions, StatusSource,
            StreamChannel,
        },
        engine::PipelineMonitor,
        models::SortDirection,
    },
    anyhow::{Context, Result, anyhow},
    std::{sync::Arc, time::Duration},
};

/// Terminal front end: wires the backend, the monitor and one update channel together.
pub struct App {
    args: Cli,
    backend: Arc<HttpBackend>,
    monitor: Arc<PipelineMonitor>,
}

impl App {
    pub fn new(args: Cli) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(BackendApiConfig::with_base_url(
            args.api_url.clone(),
        ))?);
        let launcher: Arc<dyn ExecutionLauncher> = backend.clone();
        let monitor = Arc::new(PipelineMonitor::new(Some(launcher)));

        let direction = if args.reverse {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        let search = args.search.clone().unwrap_or_default();
        monitor.ui().update(|ui| {
            ui.set_status_filter(args.status);
            ui.set_search(search);
            ui.set_sorting(args.sort, direction);
        });

        Ok(Self {
            args,
            backend,
            monitor,
        })
    }

    pub fn monitor(&self) -> &Arc<PipelineMonitor> {
        &self.monitor
    }

    pub async fn run(self) -> Result<()> {
        let execution_id = match self.args.launch {
            Some(date) => {
                let receipt = self.monitor.launch(date).await?;
                println!("Launched execution {} for {}", receipt.execution_id, date);
                receipt.execution_id
            }
            None => self
                .args
                .execution_id
                .clone()
                .ok_or_else(|| anyhow!("either --execution-id or --launch is required"))?,
        };

        if self.args.reprocess.is_some() || self.args.reprocess_failed {
            return self.run_reprocess(&execution_id).await;
        }
        if self.args.once {
            self.fetch_once(&execution_id).await?;
            self.print_report();
            return Ok(());
        }

        match self.args.mode {
            ChannelMode::Poll => self.watch_polling(&execution_id).await,
            ChannelMode::Stream => self.watch_stream(&execution_id).await,
        }
    }

    async fn fetch_once(&self, execution_id: &str) -> Result<()> {
        let response = self
            .backend
            .fetch_status(execution_id)
            .await
            .with_context(|| format!("fetching execution {}", execution_id))?;
        self.monitor.apply_snapshot(&response);
        Ok(())
    }

    async fn run_reprocess(&self, execution_id: &str) -> Result<()> {
        // Actions address the loaded execution.
        self.fetch_once(execution_id).await?;
        let response = match &self.args.reprocess {
            Some(fund_id) => self.monitor.reprocess(fund_id).await?,
            None => {
                let failed = self.monitor.failed_fund_ids();
                println!("{} failed fund(s): {}", failed.len(), failed.join(", "));
                self.monitor.reprocess_failed().await?
            }
        };
        println!("{}", serde_json::to_string_pretty(&response)?);
        Ok(())
    }

    async fn watch_polling(&self, execution_id: &str) -> Result<()> {
        let poller = Poller::new(self.backend.clone());
        let mut poll_rx = poller.subscribe();
        let mut funds_rx = self.monitor.funds().subscribe();
        let mut execution_rx = self.monitor.execution().subscribe();

        let options = PollOptions {
            interval: Duration::from_millis(self.args.interval_ms),
            max_consecutive_errors: self.args.max_errors,
        };
        poller.start(execution_id, options, self.monitor.clone());

        loop {
            tokio::select! {
                changed = funds_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.print_changes();
                }
                changed = execution_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    println!("{}", render_header(&self.monitor));
                }
                changed = poll_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let status = poll_rx.borrow_and_update().clone();
                    if status.max_errors_reached {
                        log::error!(
                            "Polling stopped after {} consecutive errors: {}",
                            status.error_count,
                            status.last_error.as_deref().unwrap_or("unknown")
                        );
                    }
                    if !status.is_polling {
                        break;
                    }
                }
            }
        }

        poller.stop();
        self.print_report();
        Ok(())
    }

    async fn watch_stream(&self, execution_id: &str) -> Result<()> {
        let ws_url = BackendApiConfig::with_base_url(self.args.api_url.clone()).ws_url();
        let channel = StreamChannel::new(ws_url, SessionOptions::default());
        channel.set_handler(self.monitor.clone());
        channel.subscribe(execution_id);
        channel.connect();

        let mut link_rx = channel.watch_status();
        let mut funds_rx = self.monitor.funds().subscribe();
        let mut execution_rx = self.monitor.execution().subscribe();

        loop {
            tokio::select! {
                changed = funds_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.print_changes();
                }
                changed = execution_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    println!("{}", render_header(&self.monitor));
                    if self.monitor.execution().read(|e| e.is_complete()) {
                        break;
                    }
                }
                changed = link_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let link = link_rx.borrow_and_update().clone();
                    log::info!("Stream link: {:?} (attempt {})", link.state, link.reconnect_attempts);
                    if link.state == LinkState::GaveUp {
                        break;
                    }
                }
            }
        }

        channel.disconnect();
        self.print_report();
        Ok(())
    }

    /// Prints flagged funds in arrival order, then clears the flags.
    fn print_changes(&self) {
        let lines = self.monitor.funds().read(|store| {
            store
                .order()
                .iter()
                .filter_map(|id| {
                    let flag = store.change_info(id)?;
                    let fund = store.get(id)?;
                    Some(render_change(fund, &flag.info))
                })
                .collect::<Vec<_>>()
        });
        if lines.is_empty() {
            return;
        }
        for line in &lines {
            println!("{}", line);
        }
        self.monitor.funds().update(|store| store.clear_change_flags());
    }

    fn print_report(&self) {
        println!("{}", render_header(&self.monitor));
        println!("{}", render_stage_stats(&self.monitor.stage_stats()));
        println!("{}", render_funds(&self.monitor));
        let (key, direction) = self
            .monitor
            .ui()
            .read(|ui| (ui.sort_key(), ui.sort_direction()));
        log::debug!("Sorted by {} ({})", key, direction);
    }
}
