#![allow(clippy::collapsible_if)]
#![allow(clippy::type_complexity)]

// Core modules
pub mod app;
pub mod config;
pub mod data;
pub mod domain;
pub mod engine;
pub mod models;
pub mod shared;
pub mod utils;

// Re-export commonly used types outside of crate (for main.rs and integration tests)
pub use app::App;
pub use config::{BACKEND, BackendApiConfig};
pub use data::{
    HttpBackend, PollObserver, PollOptions, PollResponse, Poller, SessionOptions, StreamChannel,
    StreamHandler, StreamMessage,
};
pub use engine::PipelineMonitor;

// CLI argument parsing
use {
    chrono::NaiveDate,
    clap::{Parser, ValueEnum},
    models::{SortKey, StatusFilter},
};

/// How snapshots reach the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ChannelMode {
    /// Fixed-interval polling of the status endpoint.
    #[default]
    Poll,
    /// Persistent event stream with incremental updates.
    Stream,
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Live monitor for the fund pipeline", long_about = None)]
pub struct Cli {
    /// Backend API base URL
    #[arg(long, default_value = BACKEND.api.base_url)]
    pub api_url: String,

    /// Execution to watch
    #[arg(long, short = 'e')]
    pub execution_id: Option<String>,

    /// Launch a new run for this report date (YYYY-MM-DD) and watch it
    #[arg(long, value_name = "DATE", conflicts_with = "execution_id")]
    pub launch: Option<NaiveDate>,

    /// Request a reprocess of one fund of the execution, then exit
    #[arg(long, value_name = "FUND_ID")]
    pub reprocess: Option<String>,

    /// Request a reprocess of every failed fund of the execution, then exit
    #[arg(long, default_value_t = false, conflicts_with = "reprocess")]
    pub reprocess_failed: bool,

    #[arg(long, value_enum, default_value_t = ChannelMode::Poll)]
    pub mode: ChannelMode,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = BACKEND.polling.interval_ms)]
    pub interval_ms: u64,

    /// Consecutive poll failures before polling stops
    #[arg(long, default_value_t = BACKEND.polling.max_consecutive_errors)]
    pub max_errors: u32,

    /// Only list funds in this state (all, ok, error, warning, running, partial)
    #[arg(long, default_value = "all")]
    pub status: StatusFilter,

    /// Case-insensitive match on fund name or id
    #[arg(long)]
    pub search: Option<String>,

    /// Sort key (arrival, fund-name, status, duration, start-time)
    #[arg(long, default_value = "fund-name")]
    pub sort: SortKey,

    /// Sort descending
    #[arg(long, default_value_t = false)]
    pub reverse: bool,

    /// Print one snapshot and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,
}

/// Entry point for the binary.
pub async fn run_app(args: Cli) -> anyhow::Result<()> {
    App::new(args)?.run().await
}
