use std::time::Duration;

/// REST client settings for the status and action endpoints.
pub struct ApiConfig {
    pub base_url: &'static str,
    pub timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

/// Live event-stream settings.
pub struct WsConfig {
    pub path: &'static str,
    /// Reconnect delay per attempt. Attempts past the end reuse the last entry.
    pub reconnect_delays_ms: &'static [u64],
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval_ms: u64,
}

pub struct PollingConfig {
    pub interval_ms: u64,
    pub max_consecutive_errors: u32,
}

pub struct BackendConfig {
    pub api: ApiConfig,
    pub ws: WsConfig,
    pub polling: PollingConfig,
}

pub const BACKEND: BackendConfig = BackendConfig {
    api: ApiConfig {
        base_url: "http://localhost:3001/api",
        timeout_ms: 60_000, // heavy queries with many funds
        retries: 3,
        retry_delay_ms: 1000,
    },
    ws: WsConfig {
        path: "/api/ws/pipeline",
        reconnect_delays_ms: &[1000, 2000, 5000, 10_000, 30_000],
        max_reconnect_attempts: 10,
        heartbeat_interval_ms: 30_000,
    },
    polling: PollingConfig {
        interval_ms: 2000,
        max_consecutive_errors: 5,
    },
};

/// Runtime view of the REST settings, seeded from `BACKEND` and overridable from the CLI.
#[derive(Debug, Clone)]
pub struct BackendApiConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for BackendApiConfig {
    fn default() -> Self {
        Self {
            base_url: BACKEND.api.base_url.to_string(),
            timeout: Duration::from_millis(BACKEND.api.timeout_ms),
            retries: BACKEND.api.retries,
            retry_delay: Duration::from_millis(BACKEND.api.retry_delay_ms),
        }
    }
}

impl BackendApiConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Event-stream endpoint derived from the API base.
    /// `http://host:3001/api` becomes `ws://host:3001/api/ws/pipeline`.
    pub fn ws_url(&self) -> String {
        let base = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        let root = base.strip_suffix("/api").unwrap_or(&base);
        format!("{}{}", root, BACKEND.ws.path)
    }
}
