use {
    crate::{
        config::{BACKEND, DF},
        data::messages::{FrameError, OutboundMessage, StreamMessage},
    },
    serde::Serialize,
    std::{fmt, time::Duration},
    strum_macros::Display,
};

/// Identity of one transport connection. Every connection gets a fresh id; events tagged
/// with an id that is no longer current are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Display)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting for the backoff delay before the next attempt.
    Reconnecting,
    /// Attempt budget exhausted. Only `connect`/`retry` leaves this state.
    GaveUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    Transport(String),
    GaveUp { attempts: u32 },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "stream transport error: {}", e),
            Self::GaveUp { attempts } => {
                write!(f, "could not connect after {} reconnection attempts", attempts)
            }
        }
    }
}

impl std::error::Error for StreamError {}

/// Side effects requested by the session. The driver performs them in order.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkAction {
    Open(ConnectionId),
    Close(ConnectionId),
    Send(ConnectionId, OutboundMessage),
    ScheduleReconnect { attempt: u32, delay: Duration },
    CancelReconnect,
    StartHeartbeat(ConnectionId),
    StopHeartbeat,
    Deliver(StreamMessage),
    Surface(StreamError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub reconnect_delays: Vec<Duration>,
    pub max_reconnect_attempts: u32,
    pub heartbeat_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            reconnect_delays: BACKEND
                .ws
                .reconnect_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            max_reconnect_attempts: BACKEND.ws.max_reconnect_attempts,
            heartbeat_interval: Duration::from_millis(BACKEND.ws.heartbeat_interval_ms),
        }
    }
}

impl SessionOptions {
    /// Backoff for the given zero-based attempt, capped at the last schedule entry.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let last = self.reconnect_delays.len().saturating_sub(1);
        self.reconnect_delays
            .get((attempt as usize).min(last))
            .copied()
            .unwrap_or(Duration::from_secs(1))
    }
}

/// Connection lifecycle, subscriptions and reconnection policy, without any I/O.
#[derive(Debug)]
pub struct StreamSession {
    options: SessionOptions,
    state: LinkState,
    /// False after a client-initiated disconnect: closes are then final.
    enabled: bool,
    current: Option<ConnectionId>,
    next_id: u64,
    attempts: u32,
    /// Insertion-ordered, replayed on every (re)connect.
    subscriptions: Vec<String>,
    last_error: Option<StreamError>,
}

impl Default for StreamSession {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl StreamSession {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            state: LinkState::Disconnected,
            enabled: false,
            current: None,
            next_id: 0,
            attempts: 0,
            subscriptions: Vec::new(),
            last_error: None,
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn current(&self) -> Option<ConnectionId> {
        self.current
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    pub fn last_error(&self) -> Option<&StreamError> {
        self.last_error.as_ref()
    }

    fn open_new(&mut self, actions: &mut Vec<LinkAction>) {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.current = Some(id);
        self.state = LinkState::Connecting;
        actions.push(LinkAction::Open(id));
    }

    fn is_current(&self, conn: ConnectionId) -> bool {
        self.current == Some(conn)
    }

    // --- Commands ---

    /// No-op while a connection is already open or opening.
    pub fn connect(&mut self) -> Vec<LinkAction> {
        self.enabled = true;
        let mut actions = Vec::new();
        match self.state {
            LinkState::Connecting | LinkState::Connected => {}
            LinkState::Reconnecting => {
                actions.push(LinkAction::CancelReconnect);
                self.open_new(&mut actions);
            }
            LinkState::GaveUp => {
                self.attempts = 0;
                self.last_error = None;
                self.open_new(&mut actions);
            }
            LinkState::Disconnected => self.open_new(&mut actions),
        }
        actions
    }

    /// Client-initiated close. Final: no reconnection follows.
    pub fn disconnect(&mut self) -> Vec<LinkAction> {
        self.enabled = false;
        let mut actions = Vec::new();
        if self.state == LinkState::Reconnecting {
            actions.push(LinkAction::CancelReconnect);
        }
        if let Some(conn) = self.current.take() {
            actions.push(LinkAction::StopHeartbeat);
            actions.push(LinkAction::Close(conn));
        }
        self.state = LinkState::Disconnected;
        self.attempts = 0;
        actions
    }

    /// Manual restart: drops whatever is in flight and opens a fresh connection with a
    /// clean attempt budget.
    pub fn retry(&mut self) -> Vec<LinkAction> {
        let mut actions = self.disconnect();
        self.last_error = None;
        actions.extend(self.connect());
        actions
    }

    pub fn subscribe(&mut self, execution_id: &str) -> Vec<LinkAction> {
        if self.subscriptions.iter().any(|s| s == execution_id) {
            return Vec::new();
        }
        self.subscriptions.push(execution_id.to_string());
        match (self.state, self.current) {
            (LinkState::Connected, Some(conn)) => vec![LinkAction::Send(
                conn,
                OutboundMessage::Subscribe(execution_id.to_string()),
            )],
            _ => Vec::new(),
        }
    }

    pub fn unsubscribe(&mut self, execution_id: &str) -> Vec<LinkAction> {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|s| s != execution_id);
        if self.subscriptions.len() == before {
            return Vec::new();
        }
        match (self.state, self.current) {
            (LinkState::Connected, Some(conn)) => vec![LinkAction::Send(
                conn,
                OutboundMessage::Unsubscribe(execution_id.to_string()),
            )],
            _ => Vec::new(),
        }
    }

    // --- Transport events ---

    pub fn on_opened(&mut self, conn: ConnectionId) -> Vec<LinkAction> {
        if !self.is_current(conn) {
            if DF.log_stream_frames {
                log::warn!("Stream: stale connection {} opened, closing it", conn);
            }
            return vec![LinkAction::Close(conn)];
        }
        if DF.log_stream_frames {
            log::info!("Stream: connection {} open", conn);
        }
        self.state = LinkState::Connected;
        self.attempts = 0;
        self.last_error = None;

        let mut actions = Vec::with_capacity(self.subscriptions.len() + 1);
        actions.extend(
            self.subscriptions
                .iter()
                .map(|id| LinkAction::Send(conn, OutboundMessage::Subscribe(id.clone()))),
        );
        actions.push(LinkAction::StartHeartbeat(conn));
        actions
    }

    pub fn on_frame(&mut self, conn: ConnectionId, text: &str) -> Vec<LinkAction> {
        if !self.is_current(conn) || self.state != LinkState::Connected {
            return Vec::new();
        }
        match StreamMessage::parse(text) {
            Ok(message) => {
                if DF.log_stream_frames {
                    log::info!("Stream {}: {}", conn, message.kind());
                }
                vec![LinkAction::Deliver(message)]
            }
            Err(FrameError::UnknownType(kind)) => {
                log::warn!("Stream {}: unknown message type {}, dropped", conn, kind);
                Vec::new()
            }
            Err(e) => {
                log::warn!("Stream {}: {}, dropped", conn, e);
                Vec::new()
            }
        }
    }

    /// The connection ended, either by closing or by failing to open. `error` carries the
    /// transport error, if any.
    pub fn on_closed(&mut self, conn: ConnectionId, error: Option<String>) -> Vec<LinkAction> {
        if !self.is_current(conn) {
            return Vec::new();
        }
        self.current = None;
        let mut actions = vec![LinkAction::StopHeartbeat];

        if let Some(error) = error {
            log::warn!("Stream {}: {}", conn, error);
            let err = StreamError::Transport(error);
            self.last_error = Some(err.clone());
            actions.push(LinkAction::Surface(err));
        }

        if !self.enabled {
            self.state = LinkState::Disconnected;
            return actions;
        }

        if self.attempts >= self.options.max_reconnect_attempts {
            log::error!(
                "Stream: giving up after {} reconnection attempts",
                self.attempts
            );
            let err = StreamError::GaveUp {
                attempts: self.attempts,
            };
            self.state = LinkState::GaveUp;
            self.last_error = Some(err.clone());
            actions.push(LinkAction::Surface(err));
            return actions;
        }

        let delay = self.options.delay_for(self.attempts);
        self.attempts += 1;
        self.state = LinkState::Reconnecting;
        if DF.log_stream_frames {
            log::info!(
                "Stream: reconnecting in {:?} (attempt {}/{})",
                delay,
                self.attempts,
                self.options.max_reconnect_attempts
            );
        }
        actions.push(LinkAction::ScheduleReconnect {
            attempt: self.attempts,
            delay,
        });
        actions
    }

    /// The backoff timer fired.
    pub fn on_reconnect_due(&mut self) -> Vec<LinkAction> {
        let mut actions = Vec::new();
        if self.enabled && self.state == LinkState::Reconnecting {
            self.open_new(&mut actions);
        }
        actions
    }

    pub fn on_heartbeat_due(&mut self, conn: ConnectionId) -> Vec<LinkAction> {
        if self.is_current(conn) && self.state == LinkState::Connected {
            vec![LinkAction::Send(conn, OutboundMessage::Ping)]
        } else {
            Vec::new()
        }
    }
}
