use {
    crate::{
        config::DF,
        data::{
            messages::{OutboundMessage, StreamMessage},
            stream::session::{
                ConnectionId, LinkAction, LinkState, SessionOptions, StreamError, StreamSession,
            },
        },
    },
    futures::{SinkExt, StreamExt},
    serde::Serialize,
    std::{
        collections::HashMap,
        sync::{Arc, PoisonError, RwLock},
        time::Duration,
    },
    tokio::{
        sync::{mpsc, watch},
        task::JoinHandle,
        time::{MissedTickBehavior, interval_at, sleep, Instant},
    },
    tokio_tungstenite::{connect_async, tungstenite::Message},
};

/// Receives what the live stream delivers.
pub trait StreamHandler: Send + Sync {
    fn on_message(&self, message: StreamMessage);

    fn on_error(&self, _error: &StreamError) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatus {
    pub state: LinkState,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
}

impl LinkStatus {
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}

enum Command {
    Connect,
    Disconnect,
    Retry,
    Subscribe(String),
    Unsubscribe(String),
}

enum Event {
    Opened(ConnectionId),
    Frame(ConnectionId, String),
    Closed(ConnectionId, Option<String>),
    ReconnectDue,
    HeartbeatDue(ConnectionId),
}

enum Outbound {
    Text(String),
    Close,
}

type SharedHandler = Arc<RwLock<Option<Arc<dyn StreamHandler>>>>;

/// WebSocket driver for a [`StreamSession`].
///
/// Commands are queued to a background task that owns the session, so every method here
/// is cheap and non-blocking. Must be created inside a tokio runtime.
pub struct StreamChannel {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<LinkStatus>,
    handler: SharedHandler,
    driver: JoinHandle<()>,
}

impl StreamChannel {
    pub fn new(url: impl Into<String>, options: SessionOptions) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(LinkStatus::default());
        let handler: SharedHandler = Arc::new(RwLock::new(None));
        let (events, event_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            url: url.into(),
            session: StreamSession::new(options),
            handler: handler.clone(),
            status: status_tx,
            events,
            links: HashMap::new(),
            heartbeat: None,
            reconnect: None,
        };
        let driver = tokio::spawn(driver.run(command_rx, event_rx));

        Self {
            commands,
            status,
            handler,
            driver,
        }
    }

    /// Replaces the handler. Frames already dispatched went to the previous one.
    pub fn set_handler(&self, handler: Arc<dyn StreamHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn clear_handler(&self) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// Restarts after giving up (or at any time) with a fresh attempt budget.
    pub fn retry(&self) {
        self.send(Command::Retry);
    }

    pub fn subscribe(&self, execution_id: impl Into<String>) {
        self.send(Command::Subscribe(execution_id.into()));
    }

    pub fn unsubscribe(&self, execution_id: impl Into<String>) {
        self.send(Command::Unsubscribe(execution_id.into()));
    }

    pub fn status(&self) -> LinkStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.clone()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            log::warn!("Stream driver has stopped, command dropped");
        }
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        // Dropping the driver drops every link sender, which closes the sockets.
        self.driver.abort();
    }
}

/// Owns the session and the per-connection tasks.
struct Driver {
    url: String,
    session: StreamSession,
    handler: SharedHandler,
    status: watch::Sender<LinkStatus>,
    events: mpsc::UnboundedSender<Event>,
    /// Outbound queue of every live connection task.
    links: HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        loop {
            let actions = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        let actions = self.session.disconnect();
                        self.apply(actions);
                        return;
                    }
                },
                Some(event) = events.recv() => self.on_event(event),
            };
            self.apply(actions);
        }
    }

    fn on_command(&mut self, command: Command) -> Vec<LinkAction> {
        match command {
            Command::Connect => self.session.connect(),
            Command::Disconnect => self.session.disconnect(),
            Command::Retry => self.session.retry(),
            Command::Subscribe(id) => self.session.subscribe(&id),
            Command::Unsubscribe(id) => self.session.unsubscribe(&id),
        }
    }

    fn on_event(&mut self, event: Event) -> Vec<LinkAction> {
        match event {
            Event::Opened(conn) => self.session.on_opened(conn),
            Event::Frame(conn, text) => self.session.on_frame(conn, &text),
            Event::Closed(conn, error) => {
                self.links.remove(&conn);
                self.session.on_closed(conn, error)
            }
            Event::ReconnectDue => {
                self.reconnect = None;
                self.session.on_reconnect_due()
            }
            Event::HeartbeatDue(conn) => self.session.on_heartbeat_due(conn),
        }
    }

    fn apply(&mut self, actions: Vec<LinkAction>) {
        for action in actions {
            match action {
                LinkAction::Open(conn) => self.open(conn),
                LinkAction::Close(conn) => {
                    if let Some(link) = self.links.remove(&conn) {
                        let _ = link.send(Outbound::Close);
                    }
                }
                LinkAction::Send(conn, message) => self.send_frame(conn, &message),
                LinkAction::ScheduleReconnect { delay, .. } => self.schedule_reconnect(delay),
                LinkAction::CancelReconnect => {
                    if let Some(task) = self.reconnect.take() {
                        task.abort();
                    }
                }
                LinkAction::StartHeartbeat(conn) => self.start_heartbeat(conn),
                LinkAction::StopHeartbeat => {
                    if let Some(task) = self.heartbeat.take() {
                        task.abort();
                    }
                }
                LinkAction::Deliver(message) => self.deliver(message),
                LinkAction::Surface(error) => {
                    if let Some(handler) = self.current_handler() {
                        handler.on_error(&error);
                    }
                }
            }
        }
        self.publish_status();
    }

    fn current_handler(&self) -> Option<Arc<dyn StreamHandler>> {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn deliver(&self, message: StreamMessage) {
        if let StreamMessage::Error(e) = &message {
            log::error!("Stream server error: {}", e);
        }
        if let Some(handler) = self.current_handler() {
            handler.on_message(message);
        }
    }

    fn publish_status(&self) {
        let next = LinkStatus {
            state: self.session.state(),
            reconnect_attempts: self.session.attempts(),
            last_error: self.session.last_error().map(|e| e.to_string()),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn send_frame(&self, conn: ConnectionId, message: &OutboundMessage) {
        let Some(link) = self.links.get(&conn) else {
            return;
        };
        if link.send(Outbound::Text(message.to_json())).is_err() && DF.log_stream_frames {
            log::warn!("Stream {}: link gone, frame dropped", conn);
        }
    }

    fn open(&mut self, conn: ConnectionId) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.links.insert(conn, tx);
        tokio::spawn(run_connection(
            self.url.clone(),
            conn,
            rx,
            self.events.clone(),
        ));
    }

    fn schedule_reconnect(&mut self, delay: Duration) {
        if let Some(task) = self.reconnect.take() {
            task.abort();
        }
        let events = self.events.clone();
        self.reconnect = Some(tokio::spawn(async move {
            sleep(delay).await;
            let _ = events.send(Event::ReconnectDue);
        }));
    }

    fn start_heartbeat(&mut self, conn: ConnectionId) {
        if let Some(task) = self.heartbeat.take() {
            task.abort();
        }
        let period = self
            .session
            .options()
            .heartbeat_interval
            .max(Duration::from_millis(1));
        let events = self.events.clone();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if events.send(Event::HeartbeatDue(conn)).is_err() {
                    return;
                }
            }
        }));
    }
}

/// One socket from handshake to close. Reports back through `events`, always tagged
/// with `conn`; the session decides whether the report still matters.
async fn run_connection(
    url: String,
    conn: ConnectionId,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<Event>,
) {
    if DF.log_stream_frames {
        log::info!("Stream {}: connecting to {}", conn, url);
    }
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _)) => socket,
        Err(e) => {
            let _ = events.send(Event::Closed(conn, Some(e.to_string())));
            return;
        }
    };
    let _ = events.send(Event::Opened(conn));
    let (mut write, mut read) = socket.split();

    let error = loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        break Some(e.to_string());
                    }
                }
                // Closed by the session, or the driver is gone.
                Some(Outbound::Close) | None => {
                    let _ = write.close().await;
                    break None;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(Event::Frame(conn, text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(_))) | None => break None,
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(e.to_string()),
            },
        }
    };

    if DF.log_stream_frames {
        log::info!("Stream {}: closed", conn);
    }
    let _ = events.send(Event::Closed(conn, error));
}
