use {
    futures::{SinkExt, StreamExt},
    pipeline_monitor::{
        PipelineMonitor, SessionOptions, StreamChannel,
        data::LinkState,
    },
    serde_json::{Value, json},
    std::{sync::Arc, time::Duration},
    tokio::{
        net::{TcpListener, TcpStream},
        time::timeout,
    },
    tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message},
};

const WAIT: Duration = Duration::from_secs(5);

fn fast_options(max_reconnect_attempts: u32) -> SessionOptions {
    SessionOptions {
        reconnect_delays: vec![Duration::from_millis(20)],
        max_reconnect_attempts,
        heartbeat_interval: Duration::from_secs(60),
    }
}

/// Next text frame from the client, skipping heartbeats.
async fn next_frame(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let message = ws
            .next()
            .await
            .expect("client hung up")
            .expect("read error");
        if let Message::Text(text) = message {
            let frame: Value = serde_json::from_str(text.as_str()).expect("json frame");
            if frame["type"] != "PING" {
                return frame;
            }
        }
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, frame: Value) {
    ws.send(Message::text(frame.to_string()))
        .await
        .expect("server send");
}

#[tokio::test]
async fn delivers_frames_and_resubscribes_after_a_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("ws://{}/api/ws/pipeline", listener.local_addr().expect("addr"));

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept 1");
        let mut ws = accept_async(tcp).await.expect("handshake 1");
        send(&mut ws, json!({"type": "CONNECTED", "data": {"clientId": "c-1"}})).await;
        let first = next_frame(&mut ws).await;
        send(
            &mut ws,
            json!({
                "type": "INITIAL_STATE",
                "data": {
                    "ejecucion": {"ID_Ejecucion": 7, "Estado": "EN_PROGRESO"},
                    "fondos": [{"ID_Fund": 1, "FundShortName": "ALPHA", "Estado_Extraccion": "OK"}]
                }
            }),
        )
        .await;
        // Abrupt drop: no close frame.
        drop(ws);

        let (tcp, _) = listener.accept().await.expect("accept 2");
        let mut ws = accept_async(tcp).await.expect("handshake 2");
        let second = next_frame(&mut ws).await;
        send(
            &mut ws,
            json!({"type": "FUND_UPDATE", "data": {"ID_Fund": 2, "FundShortName": "BETA"}}),
        )
        .await;
        // Keep the socket open until the client is done.
        let _ = ws.next().await;
        (first, second)
    });

    let monitor = Arc::new(PipelineMonitor::default());
    let channel = StreamChannel::new(url, fast_options(5));
    channel.set_handler(monitor.clone());
    channel.subscribe("7");
    channel.connect();

    let mut funds = monitor.funds().subscribe();
    timeout(WAIT, funds.wait_for(|_| monitor.fund("1").is_some()))
        .await
        .expect("initial state delivered")
        .expect("store alive");
    timeout(WAIT, funds.wait_for(|_| monitor.fund("2").is_some()))
        .await
        .expect("update after reconnect")
        .expect("store alive");

    assert_eq!(monitor.visible_fund_ids(), vec!["1".to_string(), "2".to_string()]);
    assert_eq!(
        monitor.execution().read(|e| e.execution_id().map(str::to_string)),
        Some("7".to_string())
    );
    let mut link = channel.watch_status();
    let connected = timeout(WAIT, link.wait_for(|s| s.is_connected()))
        .await
        .expect("connected")
        .expect("driver alive")
        .clone();
    assert_eq!(connected.reconnect_attempts, 0);

    channel.disconnect();
    let (first, second) = timeout(WAIT, server).await.expect("server done").expect("server task");
    let subscribe = json!({"type": "SUBSCRIBE", "data": {"ID_Ejecucion": 7}});
    assert_eq!(first, subscribe);
    assert_eq!(second, subscribe);
}

#[tokio::test]
async fn gives_up_after_the_attempt_budget() {
    // Bind then release a port, so nothing is listening on it.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        listener.local_addr().expect("addr")
    };
    let channel = StreamChannel::new(format!("ws://{}/api/ws/pipeline", addr), fast_options(2));
    channel.connect();

    let mut link = channel.watch_status();
    let gave_up = timeout(WAIT, link.wait_for(|s| s.state == LinkState::GaveUp))
        .await
        .expect("gave up in time")
        .expect("driver alive")
        .clone();
    assert!(gave_up.last_error.is_some());

    // Stays down until told otherwise.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(channel.status().state, LinkState::GaveUp);
}

#[tokio::test]
async fn disconnect_before_connect_is_harmless() {
    let channel = StreamChannel::new("ws://127.0.0.1:9/api/ws/pipeline", fast_options(1));
    channel.disconnect();
    channel.disconnect();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(channel.status().state, LinkState::Disconnected);
}
