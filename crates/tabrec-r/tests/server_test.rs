use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tabrec_engine::config::RecorderConfig;
use tabrec_engine::config::schema::BufferConfig;
use tabrec_engine::persistence::MemoryStorage;
use tabrec_engine::protocol::{PersistedSnapshot, StoreRequest, StoreResponse};
use tabrec_engine::store::{NoopIndicator, Store, StoreHandle, StoreService};
use tabrec_r::{ServerHandle, StoreClient, StoreServer, dispatch};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

async fn start_server() -> (StoreHandle, ServerHandle) {
    let store = Store::hydrate(
        &BufferConfig::default(),
        Arc::new(MemoryStorage::new()),
        Arc::new(NoopIndicator),
    )
    .await;
    let (store, _task) = StoreService::spawn(store);
    let handle = StoreServer::new(0, store.clone())
        .start()
        .await
        .expect("Failed to start server");
    (store, handle)
}

async fn connect_simulated_client(port: u16) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
    let url = format!("ws://localhost:{}", port);
    for _ in 0..10 {
        if let Ok((ws_stream, _)) = connect_async(&url).await {
            return ws_stream;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to simulated server");
}

async fn send_json(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

async fn next_json(ws: &mut WebSocketStream<MaybeTlsStream<TcpStream>>) -> Value {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Timeout waiting for response")
        .expect("Client stream ended unexpectedly")
        .expect("WS error");
    serde_json::from_str(&msg.to_string()).expect("Failed to deserialize")
}

#[tokio::test]
async fn test_recording_session_over_websocket() {
    let (_store, handle) = start_server().await;
    let mut client_ws = connect_simulated_client(handle.port()).await;

    send_json(
        &mut client_ws,
        json!({"action": "recordingStarted", "tabId": 7, "url": "https://example.com/"}),
    )
    .await;
    send_json(
        &mut client_ws,
        json!({"action": "consoleLog", "log": {
            "timestamp": "2024-05-01T12:00:00.000Z",
            "level": "warn",
            "message": "careful",
            "url": "https://example.com/",
            "userAgent": "test"
        }}),
    )
    .await;

    send_json(&mut client_ws, json!({"action": "getRecordingStatus", "tabId": 7})).await;
    assert_eq!(next_json(&mut client_ws).await, json!({"isRecording": true}));

    send_json(&mut client_ws, json!({"action": "getLogs"})).await;
    let logs = next_json(&mut client_ws).await;
    assert_eq!(logs["consoleLogs"].as_array().unwrap().len(), 1);
    assert_eq!(logs["consoleLogs"][0]["message"], "careful");
    assert_eq!(logs["networkLogs"], json!([]));

    send_json(&mut client_ws, json!({"action": "clearLogs"})).await;
    assert_eq!(next_json(&mut client_ws).await, json!({"status": "cleared"}));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_unknown_and_invalid_frames_are_ignored() {
    let (_store, handle) = start_server().await;
    let mut client_ws = connect_simulated_client(handle.port()).await;

    client_ws
        .send(Message::Text("{not json".into()))
        .await
        .unwrap();
    send_json(&mut client_ws, json!({"action": "selfDestruct"})).await;

    // The connection survives and the next real request is answered first.
    send_json(&mut client_ws, json!({"action": "getRecordingStatus", "tabId": 1})).await;
    assert_eq!(next_json(&mut client_ws).await, json!({"isRecording": false}));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_connections_share_one_store() {
    let (store, handle) = start_server().await;
    let mut recorder = StoreClient::connect(handle.port()).await.unwrap();
    let mut viewer = StoreClient::connect(handle.port()).await.unwrap();

    let response = recorder
        .call(StoreRequest::RecordingStarted {
            tab_id: 2,
            url: "https://example.com/".into(),
        })
        .await
        .unwrap();
    assert!(response.is_none());
    // Frames on one connection are handled in order: once this is answered the
    // start above has reached the store.
    recorder
        .call(StoreRequest::GetRecordingStatus { tab_id: 2 })
        .await
        .unwrap();

    let response = viewer
        .call(StoreRequest::GetRecordingStatus { tab_id: 2 })
        .await
        .unwrap();
    assert_eq!(
        response,
        Some(StoreResponse::RecordingStatus { is_recording: true })
    );
    assert!(store.is_recording(2).await.unwrap());

    recorder.close().await;
    viewer.close().await;
    handle.shutdown().await;
}

#[tokio::test]
async fn test_dispatch_answers_only_requests_with_responses() {
    let (store, handle) = start_server().await;

    assert!(
        dispatch(&store, r#"{"action":"recordingStopped","tabId":3}"#)
            .await
            .is_none()
    );
    assert!(dispatch(&store, "[]").await.is_none());
    assert!(
        dispatch(&store, r#"{"event":"navigationComplete","tabId":3}"#)
            .await
            .is_none()
    );
    assert_eq!(
        dispatch(&store, r#"{"action":"getLogs"}"#).await.unwrap(),
        r#"{"consoleLogs":[],"networkLogs":[]}"#
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn test_tab_removed_frame_clears_recording() {
    let (store, handle) = start_server().await;
    let mut client_ws = connect_simulated_client(handle.port()).await;

    send_json(
        &mut client_ws,
        json!({"action": "recordingStarted", "tabId": 4, "url": "https://example.com/"}),
    )
    .await;
    send_json(&mut client_ws, json!({"action": "getRecordingStatus", "tabId": 4})).await;
    assert_eq!(next_json(&mut client_ws).await, json!({"isRecording": true}));

    send_json(&mut client_ws, json!({"event": "tabRemoved", "tabId": 4})).await;
    send_json(&mut client_ws, json!({"action": "getRecordingStatus", "tabId": 4})).await;
    assert_eq!(next_json(&mut client_ws).await, json!({"isRecording": false}));
    assert!(!store.is_recording(4).await.unwrap());

    handle.shutdown().await;
}

#[tokio::test]
async fn test_serve_with_reset_writes_pristine_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    std::fs::write(
        &path,
        r#"{"isRecording":false,"consoleLogs":[{"timestamp":"2024-05-01T12:00:00.000Z","level":"log","message":"stale","url":"https://example.com/","userAgent":"test"}],"networkLogs":[]}"#,
    )
    .unwrap();

    let mut config = RecorderConfig::default();
    config.storage.path = Some(path.clone());

    tabrec_r::serve_until(&config, 0, true, async {}).await.unwrap();

    let stored: PersistedSnapshot =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(stored, PersistedSnapshot::pristine());
}
