use futures::{SinkExt, StreamExt};
use tabrec_engine::error::RecorderError;
use tabrec_engine::protocol::{StoreRequest, StoreResponse};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

/// Talks to a running [`StoreServer`](crate::server::StoreServer). Replies
/// carry no correlation id, so calls must not overlap on one client.
pub struct StoreClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl StoreClient {
    pub async fn connect(port: u16) -> Result<Self, RecorderError> {
        let url = format!("ws://127.0.0.1:{}", port);
        let (ws, _) = connect_async(&url)
            .await
            .map_err(|e| RecorderError::Disconnected(format!("{}: {}", url, e)))?;
        debug!("Connected to store server at {}", url);
        Ok(Self { ws })
    }

    pub async fn call(&mut self, request: StoreRequest) -> Result<Option<StoreResponse>, RecorderError> {
        let expects_response = request.expects_response();
        let json = serde_json::to_string(&request)?;
        self.ws
            .send(Message::Text(json))
            .await
            .map_err(|e| RecorderError::Disconnected(e.to_string()))?;

        if !expects_response {
            return Ok(None);
        }

        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(Some(serde_json::from_str(&text)?)),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => return Err(RecorderError::Disconnected(e.to_string())),
            }
        }
        Err(RecorderError::Disconnected("store server closed the connection".into()))
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
