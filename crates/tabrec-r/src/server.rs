use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tabrec_engine::error::RecorderError;
use tabrec_engine::protocol::{StoreRequest, TabLifecycle};
use tabrec_engine::store::StoreHandle;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Exposes the store message protocol over WebSocket. Every connection shares
/// the same [`StoreHandle`], so requests from all clients are serialized by the
/// store service.
#[derive(Clone)]
pub struct StoreServer {
    port: u16,
    store: StoreHandle,
    // One sender, one receiver per connection.
    shutdown_tx: broadcast::Sender<()>,
}

pub struct ServerHandle {
    pub local_addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting and close every open connection.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.task.abort();
        let _ = self.task.await;
    }
}

impl StoreServer {
    pub fn new(port: u16, store: StoreHandle) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            port,
            store,
            shutdown_tx,
        }
    }

    /// Bind on 127.0.0.1. Port 0 picks a free port; see [`ServerHandle::local_addr`].
    pub async fn start(&self) -> Result<ServerHandle, RecorderError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Store server listening on: {}", local_addr);

        let store = self.store.clone();
        let shutdown_tx = self.shutdown_tx.clone();
        let accept_shutdown = shutdown_tx.clone();

        let task = tokio::spawn(async move {
            info!("Server accept loop started");
            loop {
                let (stream, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                info!("Accepted TCP connection from: {}", peer);
                tokio::spawn(accept_connection(
                    stream,
                    store.clone(),
                    accept_shutdown.subscribe(),
                ));
            }
        });

        Ok(ServerHandle {
            local_addr,
            shutdown_tx,
            task,
        })
    }
}

async fn accept_connection(
    stream: TcpStream,
    store: StoreHandle,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!("Error during the websocket handshake occurred: {}", e);
            return;
        }
    };

    info!("New WebSocket connection: established");
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = ws_sender.send(Message::Close(None)).await;
                break;
            }

            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Some(reply) = dispatch(&store, &text).await else {
                            continue;
                        };
                        if let Err(e) = ws_sender.send(Message::Text(reply)).await {
                            error!("Failed to send response to WS: {}", e);
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket closed");
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Handle one text frame. Returns the JSON reply for requests that have one.
///
/// A frame is either a store action (`{"action": ...}`) or a tab lifecycle
/// notice (`{"event": "tabRemoved" | "navigationComplete", "tabId": n}`).
/// Anything else is logged and dropped.
pub async fn dispatch(store: &StoreHandle, text: &str) -> Option<String> {
    let request = match serde_json::from_str::<StoreRequest>(text) {
        Ok(request) => request,
        Err(e) => {
            if let Ok(notice) = serde_json::from_str::<TabLifecycle>(text) {
                debug!("Tab event {:?}", notice);
                if let Err(e) = store.tab_event(notice.into()) {
                    error!("Store unavailable for tab event: {}", e);
                }
            } else {
                warn!("Ignoring unrecognized message: {} | Text: {}", e, text);
            }
            return None;
        }
    };

    let action = request.action();
    debug!("Dispatching {}", action);
    match store.call(request).await {
        Ok(Some(response)) => match serde_json::to_string(&response) {
            Ok(json) => Some(json),
            Err(e) => {
                error!("Failed to encode {} response: {}", action, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            error!("Store unavailable for {}: {}", action, e);
            None
        }
    }
}
