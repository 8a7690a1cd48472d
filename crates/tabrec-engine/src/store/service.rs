use super::Store;
use async_trait::async_trait;
use std::sync::Arc;
use tabrec_common::error::RecorderError;
use tabrec_common::protocol::{LogSnapshot, StoreRequest, StoreResponse, TabId, TabLifecycle};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabEvent {
    Removed(TabId),
    NavigationComplete(TabId),
}

impl From<TabLifecycle> for TabEvent {
    fn from(notice: TabLifecycle) -> Self {
        match notice {
            TabLifecycle::TabRemoved { tab_id } => TabEvent::Removed(tab_id),
            TabLifecycle::NavigationComplete { tab_id } => TabEvent::NavigationComplete(tab_id),
        }
    }
}

/// Whoever owns the tabs: re-establishes the relay/interceptor pair after a
/// navigation wiped the page.
#[async_trait]
pub trait TabNavigator: Send + Sync {
    async fn reestablish(&self, tab: TabId) -> Result<(), RecorderError>;
}

enum StoreMessage {
    Request {
        request: StoreRequest,
        reply: Option<oneshot::Sender<StoreResponse>>,
    },
    Tab(TabEvent),
    Installed,
    AttachNavigator(Arc<dyn TabNavigator>),
    Flush(oneshot::Sender<()>),
}

/// Cloneable entry point into the store context.
///
/// `send` is at-most-once and never waits: if the store is gone the request is
/// lost. `call` waits for the answer.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::UnboundedSender<StoreMessage>,
}

impl StoreHandle {
    fn post(&self, message: StoreMessage) -> Result<(), RecorderError> {
        self.tx
            .send(message)
            .map_err(|_| RecorderError::Disconnected("store".into()))
    }

    pub fn send(&self, request: StoreRequest) -> Result<(), RecorderError> {
        self.post(StoreMessage::Request {
            request,
            reply: None,
        })
    }

    pub async fn call(&self, request: StoreRequest) -> Result<Option<StoreResponse>, RecorderError> {
        if !request.expects_response() {
            self.send(request)?;
            return Ok(None);
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(StoreMessage::Request {
            request,
            reply: Some(reply_tx),
        })?;
        reply_rx
            .await
            .map(Some)
            .map_err(|_| RecorderError::Disconnected("store".into()))
    }

    pub fn tab_event(&self, event: TabEvent) -> Result<(), RecorderError> {
        self.post(StoreMessage::Tab(event))
    }

    pub fn installed(&self) -> Result<(), RecorderError> {
        self.post(StoreMessage::Installed)
    }

    pub fn attach_navigator(&self, navigator: Arc<dyn TabNavigator>) -> Result<(), RecorderError> {
        self.post(StoreMessage::AttachNavigator(navigator))
    }

    /// Resolves once everything sent before has been processed and persisted.
    pub async fn flush(&self) -> Result<(), RecorderError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.post(StoreMessage::Flush(done_tx))?;
        done_rx
            .await
            .map_err(|_| RecorderError::Disconnected("store".into()))
    }

    pub async fn get_logs(&self) -> Result<LogSnapshot, RecorderError> {
        match self.call(StoreRequest::GetLogs).await? {
            Some(StoreResponse::Logs(snapshot)) => Ok(snapshot),
            other => Err(unexpected("getLogs", other)),
        }
    }

    pub async fn is_recording(&self, tab: TabId) -> Result<bool, RecorderError> {
        match self
            .call(StoreRequest::GetRecordingStatus { tab_id: tab })
            .await?
        {
            Some(StoreResponse::RecordingStatus { is_recording }) => Ok(is_recording),
            other => Err(unexpected("getRecordingStatus", other)),
        }
    }

    pub async fn clear_logs(&self) -> Result<(), RecorderError> {
        match self.call(StoreRequest::ClearLogs).await? {
            Some(StoreResponse::Cleared { .. }) => Ok(()),
            other => Err(unexpected("clearLogs", other)),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

fn unexpected(action: &str, response: Option<StoreResponse>) -> RecorderError {
    RecorderError::Other(format!("Unexpected response to {}: {:?}", action, response))
}

/// Runs the store in its own task and processes messages one at a time.
pub struct StoreService {
    store: Store,
    navigator: Option<Arc<dyn TabNavigator>>,
    rx: mpsc::UnboundedReceiver<StoreMessage>,
}

impl StoreService {
    pub fn spawn(store: Store) -> (StoreHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = StoreService {
            store,
            navigator: None,
            rx,
        };
        let task = tokio::spawn(service.run());
        (StoreHandle { tx }, task)
    }

    async fn run(mut self) {
        info!("Store service started");
        while let Some(message) = self.rx.recv().await {
            match message {
                StoreMessage::Request { request, reply } => {
                    debug!("Store received {}", request.action());
                    let response = self.store.handle(request);
                    if let Some(reply) = reply {
                        match response {
                            Some(response) => {
                                let _ = reply.send(response);
                            }
                            None => warn!("Request expected a response but produced none"),
                        }
                    }
                }
                StoreMessage::Tab(TabEvent::Removed(tab)) => self.store.on_tab_removed(tab),
                StoreMessage::Tab(TabEvent::NavigationComplete(tab)) => {
                    if self.store.on_navigation_complete(tab) {
                        self.reestablish(tab);
                    }
                }
                StoreMessage::Installed => self.store.on_installed(),
                StoreMessage::AttachNavigator(navigator) => self.navigator = Some(navigator),
                StoreMessage::Flush(done) => {
                    self.store.flush().await;
                    let _ = done.send(());
                }
            }
        }
        self.store.flush().await;
        info!("Store service stopped");
    }

    fn reestablish(&self, tab: TabId) {
        let Some(navigator) = self.navigator.clone() else {
            warn!("Tab {} navigated while recording but no navigator is attached", tab);
            return;
        };
        info!("Re-establishing recorder on tab {} after navigation", tab);
        // The navigator may call back into the store; never await it here.
        tokio::spawn(async move {
            if let Err(e) = navigator.reestablish(tab).await {
                error!("Error re-injecting recorder into tab {}: {}", tab, e);
            }
        });
    }
}
