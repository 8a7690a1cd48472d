//! The isolated relay: gates page broadcasts on a local recording flag and
//! forwards them to the store.

use crate::interceptor::{InstallOutcome, InterceptorInjector};
use crate::page::{InterceptorState, PageContext};
use crate::store::StoreHandle;
use std::sync::Arc;
use std::time::Duration;
use tabrec_common::error::RecorderError;
use tabrec_common::protocol::{
    LogEntry, LogLevel, PageMessage, PagePayload, RECORDING_STARTED_MESSAGE,
    RECORDING_STOPPED_MESSAGE, RelayRequest, RelayResponse, StoreRequest, now,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

const CONTROL_QUEUE: usize = 32;

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Delay before the first interceptor injection attempt.
    pub injection_delay: Duration,
    /// Initial recording flag, as reported by the store.
    pub recording: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            injection_delay: Duration::from_millis(50),
            recording: false,
        }
    }
}

struct RelayCommand {
    request: RelayRequest,
    reply: oneshot::Sender<RelayResponse>,
}

/// Control surface of one relay (start/stop/status).
#[derive(Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayCommand>,
}

impl RelayHandle {
    pub async fn request(&self, request: RelayRequest) -> Result<RelayResponse, RecorderError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RelayCommand {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RecorderError::Disconnected("relay".into()))?;
        reply_rx
            .await
            .map_err(|_| RecorderError::Disconnected("relay".into()))
    }

    /// Wire entry point: anything that does not parse as a known action is
    /// answered with `Unknown action` without reaching the relay.
    pub async fn request_json(&self, text: &str) -> Result<RelayResponse, RecorderError> {
        match serde_json::from_str::<RelayRequest>(text) {
            Ok(request) => self.request(request).await,
            Err(e) => {
                debug!("Unrecognized relay message {}: {}", text, e);
                Ok(RelayResponse::unknown_action())
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct Relay {
    page: PageContext,
    store: StoreHandle,
    injector: Arc<dyn InterceptorInjector>,
    recording: bool,
    initialized: bool,
}

impl Relay {
    pub fn new(
        page: PageContext,
        store: StoreHandle,
        injector: Arc<dyn InterceptorInjector>,
        recording: bool,
    ) -> Self {
        Self {
            page,
            store,
            injector,
            recording,
            initialized: false,
        }
    }

    /// Attach a relay to `page` and run it in its own task. Returns `None`
    /// when the page already has one.
    pub fn spawn(
        page: PageContext,
        store: StoreHandle,
        injector: Arc<dyn InterceptorInjector>,
        options: RelayOptions,
    ) -> Option<RelayHandle> {
        if !page.claim_relay_slot() {
            info!("Tab Recorder: Already initialized, skipping duplicate injection");
            return None;
        }

        // Subscribe before returning so nothing posted afterwards is missed.
        let page_rx = page.subscribe();
        let unload_rx = page.unload_signal();
        let (tx, control_rx) = mpsc::channel(CONTROL_QUEUE);

        let relay = Relay::new(page, store, injector, options.recording);
        tokio::spawn(relay.run(page_rx, control_rx, unload_rx, options.injection_delay));
        Some(RelayHandle { tx })
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn status(&self) -> RelayResponse {
        RelayResponse::Status {
            is_recording: self.recording,
            is_initialized: self.initialized,
        }
    }

    pub async fn ensure_interceptor_installed(&mut self) -> Result<(), RecorderError> {
        if self.initialized {
            return Ok(());
        }
        if self.page.interceptor_state() == InterceptorState::Installed {
            info!("Tab Recorder: Console override already injected, skipping");
            self.initialized = true;
            return Ok(());
        }

        match self.injector.inject(&self.page).await {
            Ok(outcome) => {
                if outcome == InstallOutcome::Installed {
                    info!("Tab Recorder: Console override injected successfully");
                }
                self.initialized = true;
                Ok(())
            }
            Err(e) => {
                error!("Tab Recorder: Failed to initialize console interception: {}", e);
                Err(e)
            }
        }
    }

    pub fn start_recording(&mut self) -> Result<(), RecorderError> {
        self.recording = true;
        info!("Tab Recorder: Console recording started");
        self.forward(StoreRequest::ConsoleLog {
            log: self.marker(RECORDING_STARTED_MESSAGE),
        })
    }

    pub fn stop_recording(&mut self) -> Result<(), RecorderError> {
        self.recording = false;
        info!("Tab Recorder: Console recording stopped");
        self.forward(StoreRequest::ConsoleLog {
            log: self.marker(RECORDING_STOPPED_MESSAGE),
        })
    }

    pub async fn handle_request(&mut self, request: RelayRequest) -> RelayResponse {
        match request {
            RelayRequest::Initialize => match self.ensure_interceptor_installed().await {
                Ok(()) => RelayResponse::ok(),
                Err(RecorderError::InjectionFailed(reason)) => RelayResponse::failed(reason),
                Err(e) => RelayResponse::failed(e.to_string()),
            },
            RelayRequest::StartRecording => {
                if !self.initialized {
                    info!("Tab Recorder: Initializing console interception before starting recording");
                    if let Err(e) = self.ensure_interceptor_installed().await {
                        return RelayResponse::failed(e.to_string());
                    }
                }
                match self.start_recording() {
                    Ok(()) => RelayResponse::ok(),
                    Err(e) => RelayResponse::failed(e.to_string()),
                }
            }
            RelayRequest::StopRecording => match self.stop_recording() {
                Ok(()) => RelayResponse::ok(),
                Err(e) => RelayResponse::failed(e.to_string()),
            },
            RelayRequest::GetStatus => {
                debug!(
                    "Tab Recorder: Status requested - recording: {}, initialized: {}",
                    self.recording, self.initialized
                );
                self.status()
            }
        }
    }

    pub fn on_page_message(&mut self, message: PageMessage) {
        if !message.is_ours() {
            return;
        }
        if !self.recording {
            return;
        }

        let request = match message.payload {
            PagePayload::Console(capture) => StoreRequest::ConsoleLog {
                log: LogEntry {
                    timestamp: now(),
                    level: capture.level,
                    message: capture.message,
                    source_url: self.page.url().to_string(),
                    user_agent: self.page.user_agent().to_string(),
                },
            },
            PagePayload::Network(capture) => StoreRequest::NetworkLog { log: capture.entry },
        };
        if let Err(e) = self.forward(request) {
            warn!("Failed to send log to background: {}", e);
        }
    }

    /// Best effort: nothing waits for this to reach the store.
    pub fn on_unload(&mut self) {
        if self.recording
            && let Err(e) = self.stop_recording()
        {
            warn!("Failed to record stop on unload: {}", e);
        }
    }

    fn marker(&self, message: &str) -> LogEntry {
        LogEntry {
            timestamp: now(),
            level: LogLevel::Info,
            message: message.to_string(),
            source_url: self.page.url().to_string(),
            user_agent: self.page.user_agent().to_string(),
        }
    }

    fn forward(&self, request: StoreRequest) -> Result<(), RecorderError> {
        self.store.send(request)
    }

    async fn run(
        mut self,
        mut page_rx: tokio::sync::broadcast::Receiver<PageMessage>,
        mut control_rx: mpsc::Receiver<RelayCommand>,
        mut unload_rx: tokio::sync::watch::Receiver<bool>,
        injection_delay: Duration,
    ) {
        let initial_injection = tokio::time::sleep(injection_delay);
        tokio::pin!(initial_injection);
        let mut injection_due = true;

        if *unload_rx.borrow() {
            return;
        }

        loop {
            // Page events first: a control request must observe every event
            // posted before it.
            tokio::select! {
                biased;
                event = page_rx.recv() => match event {
                    Ok(message) => self.on_page_message(message),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Relay fell behind, {} page events lost", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = unload_rx.changed() => {
                    if changed.is_err() || *unload_rx.borrow() {
                        self.on_unload();
                        break;
                    }
                }
                command = control_rx.recv() => match command {
                    Some(RelayCommand { request, reply }) => {
                        let response = self.handle_request(request).await;
                        let _ = reply.send(response);
                    }
                    None => break,
                },
                _ = &mut initial_injection, if injection_due => {
                    injection_due = false;
                    let _ = self.ensure_interceptor_installed().await;
                }
            }
        }
        debug!("Relay for {} stopped", self.page.url());
    }
}
