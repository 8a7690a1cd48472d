//! UI-side client of the message protocol.
//!
//! Talks to a tab's relay through a [`TabHost`] and to the store through a
//! [`StoreHandle`]. Readiness probing is bounded: a relay that does not answer
//! within the configured attempts is reported as unreachable.

use crate::export::{ExportOutcome, write_export};
use crate::store::StoreHandle;
use async_trait::async_trait;
use std::path::Path;
use tabrec_common::config::schema::RelayConfig;
use tabrec_common::error::RecorderError;
use tabrec_common::protocol::{RelayRequest, RelayResponse, StoreRequest, TabId, now};
use tracing::{debug, info, warn};

#[async_trait]
pub trait TabHost: Send + Sync {
    async fn tab_url(&self, tab: TabId) -> Result<String, RecorderError>;

    /// Point-to-point request to the relay living in `tab`.
    async fn send_to_relay(
        &self,
        tab: TabId,
        request: RelayRequest,
    ) -> Result<RelayResponse, RecorderError>;

    /// Load the relay into `tab`. Safe to call when one is already present.
    async fn inject_relay(&self, tab: TabId) -> Result<(), RecorderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    /// The relay could not be reached; the store was still told to stop.
    StoppedWithWarnings(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiState {
    Idle,
    Recording,
    HasData,
}

impl UiState {
    pub fn from_flags(is_recording: bool, has_data: bool) -> Self {
        if is_recording {
            UiState::Recording
        } else if has_data {
            UiState::HasData
        } else {
            UiState::Idle
        }
    }

    pub fn status_text(&self) -> &'static str {
        match self {
            UiState::Idle => "Ready to record console logs",
            UiState::Recording => "Recording console logs...",
            UiState::HasData => "Recording stopped. Data available for export.",
        }
    }
}

pub struct Controller<H: TabHost> {
    host: H,
    store: StoreHandle,
    relay: RelayConfig,
}

impl<H: TabHost> Controller<H> {
    pub fn new(host: H, store: StoreHandle, relay: RelayConfig) -> Self {
        Self { host, store, relay }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Check for the relay (inject and poll if it is missing), load the
    /// interceptor, then start.
    ///
    /// Nothing reaches the store until the interceptor is loaded, so a tab
    /// that cannot be recorded leaves the previous session's logs intact.
    pub async fn start_recording(&self, tab: TabId) -> Result<(), RecorderError> {
        let url = self.host.tab_url(tab).await?;

        match self.host.send_to_relay(tab, RelayRequest::GetStatus).await {
            Ok(_) => debug!("Relay already present in tab {}", tab),
            Err(e) if e.is_retryable() => {
                info!("Relay not loaded in tab {}, injecting", tab);
                self.host.inject_relay(tab).await?;
                self.wait_for_relay(tab).await?;
            }
            Err(e) => return Err(e),
        }

        match self.host.send_to_relay(tab, RelayRequest::Initialize).await? {
            response if response.is_success() => {}
            RelayResponse::Ack {
                error: Some(error), ..
            } => {
                warn!("Interceptor did not load in tab {}: {}", tab, error);
                return Err(RecorderError::InjectionFailed(error));
            }
            other => {
                return Err(RecorderError::InjectionFailed(format!(
                    "Unexpected reply to initialize: {:?}",
                    other
                )));
            }
        }

        // The store resets its buffers before the relay's start marker arrives.
        self.store.send(StoreRequest::RecordingStarted {
            tab_id: tab,
            url: url.clone(),
        })?;

        let failure = match self.host.send_to_relay(tab, RelayRequest::StartRecording).await {
            Ok(response) if response.is_success() => return Ok(()),
            Ok(RelayResponse::Ack {
                error: Some(error), ..
            }) => RecorderError::Other(error),
            Ok(other) => RecorderError::Other(format!("Recording failed to start: {:?}", other)),
            Err(e) => e,
        };

        warn!("Could not start recording on tab {}: {}", tab, failure);
        self.store
            .send(StoreRequest::RecordingStopped { tab_id: tab })?;
        Err(failure)
    }

    /// Poll `getStatus` until the relay answers, at most
    /// [`MAX_READY_ATTEMPTS`](tabrec_common::config::schema::MAX_READY_ATTEMPTS) times whatever the configuration asks for.
    pub async fn wait_for_relay(&self, tab: TabId) -> Result<(), RecorderError> {
        let attempts = self.relay.bounded_attempts();
        for attempt in 0..attempts {
            debug!(
                "Polling for relay readiness in tab {} (attempt {}/{})",
                tab,
                attempt + 1,
                attempts
            );
            match self.host.send_to_relay(tab, RelayRequest::GetStatus).await {
                Ok(_) => return Ok(()),
                Err(e) if e.is_retryable() => {
                    tokio::time::sleep(self.relay.ready_interval()).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(RecorderError::Unreachable {
            target: format!("relay in tab {}", tab),
            attempts,
        })
    }

    pub async fn stop_recording(&self, tab: TabId) -> Result<StopOutcome, RecorderError> {
        let outcome = match self.host.send_to_relay(tab, RelayRequest::StopRecording).await {
            Ok(response) if response.is_success() => StopOutcome::Stopped,
            Ok(response) => StopOutcome::StoppedWithWarnings(format!("{:?}", response)),
            Err(e) => {
                warn!("Error stopping recording on tab {}: {}", tab, e);
                StopOutcome::StoppedWithWarnings(e.to_string())
            }
        };
        self.store
            .send(StoreRequest::RecordingStopped { tab_id: tab })?;
        Ok(outcome)
    }

    pub async fn ui_state(&self, tab: TabId) -> Result<UiState, RecorderError> {
        let is_recording = self.store.is_recording(tab).await?;
        let logs = self.store.get_logs().await?;
        Ok(UiState::from_flags(is_recording, !logs.console_logs.is_empty()))
    }

    pub async fn export(&self, url: &str, directory: &Path) -> Result<ExportOutcome, RecorderError> {
        let logs = self.store.get_logs().await?;
        write_export(&logs, url, directory, now()).await
    }

    pub async fn clear(&self) -> Result<(), RecorderError> {
        self.store.clear_logs().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_state_precedence() {
        assert_eq!(UiState::from_flags(true, true), UiState::Recording);
        assert_eq!(UiState::from_flags(false, true), UiState::HasData);
        assert_eq!(UiState::from_flags(false, false), UiState::Idle);
        assert_eq!(UiState::Idle.status_text(), "Ready to record console logs");
    }
}
