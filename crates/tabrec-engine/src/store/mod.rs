//! The background store: authoritative recording set and captured logs.
//!
//! Buffers are extension-global. Only the recording flag is keyed by tab.

mod indicator;
mod service;

pub use indicator::{BADGE_COLOR, BADGE_TEXT, Badge, BadgeIndicator, NoopIndicator, RecordingIndicator};
pub use service::{StoreHandle, StoreService, TabEvent, TabNavigator};

use crate::buffer::LogBuffer;
use crate::persistence::{SnapshotStorage, SnapshotWriter};
use std::collections::HashSet;
use std::sync::Arc;
use tabrec_common::config::schema::BufferConfig;
use tabrec_common::protocol::{
    ClearStatus, LogEntry, LogSnapshot, NetworkLogEntry, PersistedSnapshot, StoreRequest,
    StoreResponse, TabId,
};
use tracing::{debug, info, warn};

pub struct Store {
    recording_tabs: HashSet<TabId>,
    console_logs: LogBuffer<LogEntry>,
    network_logs: LogBuffer<NetworkLogEntry>,
    writer: SnapshotWriter,
    indicator: Arc<dyn RecordingIndicator>,
}

impl Store {
    /// Construct and re-hydrate the buffers from the last persisted snapshot.
    pub async fn hydrate(
        buffers: &BufferConfig,
        storage: Arc<dyn SnapshotStorage>,
        indicator: Arc<dyn RecordingIndicator>,
    ) -> Self {
        let snapshot = match storage.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to load persisted snapshot, starting empty: {}", e);
                PersistedSnapshot::default()
            }
        };

        let console_logs = LogBuffer::with_entries(
            buffers.console_capacity,
            snapshot.console_logs.unwrap_or_default(),
        );
        let network_logs = LogBuffer::with_entries(
            buffers.network_capacity,
            snapshot.network_logs.unwrap_or_default(),
        );
        info!(
            "Store hydrated with {} console and {} network entries",
            console_logs.len(),
            network_logs.len()
        );

        let writer = SnapshotWriter::spawn(storage);
        if snapshot.is_recording == Some(true) {
            // No relay outlives a background restart.
            warn!("Snapshot claimed an active recording; resetting to stopped");
            writer.write(PersistedSnapshot {
                is_recording: Some(false),
                ..Default::default()
            });
        }

        Self {
            recording_tabs: HashSet::new(),
            console_logs,
            network_logs,
            writer,
            indicator,
        }
    }

    /// First install: wipe everything and write the pristine layout.
    pub fn on_installed(&mut self) {
        self.recording_tabs.clear();
        self.console_logs.clear();
        self.network_logs.clear();
        self.writer.write(PersistedSnapshot::pristine());
    }

    pub fn mark_recording_started(&mut self, tab: TabId, url: &str) {
        info!("Recording started on tab {} ({})", tab, url);
        self.recording_tabs.insert(tab);
        self.console_logs.clear();
        self.network_logs.clear();
        self.writer.write(PersistedSnapshot {
            is_recording: Some(true),
            console_logs: Some(Vec::new()),
            network_logs: Some(Vec::new()),
        });
        self.indicator.show(tab);
    }

    pub fn mark_recording_stopped(&mut self, tab: TabId) {
        info!("Recording stopped on tab {}", tab);
        self.recording_tabs.remove(&tab);
        self.writer.write(PersistedSnapshot {
            is_recording: Some(false),
            ..Default::default()
        });
        self.indicator.clear(tab);
    }

    pub fn append_console_log(&mut self, entry: LogEntry) {
        let evicted = self.console_logs.push(entry);
        if evicted > 0 {
            debug!("Console buffer full, evicted {} oldest entries", evicted);
        }
        self.writer.write(PersistedSnapshot {
            console_logs: Some(self.console_logs.to_vec()),
            ..Default::default()
        });
    }

    pub fn append_network_log(&mut self, entry: NetworkLogEntry) {
        let evicted = self.network_logs.push(entry);
        if evicted > 0 {
            debug!("Network buffer full, evicted {} oldest entries", evicted);
        }
        self.writer.write(PersistedSnapshot {
            network_logs: Some(self.network_logs.to_vec()),
            ..Default::default()
        });
    }

    pub fn logs(&self) -> LogSnapshot {
        LogSnapshot {
            console_logs: self.console_logs.to_vec(),
            network_logs: self.network_logs.to_vec(),
        }
    }

    pub fn clear_logs(&mut self) {
        self.console_logs.clear();
        self.network_logs.clear();
        self.writer.write(PersistedSnapshot {
            console_logs: Some(Vec::new()),
            network_logs: Some(Vec::new()),
            ..Default::default()
        });
    }

    pub fn is_recording(&self, tab: TabId) -> bool {
        self.recording_tabs.contains(&tab)
    }

    /// Tab closed: forget its recording flag. Buffers are untouched.
    pub fn on_tab_removed(&mut self, tab: TabId) {
        if self.recording_tabs.remove(&tab) {
            info!("Recording tab {} closed", tab);
        }
    }

    /// Navigation finished. True when the tab needs a fresh relay/interceptor pair.
    pub fn on_navigation_complete(&self, tab: TabId) -> bool {
        self.is_recording(tab)
    }

    /// Resolves once every snapshot write queued so far has landed.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    pub fn handle(&mut self, request: StoreRequest) -> Option<StoreResponse> {
        match request {
            StoreRequest::RecordingStarted { tab_id, url } => {
                self.mark_recording_started(tab_id, &url);
                None
            }
            StoreRequest::RecordingStopped { tab_id } => {
                self.mark_recording_stopped(tab_id);
                None
            }
            StoreRequest::ConsoleLog { log } => {
                self.append_console_log(log);
                None
            }
            StoreRequest::NetworkLog { log } => {
                self.append_network_log(log);
                None
            }
            StoreRequest::GetRecordingStatus { tab_id } => Some(StoreResponse::RecordingStatus {
                is_recording: self.is_recording(tab_id),
            }),
            StoreRequest::GetLogs => Some(StoreResponse::Logs(self.logs())),
            StoreRequest::ClearLogs => {
                self.clear_logs();
                Some(StoreResponse::Cleared {
                    status: ClearStatus::Cleared,
                })
            }
        }
    }
}
