#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tabrec_engine::browser::SimulatedBrowser;
use tabrec_engine::config::schema::{BufferConfig, RelayConfig};
use tabrec_engine::controller::TabHost;
use tabrec_engine::persistence::MemoryStorage;
use tabrec_engine::protocol::{
    LogEntry, LogLevel, PersistedSnapshot, RelayRequest, RelayResponse, TabId, now,
};
use tabrec_engine::store::{BadgeIndicator, Store, StoreHandle, StoreService};

pub struct Harness {
    pub store: StoreHandle,
    pub storage: Arc<MemoryStorage>,
    pub badges: Arc<BadgeIndicator>,
}

pub async fn spawn_store_with(buffers: BufferConfig, snapshot: PersistedSnapshot) -> Harness {
    let storage = Arc::new(MemoryStorage::with_snapshot(snapshot));
    let badges = Arc::new(BadgeIndicator::new());
    let store = Store::hydrate(&buffers, storage.clone(), badges.clone()).await;
    let (store, _task) = StoreService::spawn(store);
    Harness {
        store,
        storage,
        badges,
    }
}

pub async fn spawn_store() -> Harness {
    spawn_store_with(BufferConfig::default(), PersistedSnapshot::default()).await
}

pub fn fast_relay_config() -> RelayConfig {
    RelayConfig {
        ready_attempts: 10,
        ready_interval_ms: 5,
        injection_delay_ms: 1,
    }
}

pub fn entry(message: &str) -> LogEntry {
    LogEntry {
        timestamp: now(),
        level: LogLevel::Log,
        message: message.to_string(),
        source_url: "https://example.com/".into(),
        user_agent: "test-agent".into(),
    }
}

/// Wait until the tab's relay answers and reports an installed interceptor.
pub async fn wait_until_initialized(browser: &SimulatedBrowser, tab: TabId) -> RelayResponse {
    for _ in 0..200 {
        if let Ok(status @ RelayResponse::Status {
            is_initialized: true,
            ..
        }) = browser.send_to_relay(tab, RelayRequest::GetStatus).await
        {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("relay in tab {} never became ready", tab);
}

pub fn messages(entries: &[LogEntry]) -> Vec<String> {
    entries.iter().map(|e| e.message.clone()).collect()
}
