//! WebSocket transport for the store message protocol.

pub mod client;
pub mod server;

use std::future::Future;
use std::sync::Arc;
use tabrec_engine::config::RecorderConfig;
use tabrec_engine::error::RecorderError;
use tabrec_engine::persistence::FileStorage;
use tabrec_engine::store::{NoopIndicator, Store, StoreHandle, StoreService};
use tokio::task::JoinHandle;
use tracing::info;

pub use client::StoreClient;
pub use server::{ServerHandle, StoreServer, dispatch};

/// Hydrate a store from the configured snapshot file and start its service.
pub async fn open_store(config: &RecorderConfig) -> (StoreHandle, JoinHandle<()>) {
    let path = config.storage.resolved_path();
    info!("Using snapshot file {}", path.display());
    let storage = Arc::new(FileStorage::new(path));
    let store = Store::hydrate(&config.buffers, storage, Arc::new(NoopIndicator)).await;
    StoreService::spawn(store)
}

/// Serve the store until `shutdown` resolves, then flush pending snapshot writes.
///
/// With `reset`, the store starts as on a fresh install: buffers emptied and
/// the snapshot file rewritten to its pristine layout.
pub async fn serve_until<F>(
    config: &RecorderConfig,
    port: u16,
    reset: bool,
    shutdown: F,
) -> Result<(), RecorderError>
where
    F: Future<Output = ()>,
{
    let (store, _service) = open_store(config).await;
    if reset {
        info!("Resetting recorder state");
        store.installed()?;
    }
    let handle = StoreServer::new(port, store.clone()).start().await?;
    info!("Connect the extension background to ws://localhost:{}", handle.port());

    shutdown.await;
    info!("Shutting down store server");
    handle.shutdown().await;
    store.flush().await
}
