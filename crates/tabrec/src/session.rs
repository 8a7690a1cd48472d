use anyhow::{Result, bail};
use tabrec_engine::config::RecorderConfig;
use tabrec_engine::protocol::{LogSnapshot, StoreRequest, StoreResponse, TabId};
use tabrec_engine::store::StoreHandle;
use tabrec_r::{StoreClient, open_store};
use tracing::{debug, info};

/// A running server owns the snapshot file; without one the CLI opens it itself.
pub enum Session {
    Remote(StoreClient),
    Local(StoreHandle),
}

impl Session {
    pub async fn open(config: &RecorderConfig) -> Self {
        match StoreClient::connect(config.server.port).await {
            Ok(client) => {
                info!("Using running store server on port {}", config.server.port);
                Session::Remote(client)
            }
            Err(e) => {
                debug!("No store server ({}), opening snapshot directly", e);
                let (store, _service) = open_store(config).await;
                Session::Local(store)
            }
        }
    }

    async fn call(&mut self, request: StoreRequest) -> Result<Option<StoreResponse>> {
        let response = match self {
            Session::Remote(client) => client.call(request).await?,
            Session::Local(store) => store.call(request).await?,
        };
        Ok(response)
    }

    pub async fn get_logs(&mut self) -> Result<LogSnapshot> {
        match self.call(StoreRequest::GetLogs).await? {
            Some(StoreResponse::Logs(snapshot)) => Ok(snapshot),
            other => bail!("Unexpected response to getLogs: {:?}", other),
        }
    }

    pub async fn is_recording(&mut self, tab: TabId) -> Result<bool> {
        match self
            .call(StoreRequest::GetRecordingStatus { tab_id: tab })
            .await?
        {
            Some(StoreResponse::RecordingStatus { is_recording }) => Ok(is_recording),
            other => bail!("Unexpected response to getRecordingStatus: {:?}", other),
        }
    }

    pub async fn clear_logs(&mut self) -> Result<()> {
        match self.call(StoreRequest::ClearLogs).await? {
            Some(StoreResponse::Cleared { .. }) => Ok(()),
            other => bail!("Unexpected response to clearLogs: {:?}", other),
        }
    }

    /// Local sessions wait for their snapshot writes to land.
    pub async fn close(self) -> Result<()> {
        match self {
            Session::Remote(client) => client.close().await,
            Session::Local(store) => store.flush().await?,
        }
        Ok(())
    }
}
