use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tabrec_common::error::RecorderError;
use tabrec_common::protocol::{ExportDocument, LogSnapshot, export_file_name};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Nothing captured; no file written.
    NoData,
    Written(PathBuf),
}

/// Build the export document. Network entries are not part of it.
pub fn build_export(snapshot: &LogSnapshot, url: &str, at: DateTime<Utc>) -> Option<ExportDocument> {
    if snapshot.console_logs.is_empty() {
        return None;
    }
    Some(ExportDocument {
        timestamp: at,
        url: url.to_string(),
        console_logs: snapshot.console_logs.clone(),
    })
}

pub async fn write_export(
    snapshot: &LogSnapshot,
    url: &str,
    directory: &Path,
    at: DateTime<Utc>,
) -> Result<ExportOutcome, RecorderError> {
    let Some(document) = build_export(snapshot, url, at) else {
        info!("No data to export");
        return Ok(ExportOutcome::NoData);
    };

    tokio::fs::create_dir_all(directory).await?;
    let path = directory.join(export_file_name(at));
    let content = serde_json::to_string_pretty(&document)?;
    tokio::fs::write(&path, content).await?;

    info!(
        "Exported {} console entries to {}",
        document.console_logs.len(),
        path.display()
    );
    Ok(ExportOutcome::Written(path))
}
