use chrono::{DateTime, SubsecRound, Utc};
use serde::de::{self, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Browser tab identifier as handed out by the host.
pub type TabId = u32;

/// Tag stamped on every page broadcast so the relay can ignore unrelated
/// same-document traffic.
pub const PAGE_SOURCE_TAG: &str = "tab-recorder";

pub const RECORDING_STARTED_MESSAGE: &str = "Tab Recorder: Console recording started";
pub const RECORDING_STOPPED_MESSAGE: &str = "Tab Recorder: Console recording stopped";

/// Current time at the millisecond precision the wire format carries.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================
// Captured records
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Log,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One captured console call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(rename = "url", alias = "sourceUrl")]
    pub source_url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Fetch,
    Xhr,
}

/// HTTP status of a captured request, or `"error"` when the request never
/// produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Code(u16),
    Error,
}

impl Serialize for ResponseStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ResponseStatus::Code(code) => serializer.serialize_u16(*code),
            ResponseStatus::Error => serializer.serialize_str("error"),
        }
    }
}

impl<'de> Deserialize<'de> for ResponseStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawStatus {
            Code(u16),
            Text(String),
        }

        match RawStatus::deserialize(deserializer)? {
            RawStatus::Code(code) => Ok(ResponseStatus::Code(code)),
            RawStatus::Text(text) if text == "error" => Ok(ResponseStatus::Error),
            RawStatus::Text(text) => Err(de::Error::invalid_value(
                Unexpected::Str(&text),
                &"an HTTP status code or \"error\"",
            )),
        }
    }
}

/// Fetch responses expose a header map; XHR only hands out the raw header block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseHeaders {
    Map(BTreeMap<String, String>),
    Raw(String),
}

impl Default for ResponseHeaders {
    fn default() -> Self {
        ResponseHeaders::Map(BTreeMap::new())
    }
}

/// One completed request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkLogEntry {
    pub transport: Transport,
    pub method: String,
    pub url: String,
    pub status: ResponseStatus,
    #[serde(with = "iso8601")]
    pub request_time: DateTime<Utc>,
    #[serde(with = "iso8601")]
    pub response_time: DateTime<Utc>,
    pub response_body: String,
    #[serde(default)]
    pub headers: ResponseHeaders,
}

// ============================================================
// Page broadcast (interceptor -> relay, same document only)
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkTag {
    #[serde(rename = "networkLog")]
    NetworkLog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCapture {
    #[serde(rename = "type")]
    pub kind: NetworkTag,
    #[serde(flatten)]
    pub entry: NetworkLogEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleCapture {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PagePayload {
    Network(NetworkCapture),
    Console(ConsoleCapture),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMessage {
    pub source: String,
    #[serde(flatten)]
    pub payload: PagePayload,
}

impl PageMessage {
    pub fn console(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            source: PAGE_SOURCE_TAG.to_string(),
            payload: PagePayload::Console(ConsoleCapture {
                level,
                message: message.into(),
            }),
        }
    }

    pub fn network(entry: NetworkLogEntry) -> Self {
        Self {
            source: PAGE_SOURCE_TAG.to_string(),
            payload: PagePayload::Network(NetworkCapture {
                kind: NetworkTag::NetworkLog,
                entry,
            }),
        }
    }

    pub fn is_ours(&self) -> bool {
        self.source == PAGE_SOURCE_TAG
    }
}

// ============================================================
// Store protocol (UI/Relay -> Store)
// ============================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum StoreRequest {
    #[serde(rename_all = "camelCase")]
    RecordingStarted { tab_id: TabId, url: String },
    #[serde(rename_all = "camelCase")]
    RecordingStopped { tab_id: TabId },
    ConsoleLog { log: LogEntry },
    NetworkLog { log: NetworkLogEntry },
    #[serde(rename_all = "camelCase")]
    GetRecordingStatus { tab_id: TabId },
    GetLogs,
    ClearLogs,
}

impl StoreRequest {
    pub fn action(&self) -> &'static str {
        match self {
            StoreRequest::RecordingStarted { .. } => "recordingStarted",
            StoreRequest::RecordingStopped { .. } => "recordingStopped",
            StoreRequest::ConsoleLog { .. } => "consoleLog",
            StoreRequest::NetworkLog { .. } => "networkLog",
            StoreRequest::GetRecordingStatus { .. } => "getRecordingStatus",
            StoreRequest::GetLogs => "getLogs",
            StoreRequest::ClearLogs => "clearLogs",
        }
    }

    /// Whether the sender expects an answer.
    pub fn expects_response(&self) -> bool {
        matches!(
            self,
            StoreRequest::GetRecordingStatus { .. }
                | StoreRequest::GetLogs
                | StoreRequest::ClearLogs
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearStatus {
    #[serde(rename = "cleared")]
    Cleared,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSnapshot {
    pub console_logs: Vec<LogEntry>,
    pub network_logs: Vec<NetworkLogEntry>,
}

impl LogSnapshot {
    pub fn is_empty(&self) -> bool {
        self.console_logs.is_empty() && self.network_logs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreResponse {
    #[serde(rename_all = "camelCase")]
    RecordingStatus { is_recording: bool },
    Logs(LogSnapshot),
    Cleared { status: ClearStatus },
}

/// Tab lifecycle notice from a background that reaches the store over a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TabLifecycle {
    #[serde(rename_all = "camelCase")]
    TabRemoved { tab_id: TabId },
    #[serde(rename_all = "camelCase")]
    NavigationComplete { tab_id: TabId },
}

// ============================================================
// Relay protocol (UI -> Relay, per tab)
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum RelayRequest {
    /// Load the interceptor if it is not loaded yet, without starting.
    Initialize,
    StartRecording,
    StopRecording,
    GetStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayResponse {
    #[serde(rename_all = "camelCase")]
    Status {
        is_recording: bool,
        is_initialized: bool,
    },
    Ack {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl RelayResponse {
    pub fn ok() -> Self {
        RelayResponse::Ack {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        RelayResponse::Ack {
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn unknown_action() -> Self {
        Self::failed("Unknown action")
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RelayResponse::Ack { success: true, .. })
    }
}

// ============================================================
// Persistence and export layouts
// ============================================================

/// Key/value snapshot. Also used as a patch: only present keys are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_recording: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_logs: Option<Vec<LogEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_logs: Option<Vec<NetworkLogEntry>>,
}

impl PersistedSnapshot {
    /// The layout written when the extension is first installed.
    pub fn pristine() -> Self {
        Self {
            is_recording: Some(false),
            console_logs: Some(Vec::new()),
            network_logs: Some(Vec::new()),
        }
    }

    pub fn merge(&mut self, patch: PersistedSnapshot) {
        if patch.is_recording.is_some() {
            self.is_recording = patch.is_recording;
        }
        if patch.console_logs.is_some() {
            self.console_logs = patch.console_logs;
        }
        if patch.network_logs.is_some() {
            self.network_logs = patch.network_logs;
        }
    }
}

/// The JSON document handed to the user on export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    #[serde(with = "iso8601")]
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub console_logs: Vec<LogEntry>,
}

/// `tab-recorder-2024-05-01T12-30-00.json`
pub fn export_file_name(at: DateTime<Utc>) -> String {
    format!("tab-recorder-{}.json", at.format("%Y-%m-%dT%H-%M-%S"))
}
