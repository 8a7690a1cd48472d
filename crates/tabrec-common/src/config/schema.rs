use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default)]
    pub buffers: BufferConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_console_capacity")]
    pub console_capacity: usize,
    #[serde(default = "default_network_capacity")]
    pub network_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            console_capacity: default_console_capacity(),
            network_capacity: default_network_capacity(),
        }
    }
}

fn default_console_capacity() -> usize {
    1000
}

fn default_network_capacity() -> usize {
    500
}

/// Readiness polling never runs longer than this, whatever the config says.
pub const MAX_READY_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_ready_attempts")]
    pub ready_attempts: u32,
    #[serde(default = "default_ready_interval_ms")]
    pub ready_interval_ms: u64,
    #[serde(default = "default_injection_delay_ms")]
    pub injection_delay_ms: u64,
}

impl RelayConfig {
    /// `ready_attempts` clamped to `1..=MAX_READY_ATTEMPTS`.
    pub fn bounded_attempts(&self) -> u32 {
        self.ready_attempts.clamp(1, MAX_READY_ATTEMPTS)
    }

    pub fn ready_interval(&self) -> Duration {
        Duration::from_millis(self.ready_interval_ms)
    }

    pub fn injection_delay(&self) -> Duration {
        Duration::from_millis(self.injection_delay_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ready_attempts: default_ready_attempts(),
            ready_interval_ms: default_ready_interval_ms(),
            injection_delay_ms: default_injection_delay_ms(),
        }
    }
}

fn default_ready_attempts() -> u32 {
    10
}

fn default_ready_interval_ms() -> u64 {
    100
}

fn default_injection_delay_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Snapshot file. Falls back to `~/.tabrec/snapshot.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        match dirs::home_dir() {
            Some(home) => home.join(".tabrec").join("snapshot.json"),
            None => PathBuf::from("./tabrec-snapshot.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    9001
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_directory")]
    pub directory: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_directory(),
        }
    }
}

fn default_export_directory() -> PathBuf {
    PathBuf::from(".")
}
