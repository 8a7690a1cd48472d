use thiserror::Error;

/// Failures that cross a context boundary. Capture-path problems (argument
/// serialization, buffer overflow) never show up here: they are absorbed where
/// they happen.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Interceptor injection failed: {0}")]
    InjectionFailed(String),

    #[error("{target} not reachable after {attempts} attempts")]
    Unreachable { target: String, attempts: u32 },

    #[error("Context disconnected: {0}")]
    Disconnected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl RecorderError {
    /// Stable code for surfacing to a UI.
    pub fn code(&self) -> &'static str {
        match self {
            RecorderError::InjectionFailed(_) => "INJECTION_FAILED",
            RecorderError::Unreachable { .. } => "UNREACHABLE",
            RecorderError::Disconnected(_) => "DISCONNECTED",
            RecorderError::Serialization(_) => "SERIALIZATION_ERROR",
            RecorderError::Io(_) => "IO_ERROR",
            RecorderError::Other(_) => "UNKNOWN_ERROR",
        }
    }

    /// Connection-level failures that a caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecorderError::Unreachable { .. } | RecorderError::Disconnected(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_retry_classification() {
        let err = RecorderError::Unreachable {
            target: "relay for tab 3".into(),
            attempts: 10,
        };
        assert_eq!(err.code(), "UNREACHABLE");
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "relay for tab 3 not reachable after 10 attempts");

        let err = RecorderError::InjectionFailed("script blocked".into());
        assert_eq!(err.code(), "INJECTION_FAILED");
        assert!(!err.is_retryable());
    }
}
