use thiserror::Error;

/// Top-level error type for the Sahay kiosk system.
///
/// Each variant covers a subsystem. Subsystem crates define their own error
/// types and implement `From<SubsystemError> for SahayError` so that the `?`
/// operator works seamlessly across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SahayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Invalid input: {0}")]
    Input(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("A session is already active")]
    SessionAlreadyActive,

    #[error("No active session")]
    NoActiveSession,

    #[error("{service} failed: {reason}")]
    Upstream { service: String, reason: String },

    #[error("{service} timed out after {budget_ms}ms")]
    Timeout { service: String, budget_ms: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SahayError {
    /// Whether this error comes from an external collaborator.
    ///
    /// Timeouts are treated as a subtype of upstream failure: both degrade
    /// to the fallback response rather than propagating to the caller.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            SahayError::Upstream { .. } | SahayError::Timeout { .. }
        )
    }
}

impl From<toml::de::Error> for SahayError {
    fn from(err: toml::de::Error) -> Self {
        SahayError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for SahayError {
    fn from(err: toml::ser::Error) -> Self {
        SahayError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for SahayError {
    fn from(err: serde_json::Error) -> Self {
        SahayError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Sahay operations.
pub type Result<T> = std::result::Result<T, SahayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SahayError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");

        let err = SahayError::Input("empty request".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty request");

        let err = SahayError::SessionAlreadyActive;
        assert_eq!(err.to_string(), "A session is already active");

        let err = SahayError::NoActiveSession;
        assert_eq!(err.to_string(), "No active session");
    }

    #[test]
    fn test_upstream_display() {
        let err = SahayError::Upstream {
            service: "llm".to_string(),
            reason: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "llm failed: rate limited");
    }

    #[test]
    fn test_timeout_display() {
        let err = SahayError::Timeout {
            service: "llm".to_string(),
            budget_ms: 30_000,
        };
        assert_eq!(err.to_string(), "llm timed out after 30000ms");
    }

    #[test]
    fn test_is_upstream() {
        assert!(SahayError::Upstream {
            service: "asr".to_string(),
            reason: "busy".to_string(),
        }
        .is_upstream());
        assert!(SahayError::Timeout {
            service: "tts".to_string(),
            budget_ms: 100,
        }
        .is_upstream());
        assert!(!SahayError::Storage("disk full".to_string()).is_upstream());
        assert!(!SahayError::Input("empty".to_string()).is_upstream());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SahayError = io_err.into();
        assert!(matches!(err, SahayError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_from_toml_de() {
        let bad_toml = "invalid = [[[";
        let parsed: std::result::Result<toml::Value, _> = toml::from_str(bad_toml);
        let err: SahayError = parsed.unwrap_err().into();
        assert!(matches!(err, SahayError::Config(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad_json = "{ invalid json }";
        let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str(bad_json);
        let err: SahayError = parsed.unwrap_err().into();
        assert!(matches!(err, SahayError::Serialization(_)));
    }

    #[test]
    fn test_result_type_with_question_mark() {
        fn inner() -> Result<String> {
            let io_result: std::result::Result<i32, std::io::Error> = Ok(42);
            let _value = io_result?;
            Ok("success".to_string())
        }

        assert_eq!(inner().unwrap(), "success");
    }

    #[test]
    fn test_error_debug_impl() {
        let err = SahayError::Retrieval("dimension mismatch".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("Retrieval"));
        assert!(debug_str.contains("dimension mismatch"));
    }
}
