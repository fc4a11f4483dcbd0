//! Error types for the CLI

/// CLI Result type
pub type Result<T> = std::result::Result<T, Error>;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("scale error: {0}")]
    Scaler(#[from] kscaler::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("command failed: {message}")]
    CommandFailed { message: String },

    #[error("{failed} of {total} workloads were not scaled")]
    PartialFailure { failed: usize, total: usize },

    #[error("run stopped before {kind}s were processed: {message}")]
    RunStopped { kind: String, message: String },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn command_failed(message: impl Into<String>) -> Self {
        Error::CommandFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_message() {
        let err = Error::PartialFailure {
            failed: 2,
            total: 7,
        };
        assert_eq!(err.to_string(), "2 of 7 workloads were not scaled");
    }

    #[test]
    fn test_scaler_error_converts() {
        let err: Error = kscaler::Error::cancelled("apply-scale").into();
        assert!(matches!(err, Error::Scaler(_)));
        assert!(err.to_string().contains("cancelled before apply-scale"));
    }
}
