use crate::counters::{status, BackendError, StatusCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TopoError {
    #[error("Counter backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for topoperf operations
pub type Result<T> = std::result::Result<T, TopoError>;

impl TopoError {
    /// Creates a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new topology error
    pub fn topology<S: Into<String>>(msg: S) -> Self {
        Self::Topology(msg.into())
    }

    /// Numeric status for callers that speak the backend's status codes.
    ///
    /// Backend errors keep their native code. Everything the measurement
    /// layer itself rejects collapses to [`status::EINVAL`].
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Backend(err) => err.code,
            Self::InvalidArgument(_) => status::EINVAL,
            Self::Io(_) => status::ESYS,
            Self::Config(_) | Self::Topology(_) | Self::Serialization(_) => status::EMISC,
        }
    }

    /// Returns true if the error came from the counter backend
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Backend(_) => "backend",
            Self::InvalidArgument(_) => "validation",
            Self::Config(_) => "config",
            Self::Topology(_) => "topology",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TopoError::invalid_argument("no events in event set");
        assert_eq!(err.to_string(), "Invalid argument: no events in event set");
        assert_eq!(err.category(), "validation");
        assert_eq!(err.status_code(), status::EINVAL);
    }

    #[test]
    fn test_backend_code_passes_through() {
        let err: TopoError = BackendError::new(status::ENOTRUN, "event set is not running").into();
        assert!(err.is_backend());
        assert_eq!(err.status_code(), status::ENOTRUN);
        assert_eq!(err.category(), "backend");
    }

    #[test]
    fn test_non_subsystem_errors_are_not_einval() {
        assert_eq!(TopoError::config("bad").status_code(), status::EMISC);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(TopoError::from(io).status_code(), status::ESYS);
    }
}
