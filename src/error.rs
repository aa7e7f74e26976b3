//! Error types and result aliases for the agentrace library.
//!
//! This module defines the core error type [`AgentraceError`] and the [`Result`] type alias
//! used throughout the library. All public APIs that can fail return `Result<T>` for
//! consistent error handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentraceError {
    #[error("Trace context error: {0}")]
    ContextError(String),

    #[error("Run error: {0}")]
    RunError(String),

    #[error("Evaluator error: {0}")]
    EvaluatorError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Timeout error: {0}")]
    TimeoutError(String),
}

pub type Result<T> = std::result::Result<T, AgentraceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_error_display() {
        let err = AgentraceError::ContextError("mismatched pop".to_string());
        assert_eq!(err.to_string(), "Trace context error: mismatched pop");
    }

    #[test]
    fn test_run_error_display() {
        let err = AgentraceError::RunError("duplicate run name: eval-1".to_string());
        assert_eq!(err.to_string(), "Run error: duplicate run name: eval-1");
    }

    #[test]
    fn test_evaluator_error_display() {
        let err = AgentraceError::EvaluatorError("judge unavailable".to_string());
        assert_eq!(err.to_string(), "Evaluator error: judge unavailable");
    }

    #[test]
    fn test_config_error_display() {
        let err = AgentraceError::ConfigError("config is not a mapping".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: config is not a mapping");
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: AgentraceError = json_err.into();

        match err {
            AgentraceError::SerializationError(_) => {}
            _ => panic!("Expected SerializationError"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AgentraceError = io_err.into();

        match err {
            AgentraceError::IoError(_) => {}
            _ => panic!("Expected IoError"),
        }
    }

    #[test]
    fn test_error_debug() {
        let err = AgentraceError::TimeoutError("evaluator exceeded 5s".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("TimeoutError"));
    }

    #[test]
    fn test_result_type() {
        let ok_result: Result<i32> = Ok(42);
        assert!(ok_result.is_ok());

        let err_result: Result<i32> = Err(AgentraceError::TimeoutError("evaluator".to_string()));
        assert!(err_result.is_err());
    }
}
