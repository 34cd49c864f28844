/// Unified error handling for pasarela
///
/// Bootstrap errors (endpoint, routing, mode, TLS and configuration failures)
/// are terminal: they are surfaced to the caller and never retried. The
/// driver-side variants cover the CQL connection layer.

use std::fmt;
use std::io;
use thiserror::Error;

pub use crate::config::ConfigError;

/// Main error type for pasarela operations
#[derive(Debug, Error)]
pub enum PasarelaError {
    /// Malformed host or port
    #[error("Invalid endpoint '{host}:{port}': {reason}")]
    InvalidEndpoint {
        host: String,
        port: i64,
        reason: String,
    },

    /// A cluster member that carries no usable routing identifier
    #[error("Unroutable member: {message}")]
    UnroutableMember { message: String },

    /// Unrecognized connection mode selector
    #[error("Invalid connection mode: '{input}'")]
    InvalidMode { input: String },

    /// Key store / trust store read, parse or password failure
    #[error("TLS initialization failed: {message}")]
    TlsInit { message: String },

    /// Option required by the selected mode is absent
    #[error("Missing required option '{option}' for {mode} mode")]
    ConfigMissing { option: String, mode: String },

    /// Configuration file errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] io::Error),

    /// CQL frame parsing errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] CqlError),

    /// ERROR frame returned by a node
    #[error("Server error {code:#06x}: {message}")]
    Server { code: i32, message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// No contact point or node could be reached
    #[error("No host available: {message}")]
    NoHostAvailable { message: String },
}

/// CQL native protocol errors
#[derive(Debug, Error)]
pub enum CqlError {
    #[error("Unsupported protocol version byte {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("Unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Unexpected {received} response to {request}")]
    UnexpectedResponse { request: String, received: String },

    #[error("Frame body of {0} bytes exceeds the 256MB limit")]
    FrameTooLarge(usize),
}

/// Result type alias for pasarela operations
pub type PasarelaResult<T> = Result<T, PasarelaError>;

impl PasarelaError {
    /// Create an invalid endpoint error
    pub fn invalid_endpoint<H: Into<String>, R: Into<String>>(host: H, port: i64, reason: R) -> Self {
        PasarelaError::InvalidEndpoint {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    /// Create an unroutable member error
    pub fn unroutable<S: Into<String>>(message: S) -> Self {
        PasarelaError::UnroutableMember {
            message: message.into(),
        }
    }

    /// Create an invalid mode error
    pub fn invalid_mode<S: Into<String>>(input: S) -> Self {
        PasarelaError::InvalidMode {
            input: input.into(),
        }
    }

    /// Create a TLS initialization error
    pub fn tls_init<S: Into<String>>(message: S) -> Self {
        PasarelaError::TlsInit {
            message: message.into(),
        }
    }

    /// Create a missing option error
    pub fn config_missing<O: Into<String>, M: Into<String>>(option: O, mode: M) -> Self {
        PasarelaError::ConfigMissing {
            option: option.into(),
            mode: mode.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        PasarelaError::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a no host available error
    pub fn no_host<S: Into<String>>(message: S) -> Self {
        PasarelaError::NoHostAvailable {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (can retry)
    ///
    /// Bootstrap errors never are; connectivity errors are left to the caller.
    pub fn is_recoverable(&self) -> bool {
        match self {
            PasarelaError::Network(_) => true,
            PasarelaError::Timeout { .. } => true,
            PasarelaError::NoHostAvailable { .. } => true,
            _ => false,
        }
    }

    /// Whether this error ends the bootstrap path
    pub fn is_bootstrap_failure(&self) -> bool {
        matches!(
            self,
            PasarelaError::InvalidEndpoint { .. }
                | PasarelaError::UnroutableMember { .. }
                | PasarelaError::InvalidMode { .. }
                | PasarelaError::TlsInit { .. }
                | PasarelaError::ConfigMissing { .. }
                | PasarelaError::Config(_)
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PasarelaError::Config(_) => ErrorSeverity::Critical,
            PasarelaError::ConfigMissing { .. } => ErrorSeverity::Critical,
            PasarelaError::TlsInit { .. } => ErrorSeverity::Critical,
            PasarelaError::Network(_) => ErrorSeverity::Warning,
            PasarelaError::Timeout { .. } => ErrorSeverity::Warning,
            PasarelaError::UnroutableMember { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical errors that require immediate attention
    Critical,
    /// Errors that affect functionality but don't crash the system
    Error,
    /// Warnings about potential issues
    Warning,
    /// Informational messages about recoverable issues
    Info,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Warning => write!(f, "WARNING"),
            ErrorSeverity::Info => write!(f, "INFO"),
        }
    }
}

impl CqlError {
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        CqlError::Malformed(message.into())
    }

    pub fn unexpected<R: Into<String>, S: Into<String>>(request: R, received: S) -> Self {
        CqlError::UnexpectedResponse {
            request: request.into(),
            received: received.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = PasarelaError::invalid_endpoint("", 9042, "host is empty");
        assert!(matches!(error, PasarelaError::InvalidEndpoint { .. }));
        assert_eq!(error.to_string(), "Invalid endpoint ':9042': host is empty");

        let error = PasarelaError::config_missing("ingress.port", "ingress");
        assert_eq!(
            error.to_string(),
            "Missing required option 'ingress.port' for ingress mode"
        );
    }

    #[test]
    fn test_error_severity() {
        let config_error = PasarelaError::Config(ConfigError::ValidationError("test".to_string()));
        assert_eq!(config_error.severity(), ErrorSeverity::Critical);

        let network_error =
            PasarelaError::Network(io::Error::new(io::ErrorKind::ConnectionRefused, "test"));
        assert_eq!(network_error.severity(), ErrorSeverity::Warning);
        assert_eq!(ErrorSeverity::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn test_bootstrap_errors_are_terminal() {
        let errors = vec![
            PasarelaError::invalid_mode("bogus"),
            PasarelaError::tls_init("bad store"),
            PasarelaError::unroutable("no host id"),
            PasarelaError::config_missing("ingress.address", "ingress"),
        ];

        for error in errors {
            assert!(error.is_bootstrap_failure(), "{error}");
            assert!(!error.is_recoverable(), "{error}");
        }

        let timeout = PasarelaError::timeout("connect");
        assert!(timeout.is_recoverable());
        assert!(!timeout.is_bootstrap_failure());
    }

    #[test]
    fn test_server_error_display() {
        let error = PasarelaError::Server {
            code: 0x2200,
            message: "unconfigured table".to_string(),
        };
        assert_eq!(error.to_string(), "Server error 0x2200: unconfigured table");
    }

    #[test]
    fn test_cql_error_conversion() {
        let error: PasarelaError = CqlError::UnknownOpcode(0x42).into();
        assert!(matches!(error, PasarelaError::Protocol(CqlError::UnknownOpcode(0x42))));
    }
}
