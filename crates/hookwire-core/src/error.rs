//! Unified application error types for Hookwire.
//!
//! Every crate maps its internal errors into [`AppError`] so that a single
//! run-level error reaches whoever invoked the pipeline.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A configuration value is missing or invalid.
    Configuration,
    /// The hook handler executable could not be found on the search path.
    HandlerNotFound,
    /// The configured language cannot be used for remote hook execution.
    UnsupportedLanguage,
    /// The hook handler process could not be started.
    Spawn,
    /// The TCP connection to the hook handler failed or timed out.
    Connection,
    /// The hook handler process exited unexpectedly.
    HandlerCrashed,
    /// The hook handler process could not be terminated.
    Termination,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An I/O error occurred.
    Io,
    /// A hook failed.
    Hook,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::HandlerNotFound => write!(f, "HANDLER_NOT_FOUND"),
            Self::UnsupportedLanguage => write!(f, "UNSUPPORTED_LANGUAGE"),
            Self::Spawn => write!(f, "SPAWN"),
            Self::Connection => write!(f, "CONNECTION"),
            Self::HandlerCrashed => write!(f, "HANDLER_CRASHED"),
            Self::Termination => write!(f, "TERMINATION"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Io => write!(f, "IO"),
            Self::Hook => write!(f, "HOOK"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified application error used throughout Hookwire.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a handler-not-found error.
    pub fn handler_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HandlerNotFound, message)
    }

    /// Create an unsupported-language error.
    pub fn unsupported_language(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedLanguage, message)
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    /// Create a handler-crashed error.
    pub fn handler_crashed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HandlerCrashed, message)
    }

    /// Create a hook error.
    pub fn hook(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Hook, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Io, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
