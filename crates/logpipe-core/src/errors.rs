//! Error types for logpipe
//!
//! This module contains all error types used by the delivery core: grammar
//! errors raised while parsing connection strings, configuration errors,
//! failures reported by sinks, scheduler lifecycle errors, and the
//! `LogpipeError` type that unifies them.

use crate::command::SchedulerAction;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Connection string and option grammar errors
///
/// Positions are 1-based character offsets into the trimmed input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Missing \"(\" at position {position}")]
    MissingOpenParen { position: usize },
    #[error("Missing \")\" at position {position}")]
    MissingCloseParen { position: usize },
    #[error("Quoted values not closed at protocol \"{protocol}\" (opened at position {position})")]
    UnterminatedQuote { protocol: String, position: usize },
    #[error("Missing \"=\" at \"{protocol}\" protocol (position {position})")]
    MissingEquals { protocol: String, position: usize },
    #[error("Empty protocol name at position {position}")]
    EmptyProtocolName { position: usize },
    #[error("Empty option name at \"{protocol}\" protocol (position {position})")]
    EmptyOptionKey { protocol: String, position: usize },
}

impl ParseError {
    /// Character position the error refers to
    pub fn position(&self) -> usize {
        match self {
            ParseError::MissingOpenParen { position }
            | ParseError::MissingCloseParen { position }
            | ParseError::UnterminatedQuote { position, .. }
            | ParseError::MissingEquals { position, .. }
            | ParseError::EmptyProtocolName { position }
            | ParseError::EmptyOptionKey { position, .. } => *position,
        }
    }
}

/// Invalid configuration values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Option \"{key}\" is not available for protocol \"{protocol}\"")]
    UnknownOption { protocol: String, key: String },
    #[error("Invalid value \"{value}\" for option \"{key}\"")]
    InvalidValue { key: String, value: String },
    #[error("Invalid scheduler configuration: {reason}")]
    InvalidScheduler { reason: String },
    #[error("Asynchronous mode is not enabled for protocol \"{protocol}\"")]
    AsyncDisabled { protocol: String },
}

/// Failures raised by a sink while executing a command
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Sink is not connected")]
    NotConnected,
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },
    #[error("Sink panicked while executing {action}: {message}")]
    Panicked {
        action: SchedulerAction,
        message: String,
    },
    #[error("Sink error: {0}")]
    Custom(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Scheduler lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler has been stopped and cannot be restarted")]
    AlreadyStopped,
    #[error("Failed to spawn scheduler worker: {0}")]
    Spawn(#[source] std::io::Error),
}

// ----------------------------------------------------------------------------
// Unified Error Type
// ----------------------------------------------------------------------------

/// Core error type for logpipe
#[derive(Debug, thiserror::Error)]
pub enum LogpipeError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl LogpipeError {
    /// Create an invalid scheduler configuration error with a reason
    pub fn invalid_config<T: Into<String>>(reason: T) -> Self {
        LogpipeError::Config(ConfigError::InvalidScheduler {
            reason: reason.into(),
        })
    }

    /// Create an unknown option error
    pub fn unknown_option<P: Into<String>, K: Into<String>>(protocol: P, key: K) -> Self {
        LogpipeError::Config(ConfigError::UnknownOption {
            protocol: protocol.into(),
            key: key.into(),
        })
    }
}

impl SinkError {
    /// Create a protocol error with a reason
    pub fn protocol<T: Into<String>>(reason: T) -> Self {
        SinkError::Protocol {
            reason: reason.into(),
        }
    }

    /// Wrap an error raised by a sink implementation
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        SinkError::Custom(Box::new(error))
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = std::result::Result<T, LogpipeError>;
pub type LogpipeResult<T> = Result<T>;
