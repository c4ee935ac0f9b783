use std::fmt;
use thiserror::Error;

/// Protocol timers defined by SEMI E4/E37
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// SECS-I protocol timeout (ENQ/EOT and block/ACK handshake)
    T2,
    /// Reply timeout
    T3,
    /// SECS-I inter-block timeout
    T4,
    /// Connect separation timeout
    T5,
    /// Control transaction timeout
    T6,
    /// Not-selected timeout (HSMS) or first block byte timeout (SECS-I)
    T7,
    /// Inter-character timeout
    T8,
}

impl Timer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timer::T2 => "T2",
            Timer::T3 => "T3",
            Timer::T4 => "T4",
            Timer::T5 => "T5",
            Timer::T6 => "T6",
            Timer::T7 => "T7",
            Timer::T8 => "T8",
        }
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for SECS/GEM operations
#[derive(Error, Debug)]
pub enum SecsError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Not connected")]
    NotConnected,

    #[error("Connection lost")]
    ConnectionLost,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout {0}")]
    Timeout(Timer),

    #[error("Retry limit exceeded after {0} attempts")]
    RetryExhausted(u32),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session rejected: {0}")]
    SessionRejected(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid item: {0}")]
    InvalidItem(String),

    #[error("Value out of range: {0}")]
    ValueOutOfRange(String),

    #[error("Item length {0} exceeds 0xFFFFFF")]
    LengthTooLarge(usize),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("SML parse error at {line}:{column}: {message}")]
    SmlParse {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Frame invalid: {0}")]
    FrameInvalid(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Construction,
    Decode,
    Transport,
    Timeout,
    Protocol,
    Config,
}

impl SecsError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SecsError::InvalidMessage(_)
            | SecsError::InvalidItem(_)
            | SecsError::ValueOutOfRange(_)
            | SecsError::LengthTooLarge(_) => ErrorCategory::Construction,
            SecsError::Decode(_) | SecsError::SmlParse { .. } | SecsError::FrameInvalid(_) => {
                ErrorCategory::Decode
            }
            SecsError::Connection(_)
            | SecsError::NotConnected
            | SecsError::ConnectionLost
            | SecsError::ConnectionClosed
            | SecsError::RetryExhausted(_) => ErrorCategory::Transport,
            SecsError::Timeout(_) => ErrorCategory::Timeout,
            SecsError::Protocol(_) | SecsError::SessionRejected(_) => ErrorCategory::Protocol,
            SecsError::Config(_) => ErrorCategory::Config,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SecsError::Timeout(_))
    }

    /// The timer that expired, if this is a timeout
    pub fn timer(&self) -> Option<Timer> {
        match self {
            SecsError::Timeout(t) => Some(*t),
            _ => None,
        }
    }

    /// Shorthand for a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        SecsError::Decode(message.into())
    }

    /// Builds a transport error from an io error kind and message
    pub fn io(kind: std::io::ErrorKind, message: impl Into<String>) -> Self {
        SecsError::Connection(std::io::Error::new(kind, message.into()))
    }
}

/// Result type alias for SECS/GEM operations
pub type SecsResult<T> = Result<T, SecsError>;
