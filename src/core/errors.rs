//! Error types for the clickspectre library.
//!
//! This module provides structured error types for every stage of the
//! analysis pipeline, the substring/code classification used to decide
//! whether a backend failure is an authentication error or a transient
//! network error, and the process exit signals consumed by the CLI.

use std::io;

use thiserror::Error;

/// Main result type for clickspectre operations.
pub type Result<T> = std::result::Result<T, SpectreError>;

/// ClickHouse server error codes that indicate an authentication failure.
const AUTH_ERROR_CODES: [u32; 4] = [193, 194, 497, 516];

/// Case-insensitive markers identifying authentication failures.
const AUTH_ERROR_MARKERS: &[&str] = &[
    "authentication failed",
    "authentication error",
    "invalid credentials",
    "invalid password",
    "password is incorrect",
    "wrong password",
    "unknown user",
    "unauthorized",
    "access denied",
];

/// Case-insensitive markers identifying transient, retriable failures.
const RETRIABLE_ERROR_MARKERS: &[&str] = &[
    "timeout",
    "i/o timeout",
    "tls handshake timeout",
    "eof",
    "unexpected eof",
    "broken pipe",
    "connection reset",
    "connection refused",
    "connection aborted",
    "connection closed",
    "use of closed network connection",
    "network is unreachable",
    "no route to host",
    "no such host",
    "temporary failure in name resolution",
];

/// Comprehensive error type for all clickspectre operations.
#[derive(Error, Debug)]
pub enum SpectreError {
    /// Configuration errors surfaced before any I/O
    #[error("configuration error: {message}")]
    Config {
        /// Error description
        message: String,
        /// Configuration field that caused the error
        field: Option<String>,
    },

    /// Connection string could not be parsed
    #[error("invalid DSN: {message}")]
    Dsn {
        /// Error description
        message: String,
    },

    /// Connection establishment failures
    #[error("connection error: {message}")]
    Connect {
        /// Error description
        message: String,
    },

    /// Authentication failures; never retried
    #[error("authentication error: {message}")]
    Auth {
        /// Error description
        message: String,
    },

    /// A context deadline fired
    #[error("deadline exceeded: {message}")]
    Timeout {
        /// What was being waited on
        message: String,
    },

    /// Transient network failures; retried inside the retry envelope
    #[error("network error: {message}")]
    Network {
        /// Error description
        message: String,
    },

    /// Missing query-log table or unexpected projection
    #[error("schema error: {message}")]
    Schema {
        /// Error description
        message: String,
    },

    /// File I/O errors (baseline, reports)
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable error message
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("serialization error: {message}")]
    Serialization {
        /// Error description
        message: String,
        /// Underlying serialization error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Baseline file problems (parse failure, unsupported version)
    #[error("baseline error: {message}")]
    Baseline {
        /// Error description
        message: String,
    },

    /// A requested entity does not exist
    #[error("not found: {message}")]
    NotFound {
        /// What was looked up
        message: String,
    },

    /// The run context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Generic internal errors
    #[error("internal error: {message}")]
    Internal {
        /// Error description
        message: String,
    },
}

impl SpectreError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new configuration error with field context
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new DSN error
    pub fn dsn(message: impl Into<String>) -> Self {
        Self::Dsn {
            message: message.into(),
        }
    }

    /// Create a new connection error
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Create a new authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a new deadline error
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Create a new transient network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a new I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a new not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a new baseline error
    pub fn baseline(message: impl Into<String>) -> Self {
        Self::Baseline {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify a raw backend error message into an error value.
    ///
    /// Authentication markers win over retriable markers so that a message
    /// like "access denied; connection closed" fails fast.
    pub fn from_backend(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_auth_error_text(&message) {
            Self::Auth { message }
        } else if is_retriable_error_text(&message) {
            Self::Network { message }
        } else {
            Self::Connect { message }
        }
    }

    /// Whether this error is an authentication failure (fail fast, no retry).
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Whether this error may be retried inside the retry envelope.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Whether this error was caused by a context deadline.
    pub fn is_deadline(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Check whether an error message carries an authentication marker or a
/// known server authentication code.
pub fn is_auth_error_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    if AUTH_ERROR_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    AUTH_ERROR_CODES
        .iter()
        .any(|code| lower.contains(&format!("code: {code}")))
}

/// Check whether an error message matches a transient-failure marker.
pub fn is_retriable_error_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    RETRIABLE_ERROR_MARKERS.iter().any(|m| lower.contains(m))
}

impl From<io::Error> for SpectreError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<serde_json::Error> for SpectreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON serialization failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for SpectreError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML parsing failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

/// Process exit signals consumed by the CLI.
///
/// `FindingsDetected` is raised when, after baseline suppression, the sum of
/// all recommendation buckets plus anomalies is positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitSignal {
    /// Analysis completed with no findings
    Success,
    /// Unclassified failure
    Internal,
    /// Configuration or flag validation failure
    InvalidArgument,
    /// Missing file, host, or table
    NotFound,
    /// Authentication failure
    Auth,
    /// Connection or transient network failure
    Network,
    /// Analysis completed and findings remain after suppression
    FindingsDetected,
}

impl ExitSignal {
    /// Numeric process exit code.
    pub fn code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::Internal => 1,
            Self::InvalidArgument => 2,
            Self::NotFound => 3,
            Self::Auth => 4,
            Self::Network => 5,
            Self::FindingsDetected => 6,
        }
    }

    /// Classify a run error into an exit signal.
    ///
    /// Error kinds are matched first; unrecognized kinds fall back to
    /// message-substring heuristics.
    pub fn from_error(err: &SpectreError) -> Self {
        match err {
            SpectreError::Config { .. } | SpectreError::Dsn { .. } => Self::InvalidArgument,
            SpectreError::Auth { .. } => Self::Auth,
            SpectreError::Timeout { .. }
            | SpectreError::Network { .. }
            | SpectreError::Connect { .. } => Self::Network,
            SpectreError::NotFound { .. } => Self::NotFound,
            SpectreError::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                Self::NotFound
            }
            _ => Self::from_message(&err.to_string()),
        }
    }

    fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("not a directory")
            || lower.contains("does not exist")
            || lower.contains("no such file")
        {
            return Self::NotFound;
        }

        if lower.contains("connection refused")
            || lower.contains("i/o timeout")
            || lower.contains("network is unreachable")
        {
            return Self::Network;
        }

        if lower.contains("required")
            || lower.contains("invalid")
            || lower.contains("must be")
            || lower.contains("expected")
        {
            return Self::InvalidArgument;
        }

        Self::Internal
    }
}
