use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::{
    borrow::Cow,
    error::Error as StdError,
    fmt::{Display, Error as FmtError, Formatter},
};
use thiserror::Error as ThisError;

/// Maximal number of dirty records logged per task.  Records beyond this
/// limit are still counted, but not logged.
pub const MAX_REPORTED_DIRTY_RECORDS: usize = 100;

/// Error information attached to a statistics report.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub message: String,
    /// Error code is a string that specifies this error type.
    pub error_code: Cow<'static, str>,
    /// Detailed error metadata.
    /// The contents of this field is determined by `error_code`.
    pub details: JsonValue,
}

/// Error trait which internal errors must implement such that it
/// can be transformed to a complete JSON error report.
pub trait DetailedError: StdError + Serialize {
    /// Identifying name of the error.
    fn error_code(&self) -> Cow<'static, str>;
}

impl<E> From<&E> for ErrorResponse
where
    E: DetailedError,
{
    fn from(error: &E) -> ErrorResponse {
        Self::from_error(error)
    }
}

impl ErrorResponse {
    /// Transform the detailed error to a complete JSON error report.
    /// - The message is retrieved using `to_string()` (available due to trait `StdError`)
    /// - The details are retrieved by serializing to JSON (available due to trait `Serialize`)
    pub fn from_error<E>(error: &E) -> Self
    where
        E: DetailedError,
    {
        let message = error.to_string();
        let error_code = error.error_code();
        let details = serde_json::to_value(error).unwrap_or_else(|e| {
            JsonValue::String(format!("Failed to serialize error. Details: '{e}'"))
        });

        Self {
            message,
            error_code,
            details,
        }
    }
}

/// Closed classification of every failure the engine can observe.
///
/// The retry layer decides whether to retry a failure by looking up its kind
/// in a caller-supplied set, so the set of kinds must not depend on concrete
/// error types.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ErrorKind {
    /// A column value cannot be represented as the requested type.
    ConversionUnsupported,

    /// Operation attempted on a closed channel.
    ChannelClosed,

    /// A task made no progress for longer than the hang threshold.
    TaskHungExpired,

    /// An asynchronous attempt did not complete within its timeout.
    AttemptTimeout,

    /// The retry pool had no thread available to run an attempt.
    AttemptRejected,

    /// An asynchronous attempt terminated without producing a result.
    AttemptAbandoned,

    /// An API was called with arguments that can never succeed.
    InvalidArgument,

    /// Invalid configuration.
    Config,

    /// The job accumulated more dirty records than allowed.
    ErrorLimitExceeded,

    /// Failure reported by a reader or writer plugin.
    Plugin,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversionUnsupported => "ConversionUnsupported",
            Self::ChannelClosed => "ChannelClosed",
            Self::TaskHungExpired => "TaskHungExpired",
            Self::AttemptTimeout => "AttemptTimeout",
            Self::AttemptRejected => "AttemptRejected",
            Self::AttemptAbandoned => "AttemptAbandoned",
            Self::InvalidArgument => "InvalidArgument",
            Self::Config => "Config",
            Self::ErrorLimitExceeded => "ErrorLimitExceeded",
            Self::Plugin => "Plugin",
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.as_str())
    }
}

/// Errors that know which [`ErrorKind`] they belong to.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Configuration error.
#[derive(ThisError, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ConfigError {
    /// Failed to parse configuration text.
    #[error("Failed to parse configuration: {error}")]
    Parse { error: String },

    /// Failed to read a configuration file.
    #[error("Failed to read configuration file '{path}': {error}")]
    Io { path: String, error: String },

    /// A setting holds a value outside its valid range.
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid_value(key: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            reason: reason.into(),
        }
    }
}

impl DetailedError for ConfigError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Parse { .. } => Cow::from("ConfigParseError"),
            Self::Io { .. } => Cow::from("ConfigIoError"),
            Self::InvalidValue { .. } => Cow::from("InvalidConfigValue"),
        }
    }
}

impl Classify for ConfigError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}
