use anyhow::Error as AnyError;
use ferry_adapterlib::{ConversionError, TaskId};
use ferry_types::error::{Classify, ConfigError, DetailedError, ErrorKind};
use serde::{ser::SerializeStruct, Serialize, Serializer};
use std::{
    borrow::Cow,
    error::Error as StdError,
    fmt::{Display, Error as FmtError, Formatter},
    sync::Arc,
};

/// Engine error.
///
/// Reports every failure observed while moving records from readers to
/// writers: invalid configuration, failures raised by plugins, and failures
/// detected by the engine itself (closed channels, hung tasks, attempts
/// that run out of time).
///
/// The error is cheap to clone so that the first failure of a task can be
/// captured in its [`Communication`](crate::Communication) and still be
/// returned to the caller.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SyncError {
    /// Invalid configuration.
    Config { config_error: ConfigError },

    /// A column value cannot be represented as the requested type.
    Conversion { conversion_error: ConversionError },

    /// Operation attempted on a closed channel.
    ChannelClosed,

    /// The task did not read any records for longer than the hang
    /// threshold.
    TaskHungExpired {
        task_id: TaskId,
        last_total_read_records: u64,
        elapsed_ms: i64,
    },

    /// An asynchronous attempt did not complete within its timeout.
    AttemptTimeout { timeout_ms: u64 },

    /// All threads of the retry pool were busy.
    AttemptRejected { max_threads: usize },

    /// An asynchronous attempt terminated without producing a result,
    /// e.g., because it panicked.
    AttemptAbandoned,

    /// API called with arguments that can never succeed.
    InvalidArgument { reason: String },

    /// The job accumulated more dirty records than allowed.
    ErrorLimitExceeded {
        error_records: u64,
        total_records: u64,
        reason: String,
    },

    /// Reader or writer plugin failure.
    #[serde(serialize_with = "serialize_plugin_error")]
    Plugin { error: Arc<AnyError> },

    /// A task exhausted its execution attempts.
    TaskFailed { task_id: TaskId, error: Arc<SyncError> },
}

fn serialize_plugin_error<S>(error: &Arc<AnyError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut ser = serializer.serialize_struct("Plugin", 2)?;
    ser.serialize_field("error", &format!("{error:#}"))?;
    ser.serialize_field("backtrace", &error.backtrace().to_string())?;
    ser.end()
}

impl SyncError {
    /// Wraps an error returned by a plugin.
    ///
    /// Engine errors that travelled through the plugin unchanged (e.g., a
    /// [`SyncError::ChannelClosed`] returned by the record sender) are
    /// unwrapped rather than reported as plugin failures.
    pub fn plugin(error: AnyError) -> Self {
        match error.downcast::<SyncError>() {
            Ok(error) => error,
            Err(error) => Self::Plugin {
                error: Arc::new(error),
            },
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn task_failed(task_id: TaskId, error: Arc<SyncError>) -> Self {
        Self::TaskFailed { task_id, error }
    }
}

impl Classify for SyncError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Conversion { .. } => ErrorKind::ConversionUnsupported,
            Self::ChannelClosed => ErrorKind::ChannelClosed,
            Self::TaskHungExpired { .. } => ErrorKind::TaskHungExpired,
            Self::AttemptTimeout { .. } => ErrorKind::AttemptTimeout,
            Self::AttemptRejected { .. } => ErrorKind::AttemptRejected,
            Self::AttemptAbandoned => ErrorKind::AttemptAbandoned,
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::ErrorLimitExceeded { .. } => ErrorKind::ErrorLimitExceeded,
            Self::Plugin { error } => classify_chain(error),
            Self::TaskFailed { error, .. } => error.kind(),
        }
    }
}

/// Kind of the first classifiable error in the chain, or
/// [`ErrorKind::Plugin`].
fn classify_chain(error: &AnyError) -> ErrorKind {
    for cause in error.chain() {
        if let Some(error) = cause.downcast_ref::<SyncError>() {
            return error.kind();
        }
        if let Some(error) = cause.downcast_ref::<ConversionError>() {
            return error.kind();
        }
        if let Some(error) = cause.downcast_ref::<ConfigError>() {
            return error.kind();
        }
    }
    ErrorKind::Plugin
}

impl DetailedError for SyncError {
    fn error_code(&self) -> Cow<'static, str> {
        match self {
            Self::Config { config_error } => config_error.error_code(),
            Self::Conversion { conversion_error } => conversion_error.error_code(),
            Self::ChannelClosed => Cow::from("ChannelClosed"),
            Self::TaskHungExpired { .. } => Cow::from("TaskHungExpired"),
            Self::AttemptTimeout { .. } => Cow::from("AttemptTimeout"),
            Self::AttemptRejected { .. } => Cow::from("AttemptRejected"),
            Self::AttemptAbandoned => Cow::from("AttemptAbandoned"),
            Self::InvalidArgument { .. } => Cow::from("InvalidArgument"),
            Self::ErrorLimitExceeded { .. } => Cow::from("ErrorLimitExceeded"),
            Self::Plugin { .. } => Cow::from("PluginError"),
            Self::TaskFailed { .. } => Cow::from("TaskFailed"),
        }
    }
}

impl StdError for SyncError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Config { config_error } => Some(config_error),
            Self::Conversion { conversion_error } => Some(conversion_error),
            Self::TaskFailed { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            Self::Config { config_error } => write!(f, "{config_error}"),
            Self::Conversion { conversion_error } => write!(f, "{conversion_error}"),
            Self::ChannelClosed => f.write_str("Channel is closed"),
            Self::TaskHungExpired {
                task_id,
                last_total_read_records,
                elapsed_ms,
            } => write!(
                f,
                "Task {task_id} hung expired: no records read for {elapsed_ms} ms (total read records: {last_total_read_records})"
            ),
            Self::AttemptTimeout { timeout_ms } => {
                write!(f, "Attempt did not complete within {timeout_ms} ms")
            }
            Self::AttemptRejected { max_threads } => write!(
                f,
                "Attempt rejected: all {max_threads} threads of the retry pool are busy"
            ),
            Self::AttemptAbandoned => f.write_str("Attempt terminated without producing a result"),
            Self::InvalidArgument { reason } => write!(f, "Invalid argument: {reason}"),
            Self::ErrorLimitExceeded { reason, .. } => {
                write!(f, "Dirty record limit exceeded: {reason}")
            }
            Self::Plugin { error } => write!(f, "Plugin error: {error:#}"),
            Self::TaskFailed { task_id, error } => write!(f, "Task {task_id} failed: {error}"),
        }
    }
}

impl From<ConfigError> for SyncError {
    fn from(config_error: ConfigError) -> Self {
        Self::Config { config_error }
    }
}

impl From<ConversionError> for SyncError {
    fn from(conversion_error: ConversionError) -> Self {
        Self::Conversion { conversion_error }
    }
}
