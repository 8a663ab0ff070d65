//! Engine configuration.
//!
//! This module defines the configuration consumed by the execution core:
//! channel sizing and throttling, task-group scheduling, task failover and
//! error limits.  The structure mirrors the dotted key paths used in
//! configuration files (see [`crate::constants`]), so that a configuration
//! file such as
//!
//! ```yaml
//! transport:
//!   channel:
//!     capacity: 1024
//!     speed:
//!       byte: 1048576
//! container:
//!   task:
//!     failOver:
//!       maxRetryTimes: 3
//! ```
//!
//! can be deserialized directly into a [`CoreConfig`].  Every section is
//! optional and falls back to its defaults.

use crate::constants::{
    CHANNEL_BYTE_CAPACITY, CHANNEL_CAPACITY, CHANNEL_FLOW_CONTROL_INTERVAL,
    DEFAULT_TASK_HANG_TIMEOUT_MS, EXCHANGER_BUFFER_SIZE, JOB_ERROR_LIMIT_PERCENTAGE,
    TASK_GROUP_CHANNEL, TASK_GROUP_REPORT_INTERVAL, TASK_GROUP_SLEEP_INTERVAL, TASK_HANG_TIMEOUT,
};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default value of `ChannelConfig::capacity`.
pub const fn default_channel_capacity() -> usize {
    512
}

/// Default value of `ChannelConfig::byte_capacity` (64 MiB).
pub const fn default_channel_byte_capacity() -> u64 {
    64 * 1024 * 1024
}

/// Default value of `ChannelConfig::flow_control_interval_ms`.
pub const fn default_flow_control_interval_ms() -> u64 {
    20
}

/// Default value of `ExchangerConfig::buffer_size`.
pub const fn default_exchanger_buffer_size() -> usize {
    32
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Record transport between reader and writer tasks.
    pub transport: TransportConfig,

    /// Task-group scheduling, reporting and failover.
    pub container: ContainerConfig,

    /// Statistics collection.
    pub statistics: StatisticsConfig,

    /// Job-wide settings.
    pub job: JobConfig,
}

impl CoreConfig {
    /// Parses a YAML (or JSON, which is a subset of YAML) configuration.
    pub fn from_yaml_str(s: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(s).map_err(|e| ConfigError::Parse {
            error: e.to_string(),
        })
    }

    /// Reads and parses the configuration file at `path`.
    pub fn from_path<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml_str(&text)
    }

    /// Checks all settings, returning the first invalid one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport.validate()?;
        self.container.validate()?;
        self.job.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub channel: ChannelConfig,
    pub exchanger: ExchangerConfig,
}

impl TransportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.channel.validate()?;
        self.exchanger.validate()
    }
}

/// Configuration of the channel that connects a reader task to a writer task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Maximal number of records queued in the channel.
    ///
    /// A reader that tries to push more records blocks until the writer
    /// takes some of them.
    ///
    /// The default is 512.
    pub capacity: usize,

    /// Maximal total estimated size, in bytes, of the records queued in the
    /// channel.
    ///
    /// A single record larger than this limit is still accepted when the
    /// channel is empty, so that oversized records cannot deadlock the
    /// channel.
    ///
    /// The default is 64 MiB.
    pub byte_capacity: u64,

    /// Throughput ceilings.
    pub speed: SpeedConfig,

    /// Interval, in milliseconds, at which the channel samples its
    /// throughput and decides whether to throttle the producer.
    ///
    /// The default is 20.
    #[serde(rename = "flowControlInterval")]
    pub flow_control_interval_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_channel_capacity(),
            byte_capacity: default_channel_byte_capacity(),
            speed: SpeedConfig::default(),
            flow_control_interval_ms: default_flow_control_interval_ms(),
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::invalid_value(
                CHANNEL_CAPACITY,
                "channel capacity must be a positive number of records",
            ));
        }
        if self.byte_capacity == 0 {
            return Err(ConfigError::invalid_value(
                CHANNEL_BYTE_CAPACITY,
                "channel byte capacity must be a positive number of bytes",
            ));
        }
        if self.flow_control_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                CHANNEL_FLOW_CONTROL_INTERVAL,
                "flow control interval must be at least 1 millisecond",
            ));
        }
        Ok(())
    }

    pub fn flow_control_interval(&self) -> Duration {
        Duration::from_millis(self.flow_control_interval_ms)
    }
}

/// Channel throughput ceilings.
///
/// A missing, zero or negative value disables the corresponding limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Maximal number of bytes per second.
    pub byte: Option<i64>,

    /// Maximal number of records per second.
    pub record: Option<i64>,
}

impl SpeedConfig {
    pub fn byte_limit(&self) -> Option<u64> {
        positive(self.byte)
    }

    pub fn record_limit(&self) -> Option<u64> {
        positive(self.record)
    }

    pub fn is_limited(&self) -> bool {
        self.byte_limit().is_some() || self.record_limit().is_some()
    }
}

fn positive(value: Option<i64>) -> Option<u64> {
    value.filter(|v| *v > 0).map(|v| v as u64)
}

/// Configuration of the buffered record exchanger used by tasks to talk to
/// their channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExchangerConfig {
    /// Number of records a reader accumulates before pushing them to the
    /// channel in one batch.
    ///
    /// The default is 32.
    pub buffer_size: usize,
}

impl Default for ExchangerConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_exchanger_buffer_size(),
        }
    }
}

impl ExchangerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::invalid_value(
                EXCHANGER_BUFFER_SIZE,
                "exchanger buffer size must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerConfig {
    pub task_group: TaskGroupConfig,
    pub task: TaskConfig,
}

impl ContainerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.task_group.validate()?;
        self.task.validate()
    }
}

/// Task-group scheduling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskGroupConfig {
    /// Maximal number of tasks running concurrently within the group.
    ///
    /// Each running task uses two threads: one for the reader and one for
    /// the writer.
    ///
    /// The default is 5.
    pub channel: usize,

    /// Interval, in milliseconds, between two progress reports of the group.
    ///
    /// The default is 10 seconds.
    #[serde(rename = "reportInterval")]
    pub report_interval_ms: u64,

    /// Interval, in milliseconds, at which a running task is checked for
    /// completion, failure and progress.
    ///
    /// The default is 100.
    #[serde(rename = "sleepInterval")]
    pub sleep_interval_ms: u64,
}

impl Default for TaskGroupConfig {
    fn default() -> Self {
        Self {
            channel: 5,
            report_interval_ms: 10_000,
            sleep_interval_ms: 100,
        }
    }
}

impl TaskGroupConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel == 0 {
            return Err(ConfigError::invalid_value(
                TASK_GROUP_CHANNEL,
                "a task group must be allowed to run at least one task",
            ));
        }
        if self.report_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                TASK_GROUP_REPORT_INTERVAL,
                "report interval must be at least 1 millisecond",
            ));
        }
        if self.sleep_interval_ms == 0 {
            return Err(ConfigError::invalid_value(
                TASK_GROUP_SLEEP_INTERVAL,
                "sleep interval must be at least 1 millisecond",
            ));
        }
        Ok(())
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_millis(self.sleep_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaskConfig {
    pub fail_over: FailoverConfig,

    /// A task that reads no new records for this many milliseconds is
    /// declared hung and failed.
    ///
    /// The default is 48 hours.
    pub hang_timeout_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            fail_over: FailoverConfig::default(),
            hang_timeout_ms: DEFAULT_TASK_HANG_TIMEOUT_MS,
        }
    }
}

impl TaskConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hang_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                TASK_HANG_TIMEOUT,
                "hang timeout must be at least 1 millisecond",
            ));
        }
        Ok(())
    }

    pub fn hang_timeout(&self) -> Duration {
        Duration::from_millis(self.hang_timeout_ms)
    }
}

/// Task failover policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FailoverConfig {
    /// Number of times a failed task is restarted before the job fails.
    ///
    /// The default is 1.
    pub max_retry_times: u32,

    /// Delay, in milliseconds, before a failed task is restarted.
    ///
    /// The default is 10 seconds.
    #[serde(rename = "retryIntervalInMsec")]
    pub retry_interval_ms: u64,

    /// Time, in milliseconds, to wait for the threads of a failed task to
    /// exit before abandoning them.
    ///
    /// The default is 60 seconds.
    #[serde(rename = "maxWaitInMsec")]
    pub max_wait_ms: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_retry_times: 1,
            retry_interval_ms: 10_000,
            max_wait_ms: 60_000,
        }
    }
}

impl FailoverConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StatisticsConfig {
    /// Number of dirty records kept per task for reporting.  All dirty
    /// records are counted regardless of this setting.
    ///
    /// The default is 10.
    pub max_dirty_number: usize,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            max_dirty_number: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobConfig {
    /// Limits on the number of dirty records.  No limit by default.
    pub error_limit: Option<ErrorLimitConfig>,
}

impl JobConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.error_limit {
            Some(limit) => limit.validate(),
            None => Ok(()),
        }
    }
}

/// Dirty-record limits for a job.
///
/// When both limits are set, the job fails as soon as either one is
/// exceeded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorLimitConfig {
    /// Maximal number of dirty records.
    pub record: Option<u64>,

    /// Maximal fraction of dirty records among all records read, between
    /// 0.0 and 1.0.
    pub percentage: Option<f64>,
}

impl ErrorLimitConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(percentage) = self.percentage {
            if !(0.0..=1.0).contains(&percentage) {
                return Err(ConfigError::invalid_value(
                    JOB_ERROR_LIMIT_PERCENTAGE,
                    format!("expected a fraction between 0.0 and 1.0, found {percentage}"),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::{ChannelConfig, CoreConfig, ErrorLimitConfig};
    use crate::error::ConfigError;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = CoreConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.transport.channel.capacity, 512);
        assert_eq!(config.transport.channel.byte_capacity, 64 * 1024 * 1024);
        assert_eq!(config.transport.channel.flow_control_interval_ms, 20);
        assert_eq!(config.transport.exchanger.buffer_size, 32);
        assert_eq!(config.container.task_group.channel, 5);
        assert_eq!(config.container.task.fail_over.max_retry_times, 1);
        assert_eq!(config.container.task.hang_timeout_ms, 172_800_000);
        assert!(!config.transport.channel.speed.is_limited());
        config.validate().unwrap();
    }

    #[test]
    fn wire_names() {
        let config = CoreConfig::from_yaml_str(
            r#"
transport:
    channel:
        capacity: 16
        byteCapacity: 4096
        flowControlInterval: 5
        speed:
            byte: 1000
            record: -1
    exchanger:
        bufferSize: 4
container:
    taskGroup:
        channel: 2
        reportInterval: 500
        sleepInterval: 10
    task:
        hangTimeoutMs: 1000
        failOver:
            maxRetryTimes: 3
            retryIntervalInMsec: 50
            maxWaitInMsec: 200
statistics:
    maxDirtyNumber: 3
job:
    errorLimit:
        record: 10
        percentage: 0.5
"#,
        )
        .unwrap();

        let channel = &config.transport.channel;
        assert_eq!(channel.capacity, 16);
        assert_eq!(channel.byte_capacity, 4096);
        assert_eq!(channel.flow_control_interval_ms, 5);
        assert_eq!(channel.speed.byte_limit(), Some(1000));
        assert_eq!(channel.speed.record_limit(), None);
        assert_eq!(config.transport.exchanger.buffer_size, 4);
        assert_eq!(config.container.task_group.channel, 2);
        assert_eq!(config.container.task_group.report_interval_ms, 500);
        assert_eq!(config.container.task_group.sleep_interval_ms, 10);
        assert_eq!(config.container.task.hang_timeout_ms, 1000);
        assert_eq!(config.container.task.fail_over.max_retry_times, 3);
        assert_eq!(config.container.task.fail_over.retry_interval_ms, 50);
        assert_eq!(config.container.task.fail_over.max_wait_ms, 200);
        assert_eq!(config.statistics.max_dirty_number, 3);
        assert_eq!(
            config.job.error_limit,
            Some(ErrorLimitConfig {
                record: Some(10),
                percentage: Some(0.5)
            })
        );
        config.validate().unwrap();
    }

    #[test]
    fn json_config() {
        let config =
            CoreConfig::from_yaml_str(r#"{"transport": {"channel": {"capacity": 8}}}"#).unwrap();
        assert_eq!(config.transport.channel.capacity, 8);
        assert_eq!(config.transport.channel.byte_capacity, 64 * 1024 * 1024);
    }

    #[test]
    fn invalid_capacity() {
        let channel = ChannelConfig {
            capacity: 0,
            ..ChannelConfig::default()
        };
        assert!(matches!(
            channel.validate(),
            Err(ConfigError::InvalidValue {
                key: "transport.channel.capacity",
                ..
            })
        ));

        let config = CoreConfig::from_yaml_str("transport: {channel: {byteCapacity: 0}}").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                key: "transport.channel.byteCapacity",
                ..
            })
        ));

        // Negative capacities are rejected by the parser.
        assert!(matches!(
            CoreConfig::from_yaml_str("transport: {channel: {capacity: -1}}"),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn invalid_error_limit() {
        let config = CoreConfig::from_yaml_str("job: {errorLimit: {percentage: 1.5}}").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                key: "job.errorLimit.percentage",
                ..
            })
        ));
    }

    #[test]
    fn from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "container:\n  taskGroup:\n    channel: 7").unwrap();
        let config = CoreConfig::from_path(file.path()).unwrap();
        assert_eq!(config.container.task_group.channel, 7);

        let missing = file.path().with_extension("missing");
        assert!(matches!(
            CoreConfig::from_path(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
