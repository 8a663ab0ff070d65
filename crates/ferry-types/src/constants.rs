//! Configuration key paths.
//!
//! Each key names the location of a setting in the configuration file, using
//! the same dotted notation that appears in error messages.

pub const CHANNEL_CAPACITY: &str = "transport.channel.capacity";

pub const CHANNEL_BYTE_CAPACITY: &str = "transport.channel.byteCapacity";

pub const CHANNEL_SPEED_BYTE: &str = "transport.channel.speed.byte";

pub const CHANNEL_SPEED_RECORD: &str = "transport.channel.speed.record";

pub const CHANNEL_FLOW_CONTROL_INTERVAL: &str = "transport.channel.flowControlInterval";

pub const EXCHANGER_BUFFER_SIZE: &str = "transport.exchanger.bufferSize";

pub const TASK_GROUP_CHANNEL: &str = "container.taskGroup.channel";

pub const TASK_GROUP_REPORT_INTERVAL: &str = "container.taskGroup.reportInterval";

pub const TASK_GROUP_SLEEP_INTERVAL: &str = "container.taskGroup.sleepInterval";

pub const TASK_FAILOVER_MAX_RETRY_TIMES: &str = "container.task.failOver.maxRetryTimes";

pub const TASK_FAILOVER_RETRY_INTERVAL: &str = "container.task.failOver.retryIntervalInMsec";

pub const TASK_FAILOVER_MAX_WAIT: &str = "container.task.failOver.maxWaitInMsec";

pub const TASK_HANG_TIMEOUT: &str = "container.task.hangTimeoutMs";

pub const STATISTICS_MAX_DIRTY_NUMBER: &str = "statistics.maxDirtyNumber";

pub const JOB_ERROR_LIMIT_RECORD: &str = "job.errorLimit.record";

pub const JOB_ERROR_LIMIT_PERCENTAGE: &str = "job.errorLimit.percentage";

/// A task that reads no new records for this long is declared hung (48 hours).
pub const DEFAULT_TASK_HANG_TIMEOUT_MS: u64 = 172_800 * 1000;
