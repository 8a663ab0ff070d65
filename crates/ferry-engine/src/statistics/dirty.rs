use super::{
    tool::{total_error_records, total_read_records},
    Communication, Counter, DirtyRecord,
};
use crate::SyncError;
use anyhow::Error as AnyError;
use ferry_adapterlib::{transport::TaskCollector, Record, TaskId};
use ferry_types::{config::ErrorLimitConfig, error::MAX_REPORTED_DIRTY_RECORDS};
use serde_json::Value as JsonValue;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tracing::warn;

/// Side of a task a collector is attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Reader,
    Writer,
}

/// [`TaskCollector`] that accounts dirty records in a task's
/// [`Communication`].
///
/// Every dirty record increments the failed-records and failed-bytes
/// counters of its side.  The first [`MAX_REPORTED_DIRTY_RECORDS`] dirty
/// records of the collector are logged, and up to `max_samples` of them
/// are kept in the communication for reporting.
pub struct DirtyRecordCollector {
    task_id: TaskId,
    side: Side,
    communication: Arc<Communication>,
    max_samples: usize,
    collected: AtomicUsize,
}

impl DirtyRecordCollector {
    pub fn new(
        task_id: TaskId,
        side: Side,
        communication: Arc<Communication>,
        max_samples: usize,
    ) -> Self {
        Self {
            task_id,
            side,
            communication,
            max_samples,
            collected: AtomicUsize::new(0),
        }
    }
}

impl TaskCollector for DirtyRecordCollector {
    fn collect_dirty_record(&self, record: &Record, error: &AnyError) {
        let (records, bytes) = match self.side {
            Side::Reader => (Counter::ReadFailedRecords, Counter::ReadFailedBytes),
            Side::Writer => (Counter::WriteFailedRecords, Counter::WriteFailedBytes),
        };
        self.communication.increase_counter(records, 1);
        self.communication
            .increase_counter(bytes, record.byte_size() as u64);

        if self.collected.fetch_add(1, Ordering::AcqRel) < MAX_REPORTED_DIRTY_RECORDS {
            warn!(
                task_id = self.task_id,
                side = ?self.side,
                "dirty record {record}: {error:#}"
            );
        }

        let record = serde_json::to_value(record)
            .unwrap_or_else(|e| JsonValue::String(format!("unserializable record: {e}")));
        self.communication.add_dirty_record(
            DirtyRecord {
                record,
                error: format!("{error:#}"),
            },
            self.max_samples,
        );
    }

    fn collect_message(&self, key: &str, value: &str) {
        self.communication.add_message(key, value);
    }
}

/// Job-level limit on dirty records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorLimit {
    record: Option<u64>,
    percentage: Option<f64>,
}

impl ErrorLimit {
    pub fn new(config: Option<&ErrorLimitConfig>) -> Self {
        config.map_or_else(Self::default, |config| Self {
            record: config.record,
            percentage: config.percentage,
        })
    }

    /// Fails if `total` has more dirty records than the record limit, or if
    /// the ratio of dirty records to records read exceeds the percentage
    /// limit.
    pub fn check(&self, total: &Communication) -> Result<(), SyncError> {
        let error_records = total_error_records(total);
        let total_records = total_read_records(total);

        if let Some(limit) = self.record {
            if error_records > limit {
                return Err(SyncError::ErrorLimitExceeded {
                    error_records,
                    total_records,
                    reason: format!(
                        "limit is {limit} records, but {error_records} dirty records were collected"
                    ),
                });
            }
        }

        if let Some(limit) = self.percentage {
            if total_records > 0 {
                let ratio = error_records as f64 / total_records as f64;
                if ratio > limit {
                    return Err(SyncError::ErrorLimitExceeded {
                        error_records,
                        total_records,
                        reason: format!(
                            "limit is {:.2}% of records, but {:.2}% of records were dirty",
                            limit * 100.0,
                            ratio * 100.0
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
