//! Detection of tasks that stopped making progress.

use crate::{
    clock::{Clock, SystemClock},
    statistics::tool::total_read_records,
    Communication, SyncError,
};
use crossbeam::sync::ShardedLock;
use ferry_adapterlib::TaskId;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tracing::{error, warn};

/// Progress of a task as last seen by the monitor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    pub task_id: TaskId,

    /// Total read records at the last report that showed progress.
    pub last_total_read_records: u64,

    /// Time of the last report that showed progress.
    pub last_progress_timestamp: i64,

    /// Time of the last report.
    pub last_seen_timestamp: i64,
}

#[derive(Debug)]
struct TaskCommunication {
    last_total_read_records: AtomicU64,
    last_progress_timestamp: AtomicI64,
    last_seen_timestamp: AtomicI64,
}

impl TaskCommunication {
    fn new(total_read_records: u64, now: i64) -> Self {
        Self {
            last_total_read_records: AtomicU64::new(total_read_records),
            last_progress_timestamp: AtomicI64::new(now),
            last_seen_timestamp: AtomicI64::new(now),
        }
    }

    fn progress(&self, task_id: TaskId) -> TaskProgress {
        TaskProgress {
            task_id,
            last_total_read_records: self.last_total_read_records.load(Ordering::Acquire),
            last_progress_timestamp: self.last_progress_timestamp.load(Ordering::Acquire),
            last_seen_timestamp: self.last_seen_timestamp.load(Ordering::Acquire),
        }
    }
}

/// Registry of running tasks that fails tasks whose read-record count has
/// not increased for longer than the hang timeout.
///
/// The monitor never stops a task itself: it moves the task's
/// [`Communication`] to [`State::Failed`](ferry_adapterlib::State::Failed)
/// with a [`SyncError::TaskHungExpired`] error, and the owner of the task is
/// expected to notice and terminate or retry it.
///
/// All operations can be called concurrently from any thread.  Reports only
/// take a shared lock on the registry.
pub struct TaskMonitor {
    // `ShardedLock` is a read/write lock optimized for fast reads.  Reports
    // only need a read lock because per-task fields are atomics.
    tasks: ShardedLock<BTreeMap<TaskId, TaskCommunication>>,
    clock: Arc<dyn Clock>,
    hang_timeout_ms: i64,
}

impl TaskMonitor {
    pub fn new(hang_timeout: Duration) -> Self {
        Self::with_clock(hang_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(hang_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: ShardedLock::new(BTreeMap::new()),
            clock,
            hang_timeout_ms: hang_timeout.as_millis().min(i64::MAX as u128) as i64,
        }
    }

    pub fn hang_timeout(&self) -> Duration {
        Duration::from_millis(self.hang_timeout_ms as u64)
    }

    /// Starts tracking `task_id`.
    ///
    /// Does nothing if `communication` is finished or if the task is
    /// already registered.
    pub fn register_task(&self, task_id: TaskId, communication: &Communication) {
        if communication.is_finished() {
            return;
        }
        let now = self.clock.now_millis();
        self.tasks
            .write()
            .unwrap()
            .entry(task_id)
            .or_insert_with(|| TaskCommunication::new(total_read_records(communication), now));
    }

    /// Records the current progress of `task_id`.
    ///
    /// If the task's total read records grew since the last report with
    /// progress, the task is making progress.  Otherwise, if the last
    /// progress is older than the hang timeout, `communication` is failed
    /// with a [`SyncError::TaskHungExpired`] error.
    ///
    /// Does nothing if `communication` is finished.  Registers the task if
    /// it is unknown.
    pub fn report(&self, task_id: TaskId, communication: &Communication) {
        if communication.is_finished() {
            return;
        }

        let tasks = self.tasks.read().unwrap();
        let Some(task) = tasks.get(&task_id) else {
            drop(tasks);
            warn!(task_id, "report for unregistered task; registering it");
            self.register_task(task_id, communication);
            return;
        };

        let now = self.clock.now_millis();
        task.last_seen_timestamp.store(now, Ordering::Release);

        let total = total_read_records(communication);
        let last_total = task
            .last_total_read_records
            .fetch_max(total, Ordering::AcqRel);
        if total > last_total {
            task.last_progress_timestamp.store(now, Ordering::Release);
            return;
        }

        let elapsed_ms = now - task.last_progress_timestamp.load(Ordering::Acquire);
        if elapsed_ms > self.hang_timeout_ms {
            error!(
                task_id,
                "task hung expired: no records read for {elapsed_ms} ms (total read records: {last_total})"
            );
            communication.fail(
                SyncError::TaskHungExpired {
                    task_id,
                    last_total_read_records: last_total,
                    elapsed_ms,
                },
                now,
            );
        }
    }

    pub fn get_task_communication(&self, task_id: TaskId) -> Option<TaskProgress> {
        self.tasks
            .read()
            .unwrap()
            .get(&task_id)
            .map(|task| task.progress(task_id))
    }

    /// Stops tracking `task_id`.  Unknown ids are ignored.
    pub fn remove_task(&self, task_id: TaskId) {
        self.tasks.write().unwrap().remove(&task_id);
    }

    pub fn task_count(&self) -> usize {
        self.tasks.read().unwrap().len()
    }
}
