//! Execution of a group of tasks with failover.
//!
//! A [`TaskGroupContainer`] runs up to `container.taskGroup.channel` tasks
//! at a time.  Each attempt of a task gets a fresh [`Communication`] and
//! [`Channel`], a reader thread and a writer thread.  The thread driving the
//! task reports the attempt's progress to the [`TaskMonitor`] every
//! `container.taskGroup.sleepInterval` and stops the attempt once it fails,
//! whether the failure came from a plugin or from the monitor.  Failed
//! attempts are retried with a fixed backoff.
//!
//! Meanwhile the container merges the communications of all tasks every
//! `container.taskGroup.reportInterval`, logs the group's progress, and
//! enforces the job's error limit.

use crate::{
    clock::{Clock, SystemClock},
    retry::{execute_with_retry, RetryPolicy},
    statistics::{
        dirty::{DirtyRecordCollector, ErrorLimit, Side},
        tool::{get_report_communication, merge_communication, progress_line},
    },
    BufferedRecordExchanger, Channel, Communication, SyncError,
};
use anyhow::{anyhow, Error as AnyError, Result as AnyResult};
use ferry_adapterlib::{
    transport::{ReaderFactory, ReaderTask, RecordSender, WriterFactory, WriterTask},
    State, TaskId,
};
use ferry_types::{
    config::CoreConfig,
    error::{ConfigError, ErrorKind},
};
use std::{
    any::Any,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
    vec,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod monitor;

use monitor::TaskMonitor;

/// A unit of work: one reader and one writer moving one split of the data.
#[derive(Clone)]
pub struct TaskSpec {
    pub task_id: TaskId,
    pub reader: Arc<dyn ReaderFactory>,
    pub writer: Arc<dyn WriterFactory>,
}

impl TaskSpec {
    pub fn new(
        task_id: TaskId,
        reader: Arc<dyn ReaderFactory>,
        writer: Arc<dyn WriterFactory>,
    ) -> Self {
        Self {
            task_id,
            reader,
            writer,
        }
    }
}

pub struct TaskGroupContainer {
    task_group_id: u32,
    config: CoreConfig,
    clock: Arc<dyn Clock>,
    monitor: Arc<TaskMonitor>,
    error_limit: ErrorLimit,

    /// Communication of the latest attempt of every task started so far.
    tasks: Mutex<BTreeMap<TaskId, Arc<Communication>>>,

    /// First error that stops the whole group.
    fatal_error: Mutex<Option<SyncError>>,

    /// Cancelled when `fatal_error` is set.
    cancel: CancellationToken,
}

impl TaskGroupContainer {
    pub fn new(task_group_id: u32, config: CoreConfig) -> Result<Self, ConfigError> {
        Self::with_clock(task_group_id, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        task_group_id: u32,
        config: CoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let monitor = Arc::new(TaskMonitor::with_clock(
            config.container.task.hang_timeout(),
            clock.clone(),
        ));
        Ok(Self {
            task_group_id,
            error_limit: ErrorLimit::new(config.job.error_limit.as_ref()),
            config,
            clock,
            monitor,
            tasks: Mutex::new(BTreeMap::new()),
            fatal_error: Mutex::new(None),
            cancel: CancellationToken::new(),
        })
    }

    pub fn task_group_id(&self) -> u32 {
        self.task_group_id
    }

    pub fn monitor(&self) -> &Arc<TaskMonitor> {
        &self.monitor
    }

    /// Merged statistics of the group so far.
    pub fn communication(&self) -> Communication {
        let tasks = self.tasks.lock().unwrap();
        merge_communication(tasks.values().map(Arc::as_ref))
    }

    /// Communication of the latest attempt of `task_id`.
    pub fn task_communication(&self, task_id: TaskId) -> Option<Arc<Communication>> {
        self.tasks.lock().unwrap().get(&task_id).cloned()
    }

    /// Runs `tasks` to completion.
    ///
    /// Returns the merged statistics of all tasks if every task succeeded,
    /// possibly after retries.  Otherwise, returns the error that stopped
    /// the group or the error of the first task that ran out of attempts.
    pub fn start(&self, tasks: Vec<TaskSpec>) -> Result<Communication, SyncError> {
        let concurrency = self.config.container.task_group.channel.min(tasks.len());
        let policy = self.failover_policy()?;
        info!(
            task_group = self.task_group_id,
            "starting {} tasks, {concurrency} at a time",
            tasks.len()
        );

        let queue = &Mutex::new(tasks.into_iter());
        let failures = &Mutex::new(Vec::new());
        let policy = &policy;
        let sleep_interval = self.config.container.task_group.sleep_interval();
        let report_interval = self.config.container.task_group.report_interval();

        thread::scope(|scope| {
            let drivers = (0..concurrency)
                .map(|index| {
                    thread::Builder::new()
                        .name(format!("ferry-tg{}-driver-{index}", self.task_group_id))
                        .spawn_scoped(scope, move || self.drive(queue, policy, failures))
                        .map_err(|error| {
                            SyncError::plugin(
                                AnyError::from(error).context("failed to spawn task driver thread"),
                            )
                        })
                })
                .collect::<Result<Vec<_>, _>>();
            let drivers = match drivers {
                Ok(drivers) => drivers,
                Err(error) => {
                    // Drivers already running stop at their next attempt.
                    self.set_fatal_error(error);
                    return;
                }
            };

            let mut last_report = self.communication();
            last_report.set_timestamp(self.clock.now_millis());
            let mut last_report_at = Instant::now();
            while !drivers.iter().all(|driver| driver.is_finished()) {
                thread::sleep(sleep_interval);
                if last_report_at.elapsed() >= report_interval {
                    last_report = self.report(&last_report);
                    last_report_at = Instant::now();
                }
            }
        });

        let total = self.communication();
        if let Err(error) = self.error_limit.check(&total) {
            self.set_fatal_error(error);
        }
        if let Some(error) = self.fatal_error.lock().unwrap().clone() {
            return Err(error);
        }
        if let Some(error) = failures.lock().unwrap().first().cloned() {
            return Err(error);
        }
        info!(task_group = self.task_group_id, "{}", progress_line(&total));
        Ok(total)
    }

    fn failover_policy(&self) -> Result<RetryPolicy, SyncError> {
        let fail_over = &self.config.container.task.fail_over;
        Ok(RetryPolicy::new(
            fail_over.max_retry_times.saturating_add(1),
            fail_over.retry_interval(),
        )?
        .retry_on([
            ErrorKind::ConversionUnsupported,
            ErrorKind::ChannelClosed,
            ErrorKind::TaskHungExpired,
            ErrorKind::AttemptTimeout,
            ErrorKind::AttemptRejected,
            ErrorKind::AttemptAbandoned,
            ErrorKind::Plugin,
        ]))
    }

    /// Logs the group's progress since `last` and checks the error limit.
    /// Returns the merged communication to pass as `last` next time.
    fn report(&self, last: &Communication) -> Communication {
        let now = self.communication();
        now.set_timestamp(self.clock.now_millis());

        let report = get_report_communication(&now, last);
        info!(task_group = self.task_group_id, "{}", progress_line(&report));
        if let Err(error) = self.error_limit.check(&report) {
            self.set_fatal_error(error);
        }
        now
    }

    fn set_fatal_error(&self, error: SyncError) {
        let mut fatal_error = self.fatal_error.lock().unwrap();
        if fatal_error.is_none() {
            error!(task_group = self.task_group_id, "stopping task group: {error}");
            *fatal_error = Some(error);
            self.cancel.cancel();
        }
    }

    /// Driver thread: runs tasks from `queue` until it is empty or the
    /// group is stopped.
    fn drive(
        &self,
        queue: &Mutex<vec::IntoIter<TaskSpec>>,
        policy: &RetryPolicy,
        failures: &Mutex<Vec<SyncError>>,
    ) {
        while !self.cancel.is_cancelled() {
            let Some(spec) = queue.lock().unwrap().next() else {
                break;
            };
            let task_id = spec.task_id;

            let mut attempt = 0;
            let result = execute_with_retry(
                || {
                    attempt += 1;
                    if attempt > 1 {
                        warn!(
                            task_id,
                            "failing over task, attempt {attempt}/{}",
                            policy.retry_times()
                        );
                    }
                    self.run_attempt(&spec)
                },
                policy,
            );

            match result {
                Ok(()) => debug!(task_id, "task succeeded after {attempt} attempt(s)"),
                Err(error) => {
                    error!(task_id, "task failed after {attempt} attempt(s): {error}");
                    failures
                        .lock()
                        .unwrap()
                        .push(SyncError::task_failed(task_id, Arc::new(error)));
                }
            }
        }
    }

    /// Error that stopped the group, if it was stopped.
    fn stop_error(&self) -> Option<SyncError> {
        if !self.cancel.is_cancelled() {
            return None;
        }
        let fatal_error = self.fatal_error.lock().unwrap().clone();
        Some(fatal_error.unwrap_or(SyncError::AttemptAbandoned))
    }

    fn run_attempt(&self, spec: &TaskSpec) -> Result<(), SyncError> {
        let task_id = spec.task_id;
        if let Some(error) = self.stop_error() {
            debug!(task_id, "task group stopped, not starting another attempt");
            return Err(error);
        }
        let communication = Arc::new(Communication::with_state(
            State::Running,
            self.clock.now_millis(),
        ));
        self.tasks
            .lock()
            .unwrap()
            .insert(task_id, communication.clone());

        let result = self.execute_attempt(spec, &communication);
        self.monitor.remove_task(task_id);

        let now = self.clock.now_millis();
        match &result {
            Ok(()) => {
                communication.set_state(State::Succeeded);
                communication.set_timestamp(now);
            }
            Err(error) => communication.fail(error.clone(), now),
        }
        result
    }

    fn execute_attempt(
        &self,
        spec: &TaskSpec,
        communication: &Arc<Communication>,
    ) -> Result<(), SyncError> {
        let task_id = spec.task_id;
        let channel = Arc::new(Channel::new(
            task_id,
            &self.config.transport.channel,
            communication.clone(),
        )?);
        let mut reader = spec.reader.create(task_id).map_err(SyncError::plugin)?;
        let mut writer = spec.writer.create(task_id).map_err(SyncError::plugin)?;

        let buffer_size = self.config.transport.exchanger.buffer_size;
        let max_dirty = self.config.statistics.max_dirty_number;
        let reader_collector =
            DirtyRecordCollector::new(task_id, Side::Reader, communication.clone(), max_dirty);
        let writer_collector =
            DirtyRecordCollector::new(task_id, Side::Writer, communication.clone(), max_dirty);

        let mut sender = BufferedRecordExchanger::new(channel.clone(), buffer_size);
        let reader = self.spawn_plugin(
            format!("ferry-reader-{task_id}"),
            &channel,
            communication,
            move || {
                let result = read(reader.as_mut(), &mut sender, &reader_collector);
                reader.destroy();
                result
            },
        )?;

        let mut receiver = BufferedRecordExchanger::new(channel.clone(), buffer_size);
        let writer_channel = channel.clone();
        let writer = self.spawn_plugin(
            format!("ferry-writer-{task_id}"),
            &channel,
            communication,
            move || {
                let result = write(writer.as_mut(), &mut receiver, &writer_collector);
                writer.destroy();
                // A writer that returns early must not leave the reader blocked.
                if result.is_ok() {
                    writer_channel.close();
                }
                result
            },
        );
        let writer = match writer {
            Ok(writer) => writer,
            Err(error) => {
                channel.close();
                return Err(error);
            }
        };

        self.monitor.register_task(task_id, communication);
        let sleep_interval = self.config.container.task_group.sleep_interval();
        while !(reader.is_finished() && writer.is_finished()) {
            thread::sleep(sleep_interval);
            communication.set_timestamp(self.clock.now_millis());
            self.monitor.report(task_id, communication);
            if communication.is_finished() {
                break;
            }
            if let Some(error) = self.stop_error() {
                communication.set_error(error);
                communication.set_state(State::Killed);
                break;
            }
        }

        if communication.is_finished() {
            channel.close();
        }
        let deadline = Instant::now() + self.config.container.task.fail_over.max_wait();
        join_or_abandon(task_id, reader, deadline);
        join_or_abandon(task_id, writer, deadline);

        if communication.state() == State::Killed {
            return Err(self.stop_error().unwrap_or(SyncError::AttemptAbandoned));
        }
        if let Some(error) = communication.error() {
            return Err(error.as_ref().clone());
        }
        Ok(())
    }

    /// Runs `body` on a new thread.  If `body` fails or panics, the attempt
    /// is failed and `channel` is closed so that the other side stops.
    fn spawn_plugin<F>(
        &self,
        name: String,
        channel: &Arc<Channel>,
        communication: &Arc<Communication>,
        body: F,
    ) -> Result<JoinHandle<()>, SyncError>
    where
        F: FnOnce() -> AnyResult<()> + Send + 'static,
    {
        let channel = channel.clone();
        let communication = communication.clone();
        let clock = self.clock.clone();
        let thread_name = name.clone();

        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let error = match panic::catch_unwind(AssertUnwindSafe(body)) {
                    Ok(Ok(())) => return,
                    Ok(Err(error)) => SyncError::plugin(error),
                    Err(panic) => SyncError::plugin(anyhow!(
                        "{thread_name} panicked: {}",
                        panic_message(panic.as_ref())
                    )),
                };
                warn!(task_id = channel.task_id(), "{thread_name} failed: {error}");
                communication.fail(error, clock.now_millis());
                channel.close();
            })
            .map_err(|error| {
                SyncError::plugin(AnyError::from(error).context("failed to spawn plugin thread"))
            })
    }
}

fn read(
    reader: &mut dyn ReaderTask,
    sender: &mut BufferedRecordExchanger,
    collector: &DirtyRecordCollector,
) -> AnyResult<()> {
    reader.init()?;
    reader.start_read(sender, collector)?;
    sender.terminate()
}

fn write(
    writer: &mut dyn WriterTask,
    receiver: &mut BufferedRecordExchanger,
    collector: &DirtyRecordCollector,
) -> AnyResult<()> {
    writer.init()?;
    writer.start_write(receiver, collector)
}

/// Waits for `handle` until `deadline`, then gives up on it.  Threads
/// given up on keep running detached.
fn join_or_abandon(task_id: TaskId, handle: JoinHandle<()>, deadline: Instant) {
    while !handle.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    if handle.is_finished() {
        let _ = handle.join();
    } else {
        let name = handle.thread().name().unwrap_or("plugin thread").to_string();
        warn!(task_id, "{name} did not exit in time, abandoning it");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
