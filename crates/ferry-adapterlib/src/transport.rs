//! Interfaces between reader/writer plugins and the engine.
//!
//! A job is split into tasks.  Each task is executed by a pair of plugin
//! instances: a [`ReaderTask`] that produces [`Record`]s from the source and
//! a [`WriterTask`] that consumes them and writes them to the destination.
//! The engine connects the two with a bounded channel and hands each side
//! its end of it: a [`RecordSender`] for the reader and a [`RecordReceiver`]
//! for the writer.
//!
//! # Lifecycle
//!
//! For every execution attempt of a task the engine creates fresh plugin
//! instances through a [`ReaderFactory`] and a [`WriterFactory`], so a
//! retried task always starts from a clean state.  On each instance it calls
//! [`init`](ReaderTask::init), then the `start_*` method, then
//! [`destroy`](ReaderTask::destroy).  `destroy` is called even when `init` or
//! `start_*` fails.
//!
//! # Errors
//!
//! Plugins report failures as [`anyhow::Error`]s.  Returning an error from
//! `init` or `start_*` fails the whole attempt.  Per-record failures that
//! should not fail the task (e.g., a row that violates a constraint at the
//! destination) are instead reported through the [`TaskCollector`] as dirty
//! records, and the plugin carries on with the next record.
//!
//! # Cancellation
//!
//! When an attempt fails on either side, or is declared hung, the engine
//! closes the channel.  Any subsequent [`RecordSender::send`] fails, and
//! [`RecordReceiver::receive`] reports end-of-stream once the records already
//! queued are drained.  Plugins are expected to propagate these errors and
//! return promptly.
use crate::{element::Record, TaskId};
use anyhow::Result as AnyResult;

/// Reader's end of the channel.
pub trait RecordSender: Send {
    /// Creates an empty record for the reader to fill in.
    fn create_record(&self) -> Record {
        Record::new()
    }

    /// Sends `record` to the writer.
    ///
    /// The implementation may buffer the record.  Blocks while the channel
    /// is full or throttled.  Fails if the channel has been closed.
    fn send(&mut self, record: Record) -> AnyResult<()>;

    /// Pushes any buffered records into the channel.
    fn flush(&mut self) -> AnyResult<()>;

    /// Flushes buffered records and signals end-of-stream to the writer.
    ///
    /// The engine calls this after [`ReaderTask::start_read`] returns
    /// successfully; readers do not need to call it themselves.
    fn terminate(&mut self) -> AnyResult<()>;
}

/// Writer's end of the channel.
pub trait RecordReceiver: Send {
    /// Returns the next record, blocking until one is available.
    ///
    /// Returns `Ok(None)` once the reader has terminated and all records
    /// have been delivered; every later call returns `Ok(None)` as well.
    fn receive(&mut self) -> AnyResult<Option<Record>>;
}

/// Sink for per-record failures.
///
/// Each collector is bound to one side (reader or writer) of one execution
/// attempt.
pub trait TaskCollector: Send + Sync {
    /// Reports `record` as dirty: it could not be read or written because of
    /// `error`.  The record is counted as failed and the task continues.
    fn collect_dirty_record(&self, record: &Record, error: &anyhow::Error);

    /// Attaches a free-form message to the task's statistics.
    fn collect_message(&self, key: &str, value: &str);
}

/// Reader plugin instance for one attempt of one task.
pub trait ReaderTask: Send {
    /// Prepares the reader, e.g., by opening a connection.
    fn init(&mut self) -> AnyResult<()> {
        Ok(())
    }

    /// Reads the task's split and sends every record through `sender`.
    fn start_read(
        &mut self,
        sender: &mut dyn RecordSender,
        collector: &dyn TaskCollector,
    ) -> AnyResult<()>;

    /// Releases resources acquired by the reader.
    fn destroy(&mut self) {}
}

/// Writer plugin instance for one attempt of one task.
pub trait WriterTask: Send {
    /// Prepares the writer, e.g., by opening a connection.
    fn init(&mut self) -> AnyResult<()> {
        Ok(())
    }

    /// Receives records from `receiver` until end-of-stream and writes them
    /// to the destination.
    fn start_write(
        &mut self,
        receiver: &mut dyn RecordReceiver,
        collector: &dyn TaskCollector,
    ) -> AnyResult<()>;

    /// Releases resources acquired by the writer.
    fn destroy(&mut self) {}
}

/// Creates reader instances, one per execution attempt of a task.
pub trait ReaderFactory: Send + Sync {
    fn create(&self, task_id: TaskId) -> AnyResult<Box<dyn ReaderTask>>;
}

/// Creates writer instances, one per execution attempt of a task.
pub trait WriterFactory: Send + Sync {
    fn create(&self, task_id: TaskId) -> AnyResult<Box<dyn WriterTask>>;
}

impl<F> ReaderFactory for F
where
    F: Fn(TaskId) -> AnyResult<Box<dyn ReaderTask>> + Send + Sync,
{
    fn create(&self, task_id: TaskId) -> AnyResult<Box<dyn ReaderTask>> {
        self(task_id)
    }
}

impl<F> WriterFactory for F
where
    F: Fn(TaskId) -> AnyResult<Box<dyn WriterTask>> + Send + Sync,
{
    fn create(&self, task_id: TaskId) -> AnyResult<Box<dyn WriterTask>> {
        self(task_id)
    }
}
