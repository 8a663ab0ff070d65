use crate::SyncError;
use atomic::Atomic;
use enum_map::{Enum, EnumMap};
use ferry_adapterlib::State;
use ferry_types::error::ErrorResponse;
use serde::{ser::SerializeStruct, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc, Mutex,
    },
};

/// Statistics counters tracked by a [`Communication`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum)]
pub enum Counter {
    /// Records the reader sent through the channel.
    ReadSucceedRecords,
    ReadSucceedBytes,

    /// Records the reader reported as dirty.
    ReadFailedRecords,
    ReadFailedBytes,

    /// Records the writer took from the channel.
    WriteReceivedRecords,
    WriteReceivedBytes,

    /// Records the writer reported as dirty.
    WriteFailedRecords,
    WriteFailedBytes,

    /// Nanoseconds the writer spent waiting on an empty channel.
    WaitReaderTime,

    /// Nanoseconds the reader spent waiting on a full channel.
    WaitWriterTime,

    /// Bytes per second, computed when reporting.
    ByteSpeed,

    /// Records per second, computed when reporting.
    RecordSpeed,
}

impl Counter {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadSucceedRecords => "readSucceedRecords",
            Self::ReadSucceedBytes => "readSucceedBytes",
            Self::ReadFailedRecords => "readFailedRecords",
            Self::ReadFailedBytes => "readFailedBytes",
            Self::WriteReceivedRecords => "writeReceivedRecords",
            Self::WriteReceivedBytes => "writeReceivedBytes",
            Self::WriteFailedRecords => "writeFailedRecords",
            Self::WriteFailedBytes => "writeFailedBytes",
            Self::WaitReaderTime => "waitReaderTime",
            Self::WaitWriterTime => "waitWriterTime",
            Self::ByteSpeed => "byteSpeed",
            Self::RecordSpeed => "recordSpeed",
        }
    }
}

/// A dirty record kept as a sample for reporting.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DirtyRecord {
    /// The record, as JSON.
    pub record: JsonValue,

    /// Why the record could not be processed.
    pub error: String,
}

/// Statistics and state of a task, task group, or job.
///
/// A task's `Communication` is written by the task itself (its reader and
/// writer threads and its channel) and read concurrently by the container
/// and the [`TaskMonitor`](crate::TaskMonitor).  All counters are atomics.
/// Updates to different counters are not atomic with respect to each other,
/// so a reader may observe a momentarily inconsistent set of values.
///
/// # State
///
/// State transitions are monotonic: once the state is finished
/// ([`State::Succeeded`], [`State::Failed`], [`State::Killed`]), it can no
/// longer change.  The captured error is the first error reported; later
/// errors are ignored.
#[derive(Debug, Default)]
pub struct Communication {
    state: Atomic<State>,
    counters: EnumMap<Counter, AtomicU64>,
    timestamp: AtomicI64,
    error: Mutex<Option<Arc<SyncError>>>,
    messages: Mutex<BTreeMap<String, Vec<String>>>,
    dirty_records: Mutex<Vec<DirtyRecord>>,
}

impl Communication {
    pub fn new() -> Self {
        Self::default()
    }

    /// A communication in the given state, stamped with `timestamp`.
    pub fn with_state(state: State, timestamp: i64) -> Self {
        let communication = Self::new();
        communication.state.store(state, Ordering::Release);
        communication.set_timestamp(timestamp);
        communication
    }

    pub fn state(&self) -> State {
        self.state.load(Ordering::Acquire)
    }

    /// Changes the state to `state`, unless the current state is finished.
    ///
    /// Returns `true` if the state was changed.
    pub fn set_state(&self, state: State) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current.is_finished() {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                state,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    pub fn counter(&self, counter: Counter) -> u64 {
        self.counters[counter].load(Ordering::Acquire)
    }

    pub fn increase_counter(&self, counter: Counter, delta: u64) {
        self.counters[counter].fetch_add(delta, Ordering::AcqRel);
    }

    pub fn set_counter(&self, counter: Counter, value: u64) {
        self.counters[counter].store(value, Ordering::Release);
    }

    /// Iterates over all counters and their current values.
    pub fn counters(&self) -> impl Iterator<Item = (Counter, u64)> + '_ {
        self.counters
            .iter()
            .map(|(counter, value)| (counter, value.load(Ordering::Acquire)))
    }

    /// Time of the last update, in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp.load(Ordering::Acquire)
    }

    pub fn set_timestamp(&self, timestamp: i64) {
        self.timestamp.store(timestamp, Ordering::Release);
    }

    /// The first error captured by this communication.
    pub fn error(&self) -> Option<Arc<SyncError>> {
        self.error.lock().unwrap().clone()
    }

    /// Captures `error`, unless an error has already been captured.
    ///
    /// Returns `true` if `error` was captured.
    pub fn set_error(&self, error: impl Into<Arc<SyncError>>) -> bool {
        let mut guard = self.error.lock().unwrap();
        if guard.is_none() {
            *guard = Some(error.into());
            true
        } else {
            false
        }
    }

    /// Captures `error` and moves to [`State::Failed`].
    ///
    /// The error is recorded before the state changes, so that anyone who
    /// observes the failed state also observes an error.  Has no effect on
    /// a finished communication.
    pub fn fail(&self, error: impl Into<Arc<SyncError>>, timestamp: i64) {
        if self.is_finished() {
            return;
        }
        self.set_error(error);
        if self.set_state(State::Failed) {
            self.set_timestamp(timestamp);
        }
    }

    pub fn add_message(&self, key: &str, value: &str) {
        self.messages
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }

    pub fn messages(&self) -> BTreeMap<String, Vec<String>> {
        self.messages.lock().unwrap().clone()
    }

    /// Keeps `dirty_record` as a sample, unless `max_samples` samples have
    /// already been kept.
    pub fn add_dirty_record(&self, dirty_record: DirtyRecord, max_samples: usize) -> bool {
        let mut dirty_records = self.dirty_records.lock().unwrap();
        if dirty_records.len() < max_samples {
            dirty_records.push(dirty_record);
            true
        } else {
            false
        }
    }

    pub fn dirty_records(&self) -> Vec<DirtyRecord> {
        self.dirty_records.lock().unwrap().clone()
    }

    /// An independent copy of the current contents.
    pub fn snapshot(&self) -> Self {
        Self {
            state: Atomic::new(self.state()),
            counters: EnumMap::from_fn(|counter| AtomicU64::new(self.counter(counter))),
            timestamp: AtomicI64::new(self.timestamp()),
            error: Mutex::new(self.error()),
            messages: Mutex::new(self.messages()),
            dirty_records: Mutex::new(self.dirty_records()),
        }
    }

    /// Adds the counters, messages and samples of `other` to `self`.
    pub(crate) fn absorb(&self, other: &Communication) {
        for (counter, value) in other.counters() {
            self.increase_counter(counter, value);
        }
        if let Some(error) = other.error() {
            self.set_error(error);
        }
        let other_messages = other.messages();
        let mut messages = self.messages.lock().unwrap();
        for (key, values) in other_messages {
            messages.entry(key).or_default().extend(values);
        }
        drop(messages);
        self.dirty_records
            .lock()
            .unwrap()
            .extend(other.dirty_records());
    }
}

impl Serialize for Communication {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let counters: BTreeMap<&'static str, u64> = self
            .counters()
            .map(|(counter, value)| (counter.name(), value))
            .collect();
        let error = self
            .error()
            .map(|error| ErrorResponse::from_error(error.as_ref()));

        let mut ser = serializer.serialize_struct("Communication", 6)?;
        ser.serialize_field("state", &self.state())?;
        ser.serialize_field("timestamp", &self.timestamp())?;
        ser.serialize_field("counters", &counters)?;
        ser.serialize_field("error", &error)?;
        ser.serialize_field("messages", &self.messages())?;
        ser.serialize_field("dirtyRecords", &self.dirty_records())?;
        ser.end()
    }
}
