//! Bounded, rate-limited transport between a reader task and a writer task.
//!
//! A [`Channel`] is a FIFO queue of [`Record`]s with one producer (the
//! reader) and one consumer (the writer).  The queue is bounded both by a
//! number of records and by the total estimated size of the queued records.
//! A producer that tries to exceed either bound blocks until the consumer
//! makes room.
//!
//! Every successful `put` and `take` updates the counters of the task's
//! [`Communication`] while holding the queue lock, so the counters always
//! reflect exactly the records that crossed the channel.
//!
//! # Flow control
//!
//! When a byte or record speed ceiling is configured, the channel samples
//! the reader's counters at most once per flow-control interval.  If the
//! throughput observed since the previous sample exceeds a ceiling, the
//! producer sleeps for long enough to bring the average back down to it.
//! Throttling is advisory: a burst can exceed the ceiling for up to one
//! interval.

use crate::{statistics::Counter, Communication, SyncError};
use ferry_adapterlib::{Record, TaskId};
use ferry_types::{config::ChannelConfig, error::ConfigError};
use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};
use tracing::trace;

mod exchanger;

pub use exchanger::BufferedRecordExchanger;

struct Queue {
    records: VecDeque<Record>,
    /// Total estimated size of `records`.
    bytes: u64,
    closed: bool,
}

/// Throughput sample taken at the last flow-control check.
struct FlowSample {
    instant: Instant,
    bytes: u64,
    records: u64,
}

pub struct Channel {
    task_id: TaskId,
    capacity: usize,
    byte_capacity: u64,
    byte_speed: Option<u64>,
    record_speed: Option<u64>,
    flow_control_interval: Duration,
    communication: Arc<Communication>,
    queue: Mutex<Queue>,
    not_empty: Condvar,
    not_full: Condvar,
    last_sample: Mutex<FlowSample>,
}

impl Channel {
    /// Creates a channel for task `task_id` that accounts its traffic in
    /// `communication`.
    pub fn new(
        task_id: TaskId,
        config: &ChannelConfig,
        communication: Arc<Communication>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            task_id,
            capacity: config.capacity,
            byte_capacity: config.byte_capacity,
            byte_speed: config.speed.byte_limit(),
            record_speed: config.speed.record_limit(),
            flow_control_interval: config.flow_control_interval(),
            communication,
            queue: Mutex::new(Queue {
                records: VecDeque::with_capacity(config.capacity),
                bytes: 0,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            last_sample: Mutex::new(FlowSample {
                instant: Instant::now(),
                bytes: 0,
                records: 0,
            }),
        })
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn communication(&self) -> &Arc<Communication> {
        &self.communication
    }

    /// Appends `record` to the channel.
    ///
    /// Blocks while the channel is full.  A record is admitted into an
    /// empty channel even if it alone exceeds the byte capacity; the
    /// channel then stays full until that record is taken.
    ///
    /// Fails with [`SyncError::ChannelClosed`] if the channel is closed,
    /// including while blocked.
    pub fn put(&self, record: Record) -> Result<(), SyncError> {
        let bytes = record.byte_size() as u64;
        self.push(bytes, 1, |records| records.push_back(record))
    }

    /// Appends `records` to the channel as one batch.
    ///
    /// Blocks until there is room for the whole batch or the channel is
    /// empty.  An empty batch only checks whether the channel is closed.
    pub fn put_all(&self, records: Vec<Record>) -> Result<(), SyncError> {
        if records.is_empty() {
            return if self.is_closed() {
                Err(SyncError::ChannelClosed)
            } else {
                Ok(())
            };
        }
        let bytes = records.iter().map(|r| r.byte_size() as u64).sum();
        let count = records.len();
        self.push(bytes, count, |queue| queue.extend(records))
    }

    fn push<F>(&self, bytes: u64, count: usize, insert: F) -> Result<(), SyncError>
    where
        F: FnOnce(&mut VecDeque<Record>),
    {
        let mut queue = self.queue.lock().unwrap();
        let mut wait_start = None;
        while !queue.closed
            && !queue.records.is_empty()
            && (queue.records.len() + count > self.capacity
                || queue.bytes + bytes > self.byte_capacity)
        {
            wait_start.get_or_insert_with(Instant::now);
            queue = self.not_full.wait(queue).unwrap();
        }
        if queue.closed {
            return Err(SyncError::ChannelClosed);
        }

        insert(&mut queue.records);
        queue.bytes += bytes;
        self.communication
            .increase_counter(Counter::ReadSucceedRecords, count as u64);
        self.communication
            .increase_counter(Counter::ReadSucceedBytes, bytes);
        if let Some(start) = wait_start {
            self.communication
                .increase_counter(Counter::WaitWriterTime, start.elapsed().as_nanos() as u64);
        }
        drop(queue);

        self.not_empty.notify_all();
        self.flow_control();
        Ok(())
    }

    /// Removes the oldest record from the channel.
    ///
    /// Blocks while the channel is empty and open.  Returns `None` once the
    /// channel is closed and drained, and on every call after that.
    pub fn take(&self) -> Option<Record> {
        let mut queue = self.wait_not_empty();
        let record = queue.records.pop_front()?;
        let bytes = record.byte_size() as u64;
        queue.bytes -= bytes;
        self.communication
            .increase_counter(Counter::WriteReceivedRecords, 1);
        self.communication
            .increase_counter(Counter::WriteReceivedBytes, bytes);
        drop(queue);

        self.not_full.notify_all();
        Some(record)
    }

    /// Removes up to `max` of the oldest records from the channel.
    ///
    /// Blocks while the channel is empty and open.  Returns an empty vector
    /// once the channel is closed and drained.
    pub fn take_all(&self, max: usize) -> Vec<Record> {
        let mut queue = self.wait_not_empty();
        let count = queue.records.len().min(max.max(1));
        let records: Vec<Record> = queue.records.drain(..count).collect();
        let bytes: u64 = records.iter().map(|r| r.byte_size() as u64).sum();
        queue.bytes -= bytes;
        self.communication
            .increase_counter(Counter::WriteReceivedRecords, records.len() as u64);
        self.communication
            .increase_counter(Counter::WriteReceivedBytes, bytes);
        drop(queue);

        if !records.is_empty() {
            self.not_full.notify_all();
        }
        records
    }

    fn wait_not_empty(&self) -> std::sync::MutexGuard<'_, Queue> {
        let mut queue = self.queue.lock().unwrap();
        let mut wait_start = None;
        while queue.records.is_empty() && !queue.closed {
            wait_start.get_or_insert_with(Instant::now);
            queue = self.not_empty.wait(queue).unwrap();
        }
        if let Some(start) = wait_start {
            self.communication
                .increase_counter(Counter::WaitReaderTime, start.elapsed().as_nanos() as u64);
        }
        queue
    }

    /// Closes the channel.
    ///
    /// Subsequent `put`s fail, and producers blocked in `put` or sleeping
    /// in flow control wake up.  Records already queued are still delivered
    /// to `take`.
    pub fn close(&self) {
        self.queue.lock().unwrap().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().unwrap().closed
    }

    /// Number of queued records.
    pub fn size(&self) -> usize {
        self.queue.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// True if a `put` of a single record would block.
    pub fn is_full(&self) -> bool {
        let queue = self.queue.lock().unwrap();
        queue.records.len() >= self.capacity || queue.bytes >= self.byte_capacity
    }

    fn flow_control(&self) {
        if self.byte_speed.is_none() && self.record_speed.is_none() {
            return;
        }

        let mut sample = self.last_sample.lock().unwrap();
        let interval = sample.instant.elapsed();
        if interval < self.flow_control_interval {
            return;
        }
        let interval_ms = (interval.as_millis() as u64).max(1);

        let bytes = self.communication.counter(Counter::ReadSucceedBytes);
        let records = self.communication.counter(Counter::ReadSucceedRecords);

        let byte_delay = self.byte_speed.map_or(0, |limit| {
            throttle_delay_ms(bytes - sample.bytes, interval_ms, limit)
        });
        let record_delay = self.record_speed.map_or(0, |limit| {
            throttle_delay_ms(records - sample.records, interval_ms, limit)
        });
        let delay = byte_delay.max(record_delay);

        if delay > 0 {
            trace!(
                task_id = self.task_id,
                "throttling channel for {delay} ms after {interval_ms} ms"
            );
            self.sleep_unless_closed(Duration::from_millis(delay));
        }

        *sample = FlowSample {
            instant: Instant::now(),
            bytes,
            records,
        };
    }

    fn sleep_unless_closed(&self, delay: Duration) {
        let queue = self.queue.lock().unwrap();
        let _ = self
            .not_full
            .wait_timeout_while(queue, delay, |queue| !queue.closed)
            .unwrap();
    }
}

/// Time, in milliseconds, the producer must pause so that `amount` units
/// transferred in `interval_ms` average out to at most `limit` units per
/// second.
fn throttle_delay_ms(amount: u64, interval_ms: u64, limit: u64) -> u64 {
    let speed = amount.saturating_mul(1000) / interval_ms;
    if speed > limit {
        (speed.saturating_mul(interval_ms) / limit).saturating_sub(interval_ms)
    } else {
        0
    }
}

#[cfg(test)]
mod test {
    use super::{throttle_delay_ms, Channel};
    use crate::{test::wait, Communication, Counter, SyncError};
    use ferry_adapterlib::{Column, Record, State};
    use ferry_types::config::{ChannelConfig, SpeedConfig};
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread::{self, sleep},
        time::{Duration, Instant},
    };

    fn config(capacity: usize, byte_capacity: u64) -> ChannelConfig {
        ChannelConfig {
            capacity,
            byte_capacity,
            ..Default::default()
        }
    }

    fn channel(config: &ChannelConfig) -> Arc<Channel> {
        let communication = Arc::new(Communication::with_state(State::Running, 0));
        Arc::new(Channel::new(1, config, communication).unwrap())
    }

    fn record(value: &str) -> Record {
        vec![Column::string(value)].into()
    }

    #[test]
    fn invalid_config() {
        let communication = Arc::new(Communication::new());
        assert!(Channel::new(1, &config(0, 100), communication.clone()).is_err());
        assert!(Channel::new(1, &config(10, 0), communication).is_err());
    }

    #[test]
    fn fifo_and_accounting() {
        let channel = channel(&config(10, 1000));
        for value in ["a", "bb", "ccc"] {
            channel.put(record(value)).unwrap();
        }

        let communication = channel.communication();
        assert_eq!(communication.counter(Counter::ReadSucceedRecords), 3);
        assert_eq!(communication.counter(Counter::ReadSucceedBytes), 6);

        assert_eq!(channel.take(), Some(record("a")));
        assert_eq!(channel.take(), Some(record("bb")));
        assert_eq!(communication.counter(Counter::WriteReceivedRecords), 2);
        assert_eq!(communication.counter(Counter::WriteReceivedBytes), 3);
        assert_eq!(channel.size(), 1);
    }

    #[test]
    fn backpressure() {
        let channel = channel(&config(2, 1000));
        channel.put(record("1")).unwrap();
        channel.put(record("2")).unwrap();
        assert!(channel.is_full());

        let done = Arc::new(AtomicBool::new(false));
        let producer = {
            let channel = channel.clone();
            let done = done.clone();
            thread::spawn(move || {
                channel.put(record("3")).unwrap();
                done.store(true, Ordering::Release);
            })
        };

        sleep(Duration::from_millis(100));
        assert!(!done.load(Ordering::Acquire));

        assert_eq!(channel.take(), Some(record("1")));
        wait(|| done.load(Ordering::Acquire), 5_000).unwrap();
        producer.join().unwrap();

        assert_eq!(channel.take(), Some(record("2")));
        assert_eq!(channel.take(), Some(record("3")));
        assert!(channel.communication().counter(Counter::WaitWriterTime) > 0);
    }

    #[test]
    fn oversized_record_is_admitted() {
        let channel = channel(&config(10, 4));
        channel.put(record("0123456789")).unwrap();
        assert!(channel.is_full());

        let producer = {
            let channel = channel.clone();
            thread::spawn(move || channel.put(record("x")))
        };
        sleep(Duration::from_millis(50));
        assert_eq!(channel.size(), 1);

        assert_eq!(channel.take(), Some(record("0123456789")));
        producer.join().unwrap().unwrap();
        assert_eq!(channel.take(), Some(record("x")));
    }

    #[test]
    fn take_after_close_is_idempotent() {
        let channel = channel(&config(10, 1000));
        channel.put(record("a")).unwrap();
        channel.close();

        assert!(matches!(
            channel.put(record("b")),
            Err(SyncError::ChannelClosed)
        ));
        assert_eq!(channel.take(), Some(record("a")));
        for _ in 0..3 {
            assert_eq!(channel.take(), None);
            assert!(channel.take_all(10).is_empty());
        }
    }

    #[test]
    fn close_wakes_blocked_producer_and_consumer() {
        let channel = channel(&config(1, 1000));
        channel.put(record("a")).unwrap();

        let producer = {
            let channel = channel.clone();
            thread::spawn(move || channel.put(record("b")))
        };
        sleep(Duration::from_millis(50));
        channel.close();
        assert!(matches!(
            producer.join().unwrap(),
            Err(SyncError::ChannelClosed)
        ));

        let empty = self::channel(&config(1, 1000));
        let consumer = {
            let empty = empty.clone();
            thread::spawn(move || empty.take())
        };
        sleep(Duration::from_millis(50));
        empty.close();
        assert_eq!(consumer.join().unwrap(), None);
        assert!(empty.communication().counter(Counter::WaitReaderTime) > 0);
    }

    #[test]
    fn batches() {
        let channel = channel(&config(4, 1000));
        channel
            .put_all(vec![record("a"), record("b"), record("c")])
            .unwrap();

        // A batch larger than the remaining room waits for the consumer.
        let producer = {
            let channel = channel.clone();
            thread::spawn(move || channel.put_all(vec![record("d"), record("e")]))
        };
        sleep(Duration::from_millis(50));
        assert_eq!(channel.size(), 3);

        assert_eq!(channel.take_all(2), vec![record("a"), record("b")]);
        producer.join().unwrap().unwrap();
        assert_eq!(
            channel.take_all(10),
            vec![record("c"), record("d"), record("e")]
        );
        assert_eq!(
            channel.communication().counter(Counter::WriteReceivedRecords),
            5
        );

        channel.put_all(Vec::new()).unwrap();
        channel.close();
        assert!(matches!(
            channel.put_all(Vec::new()),
            Err(SyncError::ChannelClosed)
        ));
    }

    #[test]
    fn throttle_delay() {
        // 200 records in 100 ms is 2000/s; at 1000/s they take 200 ms.
        assert_eq!(throttle_delay_ms(200, 100, 1000), 100);
        assert_eq!(throttle_delay_ms(100, 100, 1000), 0);
        assert_eq!(throttle_delay_ms(0, 100, 1000), 0);
    }

    #[test]
    fn record_speed_limit() {
        let channel = channel(&ChannelConfig {
            capacity: 1000,
            byte_capacity: 1 << 20,
            speed: SpeedConfig {
                byte: None,
                record: Some(1000),
            },
            flow_control_interval_ms: 5,
        });

        let start = Instant::now();
        for i in 0..300 {
            channel.put(record(&i.to_string())).unwrap();
            sleep(Duration::from_micros(100));
        }
        // 300 records at 1000 records/s, minus the unthrottled last interval.
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn byte_speed_limit() {
        let channel = channel(&ChannelConfig {
            capacity: 1000,
            byte_capacity: 1 << 20,
            speed: SpeedConfig {
                byte: Some(40_000),
                record: None,
            },
            flow_control_interval_ms: 5,
        });

        let value = "x".repeat(500);
        let start = Instant::now();
        for _ in 0..40 {
            channel.put(record(&value)).unwrap();
            sleep(Duration::from_micros(100));
        }
        let bytes = channel.communication().counter(Counter::ReadSucceedBytes);
        assert!(bytes >= 20_000);
        // At least 20000 bytes at 40000 bytes/s, minus the unthrottled last
        // interval.
        assert!(start.elapsed() >= Duration::from_millis(250));
    }
}
