use crate::SyncError;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Counters {
    /// Live threads, idle or busy.
    threads: AtomicUsize,
    /// Threads currently running a job.
    active: AtomicUsize,
    /// Threads spawned so far, used for naming.
    spawned: AtomicUsize,
}

/// Elastic thread pool for timeout-bounded retry attempts.
///
/// The pool starts with no threads and spawns one per job, up to
/// `max_threads`, when no idle thread can take the job.  Threads that stay
/// idle for `keep_alive` exit.  There is no queue: a job submitted while
/// all `max_threads` threads are busy is rejected immediately.
pub struct RetryPool {
    name: String,
    max_threads: usize,
    keep_alive: Duration,
    sender: Mutex<Option<Sender<Job>>>,
    receiver: Receiver<Job>,
    counters: Arc<Counters>,
}

impl RetryPool {
    pub fn new(name: &str, max_threads: usize, keep_alive: Duration) -> Self {
        // Rendezvous channel: a send only succeeds if an idle thread is
        // waiting to receive.
        let (sender, receiver) = bounded(0);
        Self {
            name: name.to_string(),
            max_threads: max_threads.max(1),
            keep_alive,
            sender: Mutex::new(Some(sender)),
            receiver,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Pool sized for bursts of short retry attempts: at most 5 threads,
    /// reclaimed after 60 seconds of idleness.
    pub fn for_retries() -> Self {
        Self::new("ferry-retry", 5, Duration::from_secs(60))
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    /// Number of threads currently running a job.
    pub fn active_count(&self) -> usize {
        self.counters.active.load(Ordering::Acquire)
    }

    /// Number of live threads.
    pub fn thread_count(&self) -> usize {
        self.counters.threads.load(Ordering::Acquire)
    }

    /// Runs `job` on a pool thread.
    ///
    /// Fails with [`SyncError::AttemptRejected`] if all threads are busy
    /// and the pool is at its size limit, or if the pool was shut down.
    pub fn execute<F>(&self, job: F) -> Result<(), SyncError>
    where
        F: FnOnce() + Send + 'static,
    {
        let rejected = SyncError::AttemptRejected {
            max_threads: self.max_threads,
        };

        let sender = self.sender.lock().unwrap();
        let Some(sender) = sender.as_ref() else {
            return Err(rejected);
        };

        let job = match sender.try_send(Box::new(job)) {
            Ok(()) => return Ok(()),
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => job,
        };

        if !self.reserve_thread() {
            return Err(rejected);
        }
        let index = self.counters.spawned.fetch_add(1, Ordering::AcqRel);
        let receiver = self.receiver.clone();
        let counters = self.counters.clone();
        let keep_alive = self.keep_alive;
        let spawned = thread::Builder::new()
            .name(format!("{}-{index}", self.name))
            .spawn(move || worker(job, receiver, counters, keep_alive));
        if let Err(error) = spawned {
            warn!("failed to spawn retry thread: {error}");
            self.counters.threads.fetch_sub(1, Ordering::AcqRel);
            return Err(rejected);
        }
        Ok(())
    }

    fn reserve_thread(&self) -> bool {
        self.counters
            .threads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |threads| {
                (threads < self.max_threads).then_some(threads + 1)
            })
            .is_ok()
    }

    /// Stops accepting jobs.  Idle threads exit immediately; busy threads
    /// exit once their current job completes.
    pub fn shutdown(&self) {
        self.sender.lock().unwrap().take();
    }
}

impl Drop for RetryPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(first: Job, receiver: Receiver<Job>, counters: Arc<Counters>, keep_alive: Duration) {
    let mut job = Some(first);
    while let Some(next) = job.take() {
        counters.active.fetch_add(1, Ordering::AcqRel);
        if panic::catch_unwind(AssertUnwindSafe(next)).is_err() {
            warn!("retry attempt panicked");
        }
        counters.active.fetch_sub(1, Ordering::AcqRel);

        match receiver.recv_timeout(keep_alive) {
            Ok(next) => job = Some(next),
            Err(RecvTimeoutError::Timeout) => debug!("idle retry thread exiting"),
            Err(RecvTimeoutError::Disconnected) => {}
        }
    }
    counters.threads.fetch_sub(1, Ordering::AcqRel);
}
