//! Execution core of the Ferry batch data-synchronization engine.
//!
//! A job is split into tasks, each executed by a reader plugin and a writer
//! plugin connected by a bounded, rate-limited [`Channel`].  Progress and
//! failures of every task are tracked in a [`Communication`], which is
//! merged bottom-up into task-group and job totals.  The [`TaskMonitor`]
//! turns tasks that stop making progress into failures, and the
//! [`TaskGroupContainer`] retries failed tasks using the helpers in
//! [`retry`].

pub mod channel;
pub mod clock;
mod error;
pub mod retry;
pub mod statistics;
pub mod taskgroup;

#[cfg(test)]
mod test;

pub use channel::{BufferedRecordExchanger, Channel};
pub use clock::{Clock, SystemClock};
pub use error::SyncError;
pub use retry::{RetryPolicy, RetryPool};
pub use statistics::{Communication, Counter};
pub use taskgroup::{monitor::TaskMonitor, TaskGroupContainer, TaskSpec};
