//! Functions over [`Communication`]s: merging siblings into a parent total,
//! derived totals, and report formatting.

use super::{Communication, Counter};
use ferry_adapterlib::State;
use std::time::Duration;

/// Merges sibling communications into one.
///
/// Counters are summed, so totals do not depend on the order of
/// `communications`.  The merged state is the most severe child state,
/// in the order `Killed > Failed > Running > NotStarted > Succeeded`; in
/// particular, the result is `Succeeded` only if every child succeeded.
/// The merged error is the first error found in iteration order, and the
/// timestamp is the latest child timestamp.
pub fn merge_communication<'a, I>(communications: I) -> Communication
where
    I: IntoIterator<Item = &'a Communication>,
{
    let merged = Communication::new();
    let mut state = State::Succeeded;
    let mut timestamp = i64::MIN;

    for communication in communications {
        merged.absorb(communication);
        let child_state = communication.state();
        if child_state.severity() > state.severity() {
            state = child_state;
        }
        timestamp = timestamp.max(communication.timestamp());
    }

    merged.set_state(state);
    merged.set_timestamp(if timestamp == i64::MIN { 0 } else { timestamp });
    merged
}

pub fn is_finished(communication: &Communication) -> bool {
    communication.is_finished()
}

pub fn total_read_records(communication: &Communication) -> u64 {
    communication.counter(Counter::ReadSucceedRecords)
        + communication.counter(Counter::ReadFailedRecords)
}

pub fn total_read_bytes(communication: &Communication) -> u64 {
    communication.counter(Counter::ReadSucceedBytes)
        + communication.counter(Counter::ReadFailedBytes)
}

pub fn total_error_records(communication: &Communication) -> u64 {
    communication.counter(Counter::ReadFailedRecords)
        + communication.counter(Counter::WriteFailedRecords)
}

pub fn total_error_bytes(communication: &Communication) -> u64 {
    communication.counter(Counter::ReadFailedBytes)
        + communication.counter(Counter::WriteFailedBytes)
}

pub fn write_succeed_records(communication: &Communication) -> u64 {
    communication
        .counter(Counter::WriteReceivedRecords)
        .saturating_sub(communication.counter(Counter::WriteFailedRecords))
}

pub fn write_succeed_bytes(communication: &Communication) -> u64 {
    communication
        .counter(Counter::WriteReceivedBytes)
        .saturating_sub(communication.counter(Counter::WriteFailedBytes))
}

/// Returns a copy of `now` with byte and record speeds computed against
/// the earlier report `last`.
///
/// Speeds are per second over the time between the two timestamps, rounded
/// down to whole seconds and at least one second.
pub fn get_report_communication(now: &Communication, last: &Communication) -> Communication {
    let report = now.snapshot();

    let interval_ms = now.timestamp().saturating_sub(last.timestamp());
    let seconds = if interval_ms <= 1000 {
        1
    } else {
        (interval_ms / 1000) as u64
    };

    let bytes = total_read_bytes(now).saturating_sub(total_read_bytes(last));
    let records = total_read_records(now).saturating_sub(total_read_records(last));
    report.set_counter(Counter::ByteSpeed, bytes / seconds);
    report.set_counter(Counter::RecordSpeed, records / seconds);
    report
}

/// One-line human-readable summary of `communication`, as logged by the
/// container on every report.
pub fn progress_line(communication: &Communication) -> String {
    let wait_writer = Duration::from_nanos(communication.counter(Counter::WaitWriterTime));
    let wait_reader = Duration::from_nanos(communication.counter(Counter::WaitReaderTime));
    format!(
        "Total {} records, {} bytes | Speed {}B/s, {} records/s | Error {} records, {} bytes | All Task WaitWriterTime {:.3}s | All Task WaitReaderTime {:.3}s",
        total_read_records(communication),
        total_read_bytes(communication),
        communication.counter(Counter::ByteSpeed),
        communication.counter(Counter::RecordSpeed),
        total_error_records(communication),
        total_error_bytes(communication),
        wait_writer.as_secs_f64(),
        wait_reader.as_secs_f64(),
    )
}
