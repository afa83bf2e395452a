// src/accumulator.rs
//! Shared failure bookkeeping for a single run.
//!
//! Workers record failures directly so the stop decision never waits on
//! the collector thread. The count is atomic; the record list is behind a
//! mutex that is only touched on the failure path.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::types::ErrorRecord;

#[derive(Debug)]
pub struct ErrorAccumulator {
    max_errors: usize,
    count: AtomicUsize,
    records: Mutex<Vec<ErrorRecord>>,
}

impl ErrorAccumulator {
    #[must_use]
    pub fn new(max_errors: usize) -> Self {
        Self {
            max_errors,
            count: AtomicUsize::new(0),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Appends a failure. Returns true when this record is the one that
    /// crossed the threshold.
    pub fn record(&self, err: ErrorRecord) -> bool {
        if let Ok(mut records) = self.records.lock() {
            records.push(err);
        }
        let previous = self.count.fetch_add(1, Ordering::SeqCst);
        previous + 1 == self.max_errors
    }

    #[must_use]
    pub fn threshold_exceeded(&self) -> bool {
        self.count.load(Ordering::SeqCst) >= self.max_errors
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Drains the accumulated records, ordered by arrival.
    #[must_use]
    pub fn into_records(self) -> Vec<ErrorRecord> {
        self.records.into_inner().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use std::path::PathBuf;

    fn failure(n: usize) -> ErrorRecord {
        ErrorRecord::new(PathBuf::from(format!("f{n}.rs")), "boom", ErrorKind::Work)
    }

    #[test]
    fn test_threshold_crossing_signalled_once() {
        let acc = ErrorAccumulator::new(2);
        assert!(!acc.record(failure(1)));
        assert!(!acc.threshold_exceeded());
        assert!(acc.record(failure(2)));
        assert!(acc.threshold_exceeded());
        // Past the threshold the crossing signal does not repeat.
        assert!(!acc.record(failure(3)));
        assert!(acc.threshold_exceeded());
    }

    #[test]
    fn test_records_preserve_arrival_order() {
        let acc = ErrorAccumulator::new(10);
        acc.record(failure(1));
        acc.record(failure(2));
        let records = acc.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].path, PathBuf::from("f1.rs"));
        assert_eq!(records[1].path, PathBuf::from("f2.rs"));
    }
}
