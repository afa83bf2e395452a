// src/pool.rs
//! Bounded worker pool with as-completed collection.
//!
//! Workers pull items over a rendezvous channel, so an item is only ever
//! handed to an idle worker and "stop submitting" takes effect immediately:
//! nothing sits queued inside the pool when the error threshold trips or a
//! cancellation arrives. In-flight items always finish; after a cancellation
//! the collector waits out a bounded grace window and then abandons any
//! straggler rather than hanging the caller.
//!
//! Workers are stateless between items and share nothing but the work
//! queue, the result channel, and the failure accumulator.

use crossbeam_channel::{bounded, unbounded, RecvTimeoutError};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::accumulator::ErrorAccumulator;
use crate::cancel::CancelToken;
use crate::types::{ErrorKind, ErrorRecord, ProcessingResult, RunStatus};

/// One dispatchable unit: a single file. The work function itself is shared
/// across all items of a run.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub path: PathBuf,
}

/// Per-file work function supplied by the caller. Must be pure with respect
/// to the engine: path in, serializable payload or error out.
pub type WorkFn = Arc<dyn Fn(&Path) -> anyhow::Result<serde_json::Value> + Send + Sync>;

/// What the pool hands back: everything collected plus how the run ended.
#[derive(Debug)]
pub struct PoolOutcome {
    pub results: Vec<ProcessingResult>,
    pub status: RunStatus,
}

/// Poll interval for noticing cancellation while results are quiet.
const COLLECT_TICK: Duration = Duration::from_millis(50);

pub struct WorkerPool {
    workers: usize,
    grace: Duration,
}

impl WorkerPool {
    #[must_use]
    pub fn new(workers: usize, grace: Duration) -> Self {
        Self {
            workers: workers.max(1),
            grace,
        }
    }

    /// Runs every item through `work`, collecting results as they complete.
    ///
    /// Dispatch stops when `errors` crosses its threshold or `cancel` fires;
    /// items already handed to a worker finish normally. Failures are
    /// recorded into `errors` at the point of failure, by the worker itself,
    /// so the stop decision never lags behind the collector.
    pub fn run(
        &self,
        items: Vec<WorkItem>,
        work: &WorkFn,
        errors: &Arc<ErrorAccumulator>,
        cancel: &CancelToken,
        mut on_result: impl FnMut(&ProcessingResult),
    ) -> PoolOutcome {
        if items.is_empty() {
            return PoolOutcome {
                results: Vec::new(),
                status: RunStatus::Completed,
            };
        }
        if self.workers == 1 {
            return run_sequential(items, work, errors, cancel, &mut on_result);
        }
        self.run_parallel(items, work, errors, cancel, &mut on_result)
    }

    fn run_parallel(
        &self,
        items: Vec<WorkItem>,
        work: &WorkFn,
        errors: &Arc<ErrorAccumulator>,
        cancel: &CancelToken,
        on_result: &mut dyn FnMut(&ProcessingResult),
    ) -> PoolOutcome {
        let (work_tx, work_rx) = bounded::<WorkItem>(0);
        let (result_tx, result_rx) = unbounded::<ProcessingResult>();

        for _ in 0..self.workers {
            let rx = work_rx.clone();
            let tx = result_tx.clone();
            let work = Arc::clone(work);
            let errors = Arc::clone(errors);
            let cancel = cancel.clone();
            thread::spawn(move || {
                while let Ok(item) = rx.recv() {
                    if cancel.is_cancelled() || errors.threshold_exceeded() {
                        break;
                    }
                    let result = run_item(&item.path, &work);
                    if let ProcessingResult::Failure(rec) = &result {
                        errors.record(rec.clone());
                    }
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        // The collector must observe disconnect once the workers are done.
        drop(work_rx);
        drop(result_tx);

        let dispatch_cancel = cancel.clone();
        let dispatch_errors = Arc::clone(errors);
        let dispatcher = thread::spawn(move || {
            for item in items {
                if dispatch_cancel.is_cancelled() || dispatch_errors.threshold_exceeded() {
                    break;
                }
                // Errs only when every worker has exited; nothing left to do.
                if work_tx.send(item).is_err() {
                    break;
                }
            }
        });

        let mut results = Vec::new();
        let mut grace_deadline: Option<Instant> = None;
        let mut timed_out = false;

        loop {
            if grace_deadline.is_none() && cancel.is_cancelled() {
                grace_deadline = Some(Instant::now() + self.grace);
            }
            let wait = match grace_deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        timed_out = true;
                        break;
                    }
                    remaining.min(COLLECT_TICK)
                }
                None => COLLECT_TICK,
            };
            match result_rx.recv_timeout(wait) {
                Ok(result) => {
                    on_result(&result);
                    results.push(result);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if !timed_out {
            // All workers exited; the dispatcher cannot be blocked anymore.
            let _ = dispatcher.join();
        }
        // On timeout the dispatcher and stragglers are abandoned; they see
        // the stop flags and wind down on their own.

        PoolOutcome {
            results,
            status: final_status(cancel, errors),
        }
    }
}

fn run_sequential(
    items: Vec<WorkItem>,
    work: &WorkFn,
    errors: &Arc<ErrorAccumulator>,
    cancel: &CancelToken,
    on_result: &mut dyn FnMut(&ProcessingResult),
) -> PoolOutcome {
    let mut results = Vec::new();
    for item in items {
        if cancel.is_cancelled() || errors.threshold_exceeded() {
            break;
        }
        let result = run_item(&item.path, work);
        if let ProcessingResult::Failure(rec) = &result {
            errors.record(rec.clone());
        }
        on_result(&result);
        results.push(result);
    }
    PoolOutcome {
        results,
        status: final_status(cancel, errors),
    }
}

fn final_status(cancel: &CancelToken, errors: &ErrorAccumulator) -> RunStatus {
    if cancel.is_cancelled() {
        RunStatus::Cancelled
    } else if errors.threshold_exceeded() {
        RunStatus::ThresholdExceeded
    } else {
        RunStatus::Completed
    }
}

/// Runs the work function for one file. The worker boundary: a panic here
/// becomes a `Failure` for this file only and never reaches sibling workers.
fn run_item(path: &Path, work: &WorkFn) -> ProcessingResult {
    match panic::catch_unwind(AssertUnwindSafe(|| work(path))) {
        Ok(Ok(payload)) => ProcessingResult::Success {
            path: path.to_path_buf(),
            payload,
        },
        Ok(Err(e)) => ProcessingResult::Failure(ErrorRecord::new(
            path.to_path_buf(),
            format!("{e:#}"),
            ErrorKind::Work,
        )),
        Err(panic_payload) => ProcessingResult::Failure(ErrorRecord::new(
            path.to_path_buf(),
            panic_message(&panic_payload),
            ErrorKind::Panic,
        )),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("worker panicked: {s}")
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SkipCause;

    fn items(n: usize) -> Vec<WorkItem> {
        (1..=n)
            .map(|i| WorkItem {
                path: PathBuf::from(format!("f{i}.rs")),
            })
            .collect()
    }

    fn ok_fn() -> WorkFn {
        Arc::new(|p: &Path| Ok(serde_json::json!({ "file": p.display().to_string() })))
    }

    #[test]
    fn test_empty_input_completes() {
        let pool = WorkerPool::new(4, Duration::from_secs(1));
        let errors = Arc::new(ErrorAccumulator::new(10));
        let outcome = pool.run(Vec::new(), &ok_fn(), &errors, &CancelToken::new(), |_| {});
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.status, RunStatus::Completed);
    }

    #[test]
    fn test_work_error_becomes_failure() {
        let pool = WorkerPool::new(1, Duration::from_secs(1));
        let errors = Arc::new(ErrorAccumulator::new(10));
        let work: WorkFn = Arc::new(|_| anyhow::bail!("unparsable"));
        let outcome = pool.run(items(1), &work, &errors, &CancelToken::new(), |_| {});
        assert_eq!(outcome.status, RunStatus::Completed);
        match &outcome.results[0] {
            ProcessingResult::Failure(rec) => {
                assert_eq!(rec.kind, ErrorKind::Work);
                assert!(rec.message.contains("unparsable"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(errors.count(), 1);
    }

    #[test]
    fn test_panic_is_contained_to_one_file() {
        let pool = WorkerPool::new(4, Duration::from_secs(5));
        let errors = Arc::new(ErrorAccumulator::new(100));
        let work: WorkFn = Arc::new(|p: &Path| {
            assert!(
                !p.ends_with("f3.rs"),
                "pathological input"
            );
            Ok(serde_json::json!(1))
        });
        let outcome = pool.run(items(20), &work, &errors, &CancelToken::new(), |_| {});
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.results.len(), 20);
        let panics: Vec<_> = outcome
            .results
            .iter()
            .filter(|r| matches!(r, ProcessingResult::Failure(rec) if rec.kind == ErrorKind::Panic))
            .collect();
        assert_eq!(panics.len(), 1);
    }

    #[test]
    fn test_threshold_stops_dispatch_sequentially() {
        let pool = WorkerPool::new(1, Duration::from_secs(1));
        let errors = Arc::new(ErrorAccumulator::new(2));
        // Items 1 and 3 fail.
        let work: WorkFn = Arc::new(|p: &Path| {
            let s = p.display().to_string();
            if s.contains("f1") || s.contains("f3") {
                anyhow::bail!("bad file");
            }
            Ok(serde_json::json!("ok"))
        });
        let outcome = pool.run(items(5), &work, &errors, &CancelToken::new(), |_| {});
        assert_eq!(outcome.status, RunStatus::ThresholdExceeded);
        // Items 4 and 5 never began.
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(errors.count(), 2);
    }

    #[test]
    fn test_parallel_threshold_keeps_partial_results() {
        let pool = WorkerPool::new(4, Duration::from_secs(5));
        let errors = Arc::new(ErrorAccumulator::new(1));
        let work: WorkFn = Arc::new(|p: &Path| {
            if p.ends_with("f1.rs") {
                anyhow::bail!("poison");
            }
            std::thread::sleep(Duration::from_millis(5));
            Ok(serde_json::json!("ok"))
        });
        let outcome = pool.run(items(64), &work, &errors, &CancelToken::new(), |_| {});
        assert_eq!(outcome.status, RunStatus::ThresholdExceeded);
        assert!(outcome.results.len() < 64);
    }

    #[test]
    fn test_cancellation_returns_within_grace() {
        let grace = Duration::from_millis(300);
        let pool = WorkerPool::new(2, grace);
        let errors = Arc::new(ErrorAccumulator::new(100));
        let cancel = CancelToken::new();
        let work: WorkFn = Arc::new(|_| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(serde_json::json!("ok"))
        });

        let canceller = cancel.clone();
        let trigger = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome = pool.run(items(500), &work, &errors, &cancel, |_| {});
        trigger.join().unwrap();

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert!(outcome.results.len() < 500);
        // Bounded: trigger delay + grace + generous scheduling slack.
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_results_are_plain_data() {
        // Compile-time check that results can cross threads.
        fn assert_send<T: Send + 'static>() {}
        assert_send::<ProcessingResult>();
        assert_send::<SkipCause>();
    }
}
