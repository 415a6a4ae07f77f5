/// Per-sequence parallel scheduler
///
/// A track-level operation is split into one task per sequence slot. Tasks
/// run on a bounded rayon pool; each one gets exclusive `&mut` access to its
/// own slot and nothing else, so tasks can only communicate through the
/// shared progress counters.
use indexmap::IndexMap;
use log::debug;
use rayon::prelude::*;
use std::sync::{Arc, OnceLock};

use crate::cancel::CancellationToken;
use crate::error::{EngineError, EngineResult};
use crate::progress::{status, ProgressSink, TaskCounters};

pub struct SequenceScheduler {
    pool: rayon::ThreadPool,
    progress: Arc<dyn ProgressSink>,
}

impl SequenceScheduler {
    pub fn new(threads: usize, progress: Arc<dyn ProgressSink>) -> EngineResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("trackops-worker-{i}"))
            .build()?;
        Ok(SequenceScheduler { pool, progress })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `work` once per slot and collect the results in slot order.
    ///
    /// The first task failure cancels the tasks that have not started yet
    /// (running ones stop at their next checkpoint) and is returned as is.
    /// Cancellation through `cancel` yields `EngineError::Cancelled`.
    pub fn run<S, R, F>(
        &self,
        label: &str,
        slots: &mut IndexMap<String, S>,
        cancel: &CancellationToken,
        work: F,
    ) -> EngineResult<Vec<R>>
    where
        S: Send,
        R: Send,
        F: Fn(&str, &mut S, &CancellationToken) -> EngineResult<R> + Sync,
    {
        cancel.checkpoint()?;

        let total = slots.len();
        let counters = TaskCounters::new();
        let failure: OnceLock<EngineError> = OnceLock::new();
        // Cancelled on the first task failure without touching the caller's token
        let batch = cancel.child();

        debug!(
            "[SCHEDULER] {label}: {total} sequence tasks on {} threads",
            self.threads()
        );

        let results: Vec<Option<R>> = self.pool.install(|| {
            slots
                .par_iter_mut()
                .map(|(name, slot)| {
                    if batch.is_cancelled() {
                        return None;
                    }
                    counters.start();
                    match work(name, slot, &batch) {
                        Ok(result) => {
                            let done = counters.complete();
                            self.progress.report(
                                &format!("{label}: {name} {}", status(done, total)),
                                done,
                                total,
                            );
                            Some(result)
                        }
                        Err(EngineError::Cancelled) => None,
                        Err(err) => {
                            debug!("[SCHEDULER] {label}: task '{name}' failed: {err}");
                            let _ = failure.set(err);
                            batch.cancel();
                            None
                        }
                    }
                })
                .collect()
        });

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }
        if cancel.is_cancelled() {
            debug!(
                "[SCHEDULER] {label}: aborted after {} of {total} tasks",
                counters.completed()
            );
            return Err(EngineError::Cancelled);
        }
        let completed = counters.completed();
        if completed != total {
            return Err(EngineError::Internal(format!(
                "{label}: {completed} of {total} sequence tasks completed"
            )));
        }
        Ok(results.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CollectingProgress, NullProgress};

    fn slots(n: usize) -> IndexMap<String, Vec<u32>> {
        (0..n).map(|i| (format!("seq{i}"), vec![i as u32; 4])).collect()
    }

    #[test]
    fn test_results_follow_slot_order() {
        let scheduler = SequenceScheduler::new(4, Arc::new(NullProgress)).unwrap();
        let mut slots = slots(20);
        let cancel = CancellationToken::new();
        let sums = scheduler
            .run("sum", &mut slots, &cancel, |_, slot, _| {
                slot.iter_mut().for_each(|v| *v += 1);
                Ok(slot.iter().sum::<u32>())
            })
            .unwrap();
        let expected: Vec<u32> = (0..20).map(|i| (i + 1) * 4).collect();
        assert_eq!(sums, expected);
    }

    #[test]
    fn test_progress_reports_each_task() {
        let progress = Arc::new(CollectingProgress::new());
        let scheduler = SequenceScheduler::new(2, progress.clone()).unwrap();
        let mut slots = slots(5);
        scheduler
            .run("noop", &mut slots, &CancellationToken::new(), |_, _, _| Ok(()))
            .unwrap();
        let updates = progress.updates();
        assert_eq!(updates.len(), 5);
        assert!(updates.iter().all(|(_, _, total)| *total == 5));
        let mut done: Vec<usize> = updates.iter().map(|(_, d, _)| *d).collect();
        done.sort_unstable();
        assert_eq!(done, vec![1, 2, 3, 4, 5]);
        assert!(updates.iter().any(|(m, _, _)| m.ends_with("(5/5)")));
    }

    #[test]
    fn test_first_failure_is_returned_and_caller_token_untouched() {
        let scheduler = SequenceScheduler::new(1, Arc::new(NullProgress)).unwrap();
        let mut slots = slots(10);
        let cancel = CancellationToken::new();
        let err = scheduler
            .run("fail", &mut slots, &cancel, |name, _, _| {
                if name == "seq3" {
                    Err(EngineError::TaskFailed {
                        sequence: name.to_string(),
                        message: "boom".to_string(),
                    })
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::TaskFailed { ref sequence, .. } if sequence == "seq3"));
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_cancelled_before_start_touches_nothing() {
        let scheduler = SequenceScheduler::new(2, Arc::new(NullProgress)).unwrap();
        let mut slots = slots(3);
        let before = slots.clone();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = scheduler
            .run("cancel", &mut slots, &cancel, |_, slot, _| {
                slot.clear();
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(slots, before);
    }
}
