// src/process/pool.rs

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc,
};
use tracing::{debug, error, instrument};

use crate::error::{PipelineError, Result};

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Result of one unit of work.
#[derive(Debug)]
pub enum UnitOutcome<T> {
    Done(T),
    Failed(PipelineError),
    /// Cancellation was observed before the unit started.
    Skipped,
}

/// A fixed-size worker pool that lives for exactly one stage.
///
/// Units are submitted through a window no wider than the pool, and the
/// cancellation flag is checked before every submission and again when a
/// unit starts. The underlying rayon pool is dropped when `run` returns, so
/// nothing is left running between stages.
pub struct StagePool {
    name: &'static str,
    workers: usize,
    cancel: CancelToken,
}

impl StagePool {
    pub fn new(name: &'static str, workers: usize, cancel: CancelToken) -> Self {
        Self {
            name,
            workers: workers.max(1),
            cancel,
        }
    }

    /// Runs `work` over every unit and returns the outcomes in unit order.
    ///
    /// `on_complete(done, total)` is called on the calling thread after each
    /// unit finishes. Returns `Err(Cancelled)` if cancellation was observed at
    /// any point during the stage.
    #[instrument(level = "debug", skip_all, fields(stage = self.name, units = units.len()))]
    pub fn run<I, T, F>(
        &self,
        units: Vec<I>,
        work: F,
        mut on_complete: impl FnMut(usize, usize),
    ) -> Result<Vec<UnitOutcome<T>>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Result<T> + Send + Sync + 'static,
    {
        let total = units.len();
        let mut outcomes: Vec<Option<UnitOutcome<T>>> = (0..total).map(|_| None).collect();
        if total == 0 {
            return Ok(Vec::new());
        }

        let stage = self.name;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.min(total))
            .thread_name(move |i| format!("{stage}-worker-{i}"))
            .panic_handler(move |_| error!(stage, "worker panicked"))
            .build()?;

        let work = Arc::new(work);
        let (tx, rx) = mpsc::channel::<(usize, UnitOutcome<T>)>();
        let mut pending = units.into_iter().enumerate();
        let mut in_flight = 0usize;
        let mut done = 0usize;

        loop {
            while in_flight < self.workers && !self.cancel.is_cancelled() {
                let Some((idx, unit)) = pending.next() else {
                    break;
                };
                let report = Report {
                    idx,
                    tx: tx.clone(),
                    outcome: None,
                };
                let work = Arc::clone(&work);
                let cancel = self.cancel.clone();
                pool.spawn(move || {
                    let outcome = if cancel.is_cancelled() {
                        UnitOutcome::Skipped
                    } else {
                        match work(unit) {
                            Ok(v) => UnitOutcome::Done(v),
                            Err(e) => UnitOutcome::Failed(e),
                        }
                    };
                    report.complete(outcome);
                });
                in_flight += 1;
            }

            if in_flight == 0 {
                break;
            }

            // every spawned unit reports exactly once, even when it panics
            let Ok((idx, outcome)) = rx.recv() else {
                break;
            };
            outcomes[idx] = Some(outcome);
            in_flight -= 1;
            done += 1;
            on_complete(done, total);
        }
        drop(pool);

        if self.cancel.is_cancelled() {
            debug!(stage, done, total, "stage cancelled");
            return Err(PipelineError::Cancelled);
        }

        Ok(outcomes
            .into_iter()
            .map(|o| o.unwrap_or(UnitOutcome::Skipped))
            .collect())
    }
}

/// Sends a unit's outcome when dropped, so a panic still reports back.
struct Report<T> {
    idx: usize,
    tx: mpsc::Sender<(usize, UnitOutcome<T>)>,
    outcome: Option<UnitOutcome<T>>,
}

impl<T> Report<T> {
    fn complete(mut self, outcome: UnitOutcome<T>) {
        self.outcome = Some(outcome);
    }
}

impl<T> Drop for Report<T> {
    fn drop(&mut self) {
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| UnitOutcome::Failed(PipelineError::WorkerPool("unit panicked".into())));
        let _ = self.tx.send((self.idx, outcome));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn runs_every_unit_in_order() -> Result<()> {
        let pool = StagePool::new("test", 3, CancelToken::new());
        let mut progress = Vec::new();
        let outcomes = pool.run((0..10).collect(), |n: u32| Ok(n * 2), |done, total| {
            progress.push((done, total))
        })?;

        let values: Vec<u32> = outcomes
            .into_iter()
            .map(|o| match o {
                UnitOutcome::Done(v) => v,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(values, (0..10).map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(progress.len(), 10);
        assert_eq!(progress.last(), Some(&(10, 10)));
        Ok(())
    }

    #[test]
    fn unit_failures_are_contained() -> Result<()> {
        let pool = StagePool::new("test", 2, CancelToken::new());
        let outcomes = pool.run(
            vec![1, 2, 3],
            |n: u32| {
                if n == 2 {
                    Err(PipelineError::WorkerPool("boom".into()))
                } else {
                    Ok(n)
                }
            },
            |_, _| {},
        )?;
        assert!(matches!(outcomes[0], UnitOutcome::Done(1)));
        assert!(matches!(outcomes[1], UnitOutcome::Failed(_)));
        assert!(matches!(outcomes[2], UnitOutcome::Done(3)));
        Ok(())
    }

    #[test]
    fn panics_report_as_failures() -> Result<()> {
        let pool = StagePool::new("test", 2, CancelToken::new());
        let outcomes = pool.run(
            vec![1, 2],
            |n: u32| {
                if n == 1 {
                    panic!("unit blew up");
                }
                Ok(n)
            },
            |_, _| {},
        )?;
        assert!(matches!(outcomes[0], UnitOutcome::Failed(PipelineError::WorkerPool(_))));
        assert!(matches!(outcomes[1], UnitOutcome::Done(2)));
        Ok(())
    }

    #[test]
    fn cancellation_stops_submission() {
        let cancel = CancelToken::new();
        let pool = StagePool::new("test", 1, cancel.clone());
        let started = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&started);
        let trigger = cancel.clone();

        let result = pool.run(
            (0..100).collect::<Vec<u32>>(),
            move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 2 {
                    trigger.cancel();
                }
                Ok(())
            },
            |_, _| {},
        );

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        // one worker, window of one: nothing runs after the cancelling unit
        assert_eq!(started.load(Ordering::SeqCst), 3);
    }
}
