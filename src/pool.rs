//! Bounded fan-out with index-addressed result slots.
//!
//! Each input is handed to its own task; at most `concurrency` tasks hold a
//! permit at once. Results are written into a pre-sized slot vector by input
//! index, so callers see input order regardless of completion order. When the
//! batch deadline elapses the remaining tasks are aborted and their slots stay
//! `Abandoned`; everything already collected is returned.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// What became of one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot<T> {
    Done(T),
    /// The work panicked or was cancelled; carries the join error text.
    Failed(String),
    /// Still running when the batch deadline elapsed.
    Abandoned,
}

#[cfg(test)]
impl<T> Slot<T> {
    pub(crate) fn done(self) -> Option<T> {
        match self {
            Slot::Done(value) => Some(value),
            _ => None,
        }
    }
}

/// Aborts the inner job when the worker holding it is aborted.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

pub(crate) async fn run_indexed<I, T, F, Fut>(
    inputs: Vec<I>,
    concurrency: usize,
    batch_deadline: Duration,
    work: F,
) -> Vec<Slot<T>>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
{
    let mut slots: Vec<Slot<T>> = inputs.iter().map(|_| Slot::Abandoned).collect();
    if inputs.is_empty() {
        return slots;
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut workers = JoinSet::new();

    for (index, input) in inputs.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let job = work(input);
        workers.spawn(async move {
            // The semaphore is never closed, so acquisition only waits.
            let _permit = semaphore.acquire_owned().await;
            // The job runs in its own task so a panic still reports its index.
            let handle = tokio::spawn(job);
            let _guard = AbortOnDrop(handle.abort_handle());
            let result = handle.await.map_err(|e| e.to_string());
            (index, result)
        });
    }

    let deadline = Instant::now() + batch_deadline;
    loop {
        match tokio::time::timeout_at(deadline, workers.join_next()).await {
            Ok(Some(Ok((index, result)))) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = match result {
                        Ok(value) => Slot::Done(value),
                        Err(e) => {
                            error!("Worker for input #{} failed: {}", index, e);
                            Slot::Failed(e)
                        }
                    };
                }
            }
            Ok(Some(Err(e))) => {
                error!("Worker task ended without a result: {}", e);
            }
            Ok(None) => break,
            Err(_) => {
                warn!(
                    "Batch deadline of {:?} elapsed, abandoning {} in-flight invocation(s)",
                    batch_deadline,
                    workers.len()
                );
                workers.abort_all();
                break;
            }
        }
    }

    debug!(
        "Fan-out finished: {}/{} slots filled",
        slots.iter().filter(|s| matches!(s, Slot::Done(_))).count(),
        slots.len()
    );
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let inputs = vec![30u64, 1, 15, 5];
        let slots = run_indexed(inputs, 4, Duration::from_secs(5), |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay * 2
        })
        .await;

        let values: Vec<_> = slots.into_iter().map(Slot::done).collect();
        assert_eq!(values, vec![Some(60), Some(2), Some(30), Some(10)]);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let slots = run_indexed((0..12).collect::<Vec<u32>>(), 3, Duration::from_secs(5), |n| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                n
            }
        })
        .await;

        assert!(slots.iter().all(|s| matches!(s, Slot::Done(_))));
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_deadline_keeps_finished_slots() {
        let slots = run_indexed(vec![1u64, 5_000, 2], 3, Duration::from_millis(200), |delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay
        })
        .await;

        assert_eq!(slots, vec![Slot::Done(1), Slot::Abandoned, Slot::Done(2)]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let slots: Vec<Slot<u8>> =
            run_indexed(Vec::<u8>::new(), 2, Duration::from_secs(1), |n| async move { n }).await;
        assert!(slots.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_job_is_failed_not_abandoned() {
        let slots = run_indexed(vec![1u32, 2, 3], 2, Duration::from_secs(5), |n| async move {
            if n == 2 {
                panic!("boom");
            }
            n
        })
        .await;

        assert_eq!(slots[0], Slot::Done(1));
        assert!(matches!(&slots[1], Slot::Failed(msg) if msg.contains("panic")));
        assert_eq!(slots[2], Slot::Done(3));
    }
}
