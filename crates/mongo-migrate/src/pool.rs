//! Worker pool running one phase (dump or restore) across assignments.
//!
//! Every assignment gets its own task; inside a task items run strictly one
//! after another, so at most one external process per worker is alive.
//! Failures are recorded and the worker moves on. Each task returns its own
//! [`PhaseResult`], and the pool merges them after all tasks have joined.

use crate::distribute::WorkerAssignment;
use crate::error::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// The two bulk operations of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Dump,
    Restore,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Dump => write!(f, "Dump"),
            Phase::Restore => write!(f, "Restore"),
        }
    }
}

/// One collection that failed during a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: String,
    pub message: String,
    pub worker_id: usize,
}

/// Outcome of one phase. `successful` and `failed` partition the items the
/// phase was given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseResult {
    pub successful: BTreeSet<String>,
    pub failed: Vec<ItemFailure>,
}

impl PhaseResult {
    /// Number of items accounted for.
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn merge(&mut self, other: PhaseResult) {
        self.successful.extend(other.successful);
        self.failed.extend(other.failed);
    }
}

/// Runs assignments concurrently.
#[derive(Debug, Clone, Default)]
pub struct WorkerPool {
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Once `cancel` fires, workers stop starting new items; items never
    /// started are recorded as failed.
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Run `action(worker_id, item)` for every item of every assignment and
    /// wait for all workers to finish.
    pub async fn run_phase<F, Fut>(
        &self,
        phase: Phase,
        assignments: Vec<WorkerAssignment>,
        action: F,
    ) -> PhaseResult
    where
        F: Fn(usize, String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let action = Arc::new(action);
        let started = Instant::now();
        info!(
            "{} phase: {} workers, {} collections",
            phase,
            assignments.len(),
            assignments.iter().map(|a| a.items.len()).sum::<usize>()
        );

        let mut handles = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let worker_id = assignment.worker_id;
            let items = assignment.items.clone();
            let action = action.clone();
            let cancel = self.cancel.clone();

            let handle = tokio::spawn(async move {
                run_worker(phase, assignment, action.as_ref(), &cancel).await
            });
            handles.push((worker_id, items, handle));
        }

        let mut result = PhaseResult::default();
        for (worker_id, items, handle) in handles {
            match handle.await {
                Ok(contribution) => result.merge(contribution),
                Err(e) => {
                    error!("[Worker {}] task panicked: {}", worker_id, e);
                    for item in items {
                        result.failed.push(ItemFailure {
                            item,
                            message: format!("worker task panicked: {}", e),
                            worker_id,
                        });
                    }
                }
            }
        }

        info!(
            "{} phase finished in {:.1}s: {} succeeded, {} failed",
            phase,
            started.elapsed().as_secs_f64(),
            result.successful.len(),
            result.failed.len()
        );
        result
    }
}

async fn run_worker<F, Fut>(
    phase: Phase,
    assignment: WorkerAssignment,
    action: &F,
    cancel: &CancellationToken,
) -> PhaseResult
where
    F: Fn(usize, String) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let worker_id = assignment.worker_id;
    let mut result = PhaseResult::default();

    for item in assignment.items {
        if cancel.is_cancelled() {
            result.failed.push(ItemFailure {
                item,
                message: "cancelled before start".to_string(),
                worker_id,
            });
            continue;
        }

        info!("[Worker {}] {}: {} started", worker_id, item, phase);
        match action(worker_id, item.clone()).await {
            Ok(()) => {
                info!("[Worker {}] {}: {} succeeded", worker_id, item, phase);
                result.successful.insert(item);
            }
            Err(e) => {
                error!("[Worker {}] {}: {} failed - {}", worker_id, item, phase, e);
                result.failed.push(ItemFailure {
                    item,
                    message: e.to_string(),
                    worker_id,
                });
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribute::distribute;
    use crate::error::MigrateError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("c{i}")).collect()
    }

    #[tokio::test]
    async fn test_partial_failure_partitions_items() {
        let items = names(9);
        let failing: BTreeSet<String> = ["c1", "c4", "c8"].iter().map(|s| s.to_string()).collect();
        let failing_in = failing.clone();

        let result = WorkerPool::default()
            .run_phase(Phase::Dump, distribute(&items, 3), move |_, item| {
                let fail = failing_in.contains(&item);
                async move {
                    if fail {
                        Err(MigrateError::Enumeration(format!("{item} broke")))
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        let failed: BTreeSet<String> = result.failed.iter().map(|f| f.item.clone()).collect();
        assert_eq!(failed, failing);
        assert_eq!(result.total(), items.len());
        assert!(result.successful.is_disjoint(&failed));
        assert!(!result.is_success());
        // c1, c4 and c8 sit on workers 2, 2 and 3
        let workers: HashMap<_, _> = result
            .failed
            .iter()
            .map(|f| (f.item.as_str(), f.worker_id))
            .collect();
        assert_eq!(workers["c1"], 2);
        assert_eq!(workers["c4"], 2);
        assert_eq!(workers["c8"], 3);
    }

    #[tokio::test]
    async fn test_items_within_worker_run_sequentially_in_order() {
        let log: Arc<Mutex<Vec<(usize, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let running: Arc<Mutex<HashMap<usize, usize>>> = Arc::new(Mutex::new(HashMap::new()));
        let peak = Arc::new(AtomicUsize::new(0));

        let (log_in, running_in, peak_in) = (log.clone(), running.clone(), peak.clone());
        let result = WorkerPool::default()
            .run_phase(Phase::Restore, distribute(&names(8), 2), move |worker, item| {
                let (log, running, peak) = (log_in.clone(), running_in.clone(), peak_in.clone());
                async move {
                    {
                        let mut running = running.lock().unwrap();
                        let n = running.entry(worker).or_insert(0);
                        *n += 1;
                        peak.fetch_max(*n, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    log.lock().unwrap().push((worker, item));
                    *running.lock().unwrap().get_mut(&worker).unwrap() -= 1;
                    Ok::<(), MigrateError>(())
                }
            })
            .await;

        assert!(result.is_success());
        assert_eq!(result.successful.len(), 8);
        assert_eq!(peak.load(Ordering::SeqCst), 1, "a worker never runs two items at once");

        let log = log.lock().unwrap();
        let worker_one: Vec<&str> = log.iter().filter(|(w, _)| *w == 1).map(|(_, i)| i.as_str()).collect();
        assert_eq!(worker_one, vec!["c0", "c2", "c4", "c6"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_worker() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let result = WorkerPool::default()
            .run_phase(Phase::Dump, distribute(&names(4), 1), move |_, _| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(MigrateError::Enumeration("always".into()))
                }
            })
            .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        assert_eq!(result.failed.len(), 4);
        assert_eq!(
            result.failed.iter().map(|f| f.item.as_str()).collect::<Vec<_>>(),
            vec!["c0", "c1", "c2", "c3"]
        );
    }

    #[tokio::test]
    async fn test_cancelled_pool_records_unstarted_items() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = WorkerPool::new(cancel)
            .run_phase(Phase::Dump, distribute(&names(3), 2), |_, _| async { Ok::<(), MigrateError>(()) })
            .await;

        assert_eq!(result.failed.len(), 3);
        assert!(result
            .failed
            .iter()
            .all(|f| f.message == "cancelled before start"));
    }

    #[tokio::test]
    async fn test_panicking_worker_counts_its_items_as_failed() {
        let result = WorkerPool::default()
            .run_phase(Phase::Dump, distribute(&names(4), 2), |worker, _| async move {
                if worker == 2 {
                    panic!("worker two exploded");
                }
                Ok::<(), MigrateError>(())
            })
            .await;

        assert_eq!(result.total(), 4);
        assert_eq!(result.successful.len(), 2);
        assert!(result.failed.iter().all(|f| f.worker_id == 2));
    }
}
