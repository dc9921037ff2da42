//! Round-robin distribution of collections across workers.
//!
//! The same `(items, worker_count)` pair must always produce the same
//! assignments: the restore phase is planned independently of the dump
//! phase and relies on that to find each worker's dump output.

use serde::Serialize;

/// The ordered list of collections one worker processes in a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerAssignment {
    /// 1-based worker id.
    pub worker_id: usize,
    pub items: Vec<String>,
}

/// Assign `items[i]` to worker `(i % worker_count) + 1`, dropping workers
/// that end up with nothing. A `worker_count` of 0 is treated as 1.
pub fn distribute(items: &[String], worker_count: usize) -> Vec<WorkerAssignment> {
    let worker_count = worker_count.max(1);
    let mut assignments: Vec<WorkerAssignment> = (1..=worker_count)
        .map(|worker_id| WorkerAssignment {
            worker_id,
            items: Vec::new(),
        })
        .collect();

    for (i, item) in items.iter().enumerate() {
        assignments[i % worker_count].items.push(item.clone());
    }

    assignments.retain(|a| !a.items.is_empty());
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_round_robin() {
        let assignments = distribute(&names(&["a", "b", "c", "d", "e"]), 3);
        assert_eq!(
            assignments,
            vec![
                WorkerAssignment {
                    worker_id: 1,
                    items: names(&["a", "d"])
                },
                WorkerAssignment {
                    worker_id: 2,
                    items: names(&["b", "e"])
                },
                WorkerAssignment {
                    worker_id: 3,
                    items: names(&["c"])
                },
            ]
        );
    }

    #[test]
    fn test_empty_workers_dropped() {
        let assignments = distribute(&names(&["x", "y", "z"]), 10);
        assert_eq!(assignments.len(), 3);
        assert!(assignments.iter().all(|a| a.items.len() == 1));
        assert_eq!(
            assignments.iter().map(|a| a.worker_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn test_deterministic_and_complete() {
        let items: Vec<String> = (0..37).map(|i| format!("coll_{i}")).collect();
        for workers in 1..=10 {
            let first = distribute(&items, workers);
            let second = distribute(&items, workers);
            assert_eq!(first, second);

            let mut seen: Vec<String> = first.iter().flat_map(|a| a.items.clone()).collect();
            seen.sort();
            let mut expected = items.clone();
            expected.sort();
            assert_eq!(seen, expected, "every item exactly once for {workers} workers");
            assert!(first.iter().all(|a| !a.items.is_empty()));
            assert_eq!(first.len(), workers.min(items.len()));
        }
    }

    #[test]
    fn test_no_items() {
        assert!(distribute(&[], 4).is_empty());
    }

    #[test]
    fn test_zero_workers_treated_as_one() {
        let assignments = distribute(&names(&["a", "b"]), 0);
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].items, names(&["a", "b"]));
    }
}
