//! Progress extraction from free-form dump/restore tool output.
//!
//! [`parse_line`] is stateless. [`ProgressTracker`] is the per-item caller
//! state that turns a stream of events into a handful of log lines: one per
//! 10-percentage-point crossing plus a completion line.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

static PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%").expect("valid percent regex"));

static COMPLETED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(done|finished|completed?)\b").expect("valid completion regex")
});

static DOCUMENTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+document(?:s|\(s\))?\b").expect("valid document regex")
});

static FRACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)/(\d+)\b").expect("valid fraction regex"));

/// Classification of one output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Number of documents processed so far.
    DocumentCount(u64),
    /// Percentage complete, 0..=100.
    PercentMilestone(u8),
    /// Explicit completion marker, with the final count when the line has one.
    Completed { documents: Option<u64> },
    /// Anything else.
    Other,
}

/// A classified output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub raw_line: String,
}

/// Classify a single line of tool output.
///
/// Percentages win over completion markers, which win over bare document
/// counts: `[####] db.users 50/100 (50.0%)` is a milestone, and
/// `done dumping db.users (100 documents)` is a completion.
pub fn parse_line(line: &str) -> ProgressEvent {
    ProgressEvent {
        kind: classify(line),
        raw_line: line.to_string(),
    }
}

fn classify(line: &str) -> ProgressKind {
    if let Some(percent) = PERCENT
        .captures(line)
        .and_then(|c| c[1].parse::<f64>().ok())
    {
        return ProgressKind::PercentMilestone(percent.clamp(0.0, 100.0) as u8);
    }

    let documents = document_count(line);

    if COMPLETED.is_match(line) {
        return ProgressKind::Completed { documents };
    }

    match documents {
        Some(n) => ProgressKind::DocumentCount(n),
        None => ProgressKind::Other,
    }
}

fn document_count(line: &str) -> Option<u64> {
    DOCUMENTS
        .captures(line)
        .or_else(|| FRACTION.captures(line))
        .and_then(|c| c[1].parse().ok())
}

/// Per-item progress state kept by a worker while one tool runs.
#[derive(Debug)]
pub struct ProgressTracker {
    worker_id: usize,
    item: String,
    last_decile: u8,
    documents: Option<u64>,
    completed: bool,
}

impl ProgressTracker {
    pub fn new(worker_id: usize, item: impl Into<String>) -> Self {
        Self {
            worker_id,
            item: item.into(),
            last_decile: 0,
            documents: None,
            completed: false,
        }
    }

    /// Parse and log one output line. Returns the milestone newly crossed,
    /// if any (10, 20, ... 100).
    pub fn record(&mut self, line: &str) -> Option<u8> {
        let event = parse_line(line);
        match event.kind {
            ProgressKind::PercentMilestone(percent) => {
                let decile = percent / 10;
                if decile > self.last_decile {
                    self.last_decile = decile;
                    let milestone = decile * 10;
                    info!("[Worker {}] {}: {}%", self.worker_id, self.item, milestone);
                    return Some(milestone);
                }
            }
            ProgressKind::DocumentCount(n) => {
                self.documents = Some(n);
                debug!("[Worker {}] {}: {} documents", self.worker_id, self.item, n);
            }
            ProgressKind::Completed { documents } => {
                self.completed = true;
                if documents.is_some() {
                    self.documents = documents;
                }
                match self.documents {
                    Some(n) => info!(
                        "[Worker {}] {}: completed ({} documents)",
                        self.worker_id, self.item, n
                    ),
                    None => info!("[Worker {}] {}: completed", self.worker_id, self.item),
                }
            }
            ProgressKind::Other => {
                if !event.raw_line.trim().is_empty() {
                    debug!("[Worker {}] {}: {}", self.worker_id, self.item, event.raw_line);
                }
            }
        }
        None
    }

    /// Last document count seen.
    pub fn documents(&self) -> Option<u64> {
        self.documents
    }

    /// Whether the tool printed a completion marker.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_count() {
        assert_eq!(
            parse_line("2024-01-15T10:00:00.000+0000\t1500 documents restored").kind,
            ProgressKind::DocumentCount(1500)
        );
        assert_eq!(
            parse_line("42 document(s) restored successfully. 0 document(s) failed").kind,
            ProgressKind::DocumentCount(42)
        );
    }

    #[test]
    fn test_percent_milestone() {
        assert_eq!(
            parse_line("[########################]  shop.orders  200/200  (100.0%)").kind,
            ProgressKind::PercentMilestone(100)
        );
        assert_eq!(
            parse_line("[#######.................]  shop.orders  61/200  (30.5%)").kind,
            ProgressKind::PercentMilestone(30)
        );
        assert_eq!(parse_line("100%").kind, ProgressKind::PercentMilestone(100));
    }

    #[test]
    fn test_completion_markers() {
        assert_eq!(
            parse_line("2024-01-15T10:00:01.000+0000\tdone dumping shop.orders (200 documents)").kind,
            ProgressKind::Completed {
                documents: Some(200)
            }
        );
        assert_eq!(
            parse_line("finished restoring shop.orders (200 documents, 0 failures)").kind,
            ProgressKind::Completed {
                documents: Some(200)
            }
        );
        assert_eq!(
            parse_line("done").kind,
            ProgressKind::Completed { documents: None }
        );
    }

    #[test]
    fn test_unrelated_line_is_other() {
        let event = parse_line("2024-01-15T10:00:00.000+0000\twriting shop.orders to dump/shop/orders.bson");
        assert_eq!(event.kind, ProgressKind::Other);
        assert!(event.raw_line.contains("writing shop.orders"));
        assert_eq!(parse_line("").kind, ProgressKind::Other);
    }

    #[test]
    fn test_tracker_logs_once_per_decile() {
        let mut tracker = ProgressTracker::new(1, "orders");
        let milestones: Vec<u8> = ["(1.0%)", "(5.0%)", "(12.0%)", "(19.9%)", "(25.0%)", "(24.0%)", "(100.0%)"]
            .iter()
            .filter_map(|line| tracker.record(line))
            .collect();
        assert_eq!(milestones, vec![10, 20, 100]);
    }

    #[test]
    fn test_tracker_keeps_document_count() {
        let mut tracker = ProgressTracker::new(2, "users");
        tracker.record("10/50");
        assert_eq!(tracker.documents(), Some(10));
        assert!(!tracker.is_completed());
        tracker.record("done dumping shop.users (50 documents)");
        assert_eq!(tracker.documents(), Some(50));
        assert!(tracker.is_completed());
    }
}
