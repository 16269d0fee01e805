//! Chain execution metrics
//!
//! Metric names are stable; labels carry the graph id and outcome.

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Chains executed, labelled by graph and outcome
pub const CHAINS_EXECUTED: &str = "trellis_chains_executed_total";
/// Chain wall time in seconds
pub const CHAIN_DURATION: &str = "trellis_chain_duration_seconds";
/// Result items streamed to chunked consumers
pub const ITEMS_STREAMED: &str = "trellis_items_streamed_total";

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

/// Graph service metrics
pub struct GraphMetrics;

impl GraphMetrics {
    /// Record one finished chain
    pub fn record_chain(graph_id: &str, operations: usize, duration: Duration, success: bool) {
        counter!(
            CHAINS_EXECUTED,
            1,
            "graph_id" => graph_id.to_string(),
            "outcome" => outcome(success)
        );
        histogram!(
            CHAIN_DURATION,
            duration.as_secs_f64(),
            "graph_id" => graph_id.to_string(),
            "operations" => operations.to_string()
        );
    }

    /// Record items sent through a chunked response
    pub fn record_streamed(graph_id: &str, items: u64) {
        counter!(ITEMS_STREAMED, items, "graph_id" => graph_id.to_string());
    }
}

/// Times one chain and records it when finished
#[derive(Debug)]
pub struct ChainTimer {
    graph_id: String,
    operations: usize,
    started: Instant,
}

impl ChainTimer {
    /// Start timing a chain
    pub fn start(graph_id: impl Into<String>, operations: usize) -> Self {
        Self {
            graph_id: graph_id.into(),
            operations,
            started: Instant::now(),
        }
    }

    /// Record the chain outcome and return its duration
    pub fn finish(self, success: bool) -> Duration {
        let elapsed = self.started.elapsed();
        GraphMetrics::record_chain(&self.graph_id, self.operations, elapsed, success);
        elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_without_recorder() {
        let timer = ChainTimer::start("graph", 3);
        std::thread::sleep(Duration::from_millis(2));
        assert!(timer.finish(true) >= Duration::from_millis(2));
        GraphMetrics::record_streamed("graph", 10);
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome(true), "success");
        assert_eq!(outcome(false), "failure");
    }
}
