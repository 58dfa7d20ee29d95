//! Per-path request counters for the stats endpoint.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::RwLock;

/// Statistics for one API path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PathStats {
    pub total_requests: u64,
    pub rpm: f64,
}

/// Request counters for the lifetime of the process. One instance is
/// created at startup and shared through the router state.
pub struct RequestTracker {
    started_at: Instant,
    counts: RwLock<HashMap<String, u64>>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            counts: RwLock::new(HashMap::new()),
        }
    }

    /// Count one request against `path`.
    pub async fn record(&self, path: &str) {
        let mut counts = self.counts.write().await;
        *counts.entry(path.to_string()).or_insert(0) += 1;
    }

    /// Snapshot of every path seen so far, sorted by path.
    pub async fn stats(&self) -> BTreeMap<String, PathStats> {
        let elapsed_secs = self.started_at.elapsed().as_secs_f64();
        let counts = self.counts.read().await;
        counts
            .iter()
            .map(|(path, &count)| {
                (
                    path.clone(),
                    PathStats {
                        total_requests: count,
                        rpm: rate_per_minute(count, elapsed_secs),
                    },
                )
            })
            .collect()
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests per minute, rounded to two decimals. Elapsed time is floored
/// at one minute so a fresh process does not report inflated rates.
fn rate_per_minute(count: u64, elapsed_secs: f64) -> f64 {
    let minutes = (elapsed_secs / 60.0).max(1.0);
    round2(count as f64 / minutes)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
