//! Resource usage samples.
//!
//! Samples are appended in arrival order and tail-trimmed, unlike the
//! most-recent-first logs.

use chrono::Utc;

use super::engine::Store;
use super::retention::trim_tail;
use super::types::{new_id, PerformanceSample};

/// A measurement about to be recorded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewSample {
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub tps: Option<f64>,
    pub player_count: u32,
}

impl Store {
    pub fn add_performance_sample(&self, sample: NewSample) -> PerformanceSample {
        let entry = PerformanceSample {
            id: new_id(),
            cpu_percent: sample.cpu_percent,
            memory_mb: sample.memory_mb,
            tps: sample.tps,
            player_count: sample.player_count,
            created_at: Utc::now(),
        };

        let cap = self.config().retention.performance;
        self.update(|doc| {
            doc.performance.push(entry.clone());
            trim_tail(&mut doc.performance, cap);
        });
        entry
    }

    /// The newest `limit` samples (all if `None`), oldest first.
    pub fn performance_samples(&self, limit: Option<usize>) -> Vec<PerformanceSample> {
        self.read(|doc| {
            let skip = limit.map_or(0, |limit| doc.performance.len().saturating_sub(limit));
            doc.performance[skip..].to_vec()
        })
    }
}
