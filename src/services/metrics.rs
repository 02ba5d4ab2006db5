//! In-memory dispatch outcome metrics.
//!
//! One bounded ring buffer per (transport kind, agent slug) series. The series
//! map is only write-locked to add a new series; samples go through the
//! series' own lock.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::domain::models::TransportKind;

type SeriesKey = (TransportKind, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sample {
    success: bool,
    duration_ms: u64,
    status_code: Option<u16>,
}

/// Aggregate view of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Transport of the series.
    pub transport_kind: TransportKind,
    /// Agent of the series.
    pub agent_slug: String,
    /// Samples retained.
    pub count: usize,
    /// Successful samples.
    pub successes: usize,
    /// Failed samples.
    pub failures: usize,
    /// `successes / count`.
    pub success_rate: f64,
    /// Mean duration.
    pub avg_ms: f64,
    /// Median duration.
    pub p50_ms: u64,
    /// 95th percentile duration.
    pub p95_ms: u64,
    /// Longest duration.
    pub max_ms: u64,
    /// HTTP status of the newest sample.
    pub last_status_code: Option<u16>,
}

/// Bounded per-series record of dispatch outcomes.
pub struct MetricsRecorder {
    capacity: usize,
    series: RwLock<HashMap<SeriesKey, Arc<Mutex<VecDeque<Sample>>>>>,
}

impl MetricsRecorder {
    /// Recorder keeping at most `capacity` samples per series.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Samples kept per series.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample, evicting the oldest when the series is full.
    pub async fn record(
        &self,
        kind: TransportKind,
        agent_slug: &str,
        success: bool,
        duration_ms: u64,
        status_code: Option<u16>,
    ) {
        let key = (kind, agent_slug.to_string());
        let ring = {
            let existing = self.series.read().await.get(&key).cloned();
            match existing {
                Some(ring) => ring,
                None => self
                    .series
                    .write()
                    .await
                    .entry(key)
                    .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(self.capacity))))
                    .clone(),
            }
        };

        let mut samples = ring.lock().await;
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(Sample {
            success,
            duration_ms,
            status_code,
        });
    }

    /// Snapshot of one series, `None` when it has no samples.
    pub async fn snapshot(&self, kind: TransportKind, agent_slug: &str) -> Option<MetricsSnapshot> {
        let ring = self
            .series
            .read()
            .await
            .get(&(kind, agent_slug.to_string()))
            .cloned()?;
        let samples = ring.lock().await;
        summarize(kind, agent_slug, &samples)
    }

    /// Snapshots of every series, ordered by agent slug then transport kind.
    pub async fn snapshots(&self) -> Vec<MetricsSnapshot> {
        let series: Vec<_> = self
            .series
            .read()
            .await
            .iter()
            .map(|(key, ring)| (key.clone(), ring.clone()))
            .collect();

        let mut snapshots = Vec::with_capacity(series.len());
        for ((kind, slug), ring) in series {
            let samples = ring.lock().await;
            if let Some(snapshot) = summarize(kind, &slug, &samples) {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_by(|a, b| {
            a.agent_slug
                .cmp(&b.agent_slug)
                .then_with(|| a.transport_kind.as_str().cmp(b.transport_kind.as_str()))
        });
        snapshots
    }

    /// Drop every series.
    pub async fn reset(&self) {
        self.series.write().await.clear();
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new(256)
    }
}

fn summarize(
    kind: TransportKind,
    agent_slug: &str,
    samples: &VecDeque<Sample>,
) -> Option<MetricsSnapshot> {
    if samples.is_empty() {
        return None;
    }
    let count = samples.len();
    let successes = samples.iter().filter(|s| s.success).count();

    let mut durations: Vec<u64> = samples.iter().map(|s| s.duration_ms).collect();
    durations.sort_unstable();
    let total: u64 = durations.iter().sum();

    Some(MetricsSnapshot {
        transport_kind: kind,
        agent_slug: agent_slug.to_string(),
        count,
        successes,
        failures: count - successes,
        success_rate: successes as f64 / count as f64,
        avg_ms: total as f64 / count as f64,
        p50_ms: percentile(&durations, 50),
        p95_ms: percentile(&durations, 95),
        max_ms: durations.last().copied().unwrap_or(0),
        last_status_code: samples.back().and_then(|s| s.status_code),
    })
}

/// Nearest-rank percentile over sorted values.
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (pct * sorted.len()).div_ceil(100).max(1);
    sorted[rank.min(sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_snapshot_aggregates() {
        let metrics = MetricsRecorder::new(16);
        for (ok, ms, status) in [(true, 10, Some(200)), (false, 30, Some(503)), (true, 20, Some(200))] {
            metrics.record(TransportKind::Api, "weather", ok, ms, status).await;
        }

        let snap = metrics.snapshot(TransportKind::Api, "weather").await.unwrap();
        assert_eq!(snap.count, 3);
        assert_eq!(snap.successes, 2);
        assert_eq!(snap.failures, 1);
        assert!((snap.success_rate - 2.0 / 3.0).abs() < f64::EPSILON);
        assert!((snap.avg_ms - 20.0).abs() < f64::EPSILON);
        assert_eq!(snap.p50_ms, 20);
        assert_eq!(snap.p95_ms, 30);
        assert_eq!(snap.max_ms, 30);
        assert_eq!(snap.last_status_code, Some(200));
    }

    #[tokio::test]
    async fn test_ring_is_bounded() {
        let metrics = MetricsRecorder::new(3);
        for ms in 1..=5 {
            metrics.record(TransportKind::Llm, "writer", true, ms, None).await;
        }
        let snap = metrics.snapshot(TransportKind::Llm, "writer").await.unwrap();
        assert_eq!(snap.count, 3);
        assert_eq!(snap.p50_ms, 4);
        assert_eq!(snap.max_ms, 5);
    }

    #[tokio::test]
    async fn test_series_are_keyed_by_kind_and_slug() {
        let metrics = MetricsRecorder::default();
        metrics.record(TransportKind::Api, "a", true, 1, None).await;
        metrics.record(TransportKind::External, "a", false, 1, None).await;
        metrics.record(TransportKind::Api, "b", true, 1, None).await;

        let all = metrics.snapshots().await;
        let keys: Vec<_> = all.iter().map(|s| (s.agent_slug.as_str(), s.transport_kind)).collect();
        assert_eq!(
            keys,
            vec![("a", TransportKind::Api), ("a", TransportKind::External), ("b", TransportKind::Api)]
        );
        assert!(metrics.snapshot(TransportKind::Llm, "a").await.is_none());
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&values, 50), 50);
        assert_eq!(percentile(&values, 95), 95);
        assert_eq!(percentile(&[7], 95), 7);
    }
}
