//! Engine metrics
//!
//! Counters for construction events and timings of synchronous
//! construction pipelines. One collector lives in each [`Registry`] and is
//! shared by its namespaces, collections and types.
//!
//! [`Registry`]: crate::Registry

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Counter names recorded by the engine
pub mod counters {
    pub const CONSTRUCTIONS: &str = "constructions";
    pub const ASYNC_CONSTRUCTIONS: &str = "async_constructions";
    pub const FAILED_CONSTRUCTIONS: &str = "failed_constructions";
    pub const FORKS: &str = "forks";
    pub const CLONES: &str = "clones";
    pub const HOOK_INVOCATIONS: &str = "hook_invocations";
    pub const FLOW_CHECKS: &str = "flow_checks";
    pub const DEFINITIONS: &str = "definitions";
}

/// Timing names recorded by the engine
pub mod timings {
    pub const CONSTRUCTION: &str = "construction";
}

pub struct EngineMetrics {
    timings: RwLock<HashMap<String, Vec<Duration>>>,
    counters: RwLock<HashMap<String, u64>>,
    start_time: Instant,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            timings: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record_timing(&self, name: impl Into<String>, duration: Duration) {
        let mut timings = self.timings.write();
        timings.entry(name.into()).or_default().push(duration);
    }

    pub fn increment(&self, name: impl Into<String>) {
        self.add(name, 1);
    }

    pub fn add(&self, name: impl Into<String>, value: u64) {
        if value == 0 {
            return;
        }
        let mut counters = self.counters.write();
        *counters.entry(name.into()).or_default() += value;
    }

    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    pub fn get_timing_stats(&self, name: &str) -> Option<TimingStats> {
        let timings = self.timings.read();
        timings.get(name).map(|durations| TimingStats::from_durations(durations))
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn reset(&self) {
        self.timings.write().clear();
        self.counters.write().clear();
    }

    pub fn summary(&self) -> MetricsSummary {
        let timings = self.timings.read();
        let counters = self.counters.read();

        MetricsSummary {
            uptime: self.uptime(),
            timings: timings
                .iter()
                .map(|(name, durations)| (name.clone(), TimingStats::from_durations(durations)))
                .collect(),
            counters: counters.clone(),
        }
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineMetrics")
            .field("counters", &*self.counters.read())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TimingStats {
    pub count: usize,
    pub total: Duration,
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub p50: Duration,
    pub p95: Duration,
}

impl TimingStats {
    fn from_durations(durations: &[Duration]) -> Self {
        if durations.is_empty() {
            return Self {
                count: 0,
                total: Duration::ZERO,
                mean: Duration::ZERO,
                min: Duration::ZERO,
                max: Duration::ZERO,
                p50: Duration::ZERO,
                p95: Duration::ZERO,
            };
        }

        let mut sorted = durations.to_vec();
        sorted.sort();

        let count = sorted.len();
        let total: Duration = sorted.iter().sum();
        let percentile = |p: f64| {
            let idx = ((count as f64 * p) as usize).min(count - 1);
            sorted[idx]
        };

        Self {
            count,
            total,
            mean: total / count as u32,
            min: sorted[0],
            max: sorted[count - 1],
            p50: percentile(0.50),
            p95: percentile(0.95),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime: Duration,
    pub timings: HashMap<String, TimingStats>,
    pub counters: HashMap<String, u64>,
}

impl MetricsSummary {
    pub fn report(&self) -> String {
        let mut lines = vec![
            format!("Uptime: {:.2?}", self.uptime),
            String::new(),
            "=== Timings ===".to_string(),
        ];

        let mut timing_names: Vec<_> = self.timings.keys().collect();
        timing_names.sort();
        for name in timing_names {
            let stats = &self.timings[name];
            lines.push(format!("{}:", name));
            lines.push(format!("  count: {}", stats.count));
            lines.push(format!("  mean:  {:.2?}", stats.mean));
            lines.push(format!("  max:   {:.2?}", stats.max));
            lines.push(format!("  p95:   {:.2?}", stats.p95));
        }

        lines.push(String::new());
        lines.push("=== Counters ===".to_string());

        let mut counter_names: Vec<_> = self.counters.keys().collect();
        counter_names.sort();
        for name in counter_names {
            lines.push(format!("{}: {}", name, self.counters[name]));
        }

        lines.join("\n")
    }
}

/// Records the elapsed time under `name` when dropped
pub struct Timer<'a> {
    metrics: &'a EngineMetrics,
    name: &'static str,
    start: Instant,
}

impl<'a> Timer<'a> {
    pub fn new(metrics: &'a EngineMetrics, name: &'static str) -> Self {
        Self {
            metrics,
            name,
            start: Instant::now(),
        }
    }
}

impl Drop for Timer<'_> {
    fn drop(&mut self) {
        self.metrics.record_timing(self.name, self.start.elapsed());
    }
}
