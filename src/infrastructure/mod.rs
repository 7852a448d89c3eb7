//! Ambient support: logging setup and engine metrics

pub mod logging;
pub mod metrics;

pub use logging::{init_dev_logging, init_file_logging, init_logging, LogConfig, LogFormat, LogOutput};
pub use metrics::{EngineMetrics, MetricsSummary, TimingStats, Timer};
