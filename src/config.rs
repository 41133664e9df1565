//! Tunables for the download engine.

use std::time::Duration;

/// Interval between straggler supervisor ticks.
pub const SPEED_CHECK_INTERVAL: Duration = Duration::from_secs(3);

/// Interval between speed sampler ticks.
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Below this mean throughput the whole link is slow and restarting
/// individual workers would just churn.
pub const MIN_MEAN_SPEED_FOR_RESTART: f64 = 100.0 * 1024.0;

/// A worker below this fraction of the mean throughput is a straggler.
pub const SLOW_WORKER_THRESHOLD: f64 = 0.3;

/// Cap on per-part worker restarts within one process.
pub const MAX_WORKER_RESTARTS: u32 = 5;

/// Sleep between retry attempts inside a single worker invocation.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// User-Agent sent on every request.
pub const USER_AGENT: &str = "Adam/1.0";

/// Fixed read buffer for streaming part bodies; also the bound on how
/// many bytes a worker can write past a pause or cancel.
pub const READ_BUFFER_SIZE: usize = 128 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct DownloadConfig {
    /// Number of parallel range workers for a fresh session.
    pub num_workers: usize,
    /// Retry attempts per worker invocation before giving up.
    pub max_retries: u32,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            num_workers: 8,
            max_retries: 3,
        }
    }
}
