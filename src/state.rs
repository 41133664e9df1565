//! Persistent download state and the shared session handle.
//!
//! [`DownloadState`] is what gets serialized to the session library for
//! crash recovery; [`Session`] wraps it in a reader-writer lock so the
//! workers, sampler and supervisor can share it without module-level
//! globals. `save` serializes under the read lock, which is what makes
//! every checkpoint a consistent snapshot.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// A contiguous byte range of the remote resource owned by one worker.
///
/// `start` and `end` are inclusive absolute offsets. `current_offset` is
/// relative to `start`: the number of bytes already written to the part's
/// temp file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Part {
    pub id: usize,
    pub start: u64,
    pub end: u64,
    #[serde(default)]
    pub current_offset: u64,
    #[serde(default)]
    pub is_complete: bool,
    /// Times the supervisor has replaced this part's worker. Reset each process.
    #[serde(skip)]
    pub restarts: u32,
    /// `current_offset` as of the last supervisor tick.
    #[serde(skip)]
    pub last_bytes_sample: u64,
}

impl Part {
    /// Total bytes covered by this part.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// The durable record of one download attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadState {
    pub url: String,
    pub filename: String,
    pub total_size: u64,
    pub parts: Vec<Part>,
}

impl DownloadState {
    #[must_use]
    pub fn new(url: String, filename: String, total_size: u64, num_workers: usize) -> Self {
        Self {
            url,
            filename,
            total_size,
            parts: partition(total_size, num_workers),
        }
    }

    /// Bytes downloaded across all parts.
    #[must_use]
    pub fn total_received(&self) -> u64 {
        self.parts.iter().map(|p| p.current_offset).sum()
    }

    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        if self.total_size == 0 {
            return 100.0;
        }
        self.total_received() as f64 / self.total_size as f64 * 100.0
    }
}

/// Splits `[0, total_size)` into `num_workers` contiguous ranges.
///
/// Equal quotient per part; the remainder is absorbed into the last part.
#[must_use]
pub fn partition(total_size: u64, num_workers: usize) -> Vec<Part> {
    if total_size == 0 || num_workers == 0 {
        return Vec::new();
    }

    let n = (num_workers as u64).min(total_size);
    let chunk_size = total_size / n;

    (0..n as usize)
        .map(|i| {
            let start = i as u64 * chunk_size;
            let end = if i as u64 == n - 1 {
                total_size - 1
            } else {
                start + chunk_size - 1
            };
            Part {
                id: i,
                start,
                end,
                current_offset: 0,
                is_complete: false,
                restarts: 0,
                last_bytes_sample: 0,
            }
        })
        .collect()
}

/// A per-part throughput sample taken by the supervisor.
#[derive(Debug, Clone, Copy)]
pub struct SpeedSample {
    pub part_id: usize,
    pub bytes_per_sec: f64,
    pub restarts: u32,
}

/// Shared, lock-guarded session state.
#[derive(Debug)]
pub struct Session {
    inner: RwLock<DownloadState>,
}

impl Session {
    #[must_use]
    pub fn new(state: DownloadState) -> Self {
        Self {
            inner: RwLock::new(state),
        }
    }

    /// Consistent copy of the whole state, for serialization.
    #[must_use]
    pub fn snapshot(&self) -> DownloadState {
        self.inner.read().unwrap().clone()
    }

    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.inner.read().unwrap().total_size
    }

    #[must_use]
    pub fn part(&self, id: usize) -> Part {
        self.inner.read().unwrap().parts[id]
    }

    #[must_use]
    pub fn parts(&self) -> Vec<Part> {
        self.inner.read().unwrap().parts.clone()
    }

    /// Advance a part's offset by `n` freshly written bytes.
    ///
    /// Returns the new offset. Only the part's current worker calls this.
    pub fn advance(&self, id: usize, n: u64) -> u64 {
        let mut state = self.inner.write().unwrap();
        let part = &mut state.parts[id];
        part.current_offset += n;
        part.current_offset
    }

    /// Reset a part's progress before a from-scratch refetch.
    pub fn reset_offset(&self, id: usize) {
        let mut state = self.inner.write().unwrap();
        state.parts[id].current_offset = 0;
    }

    pub fn mark_complete(&self, id: usize) {
        let mut state = self.inner.write().unwrap();
        state.parts[id].is_complete = true;
    }

    pub fn bump_restarts(&self, id: usize) -> u32 {
        let mut state = self.inner.write().unwrap();
        let part = &mut state.parts[id];
        part.restarts += 1;
        part.restarts
    }

    /// Per-part throughput since the previous call, for non-complete parts.
    ///
    /// Refreshes each part's `last_bytes_sample` in the same pass so
    /// consecutive calls measure disjoint windows.
    pub fn take_speed_samples(&self, window_secs: f64) -> Vec<SpeedSample> {
        let mut state = self.inner.write().unwrap();
        state
            .parts
            .iter_mut()
            .filter(|p| !p.is_complete)
            .map(|p| {
                let delta = p.current_offset.saturating_sub(p.last_bytes_sample);
                p.last_bytes_sample = p.current_offset;
                SpeedSample {
                    part_id: p.id,
                    bytes_per_sec: delta as f64 / window_secs,
                    restarts: p.restarts,
                }
            })
            .collect()
    }
}
