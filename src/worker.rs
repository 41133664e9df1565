//! Part worker: fetches one byte range into a resumable temp file.
//!
//! Each invocation inspects the temp file against the part's persisted
//! `current_offset` and decides between appending from where it left off
//! and starting the part over. Two workers never share a part; the
//! supervisor waits for a cancelled worker to return before launching
//! its replacement, so writes to a part file are totally ordered.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::TryStreamExt;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{READ_BUFFER_SIZE, RETRY_BACKOFF};
use crate::error::{DownloadError, Result};
use crate::pause::PauseGate;
use crate::progress::ProgressBus;
use crate::state::{Part, Session};

/// Everything one worker needs, owned by the coordinator and shared in.
#[derive(Clone)]
pub struct WorkerCtx {
    pub client: Client,
    pub url: String,
    pub part_id: usize,
    pub part_file: PathBuf,
    pub session: Arc<Session>,
    pub progress: Arc<ProgressBus>,
    pub pause: Arc<PauseGate>,
    pub cancel: CancellationToken,
    pub max_retries: u32,
}

/// Fetch the part, retrying transient failures with a 1 s backoff.
///
/// Cancellation and link expiry short-circuit; exhausting the retry
/// budget returns [`DownloadError::RetryExhausted`].
pub async fn run_part(ctx: &WorkerCtx) -> Result<()> {
    for attempt in 1..=ctx.max_retries {
        match fetch_part(ctx).await {
            Ok(()) => return Ok(()),
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) => {
                warn!(part = ctx.part_id, attempt, %err, "part fetch failed");
                if attempt < ctx.max_retries {
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }
        }
    }

    Err(DownloadError::RetryExhausted {
        part: ctx.part_id,
        attempts: ctx.max_retries,
    })
}

/// How to open the temp file for this attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    /// Start the part over from byte zero.
    Truncate,
    /// Continue from `current_offset`.
    Append,
}

/// Single fetch attempt.
async fn fetch_part(ctx: &WorkerCtx) -> Result<()> {
    let part = ctx.session.part(ctx.part_id);

    // Fully fetched in an earlier run; nothing to request.
    if part.current_offset >= part.size() {
        ctx.session.mark_complete(ctx.part_id);
        ctx.progress.update(ctx.part_id, part.current_offset);
        return Ok(());
    }

    let (mode, http_start) = resolve_mode(&ctx.part_file, &part).await;
    if mode == OpenMode::Truncate && part.current_offset > 0 {
        debug!(part = ctx.part_id, "temp file out of step, restarting part");
        ctx.session.reset_offset(ctx.part_id);
        ctx.progress.update(ctx.part_id, 0);
    }
    let part = ctx.session.part(ctx.part_id);

    let resp = ctx
        .client
        .get(&ctx.url)
        .header(RANGE, format!("bytes={}-{}", http_start, part.end))
        .send()
        .await?;

    match resp.status() {
        StatusCode::FORBIDDEN => return Err(DownloadError::LinkExpired),
        StatusCode::PARTIAL_CONTENT => {}
        // A 200 means the server ignored the range header; the body is
        // the whole resource, only usable when we asked from the top.
        StatusCode::OK if http_start == part.start => {}
        status => return Err(DownloadError::UnexpectedStatus(status)),
    }

    let mut file = match mode {
        OpenMode::Truncate => {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&ctx.part_file)
                .await?
        }
        OpenMode::Append => {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&ctx.part_file)
                .await?
        }
    };

    // Read through a fixed buffer so no single write exceeds 128 KiB;
    // that bounds how far a worker can run past a pause or cancel.
    let mut body = StreamReader::new(resp.bytes_stream().map_err(std::io::Error::other));
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        if ctx.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        ctx.pause.wait_while_paused(&ctx.cancel).await?;

        let n = tokio::select! {
            () = ctx.cancel.cancelled() => return Err(DownloadError::Cancelled),
            n = body.read(&mut buf) => n?,
        };
        if n == 0 {
            break;
        }

        file.write_all(&buf[..n]).await?;
        let offset = ctx.session.advance(ctx.part_id, n as u64);
        ctx.progress.update(ctx.part_id, offset);
    }

    file.flush().await?;
    ctx.session.mark_complete(ctx.part_id);
    Ok(())
}

/// Reconcile the temp file with the persisted offset.
///
/// Returns the open mode and the absolute byte to request from:
/// - temp missing or shorter than `current_offset`: the checkpoint is
///   ahead of the disk, restart the part;
/// - temp longer: a crash landed bytes past the checkpoint, truncate
///   the excess and append (restart if truncation fails);
/// - temp matches: append.
async fn resolve_mode(path: &Path, part: &Part) -> (OpenMode, u64) {
    if part.current_offset == 0 {
        return (OpenMode::Truncate, part.start);
    }

    let Ok(meta) = tokio::fs::metadata(path).await else {
        return (OpenMode::Truncate, part.start);
    };

    let size = meta.len();
    if size < part.current_offset {
        return (OpenMode::Truncate, part.start);
    }

    if size > part.current_offset && truncate_to(path, part.current_offset).await.is_err() {
        return (OpenMode::Truncate, part.start);
    }

    (OpenMode::Append, part.start + part.current_offset)
}

async fn truncate_to(path: &Path, len: u64) -> std::io::Result<()> {
    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(len).await
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn part_with_offset(current_offset: u64) -> Part {
        Part {
            id: 0,
            start: 1000,
            end: 1999,
            current_offset,
            is_complete: false,
            restarts: 0,
            last_bytes_sample: 0,
        }
    }

    #[tokio::test]
    async fn fresh_part_truncates_and_requests_full_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.part_0.tmp");

        let (mode, http_start) = resolve_mode(&path, &part_with_offset(0)).await;
        assert_eq!(mode, OpenMode::Truncate);
        assert_eq!(http_start, 1000);
    }

    #[tokio::test]
    async fn missing_temp_with_progress_restarts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.part_0.tmp");

        let (mode, http_start) = resolve_mode(&path, &part_with_offset(100)).await;
        assert_eq!(mode, OpenMode::Truncate);
        assert_eq!(http_start, 1000);
    }

    #[tokio::test]
    async fn matching_temp_appends_from_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.part_0.tmp");
        tokio::fs::write(&path, vec![0u8; 100]).await.unwrap();

        let (mode, http_start) = resolve_mode(&path, &part_with_offset(100)).await;
        assert_eq!(mode, OpenMode::Append);
        assert_eq!(http_start, 1100);
    }

    #[tokio::test]
    async fn short_temp_restarts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.part_0.tmp");
        tokio::fs::write(&path, vec![0u8; 40]).await.unwrap();

        let (mode, http_start) = resolve_mode(&path, &part_with_offset(100)).await;
        assert_eq!(mode, OpenMode::Truncate);
        assert_eq!(http_start, 1000);
    }

    #[tokio::test]
    async fn oversized_temp_is_truncated_then_appended() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f.part_0.tmp");
        tokio::fs::write(&path, vec![0u8; 160]).await.unwrap();

        let (mode, http_start) = resolve_mode(&path, &part_with_offset(100)).await;
        assert_eq!(mode, OpenMode::Append);
        assert_eq!(http_start, 1100);

        let len = tokio::fs::metadata(&path).await.unwrap().len();
        assert_eq!(len, 100);
    }
}
