//! Orchestration: session creation, worker lifecycle, joins and merge.
//!
//! The coordinator owns the session, the worker table and the error
//! slot; the supervisor borrows them through [`WorkerEnv`]. Nothing in
//! here is a module-level singleton.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::Client;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::{DownloadConfig, USER_AGENT};
use crate::error::{DownloadError, ErrorSlot, Result};
use crate::events::{EventBus, UiEvent};
use crate::merge::merge_parts;
use crate::pause::PauseGate;
use crate::probe;
use crate::progress::ProgressBus;
use crate::state::{DownloadState, Session};
use crate::store::{self, Library};
use crate::worker::{self, WorkerCtx};
use crate::{sampler, supervisor};

/// HTTP client shared by the probe and every worker.
pub fn build_client() -> Result<Client> {
    Ok(Client::builder().user_agent(USER_AGENT).build()?)
}

/// How a finished engine run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed,
    CancelledByUser,
}

struct WorkerHandle {
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

/// Live worker table plus replacement-safe accounting.
///
/// An entry exists exactly while its worker task is running: workers
/// discard their own handle on the way out, so the table doubles as the
/// per-part liveness record the supervisor consults. `reserve`/`release`
/// bracket every running worker *and* every in-flight replacement, so
/// [`WorkerSet::wait_idle`] can never observe a momentary zero while the
/// supervisor is swapping a straggler.
#[derive(Default)]
pub struct WorkerSet {
    entries: Mutex<HashMap<usize, WorkerHandle>>,
    active: AtomicUsize,
    idle: Notify,
}

impl WorkerSet {
    fn reserve(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
    }

    fn release(&self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn take(&self, id: usize) -> Option<WorkerHandle> {
        self.entries.lock().unwrap().remove(&id)
    }

    fn discard(&self, id: usize) {
        self.entries.lock().unwrap().remove(&id);
    }

    /// Whether a worker task is currently running for this part.
    ///
    /// False for parts that finished *and* for parts whose worker died
    /// for good (retries exhausted); neither is a straggler candidate.
    pub(crate) fn is_live(&self, id: usize) -> bool {
        self.entries.lock().unwrap().contains_key(&id)
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&self, id: usize, cancel: CancellationToken, join: JoinHandle<()>) {
        self.entries.lock().unwrap().insert(id, WorkerHandle { cancel, join });
    }

    /// Cancel every live worker (link expiry, user quit).
    pub fn cancel_all(&self) {
        for handle in self.entries.lock().unwrap().values() {
            handle.cancel.cancel();
        }
    }

    /// Wait until no workers (or replacements) are running.
    pub async fn wait_idle(&self) {
        loop {
            // Enable the waiter before checking, so a release landing in
            // between still wakes us.
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.active.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Shared context handed to workers and the supervisor.
pub struct WorkerEnv {
    pub client: Client,
    pub url: String,
    pub filename: String,
    pub work_dir: PathBuf,
    pub max_retries: u32,
    pub session: Arc<Session>,
    pub progress: Arc<ProgressBus>,
    pub pause: Arc<PauseGate>,
    pub events: EventBus,
    pub errors: ErrorSlot,
    pub workers: WorkerSet,
    pub user_cancel: CancellationToken,
}

/// Launch a worker for `part_id` with a fresh cancellation handle.
pub(crate) fn spawn_worker(env: &Arc<WorkerEnv>, part_id: usize) {
    let cancel = env.user_cancel.child_token();
    let ctx = WorkerCtx {
        client: env.client.clone(),
        url: env.url.clone(),
        part_id,
        part_file: store::part_path(&env.work_dir, &env.filename, part_id),
        session: env.session.clone(),
        progress: env.progress.clone(),
        pause: env.pause.clone(),
        cancel: cancel.clone(),
        max_retries: env.max_retries,
    };

    env.workers.reserve();
    let task_env = Arc::clone(env);
    // Hold the table lock across the spawn so the task's own removal on
    // exit can never run before its handle is inserted.
    let mut entries = env.workers.entries.lock().unwrap();
    let join = tokio::spawn(async move {
        let result = worker::run_part(&ctx).await;
        // This worker is no longer live, whatever happened; drop its
        // handle so the supervisor stops considering the part.
        task_env.workers.discard(part_id);
        match result {
            Ok(()) | Err(DownloadError::Cancelled) => {}
            Err(err) => {
                let link_expired = matches!(err, DownloadError::LinkExpired);
                task_env.errors.record(err);
                if link_expired {
                    // The link is dead for every part; stop the session.
                    task_env.workers.cancel_all();
                }
            }
        }
        task_env.workers.release();
    });
    entries.insert(part_id, WorkerHandle { cancel, join });
}

/// Cancel a straggler and start its replacement.
///
/// Returns the part's new restart count, or `None` when the worker had
/// already terminated on its own (nothing left to replace). Waits for
/// the cancelled worker to actually return before launching the new
/// one, so an in-flight write can never race the replacement on the
/// part file.
pub(crate) async fn replace_worker(env: &Arc<WorkerEnv>, part_id: usize) -> Option<u32> {
    let old = env.workers.take(part_id)?;

    env.workers.reserve();
    old.cancel.cancel();
    let _ = old.join.await;
    let restarts = env.session.bump_restarts(part_id);
    spawn_worker(env, part_id);
    env.workers.release();
    Some(restarts)
}

/// Probe the server and persist a fresh session.
///
/// A fresh `new` replaces any earlier attempt for the same filename.
/// Without range support the session gets a single part covering the
/// whole resource.
pub async fn create_session(
    client: &Client,
    config: &DownloadConfig,
    library: &Library,
    work_dir: &Path,
    url: String,
    filename: String,
) -> Result<DownloadState> {
    let stale_parts = match library.load(&filename).await {
        Ok(old) => old.parts.len(),
        Err(_) => config.num_workers,
    };
    library.cleanup(work_dir, &filename, stale_parts).await;

    let probed = probe::probe(client, &url).await?;
    let num_workers = if probed.supports_ranges {
        config.num_workers
    } else {
        info!("server does not support range requests, falling back to a single worker");
        1
    };

    let state = DownloadState::new(url, filename, probed.total_size, num_workers);
    library.save(&state).await?;
    Ok(state)
}

/// Drive a session to completion, cancellation or failure.
///
/// Registers ranges with the progress bus, runs sampler + supervisor +
/// one worker per incomplete part, joins everything, then merges and
/// moves the session into the complete library.
#[allow(clippy::too_many_arguments)]
pub async fn run_download(
    config: &DownloadConfig,
    state: DownloadState,
    library: &Library,
    work_dir: &Path,
    client: Client,
    progress: Arc<ProgressBus>,
    events: EventBus,
    pause: Arc<PauseGate>,
    user_cancel: CancellationToken,
) -> Result<DownloadOutcome> {
    let filename = state.filename.clone();
    let url = state.url.clone();
    let total_size = state.total_size;
    let num_parts = state.parts.len();
    let session = Arc::new(Session::new(state));

    // Register every range up front so aggregates count the parts that
    // finished in a previous run.
    for part in session.parts() {
        progress.register(part.id, part.start, part.end);
        let received = if part.is_complete {
            part.size()
        } else {
            part.current_offset
        };
        if received > 0 {
            progress.update(part.id, received);
        }
    }

    let env = Arc::new(WorkerEnv {
        client,
        url,
        filename: filename.clone(),
        work_dir: work_dir.to_path_buf(),
        max_retries: config.max_retries,
        session: session.clone(),
        progress: progress.clone(),
        pause,
        events: events.clone(),
        errors: ErrorSlot::new(),
        workers: WorkerSet::default(),
        user_cancel: user_cancel.clone(),
    });

    let done = CancellationToken::new();
    let sampler_task = tokio::spawn(sampler::run(
        session.clone(),
        progress,
        library.clone(),
        events.clone(),
        done.clone(),
    ));
    let supervisor_task = tokio::spawn(supervisor::run(env.clone(), done.clone()));

    for part in session.parts() {
        if !part.is_complete {
            spawn_worker(&env, part.id);
        }
    }

    env.workers.wait_idle().await;
    done.cancel();
    // A tick already in flight may still swap in one last replacement;
    // join the supervisor first, then drain whatever it started.
    let _ = supervisor_task.await;
    env.workers.wait_idle().await;
    let _ = sampler_task.await;

    library.save(&session.snapshot()).await?;

    if let Some(err) = env.errors.take() {
        events.publish(UiEvent::Error(err.to_string()));
        return Err(err);
    }

    if user_cancel.is_cancelled() {
        debug!("download stopped by user");
        return Ok(DownloadOutcome::CancelledByUser);
    }

    if let Err(err) = merge_parts(work_dir, &filename, num_parts, total_size).await {
        events.publish(UiEvent::Error(format!("merge failed: {err}")));
        return Err(err);
    }

    library.move_to_complete(&filename).await?;
    store::remove_part_files(work_dir, &filename, num_parts).await;
    events.publish(UiEvent::Done);
    Ok(DownloadOutcome::Completed)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn liveness_follows_the_entries_table() {
        let set = WorkerSet::default();
        let cancel = CancellationToken::new();
        let waiter = cancel.clone();
        let join = tokio::spawn(async move { waiter.cancelled().await });
        set.insert_for_test(0, cancel.clone(), join);

        assert!(set.is_live(0));
        assert!(!set.is_live(1));

        // A worker dropping its own handle on exit goes dark.
        set.discard(0);
        assert!(!set.is_live(0));
        cancel.cancel();
    }

    #[tokio::test]
    async fn wait_idle_returns_only_when_all_workers_released() {
        let set = Arc::new(WorkerSet::default());
        set.reserve();
        set.reserve();

        let waiter = {
            let set = set.clone();
            tokio::spawn(async move { set.wait_idle().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        set.release();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        set.release();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("final release should wake the waiter")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_idle_with_no_workers_is_immediate() {
        let set = WorkerSet::default();
        timeout(Duration::from_millis(50), set.wait_idle())
            .await
            .expect("no workers means no wait");
    }
}
