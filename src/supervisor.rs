//! Straggler supervisor: measures per-worker throughput and replaces
//! workers that fall persistently behind the pack.
//!
//! The multiplicative threshold is scale-free; the absolute floor keeps
//! a uniformly slow link from triggering pointless churn; the restart
//! cap bounds worst-case task pressure. Only parts with a live worker
//! count as active: a part whose worker already terminated (retries
//! exhausted, or finished racing the sample) is never a straggler
//! candidate and never dilutes the mean.

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{
    MAX_WORKER_RESTARTS, MIN_MEAN_SPEED_FOR_RESTART, SLOW_WORKER_THRESHOLD, SPEED_CHECK_INTERVAL,
};
use crate::coordinator::{replace_worker, WorkerEnv};
use crate::events::UiEvent;
use crate::state::SpeedSample;

/// Runs until the done token fires.
pub async fn run(env: Arc<WorkerEnv>, done: CancellationToken) {
    let mut ticker = interval(SPEED_CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            () = done.cancelled() => return,
            _ = ticker.tick() => {}
        }
        check_and_restart(&env).await;
    }
}

/// Result of applying the restart policy to one window of samples.
struct SpeedCheck {
    mean: f64,
    threshold: f64,
    stragglers: Vec<SpeedSample>,
}

/// Floor, threshold and restart-cap policy over the live parts' speeds.
fn evaluate_speeds(samples: &[SpeedSample]) -> Option<SpeedCheck> {
    if samples.is_empty() {
        return None;
    }

    let mean =
        samples.iter().map(|s| s.bytes_per_sec).sum::<f64>() / samples.len() as f64;

    // A slow mean blames the network, not individual workers.
    if mean < MIN_MEAN_SPEED_FOR_RESTART {
        return None;
    }

    let threshold = mean * SLOW_WORKER_THRESHOLD;
    let stragglers = samples
        .iter()
        .filter(|s| s.bytes_per_sec < threshold && s.restarts < MAX_WORKER_RESTARTS)
        .copied()
        .collect();

    Some(SpeedCheck {
        mean,
        threshold,
        stragglers,
    })
}

/// One supervision pass over the active parts.
async fn check_and_restart(env: &Arc<WorkerEnv>) {
    // Only parts whose worker is still running are candidates; a dead
    // worker (fatal failure) must not be resurrected here, and its zero
    // speed must not drag the mean down.
    let samples: Vec<SpeedSample> = env
        .session
        .take_speed_samples(SPEED_CHECK_INTERVAL.as_secs_f64())
        .into_iter()
        .filter(|s| env.workers.is_live(s.part_id))
        .collect();

    let Some(check) = evaluate_speeds(&samples) else {
        return;
    };

    env.events.publish(UiEvent::Debug(format!(
        "Speed check: mean={:.1} KB/s, threshold={:.1} KB/s",
        check.mean / 1024.0,
        check.threshold / 1024.0
    )));

    for sample in check.stragglers {
        // The part may have finished between sampling and now.
        if env.session.part(sample.part_id).is_complete {
            continue;
        }

        // None means the worker terminated on its own since the sample;
        // leave it to the coordinator's error accounting.
        let Some(restarts) = replace_worker(env, sample.part_id).await else {
            continue;
        };
        debug!(
            part = sample.part_id,
            speed = sample.bytes_per_sec,
            threshold = check.threshold,
            restarts,
            "replaced straggler"
        );
        env.events.publish(UiEvent::Debug(format!(
            "Restarting worker {} ({:.1} KB/s < {:.1} KB/s) [restart {}/{}]",
            sample.part_id,
            sample.bytes_per_sec / 1024.0,
            check.threshold / 1024.0,
            restarts,
            MAX_WORKER_RESTARTS
        )));
    }
}
