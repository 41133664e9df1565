//! Speed sampler: periodic state checkpoints plus throughput/ETA events.

use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::SAMPLE_INTERVAL;
use crate::events::{EventBus, UiEvent};
use crate::progress::ProgressBus;
use crate::state::Session;
use crate::store::Library;

/// Runs until the download completes or the done token fires.
///
/// Every tick checkpoints the session, then derives the instantaneous
/// speed from the progress-bus delta (the 500 ms window doubles to a
/// per-second rate) and publishes it with the remaining-time estimate.
pub async fn run(
    session: Arc<Session>,
    progress: Arc<ProgressBus>,
    library: Library,
    events: EventBus,
    done: CancellationToken,
) {
    let total_size = session.total_size();

    let mut ticker = interval(SAMPLE_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    let mut last_total = progress.total_received();

    loop {
        tokio::select! {
            () = done.cancelled() => return,
            _ = ticker.tick() => {}
        }

        if let Err(err) = library.save(&session.snapshot()).await {
            warn!(%err, "state checkpoint failed");
        }

        let total = progress.total_received();
        let speed = total.saturating_sub(last_total) as f64 * 2.0;
        last_total = total;

        let eta_secs = if speed > 0.0 {
            Some((total_size.saturating_sub(total) as f64 / speed) as u64)
        } else {
            None
        };
        events.publish(UiEvent::Speed {
            bytes_per_sec: speed,
            eta_secs,
        });

        if total >= total_size {
            return;
        }
    }
}
