use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::models::PlaybackProgress;
use crate::orchestrator::{Advance, Orchestrator};

/// Playback as the orchestrator sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No track is confirmed playing.
    Idle,
    /// A play command is in flight.
    Starting,
    /// The device accepted the current track.
    Playing,
}

/// What a single monitor tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NotPlaying,
    ProgressUnavailable,
    Continuing { remaining_ms: u64 },
    Advanced(Advance),
    AdvanceFailed(String),
}

pub fn should_advance(progress: &PlaybackProgress, threshold_ms: u64) -> bool {
    progress.remaining_ms() <= threshold_ms
}

/// Polls the remote service on a fixed cadence and advances the queue when
/// the current track is about to end.
pub struct PlaybackMonitor {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    threshold_ms: u64,
}

impl PlaybackMonitor {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration, threshold_ms: u64) -> Self {
        Self {
            orchestrator,
            interval,
            threshold_ms,
        }
    }

    pub async fn tick(&self) -> TickOutcome {
        let Some(polled_id) = self.orchestrator.playing_track_id().await else {
            trace!("Monitor tick skipped: not playing");
            return TickOutcome::NotPlaying;
        };

        debug!("Checking playback state...");
        let Some(progress) = self.orchestrator.gateway().currently_playing().await else {
            warn!("Playback progress unavailable; skipping this tick");
            return TickOutcome::ProgressUnavailable;
        };

        if !should_advance(&progress, self.threshold_ms) {
            return TickOutcome::Continuing {
                remaining_ms: progress.remaining_ms(),
            };
        }

        info!(
            song_id = %polled_id,
            remaining_ms = progress.remaining_ms(),
            "Track nearly finished. Playing next track."
        );
        // Progress belongs to `polled_id`; a skip may have landed during the poll.
        match self.orchestrator.advance_if_current(&polled_id).await {
            Ok(advance) => TickOutcome::Advanced(advance),
            Err(e) => TickOutcome::AdvanceFailed(e.to_string()),
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Playback monitor started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Playback monitor stopping.");
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    trace!(?outcome, "Monitor tick finished");
                }
            }
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
