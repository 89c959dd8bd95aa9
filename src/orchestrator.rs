use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::events::{QueueEvent, StateBroadcaster};
use crate::gateway::{resolve_target_device, PlaybackGateway};
use crate::ledger::{validate_delta, VoteLedger};
use crate::models::{NewSong, Song};
use crate::monitor::PlaybackState;
use crate::queue::QueueStore;
use crate::settings::Settings;
use crate::PartyError;

const SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub device_name: String,
    pub vote_retention_songs: usize,
    pub event_buffer_capacity: usize,
}

impl OrchestratorConfig {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            vote_retention_songs: 500,
            event_buffer_capacity: 100,
        }
    }
}

impl From<&Settings> for OrchestratorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            device_name: settings.device_name.clone(),
            vote_retention_songs: settings.vote_retention_songs,
            event_buffer_capacity: settings.event_buffer_capacity,
        }
    }
}

/// Result of an attempt to move playback forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// The song was popped and the device confirmed playback.
    Started(Song),
    /// Nothing pending; current track cleared and playback idle.
    Drained,
    /// A play command is already in flight; nothing was touched.
    AlreadyStarting,
    /// The track the caller decided on is no longer the one playing.
    Stale,
}

struct PartyState {
    queue: QueueStore,
    ledger: VoteLedger,
    playback: PlaybackState,
}

/// Owns the queue, the vote ledger and the playback state, and is the only
/// thing that mutates them.
///
/// Every mutation happens under one lock that is never held across a remote
/// call. After a remote call returns, state is re-read rather than assumed.
pub struct Orchestrator {
    state: Mutex<PartyState>,
    gateway: Arc<dyn PlaybackGateway>,
    broadcaster: StateBroadcaster,
    device_name: String,
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn PlaybackGateway>, config: OrchestratorConfig) -> Self {
        Self {
            state: Mutex::new(PartyState {
                queue: QueueStore::new(),
                ledger: VoteLedger::new(config.vote_retention_songs),
                playback: PlaybackState::Idle,
            }),
            gateway,
            broadcaster: StateBroadcaster::new(config.event_buffer_capacity),
            device_name: config.device_name,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.broadcaster.subscribe()
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub(crate) fn gateway(&self) -> &Arc<dyn PlaybackGateway> {
        &self.gateway
    }

    /// Current queue, best first.
    pub async fn current_queue_snapshot(&self) -> Vec<Song> {
        self.state.lock().await.queue.sorted_view()
    }

    pub async fn now_playing(&self) -> Option<Song> {
        self.state.lock().await.queue.current().cloned()
    }

    pub async fn playback_state(&self) -> PlaybackState {
        self.state.lock().await.playback
    }

    /// Id of the current track, only while the device is confirmed playing it.
    pub async fn playing_track_id(&self) -> Option<String> {
        let state = self.state.lock().await;
        match state.playback {
            PlaybackState::Playing => state.queue.current().map(|song| song.id.clone()),
            _ => None,
        }
    }

    /// Sum of the ledger's recorded votes for a song.
    pub async fn vote_tally(&self, song_id: &str) -> i64 {
        self.state.lock().await.ledger.tally(song_id)
    }

    /// Queues a song. When nothing is playing, playback starts right away
    /// instead of waiting for the monitor; the play command runs in its own
    /// task so the caller never waits on the remote service.
    pub async fn enqueue_song(self: &Arc<Self>, new_song: NewSong) -> Result<Song, PartyError> {
        let song = new_song.into_song()?;

        let next = {
            let mut state = self.state.lock().await;
            state.queue.enqueue(song.clone())?;
            state.ledger.reactivate(&song.id);
            info!(song_id = %song.id, song = %song.label(), queued = state.queue.len(), "Song queued");
            self.publish_queue(&state);

            if state.playback == PlaybackState::Idle {
                debug!("Nothing playing, bootstrapping playback");
                self.begin_advance(&mut state)
            } else {
                None
            }
        };

        if let Some(next) = next {
            let orchestrator = Arc::clone(self);
            tokio::spawn(async move {
                // Failures are logged and broadcast by start_playback.
                if orchestrator.start_playback(next).await.is_err() {
                    debug!("Bootstrap playback did not start");
                }
            });
        }
        Ok(song)
    }

    /// Applies one vote. The ledger and the score change together or not at all.
    pub async fn cast_vote(&self, voter: &str, song_id: &str, delta: i64) -> Result<i64, PartyError> {
        let mut state = self.state.lock().await;

        if state.ledger.has_voted(voter, song_id) {
            debug!(voter, song_id, "Duplicate vote rejected");
            return Err(PartyError::DuplicateVote(song_id.to_string()));
        }
        validate_delta(delta)?;
        if !state.queue.contains(song_id) {
            return Err(PartyError::SongNotFound(song_id.to_string()));
        }

        let delta = state.ledger.apply_vote(voter, song_id, delta)?;
        let votes = state.queue.record_vote(song_id, delta)?;
        debug!(voter, song_id, delta, votes, "Vote recorded");
        self.publish_queue(&state);
        Ok(votes)
    }

    /// Moves the top-ranked song to the device. Shared by the monitor and
    /// manual skips; a no-op while another start is in flight.
    pub async fn advance_playback(&self) -> Result<Advance, PartyError> {
        self.advance_checked(None).await
    }

    /// Advances only if `expected_id` is still the track confirmed playing.
    /// Used by callers whose decision rests on data fetched across an await.
    pub async fn advance_if_current(&self, expected_id: &str) -> Result<Advance, PartyError> {
        self.advance_checked(Some(expected_id)).await
    }

    async fn advance_checked(&self, expected_id: Option<&str>) -> Result<Advance, PartyError> {
        let next = {
            let mut state = self.state.lock().await;
            if state.playback == PlaybackState::Starting {
                debug!("Advance requested while a track is starting; ignoring");
                return Ok(Advance::AlreadyStarting);
            }
            if let Some(expected_id) = expected_id {
                if state.playback != PlaybackState::Playing || !state.queue.is_current(expected_id) {
                    debug!(expected_id, "Current track changed since the decision; not advancing");
                    return Ok(Advance::Stale);
                }
            }
            self.begin_advance(&mut state)
        };

        match next {
            Some(song) => {
                self.start_playback(song.clone()).await?;
                Ok(Advance::Started(song))
            }
            None => Ok(Advance::Drained),
        }
    }

    pub async fn skip(&self) -> Result<Advance, PartyError> {
        info!("Skip requested");
        self.advance_playback().await
    }

    /// Resolves the configured device against what the remote service reports.
    pub async fn check_device(&self) -> Result<String, PartyError> {
        let devices = self.gateway.list_devices().await;
        match resolve_target_device(&devices, &self.device_name) {
            Some(device_id) => {
                info!(device = %self.device_name, device_id = %device_id, "Target device found");
                Ok(device_id)
            }
            None => {
                error!(
                    device = %self.device_name,
                    available = ?devices.iter().map(|d| d.display_name.as_str()).collect::<Vec<_>>(),
                    "Target device not found. Make sure the player is open on it."
                );
                Err(PartyError::DeviceNotFound(self.device_name.clone()))
            }
        }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<NewSong>, PartyError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.gateway.search_tracks(query, SEARCH_LIMIT).await
    }

    // Pops the next song under the state lock. Returns the song to start, if any.
    fn begin_advance(&self, state: &mut PartyState) -> Option<Song> {
        let next = state.queue.advance();
        match &next {
            Some(song) => {
                state.ledger.retire(&song.id);
                state.playback = PlaybackState::Starting;
                info!(song_id = %song.id, song = %song.label(), "Advancing to next track");
            }
            None => {
                state.playback = PlaybackState::Idle;
                info!("Queue is empty. No track to play.");
            }
        }
        self.publish_queue(state);
        self.broadcaster
            .publish(QueueEvent::NowPlaying(state.queue.current().cloned()));
        next
    }

    async fn start_playback(&self, song: Song) -> Result<(), PartyError> {
        let result = self.play_on_target(&song).await;

        let mut state = self.state.lock().await;
        let still_current =
            state.queue.is_current(&song.id) && state.playback == PlaybackState::Starting;

        match &result {
            Ok(()) if still_current => {
                state.playback = PlaybackState::Playing;
                info!(song_id = %song.id, "Playback confirmed");
            }
            Ok(()) => {
                warn!(song_id = %song.id, "Current track changed while starting playback");
            }
            Err(e) => {
                error!(
                    song_id = %song.id,
                    error = %e,
                    "Could not start track; it stays current until the next enqueue or skip"
                );
                if still_current {
                    state.playback = PlaybackState::Idle;
                }
                self.broadcaster
                    .publish(QueueEvent::PlaybackError(e.to_string()));
            }
        }
        result
    }

    async fn play_on_target(&self, song: &Song) -> Result<(), PartyError> {
        let devices = self.gateway.list_devices().await;
        let device_id = resolve_target_device(&devices, &self.device_name)
            .ok_or_else(|| PartyError::DeviceNotFound(self.device_name.clone()))?;
        self.gateway.play(&device_id, &song.uri).await
    }

    fn publish_queue(&self, state: &PartyState) {
        self.broadcaster
            .publish(QueueEvent::QueueUpdated(state.queue.sorted_view()));
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("device_name", &self.device_name)
            .finish()
    }
}
