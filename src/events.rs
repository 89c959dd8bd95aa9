use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::models::Song;

// Events pushed to every connected observer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum QueueEvent {
    #[serde(rename = "queueUpdated")]
    QueueUpdated(Vec<Song>),
    #[serde(rename = "nowPlaying")]
    NowPlaying(Option<Song>),
    #[serde(rename = "playbackError")]
    PlaybackError(String),
}

impl QueueEvent {
    // Get the name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::QueueUpdated(_) => "queueUpdated",
            QueueEvent::NowPlaying(_) => "nowPlaying",
            QueueEvent::PlaybackError(_) => "playbackError",
        }
    }

    /// `{"event": <name>, "data": <payload>}`
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Fans queue changes out to all subscribers.
#[derive(Debug, Clone)]
pub struct StateBroadcaster {
    sender: broadcast::Sender<QueueEvent>,
}

impl StateBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Sends to whoever is listening. Nobody listening is fine.
    pub fn publish(&self, event: QueueEvent) {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(receivers) => trace!(event_type, receivers, "Broadcast event"),
            Err(_) => trace!(event_type, "No observers for event"),
        }
    }
}
