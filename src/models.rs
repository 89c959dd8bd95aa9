use serde::{Deserialize, Serialize};

use crate::PartyError;

/// A song waiting in (or playing from) the party queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub uri: String,
    pub name: String,
    pub artist: String,
    pub votes: i64,
}

impl Song {
    /// "artist - title", for logs.
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist, self.name)
    }
}

/// Song-shaped body submitted by a guest, and the shape of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSong {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: String,
}

impl NewSong {
    pub fn new(
        id: impl Into<String>,
        uri: impl Into<String>,
        name: impl Into<String>,
        artist: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            uri: uri.into(),
            name: name.into(),
            artist: artist.into(),
        }
    }

    /// Checks the fields a song cannot be queued without and turns it into a
    /// fresh [`Song`] with a zero score.
    pub fn into_song(self) -> Result<Song, PartyError> {
        if self.id.trim().is_empty() {
            return Err(PartyError::InvalidSong("missing id".to_string()));
        }
        if self.uri.trim().is_empty() {
            return Err(PartyError::InvalidSong(format!("song {} has no uri", self.id)));
        }
        Ok(Song {
            id: self.id,
            uri: self.uri,
            name: self.name,
            artist: self.artist,
            votes: 0,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub song_id: String,
    pub vote: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: String,
    pub display_name: String,
    pub is_active: bool,
}

/// Progress of whatever the remote service is playing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackProgress {
    pub progress_ms: u64,
    pub duration_ms: u64,
}

impl PlaybackProgress {
    pub fn remaining_ms(&self) -> u64 {
        self.duration_ms.saturating_sub(self.progress_ms)
    }
}

// --- Remote service wire formats ---

#[derive(Debug, Deserialize)]
pub(crate) struct DevicesResponse {
    #[serde(default)]
    pub devices: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDevice {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

impl RawDevice {
    // Restricted devices come back without an id and cannot be targeted.
    pub(crate) fn into_device(self) -> Option<Device> {
        Some(Device {
            id: self.id?,
            display_name: self.name,
            is_active: self.is_active,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CurrentlyPlayingResponse {
    pub progress_ms: Option<u64>,
    pub item: Option<PlayingItem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PlayingItem {
    pub duration_ms: u64,
}

impl CurrentlyPlayingResponse {
    pub(crate) fn progress(&self) -> Option<PlaybackProgress> {
        let item = self.item.as_ref()?;
        Some(PlaybackProgress {
            progress_ms: self.progress_ms?,
            duration_ms: item.duration_ms,
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PlayRequest<'a> {
    pub uris: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchResponse {
    pub tracks: SearchTracks,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchTracks {
    #[serde(default)]
    pub items: Vec<SearchTrack>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchTrack {
    pub id: String,
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SearchArtist>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchArtist {
    pub name: String,
}

impl From<SearchTrack> for NewSong {
    fn from(track: SearchTrack) -> Self {
        let artist = track
            .artists
            .into_iter()
            .map(|a| a.name)
            .collect::<Vec<_>>()
            .join(", ");
        NewSong {
            id: track.id,
            uri: track.uri,
            name: track.name,
            artist,
        }
    }
}

/// Body returned by the authorization server for a refresh grant.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
}
