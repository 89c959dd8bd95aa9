use thiserror::Error;

#[derive(Error, Debug)]
pub enum PartyError {
    #[error("Song {0} is already queued or playing")]
    DuplicateSong(String),

    #[error("Already voted on song {0}")]
    DuplicateVote(String),

    #[error("Invalid vote {0}: expected +1 or -1")]
    InvalidVote(i64),

    #[error("Song {0} not found in queue")]
    SongNotFound(String),

    #[error("Invalid song: {0}")]
    InvalidSong(String),

    #[error("Credential renewal failed: {0}")]
    CredentialRenewalFailed(String),

    #[error("Playback start failed (status {status:?}): {body}")]
    PlaybackStartFailed { status: Option<u16>, body: String },

    #[error("Playback device not found: {0}")]
    DeviceNotFound(String),

    #[error("Remote playback service error: {0}")]
    TransientRemoteError(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("URL encoding failed: {0}")]
    UrlEncodingFailed(#[from] serde_urlencoded::ser::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PartyError {
    /// Errors caused by the request itself. They go straight back to the
    /// caller and are never retried.
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            PartyError::DuplicateSong(_)
                | PartyError::DuplicateVote(_)
                | PartyError::InvalidVote(_)
                | PartyError::SongNotFound(_)
                | PartyError::InvalidSong(_)
        )
    }

    /// Errors raised while talking to the remote playback or authorization service.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            PartyError::CredentialRenewalFailed(_)
                | PartyError::PlaybackStartFailed { .. }
                | PartyError::DeviceNotFound(_)
                | PartyError::TransientRemoteError(_)
                | PartyError::RequestFailed(_)
        )
    }
}
