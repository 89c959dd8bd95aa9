use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, error, info, trace, warn};

use crate::credentials::CredentialLease;
use crate::models::{
    CurrentlyPlayingResponse, Device, DevicesResponse, NewSong, PlayRequest, PlaybackProgress,
    SearchResponse,
};
use crate::PartyError;

/// Call surface over the remote playback service.
///
/// Device discovery and progress reads are best effort: failures are logged
/// and surface as an empty list / `None`. Starting playback and searching
/// report their errors.
#[async_trait]
pub trait PlaybackGateway: Send + Sync {
    async fn list_devices(&self) -> Vec<Device>;

    /// Succeeds only when the remote service answers 204.
    async fn play(&self, device_id: &str, track_uri: &str) -> Result<(), PartyError>;

    async fn currently_playing(&self) -> Option<PlaybackProgress>;

    async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<NewSong>, PartyError>;
}

/// First device whose display name matches exactly.
pub fn resolve_target_device(devices: &[Device], configured_name: &str) -> Option<String> {
    devices
        .iter()
        .find(|device| device.display_name == configured_name)
        .map(|device| device.id.clone())
}

/// [`PlaybackGateway`] backed by the Spotify Web API.
pub struct SpotifyGateway {
    client: Client,
    api_base: String,
    lease: Arc<CredentialLease>,
}

impl SpotifyGateway {
    pub fn new(client: Client, api_base: &str, lease: Arc<CredentialLease>) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            lease,
        }
    }

    pub fn lease(&self) -> &Arc<CredentialLease> {
        &self.lease
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn fetch_devices(&self) -> Result<Vec<Device>, PartyError> {
        let token = self.lease.access_token().await?;
        let response = self
            .client
            .get(self.url("/v1/me/player/devices"))
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            return Err(PartyError::TransientRemoteError(format!(
                "device list answered {status}: {body_text}"
            )));
        }

        let devices = response.json::<DevicesResponse>().await?;
        Ok(devices
            .devices
            .into_iter()
            .filter_map(|raw| raw.into_device())
            .collect())
    }

    async fn fetch_progress(&self) -> Result<Option<PlaybackProgress>, PartyError> {
        let token = self.lease.access_token().await?;
        let response = self
            .client
            .get(self.url("/v1/me/player/currently-playing"))
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.json::<CurrentlyPlayingResponse>().await?;
                Ok(body.progress())
            }
            StatusCode::NO_CONTENT => Ok(None),
            status => {
                let body_text = response.text().await.unwrap_or_default();
                Err(PartyError::TransientRemoteError(format!(
                    "currently-playing answered {status}: {body_text}"
                )))
            }
        }
    }
}

#[async_trait]
impl PlaybackGateway for SpotifyGateway {
    async fn list_devices(&self) -> Vec<Device> {
        match self.fetch_devices().await {
            Ok(devices) => {
                debug!(count = devices.len(), "Available devices: {:?}", devices);
                devices
            }
            Err(e) => {
                error!(error = %e, "Error fetching devices");
                Vec::new()
            }
        }
    }

    async fn play(&self, device_id: &str, track_uri: &str) -> Result<(), PartyError> {
        let token = self.lease.access_token().await?;
        info!(device_id, track_uri, "Sending play request");

        let response = self
            .client
            .put(self.url("/v1/me/player/play"))
            .query(&[("device_id", device_id)])
            .bearer_auth(token)
            .json(&PlayRequest { uris: [track_uri] })
            .send()
            .await
            .map_err(|e| PartyError::PlaybackStartFailed {
                status: None,
                body: e.to_string(),
            })?;

        if response.status() == StatusCode::NO_CONTENT {
            info!(track_uri, "Playback started");
            return Ok(());
        }

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        warn!(%status, body = %body_text, "Play request rejected");
        Err(PartyError::PlaybackStartFailed {
            status: Some(status.as_u16()),
            body: body_text,
        })
    }

    async fn currently_playing(&self) -> Option<PlaybackProgress> {
        match self.fetch_progress().await {
            Ok(Some(progress)) => {
                trace!(
                    progress_ms = progress.progress_ms,
                    duration_ms = progress.duration_ms,
                    "Current track progress"
                );
                Some(progress)
            }
            Ok(None) => {
                debug!("Remote service reports no active item");
                None
            }
            Err(e) => {
                error!(error = %e, "Error fetching playback state");
                None
            }
        }
    }

    async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<NewSong>, PartyError> {
        let token = self.lease.access_token().await?;
        let limit = limit.to_string();
        let response = self
            .client
            .get(self.url("/v1/search"))
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .bearer_auth(token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            error!(%status, body = %body_text, "Search request failed");
            return Err(PartyError::TransientRemoteError(format!(
                "search answered {status}: {body_text}"
            )));
        }

        let body = response.json::<SearchResponse>().await?;
        Ok(body.tracks.items.into_iter().map(NewSong::from).collect())
    }
}

impl std::fmt::Debug for SpotifyGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpotifyGateway")
            .field("api_base", &self.api_base)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, name: &str) -> Device {
        Device {
            id: id.to_string(),
            display_name: name.to_string(),
            is_active: false,
        }
    }

    #[test]
    fn resolve_picks_first_exact_match() {
        let devices = vec![
            device("a", "Kitchen"),
            device("b", "Living Room"),
            device("c", "Living Room"),
        ];
        assert_eq!(
            resolve_target_device(&devices, "Living Room"),
            Some("b".to_string())
        );
    }

    #[test]
    fn resolve_is_exact_and_case_sensitive() {
        let devices = vec![device("a", "living room"), device("b", "Living Room 2")];
        assert_eq!(resolve_target_device(&devices, "Living Room"), None);
        assert_eq!(resolve_target_device(&[], "Living Room"), None);
    }
}
