#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;

use party_queue_rs::{
    Device, NewSong, Orchestrator, OrchestratorConfig, PartyError, PlaybackGateway,
    PlaybackProgress, PlaybackState, TokenGrant, TokenRefresher,
};

mock! {
    pub Gateway {}

    #[async_trait]
    impl PlaybackGateway for Gateway {
        async fn list_devices(&self) -> Vec<Device>;
        async fn play(&self, device_id: &str, track_uri: &str) -> Result<(), PartyError>;
        async fn currently_playing(&self) -> Option<PlaybackProgress>;
        async fn search_tracks(&self, query: &str, limit: u32) -> Result<Vec<NewSong>, PartyError>;
    }
}

mock! {
    pub Refresher {}

    #[async_trait]
    impl TokenRefresher for Refresher {
        async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, PartyError>;
    }
}

pub const DEVICE_NAME: &str = "Living Room";
pub const DEVICE_ID: &str = "device-1";

pub fn device(id: &str, name: &str) -> Device {
    Device {
        id: id.to_string(),
        display_name: name.to_string(),
        is_active: false,
    }
}

pub fn song(id: &str) -> NewSong {
    NewSong::new(
        id,
        format!("spotify:track:{id}"),
        format!("Song {id}"),
        "Test Artist",
    )
}

pub fn uri(id: &str) -> String {
    format!("spotify:track:{id}")
}

/// Gateway that reports the target device and accepts every play command.
pub fn accepting_gateway() -> MockGateway {
    let mut gateway = MockGateway::new();
    gateway
        .expect_list_devices()
        .returning(|| vec![device("other", "Kitchen"), device(DEVICE_ID, DEVICE_NAME)]);
    gateway.expect_play().returning(|_, _| Ok(()));
    gateway
}

pub fn orchestrator(gateway: MockGateway) -> Arc<Orchestrator> {
    orchestrator_with(gateway, OrchestratorConfig::new(DEVICE_NAME))
}

pub fn orchestrator_with(gateway: MockGateway, config: OrchestratorConfig) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(Arc::new(gateway), config))
}

/// Waits for a bootstrap play command to finish and returns where it landed.
pub async fn settle(orch: &Orchestrator) -> PlaybackState {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let state = orch.playback_state().await;
            if state != PlaybackState::Starting {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("playback stayed in Starting")
}

/// Refresher that counts exchanges and hands out `token-<n>` grants.
pub struct CountingRefresher {
    pub calls: AtomicUsize,
    pub seen_refresh_tokens: Mutex<Vec<String>>,
    pub delay: Duration,
    pub rotate_to: Option<String>,
    pub ttl_secs: u64,
}

impl CountingRefresher {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen_refresh_tokens: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            rotate_to: None,
            ttl_secs: 3600,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn rotating_to(mut self, refresh_token: &str) -> Self {
        self.rotate_to = Some(refresh_token.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, PartyError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_refresh_tokens
            .lock()
            .unwrap()
            .push(refresh_token.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(TokenGrant {
            access_token: format!("token-{n}"),
            expires_in: self.ttl_secs,
            refresh_token: self.rotate_to.clone(),
        })
    }
}
