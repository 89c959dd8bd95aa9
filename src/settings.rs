use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use crate::PartyError;

/// Holds all tunables, read once from ENV with fallbacks.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub static_dir: Option<PathBuf>,
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_ttl_secs: u64,
    pub api_base: String,
    pub accounts_base: String,
    pub device_name: String,
    pub monitor_interval: Duration,
    pub advance_threshold_ms: u64,
    pub request_timeout: Duration,
    pub event_buffer_capacity: usize,
    pub vote_retention_songs: usize,
}

impl Settings {
    pub const DEFAULT_API_BASE: &'static str = "https://api.spotify.com";
    pub const DEFAULT_ACCOUNTS_BASE: &'static str = "https://accounts.spotify.com";
    pub const MAX_EVENT_BUFFER_CAPACITY: usize = 65_536;

    /// Settings with defaults for every optional tunable. Used as the base of
    /// `from_env` and directly by tests.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        device_name: impl Into<String>,
    ) -> Self {
        Settings {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8888)),
            static_dir: None,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            access_token: String::new(),
            refresh_token: refresh_token.into(),
            token_ttl_secs: 3600,
            api_base: Self::DEFAULT_API_BASE.to_string(),
            accounts_base: Self::DEFAULT_ACCOUNTS_BASE.to_string(),
            device_name: device_name.into(),
            monitor_interval: Duration::from_millis(5_000),
            advance_threshold_ms: 5_000,
            request_timeout: Duration::from_secs(10),
            event_buffer_capacity: 100,
            vote_retention_songs: 500,
        }
    }

    pub fn from_env() -> Result<Self, PartyError> {
        // optionally load .env
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Builds settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PartyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &str| -> Result<String, PartyError> {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| PartyError::Config(format!("{var} must be set")))
        };

        // helper to parse a numeric variable, falling back on absence or garbage
        let parse_u64 = |var: &str, default: u64| -> u64 {
            lookup(var)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        let mut settings = Settings::new(
            required("SPOTIFY_CLIENT_ID")?,
            required("SPOTIFY_CLIENT_SECRET")?,
            required("SPOTIFY_REFRESH_TOKEN")?,
            required("PLAYBACK_DEVICE_NAME")?,
        );

        if let Some(bind) = lookup("PARTY_BIND") {
            settings.bind_addr = bind
                .parse()
                .map_err(|e| PartyError::Config(format!("PARTY_BIND '{bind}': {e}")))?;
        }
        settings.static_dir = lookup("PARTY_STATIC_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        settings.access_token = lookup("SPOTIFY_ACCESS_TOKEN").unwrap_or_default();
        settings.token_ttl_secs = parse_u64("SPOTIFY_TOKEN_TTL_SECS", settings.token_ttl_secs);
        if let Some(base) = lookup("SPOTIFY_API_BASE") {
            settings.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(base) = lookup("SPOTIFY_ACCOUNTS_BASE") {
            settings.accounts_base = base.trim_end_matches('/').to_string();
        }
        settings.monitor_interval = Duration::from_millis(parse_u64("MONITOR_INTERVAL_MS", 5_000));
        settings.advance_threshold_ms = parse_u64("ADVANCE_THRESHOLD_MS", 5_000);
        settings.request_timeout = Duration::from_secs(parse_u64("REQUEST_TIMEOUT_SECS", 10));
        settings.event_buffer_capacity = usize::try_from(parse_u64("EVENT_BUFFER_CAPACITY", 100))
            .unwrap_or(usize::MAX);
        settings.vote_retention_songs = parse_u64("VOTE_RETENTION_SONGS", 500) as usize;

        if settings.event_buffer_capacity > Self::MAX_EVENT_BUFFER_CAPACITY {
            return Err(PartyError::Config(format!(
                "EVENT_BUFFER_CAPACITY must be at most {}",
                Self::MAX_EVENT_BUFFER_CAPACITY
            )));
        }
        if settings.monitor_interval.is_zero() {
            return Err(PartyError::Config(
                "MONITOR_INTERVAL_MS must be greater than zero".to_string(),
            ));
        }

        Ok(settings)
    }
}
