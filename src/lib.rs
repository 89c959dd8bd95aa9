//! Collaborative party playlist.
//!
//! Guests queue tracks and vote on them; one shared Spotify Connect device
//! plays the current winner. The [`Orchestrator`] owns the vote-ordered
//! queue and the vote ledger, the [`PlaybackMonitor`] polls the remote
//! service and advances the queue near track end, and every change is pushed
//! to observers as a [`QueueEvent`].
//!
//! # Logging
//!
//! This library uses the `tracing` crate for logging. To see logs, install a
//! subscriber in your application, e.g.:
//!
//! ```no_run
//! tracing_subscriber::fmt()
//!     .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
//!     .init();
//! ```
mod clock;
pub use clock::{Clock, ManualClock, SystemClock};
mod credentials;
pub use credentials::{AccountsRefresher, CredentialLease, Credentials, TokenRefresher};
mod error;
pub use error::PartyError;
mod events;
pub use events::{QueueEvent, StateBroadcaster};
mod gateway;
pub use gateway::{resolve_target_device, PlaybackGateway, SpotifyGateway};
mod ledger;
pub use ledger::{validate_delta, VoteLedger};
mod models;
pub use models::{Device, NewSong, PlaybackProgress, Song, TokenGrant, VoteRequest};
mod monitor;
pub use monitor::{should_advance, PlaybackMonitor, PlaybackState, TickOutcome};
mod orchestrator;
pub use orchestrator::{Advance, Orchestrator, OrchestratorConfig};
mod queue;
pub use queue::QueueStore;
pub mod server;
mod settings;
pub use settings::Settings;
