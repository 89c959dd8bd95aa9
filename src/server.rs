use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, Request, State,
    },
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::QueueEvent;
use crate::models::{NewSong, Song, VoteRequest};
use crate::monitor::PlaybackState;
use crate::orchestrator::{Advance, Orchestrator};
use crate::PartyError;

/// Cookie carrying the anonymous per-browser voter identity.
pub const VOTER_COOKIE: &str = "userId";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterId(pub String);

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

pub fn build_router(orchestrator: Arc<Orchestrator>, static_dir: Option<&Path>) -> Router {
    let router = Router::new()
        .route("/api/queue", get(get_queue).post(post_queue))
        .route("/api/vote", post(post_vote))
        .route("/api/search", get(search))
        .route("/api/now-playing", get(now_playing))
        .route("/api/skip", post(skip))
        .route("/ws", get(ws_upgrade))
        .route("/health", get(|| async { "OK" }))
        .with_state(AppState { orchestrator });

    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router
        .layer(middleware::from_fn(assign_voter))
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<(), PartyError> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

pub fn status_for(err: &PartyError) -> StatusCode {
    match err {
        PartyError::DuplicateSong(_) => StatusCode::CONFLICT,
        PartyError::DuplicateVote(_)
        | PartyError::InvalidVote(_)
        | PartyError::InvalidSong(_) => StatusCode::BAD_REQUEST,
        PartyError::SongNotFound(_) | PartyError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
        PartyError::CredentialRenewalFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
        PartyError::PlaybackStartFailed { .. }
        | PartyError::TransientRemoteError(_)
        | PartyError::RequestFailed(_)
        | PartyError::ParseFailed(_) => StatusCode::BAD_GATEWAY,
        PartyError::UrlEncodingFailed(_) | PartyError::IoError(_) | PartyError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

struct ApiError(PartyError);

impl From<PartyError> for ApiError {
    fn from(err: PartyError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, self.0.to_string()).into_response()
    }
}

/// Reads the voter cookie, if the browser sent one.
pub fn voter_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == VOTER_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

// Hands every browser a stable voter id on first contact.
async fn assign_voter(mut request: Request, next: Next) -> Response {
    let existing = voter_from_headers(request.headers());
    let voter = existing
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(VoterId(voter.clone()));

    let mut response = next.run(request).await;

    if existing.is_none() {
        let cookie = format!("{VOTER_COOKIE}={voter}; HttpOnly; Path=/; SameSite=Lax");
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!(error = %e, "Could not build voter cookie"),
        }
    }
    response
}

async fn get_queue(State(state): State<AppState>) -> Json<Vec<Song>> {
    Json(state.orchestrator.current_queue_snapshot().await)
}

async fn post_queue(
    State(state): State<AppState>,
    Json(song): Json<NewSong>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.enqueue_song(song).await?;
    Ok(StatusCode::OK)
}

async fn post_vote(
    State(state): State<AppState>,
    Extension(VoterId(voter)): Extension<VoterId>,
    Json(vote): Json<VoteRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .cast_vote(&voter, &vote.song_id, vote.vote)
        .await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<NewSong>>, ApiError> {
    Ok(Json(state.orchestrator.search(&params.q).await?))
}

#[derive(Debug, Serialize)]
struct NowPlayingResponse {
    track: Option<Song>,
    state: PlaybackState,
}

async fn now_playing(State(state): State<AppState>) -> Json<NowPlayingResponse> {
    Json(NowPlayingResponse {
        track: state.orchestrator.now_playing().await,
        state: state.orchestrator.playback_state().await,
    })
}

async fn skip(State(state): State<AppState>) -> Result<Response, ApiError> {
    let response = match state.orchestrator.skip().await? {
        Advance::Started(song) => Json(Some(song)).into_response(),
        Advance::Drained => Json(None::<Song>).into_response(),
        Advance::AlreadyStarting | Advance::Stale => {
            (StatusCode::CONFLICT, "A track is already starting").into_response()
        }
    };
    Ok(response)
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| observe(socket, state.orchestrator))
}

// Observers are read-only: they get a snapshot on connect, then every event.
async fn observe(socket: WebSocket, orchestrator: Arc<Orchestrator>) {
    let mut events = orchestrator.subscribe();
    let (mut sink, mut stream) = socket.split();
    info!("A user connected");

    let snapshot = QueueEvent::QueueUpdated(orchestrator.current_queue_snapshot().await);
    if send_event(&mut sink, &snapshot).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&mut sink, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Observer lagged; resending queue snapshot");
                    let snapshot =
                        QueueEvent::QueueUpdated(orchestrator.current_queue_snapshot().await);
                    if send_event(&mut sink, &snapshot).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Observer socket error");
                    break;
                }
            },
        }
    }

    info!("A user disconnected");
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &QueueEvent,
) -> Result<(), axum::Error> {
    match event.to_json() {
        Ok(text) => sink.send(Message::Text(text)).await,
        Err(e) => {
            error!(error = %e, event_type = event.event_type(), "Could not serialize event");
            Ok(())
        }
    }
}
