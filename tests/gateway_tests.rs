mod common;

use std::sync::Arc;

use common::{CountingRefresher, MockRefresher};
use party_queue_rs::{
    CredentialLease, Credentials, ManualClock, PartyError, PlaybackGateway, PlaybackProgress,
    SpotifyGateway,
};
use reqwest::Client;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOW: u64 = 1_700_000_000_000;

fn fresh_lease() -> Arc<CredentialLease> {
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().never();
    Arc::new(CredentialLease::new(
        Credentials {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            ttl_secs: 3600,
        },
        Arc::new(ManualClock::new(NOW)),
        Arc::new(refresher),
    ))
}

fn gateway(server: &MockServer, lease: Arc<CredentialLease>) -> SpotifyGateway {
    SpotifyGateway::new(Client::new(), &server.uri(), lease)
}

#[tokio::test]
async fn test_list_devices_skips_restricted_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me/player/devices"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "devices": [
                {"id": "d1", "name": "Living Room", "is_active": true, "type": "Speaker"},
                {"id": null, "name": "Restricted", "is_active": false, "type": "Computer"},
                {"id": "d2", "name": "Kitchen", "is_active": false, "type": "Speaker"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let devices = gateway(&server, fresh_lease()).list_devices().await;

    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0].id, "d1");
    assert_eq!(devices[0].display_name, "Living Room");
    assert!(devices[0].is_active);
    assert_eq!(devices[1].display_name, "Kitchen");
}

#[tokio::test]
async fn test_list_devices_is_empty_on_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me/player/devices"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    assert!(gateway(&server, fresh_lease()).list_devices().await.is_empty());
}

#[tokio::test]
async fn test_play_succeeds_on_204() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/me/player/play"))
        .and(query_param("device_id", "d1"))
        .and(header("authorization", "Bearer access-1"))
        .and(body_json(json!({"uris": ["spotify:track:abc"]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    gateway(&server, fresh_lease())
        .play("d1", "spotify:track:abc")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_play_reports_other_statuses_with_body() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/me/player/play"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"status": 404, "message": "Player command failed: No active device found", "reason": "NO_ACTIVE_DEVICE"}
        })))
        .mount(&server)
        .await;

    match gateway(&server, fresh_lease())
        .play("d1", "spotify:track:abc")
        .await
    {
        Err(PartyError::PlaybackStartFailed { status, body }) => {
            assert_eq!(status, Some(404));
            assert!(body.contains("NO_ACTIVE_DEVICE"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_play_treats_202_as_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/me/player/play"))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    assert!(matches!(
        gateway(&server, fresh_lease()).play("d1", "spotify:track:abc").await,
        Err(PartyError::PlaybackStartFailed {
            status: Some(202),
            ..
        })
    ));
}

#[tokio::test]
async fn test_currently_playing_reads_progress() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me/player/currently-playing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_playing": true,
            "progress_ms": 179000,
            "item": {"id": "abc", "name": "Song", "duration_ms": 180000}
        })))
        .mount(&server)
        .await;

    assert_eq!(
        gateway(&server, fresh_lease()).currently_playing().await,
        Some(PlaybackProgress {
            progress_ms: 179_000,
            duration_ms: 180_000
        })
    );
}

#[tokio::test]
async fn test_currently_playing_is_none_without_an_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me/player/currently-playing"))
        .respond_with(ResponseTemplate::new(204))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/me/player/currently-playing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "is_playing": false,
            "progress_ms": null,
            "item": null
        })))
        .mount(&server)
        .await;

    let gateway = gateway(&server, fresh_lease());
    assert_eq!(gateway.currently_playing().await, None);
    assert_eq!(gateway.currently_playing().await, None);
}

#[tokio::test]
async fn test_currently_playing_is_none_on_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me/player/currently-playing"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    assert_eq!(gateway(&server, fresh_lease()).currently_playing().await, None);
}

#[tokio::test]
async fn test_search_maps_tracks_to_songs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .and(query_param("q", "around the world"))
        .and(query_param("type", "track"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "tracks": {
                "items": [
                    {
                        "id": "t1",
                        "uri": "spotify:track:t1",
                        "name": "Around the World",
                        "artists": [{"name": "Daft Punk"}]
                    },
                    {
                        "id": "t2",
                        "uri": "spotify:track:t2",
                        "name": "Around the World (Remix)",
                        "artists": [{"name": "Daft Punk"}, {"name": "Someone Else"}]
                    }
                ]
            }
        })))
        .mount(&server)
        .await;

    let songs = gateway(&server, fresh_lease())
        .search_tracks("around the world", 10)
        .await
        .unwrap();

    assert_eq!(songs.len(), 2);
    assert_eq!(songs[0].id, "t1");
    assert_eq!(songs[0].uri, "spotify:track:t1");
    assert_eq!(songs[0].artist, "Daft Punk");
    assert_eq!(songs[1].artist, "Daft Punk, Someone Else");
}

#[tokio::test]
async fn test_search_surfaces_remote_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/search"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    assert!(matches!(
        gateway(&server, fresh_lease()).search_tracks("x", 10).await,
        Err(PartyError::TransientRemoteError(_))
    ));
}

#[tokio::test]
async fn test_expired_token_is_renewed_before_the_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me/player/devices"))
        .and(header("authorization", "Bearer token-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"devices": []})))
        .expect(1)
        .mount(&server)
        .await;

    let clock = Arc::new(ManualClock::new(NOW));
    let refresher = Arc::new(CountingRefresher::new());
    let lease = Arc::new(CredentialLease::new(
        Credentials {
            access_token: "stale".to_string(),
            refresh_token: "refresh-1".to_string(),
            ttl_secs: 60,
        },
        clock.clone(),
        refresher.clone(),
    ));
    clock.advance(60_001);

    assert!(gateway(&server, lease).list_devices().await.is_empty());
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_poisoned_lease_makes_no_remote_calls() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/me/player/play"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let mut refresher = MockRefresher::new();
    refresher
        .expect_refresh()
        .times(1)
        .returning(|_| Err(PartyError::CredentialRenewalFailed("revoked".to_string())));
    let lease = Arc::new(CredentialLease::new(
        Credentials {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            ttl_secs: 3600,
        },
        Arc::new(ManualClock::new(NOW)),
        Arc::new(refresher),
    ));
    assert!(lease.renew().await.is_err());

    assert!(matches!(
        gateway(&server, lease).play("d1", "spotify:track:abc").await,
        Err(PartyError::CredentialRenewalFailed(_))
    ));
}
