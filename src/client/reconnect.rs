//! Retrying lost sessions

use std::time::Duration;

use tracing::{error, info, warn};

use super::{SessionEnd, SignalingClient};
use crate::config::ReconnectConfig;
use crate::endpoint::WebRtcEndpoint;
use crate::error::{ClientError, Result};
use crate::track::TrackContext;

/// Delay before the given attempt (1-based); grows linearly
pub(super) fn delay_for(config: &ReconnectConfig, attempt: u32) -> Duration {
    let extra = config.delay_ms.saturating_mul(u64::from(attempt.saturating_sub(1)));
    Duration::from_millis(config.initial_delay_ms.saturating_add(extra))
}

/// Failures a new session would hit again
fn is_final(error: &ClientError) -> bool {
    matches!(error, ClientError::AuthFailed(_)) || error.is_usage_error()
}

pub(super) async fn run(client: &SignalingClient) -> Result<()> {
    let config = &client.config().reconnect;
    let cancel_token = client.cancel_token();
    let mut republish = Vec::new();
    let mut attempt = 0u32;

    loop {
        let reason = match client.run_session(&mut republish).await {
            Ok(SessionEnd::Cancelled) => return Ok(()),
            Ok(SessionEnd::Closed) => {
                info!("Session closed by the engine");
                return Ok(());
            }
            Ok(SessionEnd::Lost {
                reason,
                established,
            }) => {
                if established {
                    attempt = 0;
                }
                reason
            }
            Err(e) if is_final(&e) => return Err(e),
            Err(e) => e.to_string(),
        };

        if cancel_token.is_cancelled() {
            return Ok(());
        }
        if !config.enabled {
            return Err(ClientError::Transport(reason));
        }
        attempt += 1;
        if attempt > config.max_attempts {
            error!("Giving up after {} attempts: {}", config.max_attempts, reason);
            return Err(ClientError::Transport(format!(
                "reconnection failed after {} attempts: {}",
                config.max_attempts, reason
            )));
        }

        let previous = reset_endpoint(client.endpoint()).await?;
        if config.add_tracks_on_reconnect {
            republish.extend(previous);
        }

        let delay = delay_for(config, attempt);
        warn!(
            "Session lost ({}), reconnecting in {:?} (attempt {}/{})",
            reason, delay, attempt, config.max_attempts
        );
        tokio::select! {
            () = cancel_token.cancelled() => return Ok(()),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// Tear down the old session, keeping the local tracks it had
async fn reset_endpoint(endpoint: &WebRtcEndpoint) -> Result<Vec<TrackContext>> {
    let local = endpoint.get_local_endpoint().await?;
    endpoint.disconnect().await?;
    Ok(local.tracks.into_values().collect())
}

/// Add the tracks of a previous session to the current one
///
/// Each add completes after a renegotiation, so they run detached from the
/// signaling pump.
pub(super) fn republish(endpoint: &WebRtcEndpoint, tracks: Vec<TrackContext>) {
    for ctx in tracks {
        let Some(media) = ctx.track else {
            warn!("Track {} was muted, not publishing it again", ctx.track_id);
            continue;
        };
        let endpoint = endpoint.clone();
        let metadata = ctx.metadata.raw_metadata;
        let simulcast = ctx.simulcast_config.unwrap_or_default();
        let max_bandwidth = ctx.max_bandwidth;
        let old_id = ctx.track_id;
        tokio::spawn(async move {
            match endpoint
                .add_track(media, metadata, simulcast, max_bandwidth)
                .await
            {
                Ok(track_id) => info!("Track {} published again as {}", old_id, track_id),
                Err(e) => warn!("Failed to publish track {} again: {}", old_id, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::config::ClientConfig;
    use crate::endpoint::EndpointOptions;
    use crate::events::EndpointEvent;
    use crate::track::{MediaStreamTrack, SimulcastConfig, TrackBandwidthLimit, TrackKind};
    use crate::webrtc::mock::MockFactory;

    fn endpoint() -> WebRtcEndpoint {
        WebRtcEndpoint::spawn(
            EndpointOptions::default(),
            Arc::new(MockFactory::default()),
            CancellationToken::new(),
        )
        .0
    }

    #[test]
    fn test_linear_delay() {
        let config = ReconnectConfig {
            initial_delay_ms: 200,
            delay_ms: 100,
            ..Default::default()
        };
        assert_eq!(delay_for(&config, 1), Duration::from_millis(200));
        assert_eq!(delay_for(&config, 2), Duration::from_millis(300));
        assert_eq!(delay_for(&config, 4), Duration::from_millis(500));
    }

    #[test]
    fn test_final_errors() {
        assert!(is_final(&ClientError::AuthFailed("bad token".to_string())));
        assert!(is_final(&ClientError::Metadata("not an object".to_string())));
        assert!(is_final(&ClientError::UnknownTrack("t1".to_string())));
        assert!(!is_final(&ClientError::Transport("reset".to_string())));
        assert!(!is_final(&ClientError::Protocol("desync".to_string())));
        assert!(!is_final(&ClientError::Disconnected));
    }

    #[tokio::test]
    async fn test_reset_keeps_tracks() {
        let endpoint = endpoint();
        endpoint
            .add_track(
                MediaStreamTrack::detached("cam", TrackKind::Video, "stream"),
                json!({ "source": "camera" }),
                SimulcastConfig::disabled(),
                TrackBandwidthLimit::Single(300),
            )
            .await
            .unwrap();

        let tracks = reset_endpoint(&endpoint).await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].max_bandwidth, TrackBandwidthLimit::Single(300));
        assert!(endpoint.get_local_endpoint().await.unwrap().tracks.is_empty());
    }

    #[tokio::test]
    async fn test_republish_skips_muted_tracks() {
        let endpoint = endpoint();
        let mut events = endpoint.subscribe();
        let track_id = endpoint
            .add_track(
                MediaStreamTrack::detached("cam", TrackKind::Video, "stream"),
                json!({ "source": "camera" }),
                SimulcastConfig::disabled(),
                TrackBandwidthLimit::default(),
            )
            .await
            .unwrap();
        endpoint.add_track(
            MediaStreamTrack::detached("mic", TrackKind::Audio, "stream"),
            json!({}),
            SimulcastConfig::disabled(),
            TrackBandwidthLimit::default(),
        )
        .await
        .unwrap();
        endpoint.replace_track(&track_id, None, None).await.unwrap();

        let tracks = reset_endpoint(&endpoint).await.unwrap();
        while events.try_recv().is_ok() {}
        republish(&endpoint, tracks);

        loop {
            if let EndpointEvent::LocalTrackAdded(ctx) = events.recv().await.unwrap() {
                assert_eq!(ctx.media_track_id(), Some("mic"));
                break;
            }
        }
        let local = endpoint.get_local_endpoint().await.unwrap();
        assert_eq!(local.tracks.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_engine_gives_up() {
        let mut config = ClientConfig {
            server_url: "ws://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        config.reconnect.max_attempts = 2;
        config.reconnect.initial_delay_ms = 10;
        config.reconnect.delay_ms = 10;

        let client = SignalingClient::new(config, endpoint());
        assert!(matches!(client.run().await, Err(ClientError::Transport(_))));
    }
}
