//! Websocket client connecting an endpoint to the engine
//!
//! The socket carries [`envelope::PeerMessage`] frames. After the
//! authentication handshake, inbound media events are fed to the
//! [`WebRtcEndpoint`] and the endpoint's `sendMediaEvent` events are written
//! back. Lost sessions are retried by [`reconnect`].

pub mod envelope;
mod reconnect;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::endpoint::WebRtcEndpoint;
use crate::error::{ClientError, Result};
use crate::events::EndpointEvent;
use crate::track::TrackContext;

use envelope::{peer_message, PeerMessage};

/// Time allowed for the engine to confirm the token
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Shut down locally
    Cancelled,
    /// The engine ended the session
    Closed,
    /// Socket or peer connection lost
    Lost {
        reason: String,
        /// The engine had accepted the endpoint before the loss
        established: bool,
    },
}

/// Signaling client driving one endpoint
pub struct SignalingClient {
    config: ClientConfig,
    endpoint: WebRtcEndpoint,
    cancel_token: CancellationToken,
}

impl SignalingClient {
    pub fn new(config: ClientConfig, endpoint: WebRtcEndpoint) -> Self {
        Self {
            config,
            endpoint,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn endpoint(&self) -> &WebRtcEndpoint {
        &self.endpoint
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Stop the running session; `run` returns once the engine was told
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Keep a session with the engine until shutdown or a final failure
    pub async fn run(&self) -> Result<()> {
        reconnect::run(self).await
    }

    /// Connect, authenticate, join and pump messages until the session ends
    ///
    /// Tracks in `republish` are added again once the engine accepted the
    /// endpoint; they are left in place when the session ends earlier.
    pub async fn run_session(&self, republish: &mut Vec<TrackContext>) -> Result<SessionEnd> {
        info!("Connecting to {}", self.config.server_url);
        let (socket, _) = tokio_tungstenite::connect_async(self.config.server_url.as_str())
            .await
            .map_err(|e| ClientError::Transport(format!("websocket connect failed: {}", e)))?;
        let (mut sink, mut stream) = socket.split();

        send_message(&mut sink, &PeerMessage::auth_request(self.config.token.as_str())).await?;

        tokio::time::timeout(AUTH_TIMEOUT, wait_authenticated(&mut stream))
            .await
            .map_err(|_| ClientError::Transport("authentication timed out".to_string()))??;
        info!("Authenticated");

        // Subscribe first so the `connect` media event is not missed
        let mut events = self.endpoint.subscribe();
        self.endpoint.connect(self.config.metadata.clone()).await?;

        let mut stats = (self.config.stats_interval_secs > 0).then(|| {
            let period = Duration::from_secs(self.config.stats_interval_secs);
            tokio::time::interval_at(tokio::time::Instant::now() + period, period)
        });
        let mut established = false;

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("Leaving the session");
                    self.endpoint.disconnect().await?;
                    flush_outbound(&mut events, &mut sink).await;
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }

                event = events.recv() => {
                    match event {
                        Ok(EndpointEvent::SendMediaEvent { data }) => {
                            send_message(&mut sink, &PeerMessage::media_event(data)).await?;
                        }
                        Ok(EndpointEvent::Connected { endpoint_id, .. }) => {
                            info!("Joined as {}", endpoint_id);
                            established = true;
                            if !republish.is_empty() {
                                reconnect::republish(&self.endpoint, std::mem::take(republish));
                            }
                        }
                        Ok(EndpointEvent::ConnectionError { message }) => {
                            return Ok(SessionEnd::Lost { reason: message, established });
                        }
                        Ok(EndpointEvent::Disconnected) => {
                            flush_outbound(&mut events, &mut sink).await;
                            let _ = sink.send(Message::Close(None)).await;
                            return Ok(SessionEnd::Closed);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Signaling pump lagged by {} events", n);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(ClientError::Internal("endpoint event bus closed".to_string()));
                        }
                    }
                }

                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Binary(data))) => self.handle_frame(&data).await,
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| f.reason.to_string())
                                .unwrap_or_else(|| "socket closed".to_string());
                            return Ok(SessionEnd::Lost { reason, established });
                        }
                        Some(Ok(other)) => debug!("Ignoring websocket message {:?}", other),
                        Some(Err(e)) => {
                            return Ok(SessionEnd::Lost { reason: e.to_string(), established });
                        }
                        None => {
                            return Ok(SessionEnd::Lost {
                                reason: "socket closed".to_string(),
                                established,
                            });
                        }
                    }
                }

                _ = tick(&mut stats) => {
                    match self.endpoint.get_statistics(None).await {
                        Ok(report) => {
                            let data = serde_json::to_string(&report)?;
                            send_message(&mut sink, &PeerMessage::rtc_stats_report(data)).await?;
                        }
                        Err(e) => warn!("Failed to collect statistics: {}", e),
                    }
                }
            }
        }
    }

    async fn handle_frame(&self, data: &[u8]) {
        match envelope::decode(data) {
            Ok(PeerMessage {
                union: Some(peer_message::Union::MediaEvent(event)),
            }) => {
                if let Err(e) = self.endpoint.receive_media_event(event.data).await {
                    warn!("Media event rejected: {}", e);
                }
            }
            Ok(other) => debug!("Ignoring {} frame", other.name()),
            Err(e) => warn!("Dropping frame: {}", e),
        }
    }
}

async fn send_message<S>(sink: &mut S, message: &PeerMessage) -> Result<()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let frame = envelope::encode(message)?;
    sink.send(Message::Binary(frame.to_vec()))
        .await
        .map_err(|e| ClientError::Transport(format!("websocket send failed: {}", e)))
}

async fn wait_authenticated<S, E>(stream: &mut S) -> Result<()>
where
    S: futures::Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Binary(data)) => match envelope::decode(&data) {
                Ok(PeerMessage {
                    union: Some(peer_message::Union::Authenticated(_)),
                }) => return Ok(()),
                Ok(other) => debug!("Ignoring {} before authentication", other.name()),
                Err(e) => warn!("Dropping frame: {}", e),
            },
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .unwrap_or_else(|| "connection closed".to_string());
                return Err(ClientError::AuthFailed(reason));
            }
            Ok(_) => {}
            Err(e) => return Err(ClientError::Transport(e.to_string())),
        }
    }
    Err(ClientError::AuthFailed("connection closed".to_string()))
}

/// Write out media events already queued on the bus
async fn flush_outbound<S>(events: &mut broadcast::Receiver<EndpointEvent>, sink: &mut S)
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Ok(event) = events.try_recv() {
        if let EndpointEvent::SendMediaEvent { data } = event {
            if let Err(e) = send_message(sink, &PeerMessage::media_event(data)).await {
                debug!("Dropping outbound event on teardown: {}", e);
                return;
            }
        }
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    use super::*;
    use crate::endpoint::EndpointOptions;
    use crate::media_event::{self, ConnectedPayload, MediaEvent};
    use crate::webrtc::mock::MockFactory;

    fn endpoint() -> WebRtcEndpoint {
        let (endpoint, _task) = WebRtcEndpoint::spawn(
            EndpointOptions::default(),
            Arc::new(MockFactory::default()),
            CancellationToken::new(),
        );
        endpoint
    }

    async fn listen() -> (TcpListener, ClientConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            server_url: format!("ws://{}", listener.local_addr().unwrap()),
            token: "secret".to_string(),
            metadata: json!({ "name": "tester" }),
            stats_interval_secs: 0,
            ..Default::default()
        };
        (listener, config)
    }

    async fn next_peer_message<S>(ws: &mut S) -> PeerMessage
    where
        S: futures::Stream<Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
    {
        loop {
            if let Message::Binary(data) = ws.next().await.unwrap().unwrap() {
                return envelope::decode(&data).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let (listener, config) = listen().await;
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let request = next_peer_message(&mut ws).await;
            assert_eq!(request, PeerMessage::auth_request("secret"));
            ws.close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "invalid token".into(),
            }))
            .await
            .unwrap();
        });

        let client = SignalingClient::new(config, endpoint());
        let result = client.run_session(&mut Vec::new()).await;
        assert!(matches!(result, Err(ClientError::AuthFailed(reason)) if reason == "invalid token"));
    }

    #[tokio::test]
    async fn test_session_joins_and_leaves() {
        let (listener, config) = listen().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            next_peer_message(&mut ws).await;
            let frame = envelope::encode(&PeerMessage::authenticated()).unwrap();
            ws.send(Message::Binary(frame.to_vec())).await.unwrap();

            let connect = match next_peer_message(&mut ws).await.union {
                Some(peer_message::Union::MediaEvent(event)) => {
                    media_event::deserialize(&event.data).unwrap()
                }
                other => panic!("expected media event, got {:?}", other),
            };
            assert!(matches!(connect, MediaEvent::Connect(_)));

            let connected = media_event::serialize(&MediaEvent::Connected(ConnectedPayload {
                id: "me".to_string(),
                other_endpoints: vec![],
            }))
            .unwrap();
            let frame = envelope::encode(&PeerMessage::media_event(connected)).unwrap();
            ws.send(Message::Binary(frame.to_vec())).await.unwrap();

            // The client says goodbye when shut down
            match next_peer_message(&mut ws).await.union {
                Some(peer_message::Union::MediaEvent(event)) => {
                    assert!(matches!(
                        media_event::deserialize(&event.data).unwrap(),
                        MediaEvent::Disconnect
                    ))
                }
                other => panic!("expected media event, got {:?}", other),
            }
        });

        let client = Arc::new(SignalingClient::new(config, endpoint()));
        let mut events = client.endpoint().subscribe();
        let session = {
            let client = client.clone();
            tokio::spawn(async move { client.run_session(&mut Vec::new()).await })
        };

        loop {
            if let EndpointEvent::Connected { endpoint_id, .. } = events.recv().await.unwrap() {
                assert_eq!(endpoint_id, "me");
                break;
            }
        }
        client.shutdown();

        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::Cancelled);
        server.await.unwrap();
    }
}
