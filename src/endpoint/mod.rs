//! WebRTC endpoint
//!
//! [`WebRtcEndpoint`] is a cheap, cloneable handle to an actor task that
//! exclusively owns the session: both registries, the peer connection and
//! the command queue. Every public operation is a message to that task.
//!
//! ```text
//! WebRtcEndpoint --EndpointMessage--> EndpointActor
//!                                        |-- LocalTrackRegistry
//!                                        |-- RemoteTrackRegistry
//!                                        |-- CommandQueue<TrackCommand>
//!                                        '-- Connection <--ConnectionEvent-- backend
//! ```
//!
//! Outbound media events are published as [`EndpointEvent::SendMediaEvent`];
//! inbound ones are fed with [`WebRtcEndpoint::receive_media_event`].

mod actor;
pub mod command_queue;
mod commands;
mod negotiation;
mod remote_events;

pub use command_queue::{NegotiationState, ResolutionPolicy};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ClientConfig, EndpointConfig, IceConfig};
use crate::error::{ClientError, Result};
use crate::events::{EndpointEvent, EventBus};
use crate::registry::Endpoint;
use crate::track::{
    identity_parser, BandwidthLimit, EndpointId, MediaStreamTrack, MetadataParser,
    SimulcastConfig, TrackBandwidthLimit, TrackContext, TrackId, Variant,
};
use crate::webrtc::{ConnectionFactory, WebRtcConnectionFactory};

use actor::EndpointActor;
use command_queue::Responder;
use commands::TrackCommand;

/// Mailbox size of the endpoint actor
const ENDPOINT_CHANNEL_BUFFER: usize = 256;

/// Construction parameters of an endpoint
#[derive(Clone)]
pub struct EndpointOptions {
    pub endpoint: EndpointConfig,
    pub ice: IceConfig,
    pub endpoint_metadata_parser: MetadataParser,
    pub track_metadata_parser: MetadataParser,
}

impl EndpointOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            ice: config.ice.clone(),
            ..Default::default()
        }
    }
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            ice: IceConfig::default(),
            endpoint_metadata_parser: identity_parser(),
            track_metadata_parser: identity_parser(),
        }
    }
}

/// Messages handled by the endpoint actor
pub(crate) enum EndpointMessage {
    Connect {
        metadata: Value,
        respond_to: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        respond_to: oneshot::Sender<()>,
    },
    /// Track mutation going through the command queue
    Enqueue {
        command: TrackCommand,
        responder: Responder,
    },
    SetTargetTrackEncoding {
        track_id: TrackId,
        variant: Variant,
        respond_to: oneshot::Sender<Result<()>>,
    },
    SetTrackEncodingEnabled {
        track_id: TrackId,
        variant: Variant,
        enabled: bool,
        respond_to: oneshot::Sender<Result<()>>,
    },
    UpdateEndpointMetadata {
        metadata: Value,
        respond_to: oneshot::Sender<Result<()>>,
    },
    UpdateTrackMetadata {
        track_id: TrackId,
        metadata: Value,
        respond_to: oneshot::Sender<Result<()>>,
    },
    GetRemoteTracks {
        respond_to: oneshot::Sender<BTreeMap<TrackId, TrackContext>>,
    },
    GetRemoteEndpoints {
        respond_to: oneshot::Sender<BTreeMap<EndpointId, Endpoint>>,
    },
    GetLocalEndpoint {
        respond_to: oneshot::Sender<Endpoint>,
    },
    GetBandwidthEstimation {
        respond_to: oneshot::Sender<u64>,
    },
    GetStatistics {
        track_id: Option<TrackId>,
        respond_to: oneshot::Sender<Result<Value>>,
    },
    ReceiveMediaEvent {
        data: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
}

/// Handle to the endpoint actor
#[derive(Clone)]
pub struct WebRtcEndpoint {
    sender: mpsc::Sender<EndpointMessage>,
    events: EventBus,
    cancel_token: CancellationToken,
}

impl WebRtcEndpoint {
    /// Spawn an endpoint backed by webrtc-rs peer connections
    pub fn new(options: EndpointOptions) -> (Self, JoinHandle<()>) {
        Self::spawn(options, Arc::new(WebRtcConnectionFactory), CancellationToken::new())
    }

    /// Spawn an endpoint creating its peer connections through `factory`
    pub fn spawn(
        options: EndpointOptions,
        factory: Arc<dyn ConnectionFactory>,
        cancel_token: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ENDPOINT_CHANNEL_BUFFER);
        let events = EventBus::with_capacity(options.endpoint.event_capacity);

        let actor = EndpointActor::new(
            options,
            receiver,
            events.clone(),
            factory,
            cancel_token.clone(),
        );
        let task = tokio::spawn(actor.run());

        (
            Self {
                sender,
                events,
                cancel_token,
            },
            task,
        )
    }

    async fn send(&self, message: EndpointMessage) -> Result<()> {
        self.sender
            .send(message)
            .await
            .map_err(|e| ClientError::Internal(format!("channel send failed: {}", e)))
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EndpointMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await
            .map_err(|e| ClientError::Internal(format!("response receive failed: {}", e)))
    }

    /// Subscribe to endpoint events
    pub fn subscribe(&self) -> broadcast::Receiver<EndpointEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Ask the engine to join with the given endpoint metadata
    pub async fn connect(&self, metadata: Value) -> Result<()> {
        self.request(|respond_to| EndpointMessage::Connect {
            metadata,
            respond_to,
        })
        .await?
    }

    /// Leave the session, close the connection and drop all state
    pub async fn disconnect(&self) -> Result<()> {
        self.request(|respond_to| EndpointMessage::Disconnect { respond_to })
            .await
    }

    async fn enqueue_unit(&self, command: TrackCommand) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(EndpointMessage::Enqueue {
            command,
            responder: Responder::Unit(tx),
        })
        .await?;
        rx.await
            .map_err(|e| ClientError::Internal(format!("response receive failed: {}", e)))?
    }

    /// Publish a local track
    ///
    /// The id is returned once the engine accepted the track, or right
    /// away while the session is not established yet.
    pub async fn add_track(
        &self,
        track: MediaStreamTrack,
        metadata: Value,
        simulcast: SimulcastConfig,
        max_bandwidth: TrackBandwidthLimit,
    ) -> Result<TrackId> {
        let (tx, rx) = oneshot::channel();
        self.send(EndpointMessage::Enqueue {
            command: TrackCommand::AddTrack {
                // Assigned by the actor when the command is queued
                track_id: TrackId::new(),
                track,
                metadata,
                simulcast,
                max_bandwidth,
            },
            responder: Responder::Track(tx, TrackId::new()),
        })
        .await?;
        rx.await
            .map_err(|e| ClientError::Internal(format!("response receive failed: {}", e)))?
    }

    pub async fn remove_track(&self, track_id: &str) -> Result<()> {
        self.enqueue_unit(TrackCommand::RemoveTrack {
            track_id: track_id.to_string(),
        })
        .await
    }

    /// Swap the media of a track without renegotiation
    ///
    /// `None` mutes the track; its media line stays negotiated.
    pub async fn replace_track(
        &self,
        track_id: &str,
        track: Option<MediaStreamTrack>,
        metadata: Option<Value>,
    ) -> Result<()> {
        self.enqueue_unit(TrackCommand::ReplaceTrack {
            track_id: track_id.to_string(),
            track,
            metadata,
        })
        .await
    }

    /// Limit the bitrate of a track (kbps, 0 = unlimited)
    pub async fn set_track_bandwidth(&self, track_id: &str, bandwidth: BandwidthLimit) -> Result<()> {
        self.enqueue_unit(TrackCommand::SetTrackBandwidth {
            track_id: track_id.to_string(),
            bandwidth,
        })
        .await
    }

    /// Limit the bitrate of one simulcast encoding (kbps, 0 = unlimited)
    pub async fn set_encoding_bandwidth(
        &self,
        track_id: &str,
        variant: Variant,
        bandwidth: BandwidthLimit,
    ) -> Result<()> {
        self.enqueue_unit(TrackCommand::SetEncodingBandwidth {
            track_id: track_id.to_string(),
            variant,
            bandwidth,
        })
        .await
    }

    /// Ask the engine to forward `variant` of a remote simulcast track
    pub async fn set_target_track_encoding(&self, track_id: &str, variant: Variant) -> Result<()> {
        self.request(|respond_to| EndpointMessage::SetTargetTrackEncoding {
            track_id: track_id.to_string(),
            variant,
            respond_to,
        })
        .await?
    }

    pub async fn enable_track_encoding(&self, track_id: &str, variant: Variant) -> Result<()> {
        self.request(|respond_to| EndpointMessage::SetTrackEncodingEnabled {
            track_id: track_id.to_string(),
            variant,
            enabled: true,
            respond_to,
        })
        .await?
    }

    pub async fn disable_track_encoding(&self, track_id: &str, variant: Variant) -> Result<()> {
        self.request(|respond_to| EndpointMessage::SetTrackEncodingEnabled {
            track_id: track_id.to_string(),
            variant,
            enabled: false,
            respond_to,
        })
        .await?
    }

    pub async fn update_endpoint_metadata(&self, metadata: Value) -> Result<()> {
        self.request(|respond_to| EndpointMessage::UpdateEndpointMetadata {
            metadata,
            respond_to,
        })
        .await?
    }

    pub async fn update_track_metadata(&self, track_id: &str, metadata: Value) -> Result<()> {
        self.request(|respond_to| EndpointMessage::UpdateTrackMetadata {
            track_id: track_id.to_string(),
            metadata,
            respond_to,
        })
        .await?
    }

    pub async fn get_remote_tracks(&self) -> Result<BTreeMap<TrackId, TrackContext>> {
        self.request(|respond_to| EndpointMessage::GetRemoteTracks { respond_to })
            .await
    }

    pub async fn get_remote_endpoints(&self) -> Result<BTreeMap<EndpointId, Endpoint>> {
        self.request(|respond_to| EndpointMessage::GetRemoteEndpoints { respond_to })
            .await
    }

    pub async fn get_local_endpoint(&self) -> Result<Endpoint> {
        self.request(|respond_to| EndpointMessage::GetLocalEndpoint { respond_to })
            .await
    }

    /// Last bandwidth estimation from the engine (bps)
    pub async fn get_bandwidth_estimation(&self) -> Result<u64> {
        self.request(|respond_to| EndpointMessage::GetBandwidthEstimation { respond_to })
            .await
    }

    /// Statistics of the peer connection, optionally limited to one track
    pub async fn get_statistics(&self, track_id: Option<&str>) -> Result<Value> {
        self.request(|respond_to| EndpointMessage::GetStatistics {
            track_id: track_id.map(str::to_string),
            respond_to,
        })
        .await?
    }

    /// Feed a serialized media event received from the engine
    ///
    /// Malformed or unknown events are logged and dropped. Events that
    /// reference unknown endpoints or tracks are returned as errors.
    pub async fn receive_media_event(&self, data: impl Into<String>) -> Result<()> {
        let data = data.into();
        self.request(|respond_to| EndpointMessage::ReceiveMediaEvent { data, respond_to })
            .await?
    }

    /// Stop the actor
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}
