//! Peer connection backend trait definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use super::config::IceConfiguration;
use super::signaling::{
    ConnectionState, IceCandidate, IceConnectionState, IceGatheringState, SessionDescription,
    SignalingState,
};
use crate::error::Result;
use crate::track::{MediaStreamTrack, TrackKind, Variant};

/// Position of a transceiver in the connection's transceiver list
pub type TransceiverId = usize;

/// Transceiver direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransceiverDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

/// Snapshot of one transceiver
#[derive(Debug, Clone, PartialEq)]
pub struct TransceiverInfo {
    pub id: TransceiverId,
    /// Media line id, assigned once the transceiver was part of an offer
    pub mid: Option<String>,
    pub kind: TrackKind,
    pub direction: TransceiverDirection,
    /// Id of the media track bound to the sender
    pub sender_track_id: Option<String>,
}

/// RTP encoding parameters of a sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderEncoding {
    /// Simulcast layer, `None` for single-encoding senders
    pub rid: Option<Variant>,
    pub active: bool,
    /// Bitrate cap in bps, `None` means unlimited
    pub max_bitrate: Option<u64>,
    pub scale_resolution_down_by: Option<f64>,
}

impl SenderEncoding {
    pub fn single(max_bitrate: Option<u64>) -> Self {
        Self {
            rid: None,
            active: true,
            max_bitrate,
            scale_resolution_down_by: None,
        }
    }

    pub fn layer(variant: Variant, active: bool, max_bitrate: Option<u64>) -> Self {
        Self {
            rid: Some(variant),
            active,
            max_bitrate,
            scale_resolution_down_by: Some(variant.scale_resolution_down_by()),
        }
    }
}

/// Asynchronous notifications of a peer connection
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Locally gathered ICE candidate, to be relayed to the engine
    IceCandidate(IceCandidate),
    SignalingStateChanged(SignalingState),
    IceGatheringStateChanged(IceGatheringState),
    ConnectionStateChanged(ConnectionState),
    IceConnectionStateChanged(IceConnectionState),
    /// Incoming media on the transceiver with the given mid
    Track {
        track: MediaStreamTrack,
        mid: Option<String>,
    },
}

/// Platform peer connection
///
/// One instance per session; a new handshake always gets a new instance.
#[async_trait]
pub trait PeerConnectionBackend: Send + Sync {
    /// Add a transceiver, optionally bound to a local track
    async fn add_transceiver(
        &self,
        kind: TrackKind,
        track: Option<&MediaStreamTrack>,
        direction: TransceiverDirection,
        encodings: Vec<SenderEncoding>,
    ) -> Result<TransceiverId>;

    async fn transceivers(&self) -> Result<Vec<TransceiverInfo>>;

    async fn set_direction(&self, id: TransceiverId, direction: TransceiverDirection) -> Result<()>;

    /// Swap the media bound to a sender without renegotiation
    async fn replace_track(&self, id: TransceiverId, track: Option<&MediaStreamTrack>) -> Result<()>;

    /// Detach the sender of a transceiver
    async fn remove_track(&self, id: TransceiverId) -> Result<()>;

    async fn set_encodings(&self, id: TransceiverId, encodings: &[SenderEncoding]) -> Result<()>;

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    /// Statistics report keyed by report id
    async fn statistics(&self) -> Result<Value>;

    async fn close(&self) -> Result<()>;
}

/// Creates peer connections
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Create a connection whose notifications are pushed into `events`
    async fn create(
        &self,
        ice: IceConfiguration,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Box<dyn PeerConnectionBackend>>;
}
