//! Payloads of the media events

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::track::{
    EncodingReason, EndpointId, SimulcastConfig, TrackId, VadStatus, Variant,
};
use crate::webrtc::signaling::{IceCandidate, SessionDescription};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataPayload {
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTrackMetadataPayload {
    pub track_id: TrackId,
    #[serde(default)]
    pub track_metadata: Value,
}

/// Local encoding switch sent to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEncodingPayload {
    pub track_id: TrackId,
    pub encoding: Variant,
}

/// Track announced by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulcast_config: Option<SimulcastConfig>,
}

/// Endpoint announced by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub id: EndpointId,
    #[serde(rename = "type", default = "default_endpoint_type")]
    pub endpoint_type: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tracks: BTreeMap<TrackId, TrackInfo>,
}

fn default_endpoint_type() -> String {
    "webrtc".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub id: EndpointId,
    #[serde(default)]
    pub other_endpoints: Vec<EndpointInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRemovedPayload {
    pub id: EndpointId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointUpdatedPayload {
    pub endpoint_id: EndpointId,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracksAddedPayload {
    pub endpoint_id: EndpointId,
    #[serde(default)]
    pub tracks: BTreeMap<TrackId, TrackInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TracksRemovedPayload {
    pub endpoint_id: EndpointId,
    pub track_ids: Vec<TrackId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackUpdatedPayload {
    pub endpoint_id: EndpointId,
    pub track_id: TrackId,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracksPriorityPayload {
    pub tracks: Vec<TrackId>,
}

/// Encoding switch of a remote track, pushed by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTrackEncodingPayload {
    pub endpoint_id: EndpointId,
    pub track_id: TrackId,
    pub encoding: Variant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Number of tracks per kind the engine is going to send
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracksTypes {
    pub audio: u32,
    pub video: u32,
}

/// TURN server operated by the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegratedTurnServer {
    pub server_addr: String,
    pub server_port: u16,
    /// "udp", "tcp" or "tls"
    pub transport: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferDataPayload {
    #[serde(default)]
    pub tracks_types: TracksTypes,
    #[serde(default)]
    pub integrated_turn_servers: Vec<IntegratedTurnServer>,
}

/// Bitrate of a track in bits per second, as a whole or per encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackBitrates {
    Single(u64),
    Simulcast(BTreeMap<Variant, u64>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpOfferPayload {
    pub sdp_offer: SessionDescription,
    pub track_id_to_track_metadata: BTreeMap<TrackId, Value>,
    pub track_id_to_track_bitrates: BTreeMap<TrackId, TrackBitrates>,
    pub mid_to_track_id: BTreeMap<String, TrackId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdpAnswerPayload {
    #[serde(rename = "type", default = "default_answer_type")]
    pub sdp_type: String,
    pub sdp: String,
    #[serde(default)]
    pub mid_to_track_id: BTreeMap<String, TrackId>,
}

fn default_answer_type() -> String {
    "answer".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackVariantBitratesPayload {
    pub track_id: TrackId,
    pub variant_bitrates: TrackBitrates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetTargetTrackVariantPayload {
    pub track_id: TrackId,
    pub variant: Variant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingSwitchedPayload {
    pub endpoint_id: EndpointId,
    pub track_id: TrackId,
    pub encoding: Variant,
    pub reason: EncodingReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadNotificationPayload {
    pub track_id: TrackId,
    pub status: VadStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandwidthEstimationPayload {
    /// Available bitrate in bits per second
    pub estimation: f64,
}

/// ICE candidate relayed in either direction
pub type CandidatePayload = IceCandidate;
