//! Endpoint event types
//!
//! Defines all events the endpoint publishes on its event bus.

use serde::Serialize;
use serde_json::Value;

use crate::registry::Endpoint;
use crate::track::{BandwidthLimit, EndpointId, TrackContext, TrackId, Variant};

/// Endpoint event enumeration
///
/// Events carry snapshots; mutating them has no effect on the endpoint.
/// Serialized as:
/// ```json
/// {
///   "event": "trackReady",
///   "data": { "trackId": "...", ... }
/// }
/// ```
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum EndpointEvent {
    // ============================================================================
    // Session
    // ============================================================================
    /// The engine accepted the connection and assigned the local id
    #[serde(rename = "connected")]
    Connected {
        endpoint_id: EndpointId,
        other_endpoints: Vec<Endpoint>,
    },

    /// `disconnect` was called; the engine is being told
    #[serde(rename = "disconnectRequested")]
    DisconnectRequested,

    /// Session torn down
    #[serde(rename = "disconnected")]
    Disconnected,

    /// The engine reported an error; the session is closed afterwards
    #[serde(rename = "signalingError")]
    SignalingError { message: String },

    /// Peer connection or ICE failed
    #[serde(rename = "connectionError")]
    ConnectionError { message: String },

    /// Serialized media event for the transport
    #[serde(rename = "sendMediaEvent")]
    SendMediaEvent { data: String },

    // ============================================================================
    // Remote tracks
    // ============================================================================
    /// Media of a remote track started flowing
    #[serde(rename = "trackReady")]
    TrackReady(TrackContext),

    #[serde(rename = "trackAdded")]
    TrackAdded(TrackContext),

    #[serde(rename = "trackRemoved")]
    TrackRemoved(TrackContext),

    #[serde(rename = "trackUpdated")]
    TrackUpdated(TrackContext),

    #[serde(rename = "tracksPriorityChanged")]
    TracksPriorityChanged {
        enabled_tracks: Vec<TrackContext>,
        disabled_tracks: Vec<TrackContext>,
    },

    #[serde(rename = "trackEncodingEnabled")]
    TrackEncodingEnabled { track: TrackContext, encoding: Variant },

    #[serde(rename = "trackEncodingDisabled")]
    TrackEncodingDisabled { track: TrackContext, encoding: Variant },

    /// The engine switched the received encoding of a remote track
    #[serde(rename = "encodingChanged")]
    EncodingChanged(TrackContext),

    #[serde(rename = "voiceActivityChanged")]
    VoiceActivityChanged(TrackContext),

    /// A remote encoding was requested through `set_target_track_encoding`
    #[serde(rename = "targetTrackEncodingRequested")]
    TargetTrackEncodingRequested { track_id: TrackId, variant: Variant },

    // ============================================================================
    // Remote endpoints
    // ============================================================================
    #[serde(rename = "endpointAdded")]
    EndpointAdded(Endpoint),

    #[serde(rename = "endpointRemoved")]
    EndpointRemoved(Endpoint),

    #[serde(rename = "endpointUpdated")]
    EndpointUpdated(Endpoint),

    /// Available bitrate estimated by the engine (bps)
    #[serde(rename = "bandwidthEstimationChanged")]
    BandwidthEstimationChanged { estimation: u64 },

    // ============================================================================
    // Local mirror events
    // ============================================================================
    #[serde(rename = "localTrackAdded")]
    LocalTrackAdded(TrackContext),

    #[serde(rename = "localTrackRemoved")]
    LocalTrackRemoved { track_id: TrackId },

    #[serde(rename = "localTrackReplaced")]
    LocalTrackReplaced {
        track_id: TrackId,
        /// Id of the new media track, `None` when muted
        media_track_id: Option<String>,
        metadata: Option<Value>,
    },

    #[serde(rename = "localTrackMuted")]
    LocalTrackMuted { track_id: TrackId },

    #[serde(rename = "localTrackUnmuted")]
    LocalTrackUnmuted { track_id: TrackId },

    #[serde(rename = "localTrackBandwidthSet")]
    LocalTrackBandwidthSet {
        track_id: TrackId,
        bandwidth: BandwidthLimit,
    },

    #[serde(rename = "localTrackEncodingBandwidthSet")]
    LocalTrackEncodingBandwidthSet {
        track_id: TrackId,
        rid: Variant,
        bandwidth: BandwidthLimit,
    },

    #[serde(rename = "localTrackEncodingEnabled")]
    LocalTrackEncodingEnabled { track_id: TrackId, encoding: Variant },

    #[serde(rename = "localTrackEncodingDisabled")]
    LocalTrackEncodingDisabled { track_id: TrackId, encoding: Variant },

    #[serde(rename = "localEndpointMetadataChanged")]
    LocalEndpointMetadataChanged { metadata: Value },

    #[serde(rename = "localTrackMetadataChanged")]
    LocalTrackMetadataChanged { track_id: TrackId, metadata: Value },
}

impl EndpointEvent {
    /// Get the event name (for filtering/logging)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::DisconnectRequested => "disconnectRequested",
            Self::Disconnected => "disconnected",
            Self::SignalingError { .. } => "signalingError",
            Self::ConnectionError { .. } => "connectionError",
            Self::SendMediaEvent { .. } => "sendMediaEvent",
            Self::TrackReady(_) => "trackReady",
            Self::TrackAdded(_) => "trackAdded",
            Self::TrackRemoved(_) => "trackRemoved",
            Self::TrackUpdated(_) => "trackUpdated",
            Self::TracksPriorityChanged { .. } => "tracksPriorityChanged",
            Self::TrackEncodingEnabled { .. } => "trackEncodingEnabled",
            Self::TrackEncodingDisabled { .. } => "trackEncodingDisabled",
            Self::EncodingChanged(_) => "encodingChanged",
            Self::VoiceActivityChanged(_) => "voiceActivityChanged",
            Self::TargetTrackEncodingRequested { .. } => "targetTrackEncodingRequested",
            Self::EndpointAdded(_) => "endpointAdded",
            Self::EndpointRemoved(_) => "endpointRemoved",
            Self::EndpointUpdated(_) => "endpointUpdated",
            Self::BandwidthEstimationChanged { .. } => "bandwidthEstimationChanged",
            Self::LocalTrackAdded(_) => "localTrackAdded",
            Self::LocalTrackRemoved { .. } => "localTrackRemoved",
            Self::LocalTrackReplaced { .. } => "localTrackReplaced",
            Self::LocalTrackMuted { .. } => "localTrackMuted",
            Self::LocalTrackUnmuted { .. } => "localTrackUnmuted",
            Self::LocalTrackBandwidthSet { .. } => "localTrackBandwidthSet",
            Self::LocalTrackEncodingBandwidthSet { .. } => "localTrackEncodingBandwidthSet",
            Self::LocalTrackEncodingEnabled { .. } => "localTrackEncodingEnabled",
            Self::LocalTrackEncodingDisabled { .. } => "localTrackEncodingDisabled",
            Self::LocalEndpointMetadataChanged { .. } => "localEndpointMetadataChanged",
            Self::LocalTrackMetadataChanged { .. } => "localTrackMetadataChanged",
        }
    }

    /// Local mirror events (`local*`)
    pub fn is_local(&self) -> bool {
        self.event_name().starts_with("local")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name() {
        let event = EndpointEvent::BandwidthEstimationChanged { estimation: 500_000 };
        assert_eq!(event.event_name(), "bandwidthEstimationChanged");
        assert!(!event.is_local());

        let event = EndpointEvent::LocalTrackMuted {
            track_id: "t".to_string(),
        };
        assert!(event.is_local());
    }

    #[test]
    fn test_serialization() {
        let event = EndpointEvent::LocalTrackEncodingBandwidthSet {
            track_id: "ep:1".to_string(),
            rid: Variant::Low,
            bandwidth: 150,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "localTrackEncodingBandwidthSet");
        assert_eq!(value["data"]["track_id"], "ep:1");
        assert_eq!(value["data"]["rid"], "l");

        let value = serde_json::to_value(EndpointEvent::Disconnected).unwrap();
        assert_eq!(value["event"], "disconnected");
    }
}
