//! Media event protocol
//!
//! Every message exchanged with the engine is a JSON object of the form
//! `{"type": <name>, "data": <payload>}`. Renegotiation related messages
//! travel inside a `custom` envelope:
//!
//! ```json
//! { "type": "custom", "data": { "type": "sdpAnswer", "data": { ... } } }
//! ```

pub mod types;

pub use types::*;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Top-level media event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum MediaEvent {
    // Client -> engine
    Connect(MetadataPayload),
    Disconnect,
    UpdateEndpointMetadata(MetadataPayload),
    UpdateTrackMetadata(UpdateTrackMetadataPayload),
    DisableTrackEncoding(TrackEncodingPayload),
    EnableTrackEncoding(TrackEncodingPayload),

    // Engine -> client
    Connected(ConnectedPayload),
    EndpointAdded(EndpointInfo),
    EndpointRemoved(EndpointRemovedPayload),
    EndpointUpdated(EndpointUpdatedPayload),
    TracksAdded(TracksAddedPayload),
    TracksRemoved(TracksRemovedPayload),
    TrackUpdated(TrackUpdatedPayload),
    TracksPriority(TracksPriorityPayload),
    TrackEncodingDisabled(RemoteTrackEncodingPayload),
    TrackEncodingEnabled(RemoteTrackEncodingPayload),
    Error(ErrorPayload),

    /// Renegotiation envelope, both directions
    Custom(CustomEvent),
}

/// Messages nested in the `custom` envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum CustomEvent {
    // Client -> engine
    RenegotiateTracks,
    SdpOffer(SdpOfferPayload),
    TrackVariantBitrates(TrackVariantBitratesPayload),
    SetTargetTrackVariant(SetTargetTrackVariantPayload),

    // Both directions
    Candidate(CandidatePayload),

    // Engine -> client
    OfferData(OfferDataPayload),
    SdpAnswer(SdpAnswerPayload),
    EncodingSwitched(EncodingSwitchedPayload),
    VadNotification(VadNotificationPayload),
    BandwidthEstimation(BandwidthEstimationPayload),
}

impl MediaEvent {
    /// Event name as it appears on the wire, for logs
    pub fn name(&self) -> &'static str {
        match self {
            MediaEvent::Connect(_) => "connect",
            MediaEvent::Disconnect => "disconnect",
            MediaEvent::UpdateEndpointMetadata(_) => "updateEndpointMetadata",
            MediaEvent::UpdateTrackMetadata(_) => "updateTrackMetadata",
            MediaEvent::DisableTrackEncoding(_) => "disableTrackEncoding",
            MediaEvent::EnableTrackEncoding(_) => "enableTrackEncoding",
            MediaEvent::Connected(_) => "connected",
            MediaEvent::EndpointAdded(_) => "endpointAdded",
            MediaEvent::EndpointRemoved(_) => "endpointRemoved",
            MediaEvent::EndpointUpdated(_) => "endpointUpdated",
            MediaEvent::TracksAdded(_) => "tracksAdded",
            MediaEvent::TracksRemoved(_) => "tracksRemoved",
            MediaEvent::TrackUpdated(_) => "trackUpdated",
            MediaEvent::TracksPriority(_) => "tracksPriority",
            MediaEvent::TrackEncodingDisabled(_) => "trackEncodingDisabled",
            MediaEvent::TrackEncodingEnabled(_) => "trackEncodingEnabled",
            MediaEvent::Error(_) => "error",
            MediaEvent::Custom(custom) => custom.name(),
        }
    }
}

impl CustomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CustomEvent::RenegotiateTracks => "renegotiateTracks",
            CustomEvent::SdpOffer(_) => "sdpOffer",
            CustomEvent::TrackVariantBitrates(_) => "trackVariantBitrates",
            CustomEvent::SetTargetTrackVariant(_) => "setTargetTrackVariant",
            CustomEvent::Candidate(_) => "candidate",
            CustomEvent::OfferData(_) => "offerData",
            CustomEvent::SdpAnswer(_) => "sdpAnswer",
            CustomEvent::EncodingSwitched(_) => "encodingSwitched",
            CustomEvent::VadNotification(_) => "vadNotification",
            CustomEvent::BandwidthEstimation(_) => "bandwidthEstimation",
        }
    }
}

impl From<CustomEvent> for MediaEvent {
    fn from(custom: CustomEvent) -> Self {
        MediaEvent::Custom(custom)
    }
}

/// Serialize a media event to its wire string
pub fn serialize(event: &MediaEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

/// Parse a wire string into a media event
///
/// Unknown event types and malformed payloads are reported as
/// [`ClientError::Protocol`]; callers log and drop them.
pub fn deserialize(raw: &str) -> Result<MediaEvent> {
    serde_json::from_str(raw).map_err(|e| ClientError::Protocol(format!("invalid media event: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::{EncodingReason, SimulcastConfig, VadStatus, Variant};
    use crate::webrtc::signaling::{IceCandidate, SdpType, SessionDescription};
    use serde_json::json;

    fn round_trip(event: MediaEvent) {
        let wire = serialize(&event).unwrap();
        assert_eq!(deserialize(&wire).unwrap(), event, "wire: {}", wire);
    }

    #[test]
    fn test_connected_from_wire() {
        let raw = r#"{"type":"connected","data":{"id":"me","otherEndpoints":[
            {"id":"peer-1","type":"webrtc","metadata":{"name":"p"},"tracks":{}}]}}"#;
        match deserialize(raw).unwrap() {
            MediaEvent::Connected(payload) => {
                assert_eq!(payload.id, "me");
                assert_eq!(payload.other_endpoints.len(), 1);
                assert_eq!(payload.other_endpoints[0].id, "peer-1");
                assert_eq!(payload.other_endpoints[0].endpoint_type, "webrtc");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_custom_envelope_nesting() {
        let event = MediaEvent::from(CustomEvent::RenegotiateTracks);
        let value: serde_json::Value = serde_json::from_str(&serialize(&event).unwrap()).unwrap();
        assert_eq!(value, json!({"type": "custom", "data": {"type": "renegotiateTracks"}}));

        let raw = r#"{"type":"custom","data":{"type":"bandwidthEstimation","data":{"estimation":500000}}}"#;
        match deserialize(raw).unwrap() {
            MediaEvent::Custom(CustomEvent::BandwidthEstimation(payload)) => {
                assert_eq!(payload.estimation, 500000.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_and_malformed_events_are_errors() {
        assert!(matches!(
            deserialize(r#"{"type":"somethingNew","data":{}}"#),
            Err(ClientError::Protocol(_))
        ));
        assert!(matches!(
            deserialize(r#"{"type":"tracksRemoved","data":{"endpointId":1}}"#),
            Err(ClientError::Protocol(_))
        ));
        assert!(deserialize("not json").is_err());
    }

    fn every_event() -> Vec<MediaEvent> {
        let track_info = TrackInfo {
            metadata: json!({"type": "camera"}),
            simulcast_config: Some(SimulcastConfig::with_encodings([Variant::Low, Variant::High])),
        };
        let peer = EndpointInfo {
            id: "peer".to_string(),
            endpoint_type: "webrtc".to_string(),
            metadata: json!({"name": "p"}),
            tracks: [("peer:t".to_string(), track_info.clone())].into(),
        };
        let encoding = TrackEncodingPayload {
            track_id: "me:abc".to_string(),
            encoding: Variant::Medium,
        };
        let remote_encoding = RemoteTrackEncodingPayload {
            endpoint_id: "peer".to_string(),
            track_id: "peer:t".to_string(),
            encoding: Variant::Low,
        };

        let custom = vec![
            CustomEvent::RenegotiateTracks,
            CustomEvent::SdpOffer(SdpOfferPayload {
                sdp_offer: SessionDescription {
                    sdp_type: SdpType::Offer,
                    sdp: "v=0\r\n".to_string(),
                },
                track_id_to_track_metadata: [("me:abc".to_string(), json!({"type": "camera"}))].into(),
                track_id_to_track_bitrates: [
                    (
                        "me:abc".to_string(),
                        TrackBitrates::Simulcast([(Variant::Low, 150_000), (Variant::High, 2_500_000)].into()),
                    ),
                    ("me:mic".to_string(), TrackBitrates::Single(50_000)),
                ]
                .into(),
                mid_to_track_id: [("0".to_string(), "me:abc".to_string())].into(),
            }),
            CustomEvent::TrackVariantBitrates(TrackVariantBitratesPayload {
                track_id: "me:mic".to_string(),
                variant_bitrates: TrackBitrates::Single(50_000),
            }),
            CustomEvent::SetTargetTrackVariant(SetTargetTrackVariantPayload {
                track_id: "peer:t".to_string(),
                variant: Variant::High,
            }),
            CustomEvent::Candidate(IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 5000 typ host").with_mid("0", 0)),
            CustomEvent::OfferData(OfferDataPayload {
                tracks_types: TracksTypes { audio: 1, video: 2 },
                integrated_turn_servers: vec![IntegratedTurnServer {
                    server_addr: "10.0.0.1".to_string(),
                    server_port: 3478,
                    transport: "tcp".to_string(),
                    username: "u".to_string(),
                    password: "p".to_string(),
                }],
            }),
            CustomEvent::SdpAnswer(SdpAnswerPayload {
                sdp_type: "answer".to_string(),
                sdp: "v=0\r\n".to_string(),
                mid_to_track_id: [("1".to_string(), "peer:t".to_string())].into(),
            }),
            CustomEvent::EncodingSwitched(EncodingSwitchedPayload {
                endpoint_id: "peer".to_string(),
                track_id: "peer:t".to_string(),
                encoding: Variant::Medium,
                reason: EncodingReason::LowBandwidth,
            }),
            CustomEvent::VadNotification(VadNotificationPayload {
                track_id: "peer:t".to_string(),
                status: VadStatus::Speech,
            }),
            CustomEvent::BandwidthEstimation(BandwidthEstimationPayload {
                estimation: 500_000.0,
            }),
        ];

        let mut events = vec![
            MediaEvent::Connect(MetadataPayload {
                metadata: json!({"displayName": "alice"}),
            }),
            MediaEvent::Disconnect,
            MediaEvent::UpdateEndpointMetadata(MetadataPayload { metadata: json!(null) }),
            MediaEvent::UpdateTrackMetadata(UpdateTrackMetadataPayload {
                track_id: "me:abc".to_string(),
                track_metadata: json!({"muted": true}),
            }),
            MediaEvent::DisableTrackEncoding(encoding.clone()),
            MediaEvent::EnableTrackEncoding(encoding),
            MediaEvent::Connected(ConnectedPayload {
                id: "me".to_string(),
                other_endpoints: vec![peer.clone()],
            }),
            MediaEvent::EndpointAdded(peer),
            MediaEvent::EndpointRemoved(EndpointRemovedPayload { id: "peer".to_string() }),
            MediaEvent::EndpointUpdated(EndpointUpdatedPayload {
                endpoint_id: "peer".to_string(),
                metadata: json!({"name": "q"}),
            }),
            MediaEvent::TracksAdded(TracksAddedPayload {
                endpoint_id: "peer".to_string(),
                tracks: [("peer:t2".to_string(), track_info)].into(),
            }),
            MediaEvent::TracksRemoved(TracksRemovedPayload {
                endpoint_id: "peer".to_string(),
                track_ids: vec!["peer:t".to_string(), "peer:t2".to_string()],
            }),
            MediaEvent::TrackUpdated(TrackUpdatedPayload {
                endpoint_id: "peer".to_string(),
                track_id: "peer:t".to_string(),
                metadata: json!({"type": "screen"}),
            }),
            MediaEvent::TracksPriority(TracksPriorityPayload {
                tracks: vec!["peer:t".to_string()],
            }),
            MediaEvent::TrackEncodingDisabled(remote_encoding.clone()),
            MediaEvent::TrackEncodingEnabled(remote_encoding),
            MediaEvent::Error(ErrorPayload {
                message: "boom".to_string(),
            }),
        ];
        events.extend(custom.into_iter().map(MediaEvent::from));
        events
    }

    #[test]
    fn test_round_trip_every_event() {
        let events = every_event();
        assert_eq!(events.len(), 27);

        let mut names = std::collections::BTreeSet::new();
        for event in events {
            assert!(names.insert(event.name()), "duplicate name {}", event.name());

            let value: serde_json::Value = serde_json::from_str(&serialize(&event).unwrap()).unwrap();
            let wire_name = match &event {
                MediaEvent::Custom(_) => {
                    assert_eq!(value["type"], "custom");
                    value["data"]["type"].clone()
                }
                _ => value["type"].clone(),
            };
            assert_eq!(wire_name, event.name());

            round_trip(event);
        }
    }

    #[test]
    fn test_event_names() {
        assert_eq!(MediaEvent::Disconnect.name(), "disconnect");
        assert_eq!(
            MediaEvent::from(CustomEvent::RenegotiateTracks).name(),
            "renegotiateTracks"
        );
    }
}
