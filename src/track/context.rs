//! Track context - the record describing one local or remote track

use std::collections::BTreeSet;

use serde::Serialize;

use super::{
    EncodingReason, EndpointId, MediaStreamTrack, MetadataState, NegotiationStatus,
    RemoteTrackState, SimulcastConfig, TrackBandwidthLimit, TrackId, TrackKind, VadStatus,
    Variant,
};

/// Negotiation and media state of one track
///
/// Registries own the authoritative copy. Everything handed out to
/// listeners and callers is a snapshot; changes only happen through
/// registry methods.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackContext {
    pub track_id: TrackId,
    /// Owning endpoint
    pub endpoint_id: EndpointId,
    /// Live media, `None` until negotiated (remote) or while muted (local)
    #[serde(skip)]
    pub track: Option<MediaStreamTrack>,
    pub stream_id: Option<String>,
    pub kind: Option<TrackKind>,
    pub simulcast_config: Option<SimulcastConfig>,
    /// Encoding currently received (remote simulcast tracks)
    pub encoding: Option<Variant>,
    pub encoding_reason: Option<EncodingReason>,
    /// Encodings switched off on the sender side
    pub disabled_encodings: BTreeSet<Variant>,
    #[serde(flatten)]
    pub metadata: MetadataState,
    pub max_bandwidth: TrackBandwidthLimit,
    pub vad_status: VadStatus,
    /// Local tracks only
    pub negotiation_status: NegotiationStatus,
    /// Remote tracks only
    pub remote_state: RemoteTrackState,
    /// SDP media line id, known once an answer has been applied
    pub m_line_id: Option<String>,
}

impl TrackContext {
    pub fn local(
        track_id: TrackId,
        endpoint_id: EndpointId,
        track: MediaStreamTrack,
        metadata: MetadataState,
        simulcast_config: SimulcastConfig,
        max_bandwidth: TrackBandwidthLimit,
    ) -> Self {
        let disabled_encodings = simulcast_config.disabled_encodings.iter().copied().collect();
        Self {
            track_id,
            endpoint_id,
            stream_id: Some(track.stream_id().to_string()),
            kind: Some(track.kind()),
            track: Some(track),
            simulcast_config: Some(simulcast_config),
            encoding: None,
            encoding_reason: None,
            disabled_encodings,
            metadata,
            max_bandwidth,
            vad_status: VadStatus::default(),
            negotiation_status: NegotiationStatus::Awaiting,
            remote_state: RemoteTrackState::default(),
            m_line_id: None,
        }
    }

    pub fn remote(
        track_id: TrackId,
        endpoint_id: EndpointId,
        metadata: MetadataState,
        simulcast_config: Option<SimulcastConfig>,
    ) -> Self {
        let disabled_encodings = simulcast_config
            .as_ref()
            .map(|config| config.disabled_encodings.iter().copied().collect())
            .unwrap_or_default();
        Self {
            track_id,
            endpoint_id,
            track: None,
            stream_id: None,
            kind: None,
            simulcast_config,
            encoding: None,
            encoding_reason: None,
            disabled_encodings,
            metadata,
            max_bandwidth: TrackBandwidthLimit::default(),
            vad_status: VadStatus::default(),
            negotiation_status: NegotiationStatus::Awaiting,
            remote_state: RemoteTrackState::Created,
            m_line_id: None,
        }
    }

    pub fn is_simulcast(&self) -> bool {
        self.simulcast_config
            .as_ref()
            .map(|config| config.enabled)
            .unwrap_or(false)
    }

    /// Encodings the sender declared as active
    pub fn active_encodings(&self) -> &[Variant] {
        match &self.simulcast_config {
            Some(config) if config.enabled => &config.active_encodings,
            _ => &[],
        }
    }

    pub fn media_track_id(&self) -> Option<&str> {
        self.track.as_ref().map(|track| track.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::identity_parser;
    use serde_json::json;

    #[test]
    fn test_local_context_starts_awaiting() {
        let track = MediaStreamTrack::detached("cam", TrackKind::Video, "stream");
        let ctx = TrackContext::local(
            "ep:1".into(),
            "ep".into(),
            track,
            MetadataState::parsed(&identity_parser(), json!({"type": "camera"})),
            SimulcastConfig {
                enabled: true,
                active_encodings: vec![Variant::Low, Variant::High],
                disabled_encodings: vec![Variant::Medium],
            },
            TrackBandwidthLimit::Single(0),
        );

        assert_eq!(ctx.negotiation_status, NegotiationStatus::Awaiting);
        assert!(ctx.m_line_id.is_none());
        assert!(ctx.is_simulcast());
        assert_eq!(ctx.active_encodings(), &[Variant::Low, Variant::High]);
        assert!(ctx.disabled_encodings.contains(&Variant::Medium));
        assert_eq!(ctx.media_track_id(), Some("cam"));
    }

    #[test]
    fn test_snapshot_serialization_skips_media() {
        let ctx = TrackContext::remote(
            "t1".into(),
            "peer".into(),
            MetadataState::parsed(&identity_parser(), json!({"a": 1})),
            None,
        );
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["trackId"], "t1");
        assert_eq!(value["metadata"], json!({"a": 1}));
        assert_eq!(value["remoteState"], "created");
        assert!(value.get("track").is_none());
    }
}
