//! Track model shared by the local and remote registries
//!
//! - `context`: `TrackContext`, the single record describing one track
//! - `media`: `MediaStreamTrack` handles to live media
//! - `metadata`: pluggable metadata parsing

pub mod context;
pub mod media;
pub mod metadata;

pub use context::TrackContext;
pub use media::{MediaStreamTrack, TrackSource};
pub use metadata::{identity_parser, MetadataParser, MetadataState};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

/// Track identifier
pub type TrackId = String;

/// Endpoint identifier
pub type EndpointId = String;

/// Media kind of a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn from_codec_type(codec_type: RTPCodecType) -> Option<Self> {
        match codec_type {
            RTPCodecType::Audio => Some(Self::Audio),
            RTPCodecType::Video => Some(Self::Video),
            _ => None,
        }
    }

    pub fn codec_type(self) -> RTPCodecType {
        match self {
            Self::Audio => RTPCodecType::Audio,
            Self::Video => RTPCodecType::Video,
        }
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Simulcast encoding (quality variant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variant {
    #[serde(rename = "l")]
    Low,
    #[serde(rename = "m")]
    Medium,
    #[serde(rename = "h")]
    High,
}

impl Variant {
    pub const ALL: [Variant; 3] = [Variant::Low, Variant::Medium, Variant::High];

    /// RTP stream id used on the wire and in sender encodings
    pub fn rid(self) -> &'static str {
        match self {
            Variant::Low => "l",
            Variant::Medium => "m",
            Variant::High => "h",
        }
    }

    pub fn from_rid(rid: &str) -> Option<Self> {
        match rid {
            "l" => Some(Variant::Low),
            "m" => Some(Variant::Medium),
            "h" => Some(Variant::High),
            _ => None,
        }
    }

    /// Resolution divisor of this layer relative to the captured video
    pub fn scale_resolution_down_by(self) -> f64 {
        match self {
            Variant::Low => 4.0,
            Variant::Medium => 2.0,
            Variant::High => 1.0,
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.rid())
    }
}

/// Simulcast configuration of a video track
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulcastConfig {
    pub enabled: bool,
    pub active_encodings: Vec<Variant>,
    pub disabled_encodings: Vec<Variant>,
}

impl SimulcastConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_encodings(active: impl IntoIterator<Item = Variant>) -> Self {
        Self {
            enabled: true,
            active_encodings: active.into_iter().collect(),
            disabled_encodings: vec![],
        }
    }

    pub fn is_active(&self, variant: Variant) -> bool {
        self.active_encodings.contains(&variant)
    }
}

/// Bandwidth limit in kbps; `0` means unlimited
pub type BandwidthLimit = u32;

/// Bandwidth limit of a whole track or per simulcast encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrackBandwidthLimit {
    Single(BandwidthLimit),
    Simulcast(BTreeMap<Variant, BandwidthLimit>),
}

impl Default for TrackBandwidthLimit {
    fn default() -> Self {
        Self::Single(0)
    }
}

/// Negotiation lifecycle of a local track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegotiationStatus {
    /// Never included in an offer
    #[default]
    Awaiting,
    /// Included in an outstanding offer
    Offered,
    /// Confirmed by an answer
    Done,
}

/// Lifecycle of a remote track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteTrackState {
    /// Announced by the server, no media yet
    #[default]
    Created,
    /// Media attached
    Ready,
    Removed,
}

/// Voice activity of an audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadStatus {
    Speech,
    #[default]
    Silence,
}

/// Why the server switched the encoding of a remote track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingReason {
    Other,
    EncodingInactive,
    LowBandwidth,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_serialization() {
        assert_eq!(serde_json::to_string(&Variant::Medium).unwrap(), "\"m\"");
        let v: Variant = serde_json::from_str("\"h\"").unwrap();
        assert_eq!(v, Variant::High);
        assert_eq!(Variant::from_rid("x"), None);
    }

    #[test]
    fn test_bandwidth_limit_untagged() {
        let single: TrackBandwidthLimit = serde_json::from_str("500").unwrap();
        assert_eq!(single, TrackBandwidthLimit::Single(500));

        let per_encoding: TrackBandwidthLimit =
            serde_json::from_str(r#"{"l":150,"h":1500}"#).unwrap();
        match per_encoding {
            TrackBandwidthLimit::Simulcast(map) => {
                assert_eq!(map.get(&Variant::Low), Some(&150));
                assert_eq!(map.get(&Variant::High), Some(&1500));
            }
            other => panic!("unexpected limit {:?}", other),
        }
    }

    #[test]
    fn test_simulcast_config_defaults() {
        let config: SimulcastConfig = serde_json::from_str(r#"{"enabled":true}"#).unwrap();
        assert!(config.enabled);
        assert!(config.active_encodings.is_empty());

        let config = SimulcastConfig::with_encodings([Variant::Low, Variant::High]);
        assert!(config.is_active(Variant::Low));
        assert!(!config.is_active(Variant::Medium));
    }

    #[test]
    fn test_encoding_reason_wire_names() {
        let reason: EncodingReason = serde_json::from_str("\"low_bandwidth\"").unwrap();
        assert_eq!(reason, EncodingReason::LowBandwidth);
    }
}
