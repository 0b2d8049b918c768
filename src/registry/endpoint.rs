use std::collections::BTreeMap;

use serde::Serialize;

use crate::track::{EndpointId, MetadataState, TrackContext, TrackId};

/// Type tag of the local endpoint
pub const WEBRTC_ENDPOINT_TYPE: &str = "webrtc";

/// A participant of the session
///
/// The endpoint's `tracks` map is the only place track contexts are stored;
/// registries index into it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Empty for the local endpoint until `connected`
    pub id: EndpointId,
    /// "webrtc" for peers; other values denote server-side components
    /// (recording, HLS, RTSP, SIP)
    #[serde(rename = "type")]
    pub endpoint_type: String,
    #[serde(flatten)]
    pub metadata: MetadataState,
    pub tracks: BTreeMap<TrackId, TrackContext>,
}

impl Endpoint {
    /// Local endpoint before the server assigned its id
    pub fn local() -> Self {
        Self {
            endpoint_type: WEBRTC_ENDPOINT_TYPE.to_string(),
            ..Default::default()
        }
    }

    pub fn new(id: EndpointId, endpoint_type: String, metadata: MetadataState) -> Self {
        Self {
            id,
            endpoint_type,
            metadata,
            tracks: BTreeMap::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn track(&self, track_id: &str) -> Option<&TrackContext> {
        self.tracks.get(track_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_endpoint_unassigned() {
        let endpoint = Endpoint::local();
        assert!(!endpoint.is_connected());
        assert_eq!(endpoint.endpoint_type, "webrtc");

        let value = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(value["type"], "webrtc");
        assert_eq!(value["id"], "");
    }
}
