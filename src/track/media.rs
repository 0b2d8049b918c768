//! Handles to live media tracks

use std::sync::Arc;

use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::TrackKind;

/// What backs a [`MediaStreamTrack`]
#[derive(Clone)]
pub enum TrackSource {
    /// Locally produced media (camera, microphone, screen, file)
    Local(Arc<dyn TrackLocal + Send + Sync>),
    /// Media received from the engine
    Remote(Arc<TrackRemote>),
    /// No platform object, only identity (used by in-memory backends)
    Detached,
}

/// Opaque handle to one live audio or video track
///
/// Acquisition of the media itself happens outside this crate; the client
/// only needs the identity, the kind and a way to hand the track to the
/// peer connection.
#[derive(Clone)]
pub struct MediaStreamTrack {
    id: String,
    kind: TrackKind,
    stream_id: String,
    source: TrackSource,
}

impl MediaStreamTrack {
    /// Wrap a local webrtc-rs track
    ///
    /// Returns `None` for tracks of unspecified kind.
    pub fn from_local(track: Arc<dyn TrackLocal + Send + Sync>) -> Option<Self> {
        let kind = TrackKind::from_codec_type(track.kind())?;
        Some(Self {
            id: track.id().to_string(),
            kind,
            stream_id: track.stream_id().to_string(),
            source: TrackSource::Local(track),
        })
    }

    /// Wrap a track delivered by `ontrack`
    pub fn from_remote(track: Arc<TrackRemote>) -> Option<Self> {
        let kind = TrackKind::from_codec_type(track.kind())?;
        Some(Self {
            id: track.id().to_string(),
            kind,
            stream_id: track.stream_id().to_string(),
            source: TrackSource::Remote(track),
        })
    }

    /// Identity-only handle
    pub fn detached(id: impl Into<String>, kind: TrackKind, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            stream_id: stream_id.into(),
            source: TrackSource::Detached,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn source(&self) -> &TrackSource {
        &self.source
    }

    /// Local webrtc-rs track, if this handle wraps one
    pub fn local(&self) -> Option<Arc<dyn TrackLocal + Send + Sync>> {
        match &self.source {
            TrackSource::Local(track) => Some(track.clone()),
            _ => None,
        }
    }
}

impl PartialEq for MediaStreamTrack {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MediaStreamTrack {}

impl std::fmt::Debug for MediaStreamTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            TrackSource::Local(_) => "local",
            TrackSource::Remote(_) => "remote",
            TrackSource::Detached => "detached",
        };
        f.debug_struct("MediaStreamTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("stream_id", &self.stream_id)
            .field("source", &source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webrtc::api::media_engine::MIME_TYPE_OPUS;
    use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
    use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

    #[test]
    fn test_from_local_track() {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            "mic".to_owned(),
            "stream-1".to_owned(),
        ));

        let handle = MediaStreamTrack::from_local(track).unwrap();
        assert_eq!(handle.id(), "mic");
        assert_eq!(handle.kind(), TrackKind::Audio);
        assert_eq!(handle.stream_id(), "stream-1");
        assert!(handle.local().is_some());
    }

    #[test]
    fn test_detached_equality_by_id() {
        let a = MediaStreamTrack::detached("cam", TrackKind::Video, "s");
        let b = MediaStreamTrack::detached("cam", TrackKind::Video, "other");
        assert_eq!(a, b);
        assert!(a.local().is_none());
    }
}
