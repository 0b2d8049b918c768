//! Local track registry
//!
//! Owns the local endpoint and its tracks, and computes everything an SDP
//! offer carries besides the SDP itself.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::endpoint::Endpoint;
use crate::config::EndpointConfig;
use crate::error::{ClientError, Result};
use crate::media_event::TrackBitrates;
use crate::track::{
    BandwidthLimit, MediaStreamTrack, MetadataParser, MetadataState, NegotiationStatus,
    SimulcastConfig, TrackBandwidthLimit, TrackContext, TrackId, TrackKind, Variant,
};
use crate::webrtc::SenderEncoding;

/// What to do with a local metadata update
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataUpdate {
    /// Track negotiated, send `updateTrackMetadata` now
    Send(Value),
    /// Offer in flight, sent once the answer is applied
    Buffered,
    /// Never offered, the next offer carries it
    Nothing,
}

/// Result of applying an SDP answer
#[derive(Debug, Default)]
pub struct AnswerOutcome {
    /// Tracks that moved from offered to done
    pub negotiated: Vec<TrackId>,
    /// Metadata buffered while offered
    pub metadata_flush: Vec<(TrackId, Value)>,
    /// Encodings disabled while offered
    pub disabled_encodings: Vec<(TrackId, Variant)>,
}

pub struct LocalTrackRegistry {
    endpoint: Endpoint,
    endpoint_parser: MetadataParser,
    track_parser: MetadataParser,
    pending_metadata: BTreeMap<TrackId, Value>,
    pending_disabled: BTreeMap<TrackId, BTreeSet<Variant>>,
    config: EndpointConfig,
}

impl LocalTrackRegistry {
    pub fn new(
        endpoint_parser: MetadataParser,
        track_parser: MetadataParser,
        config: EndpointConfig,
    ) -> Self {
        Self {
            endpoint: Endpoint::local(),
            endpoint_parser,
            track_parser,
            pending_metadata: BTreeMap::new(),
            pending_disabled: BTreeMap::new(),
            config,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint.id
    }

    /// Assign the server-provided id; only the first assignment of a
    /// session takes effect
    pub fn set_endpoint_id(&mut self, id: &str) -> bool {
        if self.endpoint.is_connected() {
            warn!(
                "Local endpoint already has id {}, ignoring {}",
                self.endpoint.id, id
            );
            return false;
        }
        self.endpoint.id = id.to_string();
        for ctx in self.endpoint.tracks.values_mut() {
            ctx.endpoint_id = id.to_string();
        }
        true
    }

    pub fn track(&self, track_id: &str) -> Option<&TrackContext> {
        self.endpoint.tracks.get(track_id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackContext> {
        self.endpoint.tracks.values()
    }

    fn track_mut(&mut self, track_id: &str) -> Result<&mut TrackContext> {
        self.endpoint
            .tracks
            .get_mut(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))
    }

    pub fn new_track_id(&self) -> TrackId {
        format!("{}:{}", self.endpoint.id, Uuid::new_v4())
    }

    pub fn find_by_media_track(&self, media_track_id: &str) -> Option<&TrackContext> {
        self.tracks()
            .find(|ctx| ctx.media_track_id() == Some(media_track_id))
    }

    /// Run the track metadata parser without storing anything
    pub fn check_track_metadata(&self, metadata: &Value) -> Result<()> {
        (self.track_parser)(metadata)
            .map(|_| ())
            .map_err(ClientError::Metadata)
    }

    /// Usage checks run before a track is added
    pub fn validate_new_track(
        &self,
        track: &MediaStreamTrack,
        simulcast: &SimulcastConfig,
        max_bandwidth: &TrackBandwidthLimit,
    ) -> Result<()> {
        if let Some(existing) = self.find_by_media_track(track.id()) {
            return Err(ClientError::DuplicateTrack(format!(
                "{} (attached as {})",
                track.id(),
                existing.track_id
            )));
        }
        let simulcast_video = simulcast.enabled && track.kind() == TrackKind::Video;
        if !simulcast_video && matches!(max_bandwidth, TrackBandwidthLimit::Simulcast(_)) {
            return Err(ClientError::InvalidBandwidth(
                "per-encoding limits require a simulcast video track".to_string(),
            ));
        }
        Ok(())
    }

    pub fn add_track(
        &mut self,
        track_id: TrackId,
        track: MediaStreamTrack,
        metadata: Value,
        mut simulcast: SimulcastConfig,
        max_bandwidth: TrackBandwidthLimit,
    ) -> Result<TrackContext> {
        self.validate_new_track(&track, &simulcast, &max_bandwidth)?;
        if self.endpoint.tracks.contains_key(&track_id) {
            return Err(ClientError::DuplicateTrack(track_id));
        }
        if simulcast.enabled && track.kind() == TrackKind::Audio {
            warn!("Simulcast is not supported for audio track {}, disabling", track.id());
            simulcast = SimulcastConfig::disabled();
        }

        let mut state = MetadataState::default();
        state
            .apply(&self.track_parser, metadata)
            .map_err(ClientError::Metadata)?;

        let ctx = TrackContext::local(
            track_id.clone(),
            self.endpoint.id.clone(),
            track,
            state,
            simulcast,
            max_bandwidth,
        );
        self.endpoint.tracks.insert(track_id, ctx.clone());
        Ok(ctx)
    }

    pub fn remove_track(&mut self, track_id: &str) -> Result<TrackContext> {
        let ctx = self
            .endpoint
            .tracks
            .remove(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))?;
        self.pending_metadata.remove(track_id);
        self.pending_disabled.remove(track_id);
        Ok(ctx)
    }

    /// Swap the media of a track, keeping its id and media line
    ///
    /// Returns the previous media, `None` when the track was muted.
    pub fn replace_track(
        &mut self,
        track_id: &str,
        track: Option<MediaStreamTrack>,
    ) -> Result<Option<MediaStreamTrack>> {
        let ctx = self.track_mut(track_id)?;
        if let Some(new) = &track {
            if ctx.kind.is_some_and(|kind| kind != new.kind()) {
                warn!("Replacing media of track {} with a {} track", track_id, new.kind());
            }
            ctx.stream_id = Some(new.stream_id().to_string());
        }
        Ok(std::mem::replace(&mut ctx.track, track))
    }

    pub fn set_track_bandwidth(&mut self, track_id: &str, limit: BandwidthLimit) -> Result<()> {
        let ctx = self.track_mut(track_id)?;
        ctx.max_bandwidth = TrackBandwidthLimit::Single(limit);
        Ok(())
    }

    pub fn set_encoding_bandwidth(
        &mut self,
        track_id: &str,
        variant: Variant,
        limit: BandwidthLimit,
    ) -> Result<()> {
        let ctx = self.track_mut(track_id)?;
        if !ctx.is_simulcast() {
            return Err(ClientError::NotSimulcast(track_id.to_string()));
        }
        match &mut ctx.max_bandwidth {
            TrackBandwidthLimit::Simulcast(limits) => {
                limits.insert(variant, limit);
            }
            single => {
                *single = TrackBandwidthLimit::Simulcast(BTreeMap::from([(variant, limit)]));
            }
        }
        Ok(())
    }

    pub fn update_endpoint_metadata(&mut self, metadata: Value) -> Result<()> {
        self.endpoint
            .metadata
            .apply(&self.endpoint_parser, metadata)
            .map_err(ClientError::Metadata)
    }

    pub fn update_track_metadata(&mut self, track_id: &str, metadata: Value) -> Result<MetadataUpdate> {
        let parser = self.track_parser.clone();
        let ctx = self.track_mut(track_id)?;
        ctx.metadata
            .apply(&parser, metadata.clone())
            .map_err(ClientError::Metadata)?;
        let status = ctx.negotiation_status;
        Ok(match status {
            NegotiationStatus::Done => MetadataUpdate::Send(metadata),
            NegotiationStatus::Offered => {
                self.pending_metadata.insert(track_id.to_string(), metadata);
                MetadataUpdate::Buffered
            }
            NegotiationStatus::Awaiting => MetadataUpdate::Nothing,
        })
    }

    fn check_encoding(ctx: &TrackContext, variant: Variant) -> Result<()> {
        if !ctx.is_simulcast() {
            return Err(ClientError::NotSimulcast(ctx.track_id.clone()));
        }
        if !ctx.active_encodings().contains(&variant) {
            return Err(ClientError::InvalidEncoding {
                track_id: ctx.track_id.clone(),
                encoding: variant.to_string(),
            });
        }
        Ok(())
    }

    /// Mark a simulcast layer as disabled
    ///
    /// Returns the negotiation status; while `offered` the change is held
    /// back until the answer is applied.
    pub fn disable_track_encoding(&mut self, track_id: &str, variant: Variant) -> Result<NegotiationStatus> {
        let ctx = self.track_mut(track_id)?;
        Self::check_encoding(ctx, variant)?;
        ctx.disabled_encodings.insert(variant);
        let status = ctx.negotiation_status;
        if status == NegotiationStatus::Offered {
            self.pending_disabled
                .entry(track_id.to_string())
                .or_default()
                .insert(variant);
        }
        Ok(status)
    }

    pub fn enable_track_encoding(&mut self, track_id: &str, variant: Variant) -> Result<NegotiationStatus> {
        let ctx = self.track_mut(track_id)?;
        Self::check_encoding(ctx, variant)?;
        ctx.disabled_encodings.remove(&variant);
        let status = ctx.negotiation_status;
        if let Some(pending) = self.pending_disabled.get_mut(track_id) {
            pending.remove(&variant);
        }
        Ok(status)
    }

    /// Sender encodings derived from the simulcast config, the disabled
    /// layers and the bandwidth limit
    pub fn sender_encodings(&self, track_id: &str) -> Result<Vec<SenderEncoding>> {
        let ctx = self
            .track(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))?;
        if !ctx.is_simulcast() {
            let max_bitrate = match ctx.max_bandwidth {
                TrackBandwidthLimit::Single(limit) => kbps_to_bps(limit),
                TrackBandwidthLimit::Simulcast(_) => None,
            };
            return Ok(vec![SenderEncoding::single(max_bitrate)]);
        }

        let limits = layer_limits(ctx);
        Ok(Variant::ALL
            .iter()
            .map(|&variant| {
                let active = ctx.active_encodings().contains(&variant)
                    && !ctx.disabled_encodings.contains(&variant);
                SenderEncoding::layer(variant, active, limits.get(&variant).copied().flatten())
            })
            .collect())
    }

    /// Bitrates announced to the engine for one track (bps)
    pub fn track_bitrates(&self, track_id: &str) -> Result<TrackBitrates> {
        let ctx = self
            .track(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))?;
        if !ctx.is_simulcast() {
            let limit = match ctx.max_bandwidth {
                TrackBandwidthLimit::Single(limit) => kbps_to_bps(limit),
                TrackBandwidthLimit::Simulcast(_) => None,
            };
            let default = match ctx.kind {
                Some(TrackKind::Audio) => self.config.default_audio_bitrate,
                _ => self.config.default_video_bitrate,
            };
            return Ok(TrackBitrates::Single(limit.unwrap_or(default)));
        }

        let limits = layer_limits(ctx);
        let defaults = self.config.simulcast_bitrates;
        Ok(TrackBitrates::Simulcast(
            Variant::ALL
                .iter()
                .map(|&variant| {
                    let default = match variant {
                        Variant::Low => defaults.low,
                        Variant::Medium => defaults.medium,
                        Variant::High => defaults.high,
                    };
                    let bitrate = limits.get(&variant).copied().flatten().unwrap_or(default);
                    (variant, bitrate)
                })
                .collect(),
        ))
    }

    pub fn track_id_to_bitrates(&self) -> BTreeMap<TrackId, TrackBitrates> {
        self.endpoint
            .tracks
            .keys()
            .filter_map(|id| Some((id.clone(), self.track_bitrates(id).ok()?)))
            .collect()
    }

    pub fn track_id_to_metadata(&self) -> BTreeMap<TrackId, Value> {
        self.tracks()
            .map(|ctx| (ctx.track_id.clone(), ctx.metadata.raw_metadata.clone()))
            .collect()
    }

    /// Mid to track id mapping for the next offer
    ///
    /// Union of the mids of the senders attached on the connection and the
    /// mids of tracks already negotiated.
    pub fn mid_to_track_id(&self, sender_mids: &HashMap<TrackId, String>) -> BTreeMap<String, TrackId> {
        let mut mapping: BTreeMap<String, TrackId> = sender_mids
            .iter()
            .filter(|(track_id, _)| self.endpoint.tracks.contains_key(*track_id))
            .map(|(track_id, mid)| (mid.clone(), track_id.clone()))
            .collect();
        for ctx in self.tracks() {
            if let Some(mid) = &ctx.m_line_id {
                mapping.entry(mid.clone()).or_insert_with(|| ctx.track_id.clone());
            }
        }
        mapping
    }

    pub fn has_awaiting(&self) -> bool {
        self.tracks()
            .any(|ctx| ctx.negotiation_status == NegotiationStatus::Awaiting)
    }

    /// Move every awaiting track to offered
    pub fn mark_offered(&mut self) -> Vec<TrackId> {
        let mut offered = Vec::new();
        for ctx in self.endpoint.tracks.values_mut() {
            if ctx.negotiation_status == NegotiationStatus::Awaiting {
                ctx.negotiation_status = NegotiationStatus::Offered;
                offered.push(ctx.track_id.clone());
            }
        }
        offered
    }

    /// Complete the negotiation of offered tracks referenced by the answer
    pub fn apply_answer(&mut self, mid_to_track_id: &BTreeMap<String, TrackId>) -> AnswerOutcome {
        let mut outcome = AnswerOutcome::default();
        for (mid, track_id) in mid_to_track_id {
            if let Some(ctx) = self.endpoint.tracks.get_mut(track_id) {
                ctx.m_line_id = Some(mid.clone());
            }
        }

        for ctx in self.endpoint.tracks.values_mut() {
            if ctx.negotiation_status != NegotiationStatus::Offered {
                continue;
            }
            if ctx.m_line_id.is_none() {
                warn!("Answer did not negotiate track {}", ctx.track_id);
                ctx.negotiation_status = NegotiationStatus::Awaiting;
                continue;
            }
            ctx.negotiation_status = NegotiationStatus::Done;
            outcome.negotiated.push(ctx.track_id.clone());

            if let Some(metadata) = self.pending_metadata.remove(&ctx.track_id) {
                outcome.metadata_flush.push((ctx.track_id.clone(), metadata));
            }
            if let Some(variants) = self.pending_disabled.remove(&ctx.track_id) {
                outcome
                    .disabled_encodings
                    .extend(variants.into_iter().map(|v| (ctx.track_id.clone(), v)));
            }
        }
        debug!("Answer negotiated {} local tracks", outcome.negotiated.len());
        outcome
    }

    /// Drop tracks, buffered updates and the endpoint id
    pub fn reset(&mut self) {
        self.endpoint = Endpoint::local();
        self.pending_metadata.clear();
        self.pending_disabled.clear();
    }
}

fn kbps_to_bps(limit: BandwidthLimit) -> Option<u64> {
    (limit > 0).then(|| u64::from(limit) * 1024)
}

/// Per-layer bitrate caps of a simulcast track (bps, `None` = unlimited)
///
/// A single limit is split across the active layers proportionally to
/// the pixel count of each layer.
fn layer_limits(ctx: &TrackContext) -> BTreeMap<Variant, Option<u64>> {
    match &ctx.max_bandwidth {
        TrackBandwidthLimit::Simulcast(limits) => limits
            .iter()
            .map(|(variant, limit)| (*variant, kbps_to_bps(*limit)))
            .collect(),
        TrackBandwidthLimit::Single(limit) => {
            let Some(total) = kbps_to_bps(*limit) else {
                return BTreeMap::new();
            };
            let active = ctx.active_encodings();
            let weight = |v: &Variant| 1.0 / v.scale_resolution_down_by().powi(2);
            let weights: f64 = active.iter().map(weight).sum();
            active
                .iter()
                .map(|v| (*v, Some((total as f64 * weight(v) / weights).round() as u64)))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::identity_parser;
    use serde_json::json;

    fn registry() -> LocalTrackRegistry {
        let mut registry =
            LocalTrackRegistry::new(identity_parser(), identity_parser(), EndpointConfig::default());
        registry.set_endpoint_id("me");
        registry
    }

    fn add(registry: &mut LocalTrackRegistry, media: &str, kind: TrackKind, simulcast: SimulcastConfig) -> TrackId {
        let id = registry.new_track_id();
        registry
            .add_track(
                id.clone(),
                MediaStreamTrack::detached(media, kind, "stream"),
                json!({"type": media}),
                simulcast,
                TrackBandwidthLimit::default(),
            )
            .unwrap();
        id
    }

    fn simulcast_lh() -> SimulcastConfig {
        SimulcastConfig::with_encodings([Variant::Low, Variant::High])
    }

    #[test]
    fn test_track_id_prefixed_by_endpoint() {
        let registry = registry();
        let id = registry.new_track_id();
        assert!(id.starts_with("me:"));
        assert!(Uuid::parse_str(&id[3..]).is_ok());
    }

    #[test]
    fn test_duplicate_attach_rejected() {
        let mut registry = registry();
        add(&mut registry, "cam", TrackKind::Video, SimulcastConfig::disabled());
        let result = registry.add_track(
            registry.new_track_id(),
            MediaStreamTrack::detached("cam", TrackKind::Video, "stream"),
            json!(null),
            SimulcastConfig::disabled(),
            TrackBandwidthLimit::default(),
        );
        assert!(matches!(result, Err(ClientError::DuplicateTrack(_))));
    }

    #[test]
    fn test_simulcast_limit_on_plain_track_rejected() {
        let registry = registry();
        let result = registry.validate_new_track(
            &MediaStreamTrack::detached("mic", TrackKind::Audio, "s"),
            &SimulcastConfig::disabled(),
            &TrackBandwidthLimit::Simulcast(BTreeMap::from([(Variant::Low, 100)])),
        );
        assert!(matches!(result, Err(ClientError::InvalidBandwidth(_))));
    }

    #[test]
    fn test_local_metadata_errors_propagate() {
        let parser: MetadataParser = std::sync::Arc::new(
            |_: &Value| -> std::result::Result<Value, String> { Err("bad".to_string()) },
        );
        let mut registry = LocalTrackRegistry::new(parser.clone(), parser, EndpointConfig::default());
        assert!(matches!(
            registry.update_endpoint_metadata(json!({})),
            Err(ClientError::Metadata(_))
        ));
        let result = registry.add_track(
            "t".into(),
            MediaStreamTrack::detached("cam", TrackKind::Video, "s"),
            json!({}),
            SimulcastConfig::disabled(),
            TrackBandwidthLimit::default(),
        );
        assert!(matches!(result, Err(ClientError::Metadata(_))));
    }

    #[test]
    fn test_default_bitrates() {
        let mut registry = registry();
        let audio = add(&mut registry, "mic", TrackKind::Audio, SimulcastConfig::disabled());
        let video = add(&mut registry, "cam", TrackKind::Video, SimulcastConfig::disabled());
        let sim = add(&mut registry, "screen", TrackKind::Video, simulcast_lh());

        assert_eq!(registry.track_bitrates(&audio).unwrap(), TrackBitrates::Single(50_000));
        assert_eq!(registry.track_bitrates(&video).unwrap(), TrackBitrates::Single(2_500_000));
        assert_eq!(
            registry.track_bitrates(&sim).unwrap(),
            TrackBitrates::Simulcast(BTreeMap::from([
                (Variant::Low, 150_000),
                (Variant::Medium, 500_000),
                (Variant::High, 2_500_000),
            ]))
        );
    }

    #[test]
    fn test_bandwidth_limits_in_kbps() {
        let mut registry = registry();
        let video = add(&mut registry, "cam", TrackKind::Video, SimulcastConfig::disabled());
        registry.set_track_bandwidth(&video, 1000).unwrap();
        assert_eq!(registry.track_bitrates(&video).unwrap(), TrackBitrates::Single(1_024_000));
        assert_eq!(
            registry.sender_encodings(&video).unwrap(),
            vec![SenderEncoding::single(Some(1_024_000))]
        );

        assert!(matches!(
            registry.set_encoding_bandwidth(&video, Variant::Low, 100),
            Err(ClientError::NotSimulcast(_))
        ));
    }

    #[test]
    fn test_single_limit_split_across_layers() {
        let mut registry = registry();
        let sim = add(&mut registry, "cam", TrackKind::Video, simulcast_lh());
        // l weighs 1/16, h weighs 1: 17 parts of 1088 kbps * 1024
        registry.set_track_bandwidth(&sim, 1088).unwrap();
        let encodings = registry.sender_encodings(&sim).unwrap();
        assert_eq!(encodings[0].max_bitrate, Some(65_536));
        assert_eq!(encodings[1].max_bitrate, None);
        assert!(!encodings[1].active);
        assert_eq!(encodings[2].max_bitrate, Some(1_048_576));

        registry.set_encoding_bandwidth(&sim, Variant::Low, 100).unwrap();
        match registry.track_bitrates(&sim).unwrap() {
            TrackBitrates::Simulcast(rates) => {
                assert_eq!(rates[&Variant::Low], 102_400);
                assert_eq!(rates[&Variant::High], 2_500_000);
            }
            other => panic!("unexpected bitrates {:?}", other),
        }
    }

    #[test]
    fn test_metadata_update_by_status() {
        let mut registry = registry();
        let id = add(&mut registry, "cam", TrackKind::Video, SimulcastConfig::disabled());

        assert_eq!(
            registry.update_track_metadata(&id, json!({"v": 1})).unwrap(),
            MetadataUpdate::Nothing
        );

        registry.mark_offered();
        assert_eq!(
            registry.update_track_metadata(&id, json!({"v": 2})).unwrap(),
            MetadataUpdate::Buffered
        );

        let outcome = registry.apply_answer(&BTreeMap::from([("0".to_string(), id.clone())]));
        assert_eq!(outcome.metadata_flush, vec![(id.clone(), json!({"v": 2}))]);

        // Flushed exactly once
        let again = registry.apply_answer(&BTreeMap::from([("0".to_string(), id.clone())]));
        assert!(again.metadata_flush.is_empty());

        assert_eq!(
            registry.update_track_metadata(&id, json!({"v": 3})).unwrap(),
            MetadataUpdate::Send(json!({"v": 3}))
        );
    }

    #[test]
    fn test_answer_assigns_mids() {
        let mut registry = registry();
        let a = add(&mut registry, "cam", TrackKind::Video, SimulcastConfig::disabled());
        let b = add(&mut registry, "mic", TrackKind::Audio, SimulcastConfig::disabled());
        assert_eq!(registry.mark_offered().len(), 2);

        let outcome = registry.apply_answer(&BTreeMap::from([("0".to_string(), a.clone())]));
        assert_eq!(outcome.negotiated, vec![a.clone()]);
        assert_eq!(registry.track(&a).unwrap().negotiation_status, NegotiationStatus::Done);
        // Not in the answer: back to awaiting for the next offer
        assert_eq!(registry.track(&b).unwrap().negotiation_status, NegotiationStatus::Awaiting);

        // Every done track has a mid present in the mapping
        let mapping = registry.mid_to_track_id(&HashMap::new());
        for ctx in registry.tracks() {
            if ctx.negotiation_status == NegotiationStatus::Done {
                let mid = ctx.m_line_id.as_ref().unwrap();
                assert_eq!(mapping.get(mid), Some(&ctx.track_id));
            }
        }
    }

    #[test]
    fn test_mid_mapping_union() {
        let mut registry = registry();
        let muted = add(&mut registry, "mic", TrackKind::Audio, SimulcastConfig::disabled());
        registry.mark_offered();
        registry.apply_answer(&BTreeMap::from([("1".to_string(), muted.clone())]));
        registry.replace_track(&muted, None).unwrap();
        let cam = add(&mut registry, "cam", TrackKind::Video, SimulcastConfig::disabled());

        let sender_mids = HashMap::from([
            (cam.clone(), "2".to_string()),
            ("gone".to_string(), "5".to_string()),
        ]);
        let mapping = registry.mid_to_track_id(&sender_mids);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("2"), Some(&cam));
        assert_eq!(mapping.get("1"), Some(&muted));
    }

    #[test]
    fn test_disable_while_offered_is_deferred() {
        let mut registry = registry();
        let id = add(&mut registry, "cam", TrackKind::Video, simulcast_lh());
        registry.mark_offered();

        assert_eq!(
            registry.disable_track_encoding(&id, Variant::Low).unwrap(),
            NegotiationStatus::Offered
        );
        assert!(matches!(
            registry.disable_track_encoding(&id, Variant::Medium),
            Err(ClientError::InvalidEncoding { .. })
        ));

        let outcome = registry.apply_answer(&BTreeMap::from([("0".to_string(), id.clone())]));
        assert_eq!(outcome.disabled_encodings, vec![(id.clone(), Variant::Low)]);
        assert!(!registry.sender_encodings(&id).unwrap()[0].active);
    }

    #[test]
    fn test_replace_keeps_identity() {
        let mut registry = registry();
        let id = add(&mut registry, "cam", TrackKind::Video, SimulcastConfig::disabled());
        registry.mark_offered();
        registry.apply_answer(&BTreeMap::from([("3".to_string(), id.clone())]));

        let previous = registry
            .replace_track(&id, Some(MediaStreamTrack::detached("cam2", TrackKind::Video, "s2")))
            .unwrap();
        assert_eq!(previous.unwrap().id(), "cam");

        let ctx = registry.track(&id).unwrap();
        assert_eq!(ctx.m_line_id.as_deref(), Some("3"));
        assert_eq!(ctx.media_track_id(), Some("cam2"));
        assert!(matches!(
            registry.remove_track("nope"),
            Err(ClientError::UnknownTrack(_))
        ));
    }
}
