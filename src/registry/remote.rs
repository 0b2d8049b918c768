//! Remote endpoints and their tracks

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, warn};

use super::endpoint::Endpoint;
use crate::error::{ClientError, Result};
use crate::media_event::{EndpointInfo, TrackInfo};
use crate::track::{
    EncodingReason, EndpointId, MediaStreamTrack, MetadataParser, MetadataState,
    RemoteTrackState, TrackContext, TrackId, VadStatus, Variant,
};

pub struct RemoteTrackRegistry {
    endpoints: BTreeMap<EndpointId, Endpoint>,
    /// Flat index: track id to owning endpoint
    track_index: HashMap<TrackId, EndpointId>,
    /// Media line to track id, from the last answer
    mid_to_track_id: BTreeMap<String, TrackId>,
    endpoint_parser: MetadataParser,
    track_parser: MetadataParser,
}

impl RemoteTrackRegistry {
    pub fn new(endpoint_parser: MetadataParser, track_parser: MetadataParser) -> Self {
        Self {
            endpoints: BTreeMap::new(),
            track_index: HashMap::new(),
            mid_to_track_id: BTreeMap::new(),
            endpoint_parser,
            track_parser,
        }
    }

    pub fn endpoints(&self) -> &BTreeMap<EndpointId, Endpoint> {
        &self.endpoints
    }

    pub fn endpoint(&self, endpoint_id: &str) -> Option<&Endpoint> {
        self.endpoints.get(endpoint_id)
    }

    /// Snapshot of every remote track keyed by track id
    pub fn tracks(&self) -> BTreeMap<TrackId, TrackContext> {
        self.endpoints
            .values()
            .flat_map(|endpoint| endpoint.tracks.iter())
            .map(|(id, ctx)| (id.clone(), ctx.clone()))
            .collect()
    }

    pub fn track(&self, track_id: &str) -> Option<&TrackContext> {
        let endpoint_id = self.track_index.get(track_id)?;
        self.endpoints.get(endpoint_id)?.tracks.get(track_id)
    }

    fn track_mut(&mut self, track_id: &str) -> Result<&mut TrackContext> {
        let endpoint_id = self
            .track_index
            .get(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))?;
        self.endpoints
            .get_mut(endpoint_id)
            .and_then(|endpoint| endpoint.tracks.get_mut(track_id))
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))
    }

    fn endpoint_mut(&mut self, endpoint_id: &str) -> Result<&mut Endpoint> {
        self.endpoints
            .get_mut(endpoint_id)
            .ok_or_else(|| ClientError::UnknownEndpoint(endpoint_id.to_string()))
    }

    fn track_context(&self, endpoint_id: &str, track_id: TrackId, info: TrackInfo) -> TrackContext {
        let metadata = MetadataState::parsed(&self.track_parser, info.metadata);
        if let Some(e) = &metadata.metadata_parsing_error {
            warn!("Invalid metadata of remote track {}: {}", track_id, e);
        }
        TrackContext::remote(track_id, endpoint_id.to_string(), metadata, info.simulcast_config)
    }

    /// Fails when any of the announced track ids is already registered
    fn check_new_tracks<'a>(&self, track_ids: impl IntoIterator<Item = &'a TrackId>) -> Result<()> {
        for track_id in track_ids {
            if let Some(owner) = self.track_index.get(track_id) {
                return Err(ClientError::Protocol(format!(
                    "Track {} already announced by endpoint {}",
                    track_id, owner
                )));
            }
        }
        Ok(())
    }

    /// Register an endpoint together with the tracks it announces
    ///
    /// Returns the endpoint snapshot and the contexts of its tracks.
    pub fn add_remote_endpoint(&mut self, info: EndpointInfo) -> Result<(Endpoint, Vec<TrackContext>)> {
        if self.endpoints.contains_key(&info.id) {
            return Err(ClientError::Protocol(format!(
                "Endpoint {} already announced",
                info.id
            )));
        }
        self.check_new_tracks(info.tracks.keys())?;
        let metadata = MetadataState::parsed(&self.endpoint_parser, info.metadata);
        if let Some(e) = &metadata.metadata_parsing_error {
            warn!("Invalid metadata of endpoint {}: {}", info.id, e);
        }
        let endpoint = Endpoint::new(info.id.clone(), info.endpoint_type, metadata);
        self.endpoints.insert(info.id.clone(), endpoint);

        let tracks = if info.tracks.is_empty() {
            Vec::new()
        } else {
            self.add_tracks(&info.id, info.tracks)?
        };
        let snapshot = self.endpoints[&info.id].clone();
        debug!("Remote endpoint {} added with {} tracks", info.id, tracks.len());
        Ok((snapshot, tracks))
    }

    pub fn update_remote_endpoint(&mut self, endpoint_id: &str, metadata: Value) -> Result<Endpoint> {
        let parser = self.endpoint_parser.clone();
        let endpoint = self.endpoint_mut(endpoint_id)?;
        if let Err(e) = endpoint.metadata.apply(&parser, metadata) {
            warn!("Invalid metadata of endpoint {}: {}", endpoint_id, e);
        }
        Ok(endpoint.clone())
    }

    /// Remove an endpoint and every track it owns
    pub fn remove_remote_endpoint(&mut self, endpoint_id: &str) -> Result<(Endpoint, Vec<TrackContext>)> {
        let endpoint = self
            .endpoints
            .remove(endpoint_id)
            .ok_or_else(|| ClientError::UnknownEndpoint(endpoint_id.to_string()))?;
        let tracks: Vec<TrackContext> = endpoint
            .tracks
            .values()
            .map(|ctx| {
                self.track_index.remove(&ctx.track_id);
                let mut ctx = ctx.clone();
                ctx.remote_state = RemoteTrackState::Removed;
                ctx
            })
            .collect();
        self.mid_to_track_id
            .retain(|_, track_id| !endpoint.tracks.contains_key(track_id));
        Ok((endpoint, tracks))
    }

    /// Add announced tracks to an endpoint; nothing changes if any id is taken
    pub fn add_tracks(
        &mut self,
        endpoint_id: &str,
        tracks: BTreeMap<TrackId, TrackInfo>,
    ) -> Result<Vec<TrackContext>> {
        if !self.endpoints.contains_key(endpoint_id) {
            return Err(ClientError::UnknownEndpoint(endpoint_id.to_string()));
        }
        self.check_new_tracks(tracks.keys())?;
        let contexts: Vec<TrackContext> = tracks
            .into_iter()
            .map(|(track_id, info)| self.track_context(endpoint_id, track_id, info))
            .collect();

        let endpoint = self.endpoint_mut(endpoint_id)?;
        for ctx in &contexts {
            endpoint.tracks.insert(ctx.track_id.clone(), ctx.clone());
        }
        for ctx in &contexts {
            self.track_index
                .insert(ctx.track_id.clone(), endpoint_id.to_string());
        }
        Ok(contexts)
    }

    /// Remove tracks of an endpoint; nothing changes unless all are known
    pub fn remove_tracks(&mut self, endpoint_id: &str, track_ids: &[TrackId]) -> Result<Vec<TrackContext>> {
        let endpoint = self.endpoint_mut(endpoint_id)?;
        if let Some(unknown) = track_ids.iter().find(|id| !endpoint.tracks.contains_key(*id)) {
            return Err(ClientError::UnknownTrack(unknown.clone()));
        }
        let mut removed = Vec::with_capacity(track_ids.len());
        for track_id in track_ids {
            if let Some(mut ctx) = endpoint.tracks.remove(track_id) {
                ctx.remote_state = RemoteTrackState::Removed;
                removed.push(ctx);
            }
        }
        for ctx in &removed {
            self.track_index.remove(&ctx.track_id);
        }
        self.mid_to_track_id
            .retain(|_, track_id| !track_ids.contains(track_id));
        Ok(removed)
    }

    pub fn update_remote_track(
        &mut self,
        endpoint_id: &str,
        track_id: &str,
        metadata: Value,
    ) -> Result<TrackContext> {
        let parser = self.track_parser.clone();
        let ctx = self
            .endpoint_mut(endpoint_id)?
            .tracks
            .get_mut(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))?;
        if let Err(e) = ctx.metadata.apply(&parser, metadata) {
            warn!("Invalid metadata of remote track {}: {}", track_id, e);
        }
        Ok(ctx.clone())
    }

    fn owned_track_mut(&mut self, endpoint_id: &str, track_id: &str) -> Result<&mut TrackContext> {
        self.endpoint_mut(endpoint_id)?
            .tracks
            .get_mut(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))
    }

    pub fn disable_remote_track_encoding(
        &mut self,
        endpoint_id: &str,
        track_id: &str,
        variant: Variant,
    ) -> Result<TrackContext> {
        let ctx = self.owned_track_mut(endpoint_id, track_id)?;
        ctx.disabled_encodings.insert(variant);
        Ok(ctx.clone())
    }

    pub fn enable_remote_track_encoding(
        &mut self,
        endpoint_id: &str,
        track_id: &str,
        variant: Variant,
    ) -> Result<TrackContext> {
        let ctx = self.owned_track_mut(endpoint_id, track_id)?;
        ctx.disabled_encodings.remove(&variant);
        Ok(ctx.clone())
    }

    /// Record the encoding the engine now forwards
    pub fn set_remote_track_encoding(
        &mut self,
        endpoint_id: &str,
        track_id: &str,
        variant: Variant,
        reason: EncodingReason,
    ) -> Result<TrackContext> {
        let ctx = self.owned_track_mut(endpoint_id, track_id)?;
        ctx.encoding = Some(variant);
        ctx.encoding_reason = Some(reason);
        Ok(ctx.clone())
    }

    pub fn set_remote_track_vad_status(&mut self, track_id: &str, status: VadStatus) -> Result<TrackContext> {
        let ctx = self.track_mut(track_id)?;
        ctx.vad_status = status;
        Ok(ctx.clone())
    }

    /// Validate a request to receive a given encoding of a remote track
    ///
    /// Returns `None`, after logging, when the track is not simulcast or the
    /// variant is not active on the sender.
    pub fn set_target_remote_track_encoding(&self, track_id: &str, variant: Variant) -> Result<Option<Variant>> {
        let ctx = self
            .track(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))?;
        if !ctx.is_simulcast() {
            warn!("Track {} is not simulcast, ignoring target encoding {}", track_id, variant);
            return Ok(None);
        }
        if !ctx.active_encodings().contains(&variant) {
            warn!(
                "Encoding {} is not active on track {}, ignoring target encoding",
                variant, track_id
            );
            return Ok(None);
        }
        Ok(Some(variant))
    }

    /// Store the media line mapping of the latest answer
    pub fn set_mid_mapping(&mut self, mid_to_track_id: &BTreeMap<String, TrackId>) {
        self.mid_to_track_id = mid_to_track_id
            .iter()
            .filter(|(_, track_id)| self.track_index.contains_key(*track_id))
            .map(|(mid, track_id)| (mid.clone(), track_id.clone()))
            .collect();
        let mids: Vec<(TrackId, String)> = self
            .mid_to_track_id
            .iter()
            .map(|(mid, track_id)| (track_id.clone(), mid.clone()))
            .collect();
        for (track_id, mid) in mids {
            if let Ok(ctx) = self.track_mut(&track_id) {
                ctx.m_line_id = Some(mid);
            }
        }
    }

    /// Bind incoming media to the track negotiated on `mid`
    ///
    /// Returns the snapshot when the track became ready.
    pub fn attach_media(&mut self, mid: &str, media: MediaStreamTrack) -> Option<TrackContext> {
        let Some(track_id) = self.mid_to_track_id.get(mid).cloned() else {
            warn!("Incoming media on unmapped mid {}", mid);
            return None;
        };
        let ctx = self.track_mut(&track_id).ok()?;
        ctx.stream_id = Some(media.stream_id().to_string());
        ctx.kind = Some(media.kind());
        ctx.track = Some(media);
        ctx.remote_state = RemoteTrackState::Ready;
        Some(ctx.clone())
    }

    /// Endpoint track sets and the flat index describe the same tracks
    pub fn check_consistency(&self) -> bool {
        let indexed = self.endpoints.values().map(|e| e.tracks.len()).sum::<usize>();
        indexed == self.track_index.len()
            && self.endpoints.iter().all(|(endpoint_id, endpoint)| {
                endpoint
                    .tracks
                    .keys()
                    .all(|track_id| self.track_index.get(track_id) == Some(endpoint_id))
            })
    }

    pub fn reset(&mut self) {
        self.endpoints.clear();
        self.track_index.clear();
        self.mid_to_track_id.clear();
    }
}
