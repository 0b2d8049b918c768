//! Connection wrapper
//!
//! Owns the single peer connection of a session, the sender bookkeeping
//! (local track id to transceiver) and the last observed connection states.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use super::backend::{
    ConnectionEvent, PeerConnectionBackend, SenderEncoding, TransceiverDirection, TransceiverId,
    TransceiverInfo,
};
use super::signaling::{
    ConnectionState, IceCandidate, IceConnectionState, IceGatheringState, SessionDescription,
    SignalingState,
};
use crate::error::{ClientError, Result};
use crate::media_event::TracksTypes;
use crate::track::{MediaStreamTrack, TrackId, TrackKind, Variant};

/// Sender of one local track
#[derive(Debug, Clone)]
struct Sender {
    transceiver: TransceiverId,
    encodings: Vec<SenderEncoding>,
}

pub struct Connection {
    backend: Box<dyn PeerConnectionBackend>,
    senders: HashMap<TrackId, Sender>,
    signaling_state: SignalingState,
    connection_state: ConnectionState,
    ice_connection_state: IceConnectionState,
    ice_gathering_state: IceGatheringState,
}

impl Connection {
    pub fn new(backend: Box<dyn PeerConnectionBackend>) -> Self {
        Self {
            backend,
            senders: HashMap::new(),
            signaling_state: SignalingState::default(),
            connection_state: ConnectionState::default(),
            ice_connection_state: IceConnectionState::default(),
            ice_gathering_state: IceGatheringState::default(),
        }
    }

    /// Record a state change reported by the backend
    ///
    /// Returns `true` for state changes, which may unblock the command queue.
    pub fn apply_state(&mut self, event: &ConnectionEvent) -> bool {
        match event {
            ConnectionEvent::SignalingStateChanged(state) => self.signaling_state = *state,
            ConnectionEvent::ConnectionStateChanged(state) => self.connection_state = *state,
            ConnectionEvent::IceConnectionStateChanged(state) => self.ice_connection_state = *state,
            ConnectionEvent::IceGatheringStateChanged(state) => self.ice_gathering_state = *state,
            _ => return false,
        }
        true
    }

    /// The connection is in the middle of a transition on every axis
    ///
    /// Signaling not stable, peer connection not connected and ICE not
    /// connected must all hold at once.
    pub fn is_unstable(&self) -> bool {
        self.signaling_state != SignalingState::Stable
            && self.connection_state != ConnectionState::Connected
            && self.ice_connection_state != IceConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    pub fn ice_connection_state(&self) -> IceConnectionState {
        self.ice_connection_state
    }

    pub fn ice_gathering_state(&self) -> IceGatheringState {
        self.ice_gathering_state
    }

    /// Attach a local track as a new send transceiver
    pub async fn add_send_transceiver(
        &mut self,
        track_id: &str,
        kind: TrackKind,
        track: Option<&MediaStreamTrack>,
        encodings: Vec<SenderEncoding>,
    ) -> Result<()> {
        if self.senders.contains_key(track_id) {
            return Err(ClientError::DuplicateTrack(track_id.to_string()));
        }
        let transceiver = self
            .backend
            .add_transceiver(kind, track, TransceiverDirection::SendRecv, encodings.clone())
            .await?;
        debug!("Track {} attached to transceiver #{}", track_id, transceiver);
        self.senders.insert(
            track_id.to_string(),
            Sender {
                transceiver,
                encodings,
            },
        );
        Ok(())
    }

    /// Add receive-only transceivers until there is one per announced track
    pub async fn add_recv_transceivers_if_needed(&mut self, tracks_types: TracksTypes) -> Result<()> {
        let transceivers = self.backend.transceivers().await?;
        for (kind, wanted) in [
            (TrackKind::Audio, tracks_types.audio),
            (TrackKind::Video, tracks_types.video),
        ] {
            let existing = transceivers
                .iter()
                .filter(|t| t.kind == kind && t.direction == TransceiverDirection::RecvOnly)
                .count() as u32;
            for _ in existing..wanted {
                self.backend
                    .add_transceiver(kind, None, TransceiverDirection::RecvOnly, vec![])
                    .await?;
            }
            if wanted > existing {
                debug!("Added {} recvonly {} transceivers", wanted - existing, kind);
            }
        }
        Ok(())
    }

    /// Transceiver of the sender attached for `track_id`
    pub fn find_sender(&self, track_id: &str) -> Option<TransceiverId> {
        self.senders.get(track_id).map(|sender| sender.transceiver)
    }

    pub fn has_sender(&self, track_id: &str) -> bool {
        self.senders.contains_key(track_id)
    }

    /// Whether a media track is bound to any sender of this connection
    pub async fn is_media_attached(&self, media_track_id: &str) -> Result<bool> {
        Ok(self
            .backend
            .transceivers()
            .await?
            .iter()
            .any(|t| t.sender_track_id.as_deref() == Some(media_track_id)))
    }

    /// Detach the sender of `track_id`; no-op when it was never attached
    pub async fn remove_sender(&mut self, track_id: &str) -> Result<()> {
        if let Some(sender) = self.senders.remove(track_id) {
            self.backend.remove_track(sender.transceiver).await?;
            debug!("Track {} detached from transceiver #{}", track_id, sender.transceiver);
        }
        Ok(())
    }

    pub async fn replace_sender_track(
        &mut self,
        track_id: &str,
        track: Option<&MediaStreamTrack>,
    ) -> Result<()> {
        let transceiver = self
            .find_sender(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))?;
        self.backend.replace_track(transceiver, track).await
    }

    /// Replace the encoding parameters of a sender
    pub async fn set_sender_encodings(
        &mut self,
        track_id: &str,
        encodings: Vec<SenderEncoding>,
    ) -> Result<()> {
        let sender = self
            .senders
            .get_mut(track_id)
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))?;
        self.backend.set_encodings(sender.transceiver, &encodings).await?;
        sender.encodings = encodings;
        Ok(())
    }

    /// Flip the active flag of one simulcast layer of a sender
    pub async fn set_encoding_active(
        &mut self,
        track_id: &str,
        variant: Variant,
        active: bool,
    ) -> Result<()> {
        let mut encodings = self
            .senders
            .get(track_id)
            .map(|sender| sender.encodings.clone())
            .ok_or_else(|| ClientError::UnknownTrack(track_id.to_string()))?;
        let encoding = encodings
            .iter_mut()
            .find(|encoding| encoding.rid == Some(variant))
            .ok_or_else(|| ClientError::InvalidEncoding {
                track_id: track_id.to_string(),
                encoding: variant.to_string(),
            })?;
        encoding.active = active;
        self.set_sender_encodings(track_id, encodings).await
    }

    pub fn sender_encodings(&self, track_id: &str) -> Option<&[SenderEncoding]> {
        self.senders.get(track_id).map(|sender| sender.encodings.as_slice())
    }

    /// Stop receiving on transceivers created for sending
    pub async fn set_transceivers_to_send_only(&mut self) -> Result<()> {
        for transceiver in self.backend.transceivers().await? {
            if transceiver.direction == TransceiverDirection::SendRecv {
                self.backend
                    .set_direction(transceiver.id, TransceiverDirection::SendOnly)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn transceivers(&self) -> Result<Vec<TransceiverInfo>> {
        self.backend.transceivers().await
    }

    /// Local track id bound to each negotiated transceiver
    pub async fn sender_mids(&self) -> Result<HashMap<TrackId, String>> {
        let transceivers = self.backend.transceivers().await?;
        Ok(self
            .senders
            .iter()
            .filter_map(|(track_id, sender)| {
                transceivers
                    .get(sender.transceiver)
                    .and_then(|t| t.mid.clone())
                    .map(|mid| (track_id.clone(), mid))
            })
            .collect())
    }

    pub async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        if ice_restart {
            info!("Creating offer with ICE restart");
        }
        self.backend.create_offer(ice_restart).await
    }

    pub async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.backend.set_local_description(description).await
    }

    pub async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.backend.set_remote_description(description).await
    }

    pub async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.backend.add_ice_candidate(candidate).await
    }

    pub async fn statistics(&self) -> Result<Value> {
        self.backend.statistics().await
    }

    pub async fn close(&mut self) -> Result<()> {
        self.senders.clear();
        self.backend.close().await
    }
}
