//! Session establishment and the SDP offer/answer round

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::actor::EndpointActor;
use super::command_queue::NegotiationState;
use crate::error::{ClientError, Result};
use crate::events::EndpointEvent;
use crate::media_event::{
    ConnectedPayload, CustomEvent, MediaEvent, OfferDataPayload, SdpAnswerPayload, SdpOfferPayload,
    TrackEncodingPayload, UpdateTrackMetadataPayload,
};
use crate::track::TrackKind;
use crate::webrtc::{
    ice_configuration, Connection, ConnectionEvent, ConnectionState, IceConnectionState,
    SessionDescription,
};

impl EndpointActor {
    /// The engine accepted the endpoint
    pub(super) fn on_connected(&mut self, payload: ConnectedPayload) {
        if !self.local.set_endpoint_id(&payload.id) {
            return;
        }
        self.established = true;
        info!(
            "Connected as {} with {} other endpoints",
            payload.id,
            payload.other_endpoints.len()
        );

        let mut other_endpoints = Vec::with_capacity(payload.other_endpoints.len());
        let mut tracks = Vec::new();
        for info in payload.other_endpoints {
            if info.id == payload.id {
                continue;
            }
            match self.remote.add_remote_endpoint(info) {
                Ok((endpoint, endpoint_tracks)) => {
                    other_endpoints.push(endpoint);
                    tracks.extend(endpoint_tracks);
                }
                Err(e) => warn!("Skipping endpoint from connected: {}", e),
            }
        }

        self.events.publish(EndpointEvent::Connected {
            endpoint_id: payload.id,
            other_endpoints,
        });
        for ctx in tracks {
            self.events.publish(EndpointEvent::TrackAdded(ctx));
        }

        // Tracks added before the session existed go out with the first offer
        if self.local.has_awaiting() {
            debug!("Local tracks awaiting negotiation, requesting renegotiation");
            self.request_renegotiation();
            self.queue.set_state(NegotiationState::Negotiating);
        }
    }

    /// Build and send an offer for the transceivers the engine asks for
    pub(super) async fn on_offer_data(&mut self, payload: OfferDataPayload) -> Result<()> {
        let ice_restart = self.connection.is_some();
        if !ice_restart {
            let ice = ice_configuration(&payload.integrated_turn_servers, &self.ice);
            let (tx, rx) = mpsc::unbounded_channel::<ConnectionEvent>();
            let backend = self.factory.create(ice, tx).await?;
            self.connection = Some(Connection::new(backend));
            self.connection_events = Some(rx);
            info!("Peer connection created");
        }
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| ClientError::Internal("peer connection missing".to_string()))?;

        connection
            .add_recv_transceivers_if_needed(payload.tracks_types)
            .await?;

        let unattached: Vec<(String, TrackKind)> = self
            .local
            .tracks()
            .filter(|ctx| !connection.has_sender(&ctx.track_id))
            .map(|ctx| (ctx.track_id.clone(), ctx.kind.unwrap_or(TrackKind::Video)))
            .collect();
        for (track_id, kind) in unattached {
            let encodings = self.local.sender_encodings(&track_id)?;
            let media = self
                .local
                .track(&track_id)
                .and_then(|ctx| ctx.track.clone());
            // A muted track still gets its media line
            connection
                .add_send_transceiver(&track_id, kind, media.as_ref(), encodings)
                .await?;
        }
        connection.set_transceivers_to_send_only().await?;

        let offer = connection.create_offer(ice_restart).await?;
        connection.set_local_description(offer.clone()).await?;
        let sender_mids = connection.sender_mids().await?;

        let sdp_offer = SdpOfferPayload {
            sdp_offer: offer,
            track_id_to_track_metadata: self.local.track_id_to_metadata(),
            track_id_to_track_bitrates: self.local.track_id_to_bitrates(),
            mid_to_track_id: self.local.mid_to_track_id(&sender_mids),
        };
        self.send_media_event(CustomEvent::SdpOffer(sdp_offer).into());

        let offered = self.local.mark_offered();
        debug!("Offer sent, {} tracks offered", offered.len());
        self.queue.set_state(NegotiationState::Negotiating);
        Ok(())
    }

    /// Apply the engine's answer and complete the negotiation round
    pub(super) async fn on_sdp_answer(&mut self, payload: SdpAnswerPayload) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| ClientError::Protocol("sdpAnswer without an offer".to_string()))?;

        self.remote.set_mid_mapping(&payload.mid_to_track_id);
        connection
            .set_remote_description(SessionDescription::answer(payload.sdp))
            .await?;

        let outcome = self.local.apply_answer(&payload.mid_to_track_id);
        for (track_id, track_metadata) in outcome.metadata_flush {
            self.send_media_event(MediaEvent::UpdateTrackMetadata(UpdateTrackMetadataPayload {
                track_id,
                track_metadata,
            }));
        }
        for (track_id, variant) in outcome.disabled_encodings {
            if let Some(connection) = self.connection.as_mut() {
                if let Err(e) = connection.set_encoding_active(&track_id, variant, false).await {
                    warn!("Failed to disable encoding {} of {}: {}", variant, track_id, e);
                }
            }
            self.send_media_event(MediaEvent::DisableTrackEncoding(TrackEncodingPayload {
                track_id,
                encoding: variant,
            }));
        }

        info!("Answer applied, {} tracks negotiated", outcome.negotiated.len());
        self.queue.finish_renegotiation();
        Ok(())
    }

    /// React to connection state changes already recorded on the connection
    pub(super) fn on_state_change(&mut self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::ConnectionStateChanged(ConnectionState::Failed) => {
                warn!("Peer connection failed");
                self.events.publish(EndpointEvent::ConnectionError {
                    message: "peer connection failed".to_string(),
                });
            }
            ConnectionEvent::IceConnectionStateChanged(IceConnectionState::Failed) => {
                warn!("ICE connection failed");
                self.events.publish(EndpointEvent::ConnectionError {
                    message: "ICE connection failed".to_string(),
                });
            }
            ConnectionEvent::IceConnectionStateChanged(IceConnectionState::Disconnected) => {
                info!("ICE disconnected, requesting renegotiation");
                self.request_renegotiation();
            }
            _ => {}
        }
    }
}
