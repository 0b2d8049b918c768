//! Media events pushed by the engine

use tracing::{debug, info, warn};

use super::actor::EndpointActor;
use crate::error::Result;
use crate::events::EndpointEvent;
use crate::media_event::{self, CustomEvent, MediaEvent};

impl EndpointActor {
    /// Parse and apply one inbound media event, then resume the queue
    ///
    /// Frames that do not parse are dropped. Events referencing unknown
    /// endpoints or tracks are reported to the caller.
    pub(super) async fn receive_media_event(&mut self, raw: &str) -> Result<()> {
        let event = match media_event::deserialize(raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping media event: {}", e);
                return Ok(());
            }
        };
        debug!("Received {}", event.name());

        let name = event.name();
        let result = self.handle_media_event(event).await;
        if let Err(e) = &result {
            warn!("Failed to apply {}: {}", name, e);
        }
        self.process_queue().await;
        result
    }

    fn is_local_endpoint(&self, endpoint_id: &str) -> bool {
        self.local.endpoint().is_connected() && self.local.endpoint_id() == endpoint_id
    }

    async fn handle_media_event(&mut self, event: MediaEvent) -> Result<()> {
        match event {
            MediaEvent::Connected(payload) => self.on_connected(payload),

            MediaEvent::EndpointAdded(info) => {
                if self.is_local_endpoint(&info.id) {
                    return Ok(());
                }
                let (endpoint, tracks) = self.remote.add_remote_endpoint(info)?;
                info!("Endpoint {} joined", endpoint.id);
                self.events.publish(EndpointEvent::EndpointAdded(endpoint));
                for ctx in tracks {
                    self.events.publish(EndpointEvent::TrackAdded(ctx));
                }
            }

            MediaEvent::EndpointRemoved(payload) => {
                if self.is_local_endpoint(&payload.id) {
                    info!("Removed from the session by the engine");
                    self.cleanup().await;
                    self.events.publish(EndpointEvent::Disconnected);
                    return Ok(());
                }
                let (endpoint, tracks) = self.remote.remove_remote_endpoint(&payload.id)?;
                info!("Endpoint {} left", endpoint.id);
                for ctx in tracks {
                    self.events.publish(EndpointEvent::TrackRemoved(ctx));
                }
                self.events.publish(EndpointEvent::EndpointRemoved(endpoint));
            }

            MediaEvent::EndpointUpdated(payload) => {
                if self.is_local_endpoint(&payload.endpoint_id) {
                    return Ok(());
                }
                let endpoint = self
                    .remote
                    .update_remote_endpoint(&payload.endpoint_id, payload.metadata)?;
                self.events.publish(EndpointEvent::EndpointUpdated(endpoint));
            }

            MediaEvent::TracksAdded(payload) => {
                if self.is_local_endpoint(&payload.endpoint_id) {
                    return Ok(());
                }
                let tracks = self.remote.add_tracks(&payload.endpoint_id, payload.tracks)?;
                for ctx in tracks {
                    self.events.publish(EndpointEvent::TrackAdded(ctx));
                }
            }

            MediaEvent::TracksRemoved(payload) => {
                if self.is_local_endpoint(&payload.endpoint_id) {
                    return Ok(());
                }
                let tracks = self
                    .remote
                    .remove_tracks(&payload.endpoint_id, &payload.track_ids)?;
                for ctx in tracks {
                    self.events.publish(EndpointEvent::TrackRemoved(ctx));
                }
            }

            MediaEvent::TrackUpdated(payload) => {
                if self.is_local_endpoint(&payload.endpoint_id) {
                    return Ok(());
                }
                let ctx = self.remote.update_remote_track(
                    &payload.endpoint_id,
                    &payload.track_id,
                    payload.metadata,
                )?;
                self.events.publish(EndpointEvent::TrackUpdated(ctx));
            }

            MediaEvent::TracksPriority(payload) => {
                let (enabled_tracks, disabled_tracks): (Vec<_>, Vec<_>) = self
                    .remote
                    .tracks()
                    .into_values()
                    .partition(|ctx| payload.tracks.contains(&ctx.track_id));
                self.events.publish(EndpointEvent::TracksPriorityChanged {
                    enabled_tracks,
                    disabled_tracks,
                });
            }

            MediaEvent::TrackEncodingDisabled(payload) => {
                let track = self.remote.disable_remote_track_encoding(
                    &payload.endpoint_id,
                    &payload.track_id,
                    payload.encoding,
                )?;
                self.events.publish(EndpointEvent::TrackEncodingDisabled {
                    track,
                    encoding: payload.encoding,
                });
            }

            MediaEvent::TrackEncodingEnabled(payload) => {
                let track = self.remote.enable_remote_track_encoding(
                    &payload.endpoint_id,
                    &payload.track_id,
                    payload.encoding,
                )?;
                self.events.publish(EndpointEvent::TrackEncodingEnabled {
                    track,
                    encoding: payload.encoding,
                });
            }

            MediaEvent::Error(payload) => {
                warn!("Engine error: {}", payload.message);
                self.events.publish(EndpointEvent::SignalingError {
                    message: payload.message,
                });
                self.disconnect().await;
            }

            MediaEvent::Custom(custom) => self.handle_custom_event(custom).await?,

            other => warn!("Ignoring outbound-only event {}", other.name()),
        }
        Ok(())
    }

    async fn handle_custom_event(&mut self, event: CustomEvent) -> Result<()> {
        match event {
            CustomEvent::OfferData(payload) => self.on_offer_data(payload).await?,

            CustomEvent::SdpAnswer(payload) => self.on_sdp_answer(payload).await?,

            CustomEvent::Candidate(candidate) => match &self.connection {
                Some(connection) => connection.add_ice_candidate(candidate).await?,
                None => warn!("Dropping remote candidate, no peer connection"),
            },

            CustomEvent::EncodingSwitched(payload) => {
                let ctx = self.remote.set_remote_track_encoding(
                    &payload.endpoint_id,
                    &payload.track_id,
                    payload.encoding,
                    payload.reason,
                )?;
                debug!(
                    "Track {} now receives encoding {} ({:?})",
                    payload.track_id, payload.encoding, payload.reason
                );
                self.events.publish(EndpointEvent::EncodingChanged(ctx));
            }

            CustomEvent::VadNotification(payload) => {
                let ctx = self
                    .remote
                    .set_remote_track_vad_status(&payload.track_id, payload.status)?;
                self.events.publish(EndpointEvent::VoiceActivityChanged(ctx));
            }

            CustomEvent::BandwidthEstimation(payload) => {
                let estimation = payload.estimation.max(0.0).ceil() as u64;
                self.bandwidth_estimation = estimation;
                self.events
                    .publish(EndpointEvent::BandwidthEstimationChanged { estimation });
            }

            other => warn!("Ignoring outbound-only event {}", other.name()),
        }
        Ok(())
    }
}
