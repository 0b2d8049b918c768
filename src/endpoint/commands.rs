//! Track mutations and the direct (unqueued) local operations

use serde_json::Value;
use tracing::{debug, info, warn};

use super::actor::EndpointActor;
use super::command_queue::{Command, NegotiationState, ResolutionPolicy, Responder};
use crate::error::{ClientError, Result};
use crate::events::EndpointEvent;
use crate::media_event::{
    CustomEvent, MediaEvent, MetadataPayload, SetTargetTrackVariantPayload, TrackEncodingPayload,
    TrackVariantBitratesPayload, UpdateTrackMetadataPayload,
};
use crate::registry::MetadataUpdate;
use crate::track::{
    BandwidthLimit, MediaStreamTrack, NegotiationStatus, SimulcastConfig, TrackBandwidthLimit,
    TrackId, Variant,
};

/// Track mutation executed through the command queue
#[derive(Debug)]
pub(crate) enum TrackCommand {
    AddTrack {
        track_id: TrackId,
        track: MediaStreamTrack,
        metadata: Value,
        simulcast: SimulcastConfig,
        max_bandwidth: TrackBandwidthLimit,
    },
    RemoveTrack {
        track_id: TrackId,
    },
    ReplaceTrack {
        track_id: TrackId,
        track: Option<MediaStreamTrack>,
        metadata: Option<Value>,
    },
    SetTrackBandwidth {
        track_id: TrackId,
        bandwidth: BandwidthLimit,
    },
    SetEncodingBandwidth {
        track_id: TrackId,
        variant: Variant,
        bandwidth: BandwidthLimit,
    },
}

impl TrackCommand {
    pub fn policy(&self) -> ResolutionPolicy {
        match self {
            TrackCommand::AddTrack { .. } | TrackCommand::RemoveTrack { .. } => {
                ResolutionPolicy::AfterRenegotiation
            }
            _ => ResolutionPolicy::Immediately,
        }
    }

    pub fn track_id(&self) -> &str {
        match self {
            TrackCommand::AddTrack { track_id, .. }
            | TrackCommand::RemoveTrack { track_id }
            | TrackCommand::ReplaceTrack { track_id, .. }
            | TrackCommand::SetTrackBandwidth { track_id, .. }
            | TrackCommand::SetEncodingBandwidth { track_id, .. } => track_id,
        }
    }
}

impl EndpointActor {
    /// Queue a track mutation; add commands get their track id here
    pub(super) fn enqueue(&mut self, mut command: TrackCommand, mut responder: Responder) {
        if let TrackCommand::AddTrack { track_id, .. } = &mut command {
            *track_id = self.local.new_track_id();
            if let Responder::Track(_, id) = &mut responder {
                *id = track_id.clone();
            }
        }
        let policy = command.policy();
        self.queue.push(Command {
            payload: command,
            policy,
            responder,
        });
    }

    /// Dispatch queued commands until the queue blocks or empties
    pub(super) async fn process_queue(&mut self) {
        loop {
            let unstable = self
                .connection
                .as_ref()
                .map(|connection| connection.is_unstable())
                .unwrap_or(false);
            let Some(command) = self.queue.next(unstable) else {
                break;
            };
            self.execute(command).await;
        }
    }

    async fn execute(&mut self, command: Command<TrackCommand>) {
        let Command {
            payload,
            policy,
            responder,
        } = command;
        let track_id = payload.track_id().to_string();

        if let Err(e) = self.validate(&payload).await {
            warn!("Rejected command for track {}: {}", track_id, e);
            responder.reject(e);
            return;
        }

        match self.handle_command(payload).await {
            Ok(needs_renegotiation) => {
                if policy == ResolutionPolicy::AfterRenegotiation
                    && needs_renegotiation
                    && self.established
                {
                    self.request_renegotiation();
                    self.queue.begin_renegotiation(Some(responder));
                } else {
                    responder.resolve();
                }
            }
            Err(e) => {
                warn!("Command for track {} failed: {}", track_id, e);
                responder.reject(e);
            }
        }
    }

    /// Checks run right before the handler of a command
    async fn validate(&self, command: &TrackCommand) -> Result<()> {
        match command {
            TrackCommand::AddTrack {
                track,
                simulcast,
                max_bandwidth,
                ..
            } => {
                self.local
                    .validate_new_track(track, simulcast, max_bandwidth)?;
                if let Some(connection) = &self.connection {
                    if connection.is_media_attached(track.id()).await? {
                        return Err(ClientError::DuplicateTrack(track.id().to_string()));
                    }
                }
                Ok(())
            }
            TrackCommand::ReplaceTrack {
                track_id, metadata, ..
            } => {
                if self.local.track(track_id).is_none() {
                    return Err(ClientError::UnknownTrack(track_id.clone()));
                }
                if let Some(metadata) = metadata {
                    self.local.check_track_metadata(metadata)?;
                }
                Ok(())
            }
            TrackCommand::SetEncodingBandwidth { track_id, .. } => {
                let ctx = self
                    .local
                    .track(track_id)
                    .ok_or_else(|| ClientError::UnknownTrack(track_id.clone()))?;
                if !ctx.is_simulcast() {
                    return Err(ClientError::NotSimulcast(track_id.clone()));
                }
                Ok(())
            }
            other => {
                let track_id = other.track_id();
                if self.local.track(track_id).is_none() {
                    return Err(ClientError::UnknownTrack(track_id.to_string()));
                }
                Ok(())
            }
        }
    }

    /// Run a command; returns whether its effect needs a renegotiation
    async fn handle_command(&mut self, command: TrackCommand) -> Result<bool> {
        match command {
            TrackCommand::AddTrack {
                track_id,
                track,
                metadata,
                simulcast,
                max_bandwidth,
            } => {
                let ctx = self
                    .local
                    .add_track(track_id, track, metadata, simulcast, max_bandwidth)?;
                info!("Local track {} added", ctx.track_id);
                self.events.publish(EndpointEvent::LocalTrackAdded(ctx));
                Ok(true)
            }
            TrackCommand::RemoveTrack { track_id } => {
                self.local.remove_track(&track_id)?;
                let attached = match self.connection.as_mut() {
                    Some(connection) => {
                        let attached = connection.has_sender(&track_id);
                        connection.remove_sender(&track_id).await?;
                        attached
                    }
                    None => false,
                };
                info!("Local track {} removed", track_id);
                self.events
                    .publish(EndpointEvent::LocalTrackRemoved { track_id });
                Ok(attached)
            }
            TrackCommand::ReplaceTrack {
                track_id,
                track,
                metadata,
            } => {
                self.replace_track(&track_id, track).await?;
                if let Some(metadata) = metadata {
                    self.update_track_metadata(&track_id, metadata)?;
                }
                Ok(false)
            }
            TrackCommand::SetTrackBandwidth {
                track_id,
                bandwidth,
            } => {
                self.local.set_track_bandwidth(&track_id, bandwidth)?;
                self.apply_sender_encodings(&track_id).await?;
                self.events.publish(EndpointEvent::LocalTrackBandwidthSet {
                    track_id: track_id.clone(),
                    bandwidth,
                });
                self.send_variant_bitrates(&track_id);
                Ok(false)
            }
            TrackCommand::SetEncodingBandwidth {
                track_id,
                variant,
                bandwidth,
            } => {
                self.local
                    .set_encoding_bandwidth(&track_id, variant, bandwidth)?;
                self.apply_sender_encodings(&track_id).await?;
                self.events
                    .publish(EndpointEvent::LocalTrackEncodingBandwidthSet {
                        track_id: track_id.clone(),
                        rid: variant,
                        bandwidth,
                    });
                self.send_variant_bitrates(&track_id);
                Ok(false)
            }
        }
    }

    async fn replace_track(&mut self, track_id: &str, track: Option<MediaStreamTrack>) -> Result<()> {
        let media_track_id = track.as_ref().map(|t| t.id().to_string());

        if let Some(connection) = self.connection.as_mut() {
            if connection.has_sender(track_id) {
                self.queue
                    .set_state(NegotiationState::ReplacingTrack);
                let result = connection.replace_sender_track(track_id, track.as_ref()).await;
                self.queue
                    .set_state(NegotiationState::Idle);
                result?;
            }
        }

        let previous = self.local.replace_track(track_id, track)?;
        debug!(
            "Track {} media {:?} -> {:?}",
            track_id,
            previous.as_ref().map(|t| t.id()),
            media_track_id
        );

        match (previous.is_some(), media_track_id.is_some()) {
            (true, false) => self.events.publish(EndpointEvent::LocalTrackMuted {
                track_id: track_id.to_string(),
            }),
            (false, true) => self.events.publish(EndpointEvent::LocalTrackUnmuted {
                track_id: track_id.to_string(),
            }),
            _ => {}
        }
        self.events.publish(EndpointEvent::LocalTrackReplaced {
            track_id: track_id.to_string(),
            media_track_id,
            metadata: self
                .local
                .track(track_id)
                .map(|ctx| ctx.metadata.raw_metadata.clone()),
        });
        Ok(())
    }

    /// Push the encodings derived from the registry to the sender, if any
    async fn apply_sender_encodings(&mut self, track_id: &str) -> Result<()> {
        let Some(connection) = self.connection.as_mut() else {
            return Ok(());
        };
        if !connection.has_sender(track_id) {
            return Ok(());
        }
        let encodings = self.local.sender_encodings(track_id)?;
        connection.set_sender_encodings(track_id, encodings).await
    }

    fn send_variant_bitrates(&self, track_id: &str) {
        let negotiated = self
            .local
            .track(track_id)
            .map(|ctx| ctx.negotiation_status == NegotiationStatus::Done)
            .unwrap_or(false);
        if !negotiated {
            return;
        }
        match self.local.track_bitrates(track_id) {
            Ok(variant_bitrates) => self.send_media_event(
                CustomEvent::TrackVariantBitrates(TrackVariantBitratesPayload {
                    track_id: track_id.to_string(),
                    variant_bitrates,
                })
                .into(),
            ),
            Err(e) => warn!("No bitrates for track {}: {}", track_id, e),
        }
    }

    pub(super) fn connect(&mut self, metadata: Value) -> Result<()> {
        self.local.update_endpoint_metadata(metadata.clone())?;
        info!("Connecting to the engine");
        self.send_media_event(MediaEvent::Connect(MetadataPayload { metadata }));
        Ok(())
    }

    pub(super) fn update_endpoint_metadata(&mut self, metadata: Value) -> Result<()> {
        self.local.update_endpoint_metadata(metadata.clone())?;
        if self.established {
            self.send_media_event(MediaEvent::UpdateEndpointMetadata(MetadataPayload {
                metadata: metadata.clone(),
            }));
        }
        self.events
            .publish(EndpointEvent::LocalEndpointMetadataChanged { metadata });
        Ok(())
    }

    pub(super) fn update_track_metadata(&mut self, track_id: &str, metadata: Value) -> Result<()> {
        match self.local.update_track_metadata(track_id, metadata.clone())? {
            MetadataUpdate::Send(track_metadata) => {
                self.send_media_event(MediaEvent::UpdateTrackMetadata(
                    UpdateTrackMetadataPayload {
                        track_id: track_id.to_string(),
                        track_metadata,
                    },
                ));
            }
            MetadataUpdate::Buffered => {
                debug!("Metadata of track {} held until the answer", track_id)
            }
            MetadataUpdate::Nothing => {}
        }
        self.events.publish(EndpointEvent::LocalTrackMetadataChanged {
            track_id: track_id.to_string(),
            metadata,
        });
        Ok(())
    }

    /// Switch one simulcast layer of a local track on or off
    ///
    /// While the track is offered the sender is left untouched; the answer
    /// applies the change.
    pub(super) async fn set_track_encoding_enabled(
        &mut self,
        track_id: &str,
        variant: Variant,
        enabled: bool,
    ) -> Result<()> {
        let status = if enabled {
            self.local.enable_track_encoding(track_id, variant)?
        } else {
            self.local.disable_track_encoding(track_id, variant)?
        };

        if status != NegotiationStatus::Offered {
            if let Some(connection) = self.connection.as_mut() {
                if connection.has_sender(track_id) {
                    connection
                        .set_encoding_active(track_id, variant, enabled)
                        .await?;
                }
            }
        }

        if status == NegotiationStatus::Done {
            let payload = TrackEncodingPayload {
                track_id: track_id.to_string(),
                encoding: variant,
            };
            self.send_media_event(if enabled {
                MediaEvent::EnableTrackEncoding(payload)
            } else {
                MediaEvent::DisableTrackEncoding(payload)
            });
        }

        let track_id = track_id.to_string();
        self.events.publish(if enabled {
            EndpointEvent::LocalTrackEncodingEnabled {
                track_id,
                encoding: variant,
            }
        } else {
            EndpointEvent::LocalTrackEncodingDisabled {
                track_id,
                encoding: variant,
            }
        });
        Ok(())
    }

    /// Request an encoding of a remote track; invalid requests are dropped
    pub(super) fn set_target_track_encoding(&mut self, track_id: &str, variant: Variant) -> Result<()> {
        let Some(variant) = self.remote.set_target_remote_track_encoding(track_id, variant)? else {
            return Ok(());
        };
        self.send_media_event(
            CustomEvent::SetTargetTrackVariant(SetTargetTrackVariantPayload {
                track_id: track_id.to_string(),
                variant,
            })
            .into(),
        );
        self.events
            .publish(EndpointEvent::TargetTrackEncodingRequested {
                track_id: track_id.to_string(),
                variant,
            });
        Ok(())
    }
}
