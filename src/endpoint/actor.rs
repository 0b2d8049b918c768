//! `EndpointActor` - sole owner of the session state
//!
//! Processes one message at a time from three sources: the handle mailbox,
//! notifications of the current peer connection and cancellation.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::command_queue::CommandQueue;
use super::commands::TrackCommand;
use super::{EndpointMessage, EndpointOptions};
use crate::config::IceConfig;
use crate::error::Result;
use crate::events::{EndpointEvent, EventBus};
use crate::media_event::{self, CustomEvent, MediaEvent};
use crate::registry::{LocalTrackRegistry, RemoteTrackRegistry};
use crate::webrtc::{Connection, ConnectionEvent, ConnectionFactory};

pub(crate) struct EndpointActor {
    receiver: mpsc::Receiver<EndpointMessage>,
    cancel_token: CancellationToken,
    pub(super) events: EventBus,
    pub(super) factory: Arc<dyn ConnectionFactory>,
    pub(super) ice: IceConfig,
    pub(super) local: LocalTrackRegistry,
    pub(super) remote: RemoteTrackRegistry,
    /// Peer connection of the session, created by the first `offerData`
    pub(super) connection: Option<Connection>,
    pub(super) connection_events: Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
    pub(super) queue: CommandQueue<TrackCommand>,
    /// Set by `connected`, cleared on teardown
    pub(super) established: bool,
    pub(super) bandwidth_estimation: u64,
}

impl EndpointActor {
    pub(super) fn new(
        options: EndpointOptions,
        receiver: mpsc::Receiver<EndpointMessage>,
        events: EventBus,
        factory: Arc<dyn ConnectionFactory>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            cancel_token,
            events,
            factory,
            ice: options.ice,
            local: LocalTrackRegistry::new(
                options.endpoint_metadata_parser.clone(),
                options.track_metadata_parser.clone(),
                options.endpoint,
            ),
            remote: RemoteTrackRegistry::new(
                options.endpoint_metadata_parser,
                options.track_metadata_parser,
            ),
            connection: None,
            connection_events: None,
            queue: CommandQueue::new(),
            established: false,
            bandwidth_estimation: 0,
        }
    }

    pub(super) async fn run(mut self) {
        debug!("Endpoint actor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!("Endpoint actor cancelled");
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            debug!("All endpoint handles dropped");
                            break;
                        }
                    }
                }

                Some(event) = next_connection_event(&mut self.connection_events) => {
                    self.handle_connection_event(event).await;
                }
            }
        }

        self.cleanup().await;
        debug!("Endpoint actor stopped");
    }

    async fn handle_message(&mut self, message: EndpointMessage) {
        match message {
            EndpointMessage::Connect {
                metadata,
                respond_to,
            } => {
                let _ = respond_to.send(self.connect(metadata));
            }
            EndpointMessage::Disconnect { respond_to } => {
                self.disconnect().await;
                let _ = respond_to.send(());
            }
            EndpointMessage::Enqueue { command, responder } => {
                self.enqueue(command, responder);
                self.process_queue().await;
            }
            EndpointMessage::SetTargetTrackEncoding {
                track_id,
                variant,
                respond_to,
            } => {
                let _ = respond_to.send(self.set_target_track_encoding(&track_id, variant));
            }
            EndpointMessage::SetTrackEncodingEnabled {
                track_id,
                variant,
                enabled,
                respond_to,
            } => {
                let result = self
                    .set_track_encoding_enabled(&track_id, variant, enabled)
                    .await;
                let _ = respond_to.send(result);
            }
            EndpointMessage::UpdateEndpointMetadata {
                metadata,
                respond_to,
            } => {
                let _ = respond_to.send(self.update_endpoint_metadata(metadata));
            }
            EndpointMessage::UpdateTrackMetadata {
                track_id,
                metadata,
                respond_to,
            } => {
                let _ = respond_to.send(self.update_track_metadata(&track_id, metadata));
            }
            EndpointMessage::GetRemoteTracks { respond_to } => {
                let _ = respond_to.send(self.remote.tracks());
            }
            EndpointMessage::GetRemoteEndpoints { respond_to } => {
                let _ = respond_to.send(self.remote.endpoints().clone());
            }
            EndpointMessage::GetLocalEndpoint { respond_to } => {
                let _ = respond_to.send(self.local.endpoint().clone());
            }
            EndpointMessage::GetBandwidthEstimation { respond_to } => {
                let _ = respond_to.send(self.bandwidth_estimation);
            }
            EndpointMessage::GetStatistics {
                track_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.statistics(track_id.as_deref()).await);
            }
            EndpointMessage::ReceiveMediaEvent { data, respond_to } => {
                let result = self.receive_media_event(&data).await;
                let _ = respond_to.send(result);
            }
        }
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        let Some(connection) = self.connection.as_mut() else {
            return;
        };

        if connection.apply_state(&event) {
            debug!("Connection event: {:?}", event);
            self.on_state_change(&event);
            self.process_queue().await;
            return;
        }

        match event {
            ConnectionEvent::IceCandidate(candidate) => {
                self.send_media_event(CustomEvent::Candidate(candidate).into());
            }
            ConnectionEvent::Track { track, mid } => {
                let Some(mid) = mid else {
                    warn!("Incoming track {} without mid", track.id());
                    return;
                };
                if let Some(ctx) = self.remote.attach_media(&mid, track) {
                    info!("Remote track {} ready", ctx.track_id);
                    self.events.publish(EndpointEvent::TrackReady(ctx));
                }
            }
            _ => {}
        }
    }

    /// Serialize a media event and hand it to the transport
    pub(super) fn send_media_event(&self, event: MediaEvent) {
        match media_event::serialize(&event) {
            Ok(data) => {
                debug!("Sending {}", event.name());
                self.events.publish(EndpointEvent::SendMediaEvent { data });
            }
            Err(e) => error!("Failed to serialize {}: {}", event.name(), e),
        }
    }

    pub(super) fn request_renegotiation(&self) {
        self.send_media_event(CustomEvent::RenegotiateTracks.into());
    }

    async fn statistics(&self, track_id: Option<&str>) -> Result<Value> {
        let Some(connection) = &self.connection else {
            return Ok(Value::Object(Default::default()));
        };
        let report = connection.statistics().await?;
        let Some(track_id) = track_id else {
            return Ok(report);
        };

        let ctx = self
            .local
            .track(track_id)
            .or_else(|| self.remote.track(track_id));
        let media_id = ctx.and_then(|ctx| ctx.media_track_id());
        let mid = ctx.and_then(|ctx| ctx.m_line_id.as_deref());

        let filtered = match report {
            Value::Object(reports) => reports
                .into_iter()
                .filter(|(_, stats)| {
                    let field_is = |key: &str, expected: Option<&str>| {
                        expected.is_some() && stats.get(key).and_then(Value::as_str) == expected
                    };
                    field_is("track_identifier", media_id) || field_is("mid", mid)
                })
                .collect(),
            _ => Default::default(),
        };
        Ok(Value::Object(filtered))
    }

    /// Leave the session on request
    pub(super) async fn disconnect(&mut self) {
        info!("Disconnecting");
        self.send_media_event(MediaEvent::Disconnect);
        self.events.publish(EndpointEvent::DisconnectRequested);
        self.cleanup().await;
        self.events.publish(EndpointEvent::Disconnected);
    }

    /// Close the connection and drop every piece of session state
    pub(super) async fn cleanup(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close().await {
                warn!("Failed to close peer connection: {}", e);
            }
        }
        self.connection_events = None;
        self.queue.clear();
        self.local.reset();
        self.remote.reset();
        self.established = false;
        self.bandwidth_estimation = 0;
    }
}

async fn next_connection_event(
    receiver: &mut Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
) -> Option<ConnectionEvent> {
    match receiver {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}
