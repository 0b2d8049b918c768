//! webrtc-rs peer connection backend

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::policy::ice_transport_policy::RTCIceTransportPolicy;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use super::backend::{
    ConnectionEvent, ConnectionFactory, PeerConnectionBackend, SenderEncoding, TransceiverDirection,
    TransceiverId, TransceiverInfo,
};
use super::config::{IceConfiguration, IceTransportPolicy};
use super::signaling::{
    ConnectionState, IceCandidate, IceConnectionState, IceGatheringState, SdpType,
    SessionDescription, SignalingState,
};
use crate::error::{ClientError, Result};
use crate::track::{MediaStreamTrack, TrackKind};

fn rtc_err(context: &str, e: impl std::fmt::Display) -> ClientError {
    ClientError::WebRtc(format!("{}: {}", context, e))
}

impl From<TransceiverDirection> for RTCRtpTransceiverDirection {
    fn from(direction: TransceiverDirection) -> Self {
        match direction {
            TransceiverDirection::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
            TransceiverDirection::SendOnly => RTCRtpTransceiverDirection::Sendonly,
            TransceiverDirection::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
            TransceiverDirection::Inactive => RTCRtpTransceiverDirection::Inactive,
        }
    }
}

fn direction_from_rtc(direction: RTCRtpTransceiverDirection) -> TransceiverDirection {
    match direction {
        RTCRtpTransceiverDirection::Sendrecv => TransceiverDirection::SendRecv,
        RTCRtpTransceiverDirection::Sendonly => TransceiverDirection::SendOnly,
        RTCRtpTransceiverDirection::Recvonly => TransceiverDirection::RecvOnly,
        _ => TransceiverDirection::Inactive,
    }
}

fn to_rtc_description(description: SessionDescription) -> Result<RTCSessionDescription> {
    match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp),
        SdpType::Rollback => {
            return Err(ClientError::WebRtc("rollback descriptions are not supported".to_string()))
        }
    }
    .map_err(|e| rtc_err("Invalid SDP", e))
}

/// Peer connection backed by webrtc-rs
pub struct PeerConnection {
    pc: Arc<RTCPeerConnection>,
}

impl PeerConnection {
    /// Create a new peer connection
    pub async fn new(
        ice: IceConfiguration,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| rtc_err("Failed to register codecs", e))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| rtc_err("Failed to register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = ice
            .ice_servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone(),
                credential: server.credential.clone(),
                ..Default::default()
            })
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ice_transport_policy: match ice.ice_transport_policy {
                IceTransportPolicy::All => RTCIceTransportPolicy::All,
                IceTransportPolicy::Relay => RTCIceTransportPolicy::Relay,
            },
            bundle_policy: RTCBundlePolicy::MaxBundle,
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| rtc_err("Failed to create peer connection", e))?;

        let peer_connection = Self { pc: Arc::new(pc) };
        peer_connection.setup_event_handlers(events);
        info!(
            "Peer connection created ({:?} ICE policy)",
            ice.ice_transport_policy
        );

        Ok(peer_connection)
    }

    /// Forward peer connection callbacks into the event channel
    fn setup_event_handlers(&self, events: mpsc::UnboundedSender<ConnectionEvent>) {
        let tx = events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                if let Some(state) = ConnectionState::from_rtc(s) {
                    debug!("Peer connection state: {}", state);
                    let _ = tx.send(ConnectionEvent::ConnectionStateChanged(state));
                }
                Box::pin(async {})
            }));

        let tx = events.clone();
        self.pc
            .on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
                if let Some(state) = IceConnectionState::from_rtc(s) {
                    debug!("ICE connection state: {}", state);
                    let _ = tx.send(ConnectionEvent::IceConnectionStateChanged(state));
                }
                Box::pin(async {})
            }));

        let tx = events.clone();
        self.pc
            .on_signaling_state_change(Box::new(move |s: RTCSignalingState| {
                if let Some(state) = SignalingState::from_rtc(s) {
                    let _ = tx.send(ConnectionEvent::SignalingStateChanged(state));
                }
                Box::pin(async {})
            }));

        let tx = events.clone();
        self.pc
            .on_ice_gathering_state_change(Box::new(move |s: RTCIceGathererState| {
                if let Some(state) = IceGatheringState::from_rtc(s) {
                    let _ = tx.send(ConnectionEvent::IceGatheringStateChanged(state));
                }
                Box::pin(async {})
            }));

        let tx = events.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                if let Some(c) = candidate {
                    match c.to_json() {
                        Ok(init) => {
                            debug!("ICE candidate: {}", init.candidate);
                            let _ = tx.send(ConnectionEvent::IceCandidate(IceCandidate::from(init)));
                        }
                        Err(e) => warn!("Failed to serialize ICE candidate: {}", e),
                    }
                }
                Box::pin(async {})
            }));

        let tx = events;
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  transceiver: Arc<RTCRtpTransceiver>| {
                let mid = transceiver.mid().map(|mid| mid.to_string());
                match MediaStreamTrack::from_remote(track) {
                    Some(track) => {
                        info!("Remote track {} on mid {:?}", track.id(), mid);
                        let _ = tx.send(ConnectionEvent::Track { track, mid });
                    }
                    None => warn!("Ignoring remote track of unknown kind on mid {:?}", mid),
                }
                Box::pin(async {})
            },
        ));
    }

    async fn transceiver(&self, id: TransceiverId) -> Result<Arc<RTCRtpTransceiver>> {
        self.pc
            .get_transceivers()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| ClientError::WebRtc(format!("No transceiver #{}", id)))
    }
}

#[async_trait]
impl PeerConnectionBackend for PeerConnection {
    async fn add_transceiver(
        &self,
        kind: TrackKind,
        track: Option<&MediaStreamTrack>,
        direction: TransceiverDirection,
        encodings: Vec<SenderEncoding>,
    ) -> Result<TransceiverId> {
        if encodings.iter().any(|encoding| encoding.rid.is_some()) {
            // webrtc-rs sends one RTP stream per local track; layers are
            // negotiated by rid only when the application provides them
            debug!("Simulcast layers requested for {} transceiver", kind);
        }

        let init = RTCRtpTransceiverInit {
            direction: direction.into(),
            send_encodings: vec![],
        };

        match track.and_then(|t| t.local()) {
            Some(local) => self.pc.add_transceiver_from_track(local, Some(init)).await,
            None => self.pc.add_transceiver_from_kind(kind.codec_type(), Some(init)).await,
        }
        .map_err(|e| rtc_err("Failed to add transceiver", e))?;

        Ok(self.pc.get_transceivers().await.len().saturating_sub(1))
    }

    async fn transceivers(&self) -> Result<Vec<TransceiverInfo>> {
        let mut infos = Vec::new();
        for (id, transceiver) in self.pc.get_transceivers().await.iter().enumerate() {
            let Some(kind) = TrackKind::from_codec_type(transceiver.kind()) else {
                continue;
            };
            let sender_track_id = transceiver
                .sender()
                .await
                .track()
                .await
                .map(|track| track.id().to_string());
            infos.push(TransceiverInfo {
                id,
                mid: transceiver.mid().map(|mid| mid.to_string()),
                kind,
                direction: direction_from_rtc(transceiver.direction()),
                sender_track_id,
            });
        }
        Ok(infos)
    }

    async fn set_direction(&self, id: TransceiverId, direction: TransceiverDirection) -> Result<()> {
        self.transceiver(id).await?.set_direction(direction.into()).await;
        Ok(())
    }

    async fn replace_track(&self, id: TransceiverId, track: Option<&MediaStreamTrack>) -> Result<()> {
        let local = match track {
            Some(track) => Some(track.local().ok_or_else(|| {
                ClientError::WebRtc(format!("Track {} is not a local track", track.id()))
            })?),
            None => None,
        };
        self.transceiver(id)
            .await?
            .sender()
            .await
            .replace_track(local)
            .await
            .map_err(|e| rtc_err("Failed to replace track", e))
    }

    async fn remove_track(&self, id: TransceiverId) -> Result<()> {
        let sender = self.transceiver(id).await?.sender().await;
        self.pc
            .remove_track(&sender)
            .await
            .map_err(|e| rtc_err("Failed to remove track", e))
    }

    async fn set_encodings(&self, id: TransceiverId, encodings: &[SenderEncoding]) -> Result<()> {
        // webrtc-rs exposes no setParameters; the engine receives the
        // limits through trackVariantBitrates
        debug!("Sender #{} encodings: {:?}", id, encodings);
        Ok(())
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        let options = RTCOfferOptions {
            ice_restart,
            ..Default::default()
        };
        let offer = self
            .pc
            .create_offer(Some(options))
            .await
            .map_err(|e| rtc_err("Failed to create offer", e))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| rtc_err("Failed to set local description", e))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| rtc_err("Failed to set remote description", e))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(candidate.into())
            .await
            .map_err(|e| rtc_err("Failed to add ICE candidate", e))
    }

    async fn statistics(&self) -> Result<Value> {
        let report = self.pc.get_stats().await;
        Ok(serde_json::to_value(&report.reports)?)
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| rtc_err("Failed to close peer connection", e))
    }
}

/// Factory of webrtc-rs peer connections
#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcConnectionFactory;

#[async_trait]
impl ConnectionFactory for WebRtcConnectionFactory {
    async fn create(
        &self,
        ice: IceConfiguration,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Box<dyn PeerConnectionBackend>> {
        Ok(Box::new(PeerConnection::new(ice, events).await?))
    }
}
