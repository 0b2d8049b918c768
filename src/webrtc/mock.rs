//! In-memory peer connection used by tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::backend::{
    ConnectionEvent, ConnectionFactory, PeerConnectionBackend, SenderEncoding, TransceiverDirection,
    TransceiverId, TransceiverInfo,
};
use super::config::IceConfiguration;
use super::signaling::{IceCandidate, SessionDescription};
use crate::error::{ClientError, Result};
use crate::track::{MediaStreamTrack, TrackKind};

#[derive(Debug, Clone)]
pub struct MockTransceiver {
    pub kind: TrackKind,
    pub mid: Option<String>,
    pub direction: TransceiverDirection,
    pub sender_track: Option<String>,
    pub encodings: Vec<SenderEncoding>,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub transceivers: Vec<MockTransceiver>,
    pub offers: Vec<bool>,
    pub local_description: Option<SessionDescription>,
    pub remote_description: Option<SessionDescription>,
    pub candidates: Vec<IceCandidate>,
    pub replaced: Vec<(TransceiverId, Option<String>)>,
    pub closed: bool,
    next_mid: usize,
}

/// Backend recording every call into a shared [`MockState`]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }
}

#[async_trait]
impl PeerConnectionBackend for MockBackend {
    async fn add_transceiver(
        &self,
        kind: TrackKind,
        track: Option<&MediaStreamTrack>,
        direction: TransceiverDirection,
        encodings: Vec<SenderEncoding>,
    ) -> Result<TransceiverId> {
        let sender_track = track.map(|t| t.id().to_string());
        Ok(self.with_state(|state| {
            state.transceivers.push(MockTransceiver {
                kind,
                mid: None,
                direction,
                sender_track,
                encodings,
            });
            state.transceivers.len() - 1
        }))
    }

    async fn transceivers(&self) -> Result<Vec<TransceiverInfo>> {
        Ok(self.with_state(|state| {
            state
                .transceivers
                .iter()
                .enumerate()
                .map(|(id, t)| TransceiverInfo {
                    id,
                    mid: t.mid.clone(),
                    kind: t.kind,
                    direction: t.direction,
                    sender_track_id: t.sender_track.clone(),
                })
                .collect()
        }))
    }

    async fn set_direction(&self, id: TransceiverId, direction: TransceiverDirection) -> Result<()> {
        self.with_state(|state| match state.transceivers.get_mut(id) {
            Some(t) => {
                t.direction = direction;
                Ok(())
            }
            None => Err(ClientError::WebRtc(format!("No transceiver #{}", id))),
        })
    }

    async fn replace_track(&self, id: TransceiverId, track: Option<&MediaStreamTrack>) -> Result<()> {
        let track_id = track.map(|t| t.id().to_string());
        self.with_state(|state: &mut MockState| -> Result<()> {
            let t = state
                .transceivers
                .get_mut(id)
                .ok_or_else(|| ClientError::WebRtc(format!("No transceiver #{}", id)))?;
            t.sender_track = track_id.clone();
            state.replaced.push((id, track_id));
            Ok(())
        })
    }

    async fn remove_track(&self, id: TransceiverId) -> Result<()> {
        self.with_state(|state: &mut MockState| -> Result<()> {
            let t = state
                .transceivers
                .get_mut(id)
                .ok_or_else(|| ClientError::WebRtc(format!("No transceiver #{}", id)))?;
            t.sender_track = None;
            t.direction = TransceiverDirection::Inactive;
            Ok(())
        })
    }

    async fn set_encodings(&self, id: TransceiverId, encodings: &[SenderEncoding]) -> Result<()> {
        self.with_state(|state: &mut MockState| -> Result<()> {
            let t = state
                .transceivers
                .get_mut(id)
                .ok_or_else(|| ClientError::WebRtc(format!("No transceiver #{}", id)))?;
            t.encodings = encodings.to_vec();
            Ok(())
        })
    }

    async fn create_offer(&self, ice_restart: bool) -> Result<SessionDescription> {
        Ok(self.with_state(|state| {
            // Mids are assigned in offer order, as a browser does
            for i in 0..state.transceivers.len() {
                if state.transceivers[i].mid.is_none() {
                    state.transceivers[i].mid = Some(state.next_mid.to_string());
                    state.next_mid += 1;
                }
            }
            state.offers.push(ice_restart);
            SessionDescription::offer(format!("v=0\r\no=mock {} 0 IN IP4 0.0.0.0\r\n", state.offers.len()))
        }))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.with_state(|state| state.local_description = Some(description));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.with_state(|state| state.remote_description = Some(description));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.with_state(|state| state.candidates.push(candidate));
        Ok(())
    }

    async fn statistics(&self) -> Result<Value> {
        Ok(self.with_state(|state| {
            let mut reports = serde_json::Map::new();
            for (id, t) in state.transceivers.iter().enumerate() {
                if let Some(track) = &t.sender_track {
                    reports.insert(
                        format!("outbound-{}", id),
                        json!({"type": "outbound-rtp", "track_identifier": track, "bytes_sent": 1000}),
                    );
                }
            }
            Value::Object(reports)
        }))
    }

    async fn close(&self) -> Result<()> {
        self.with_state(|state| state.closed = true);
        Ok(())
    }
}

/// Factory handing out [`MockBackend`]s and keeping access to their state
#[derive(Clone, Default)]
pub struct MockFactory {
    pub connections: Arc<Mutex<Vec<(IceConfiguration, Arc<Mutex<MockState>>)>>>,
    pub event_senders: Arc<Mutex<Vec<mpsc::UnboundedSender<ConnectionEvent>>>>,
}

impl MockFactory {
    pub fn created(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// State of the most recently created connection
    pub fn last(&self) -> Arc<Mutex<MockState>> {
        self.connections.lock().unwrap().last().unwrap().1.clone()
    }

    pub fn last_ice(&self) -> IceConfiguration {
        self.connections.lock().unwrap().last().unwrap().0.clone()
    }

    /// Inject a platform event into the most recent connection
    pub fn emit(&self, event: ConnectionEvent) {
        let senders = self.event_senders.lock().unwrap();
        senders.last().unwrap().send(event).unwrap();
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(
        &self,
        ice: IceConfiguration,
        events: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Result<Box<dyn PeerConnectionBackend>> {
        let state = Arc::new(Mutex::new(MockState::default()));
        self.connections.lock().unwrap().push((ice, state.clone()));
        self.event_senders.lock().unwrap().push(events);
        Ok(Box::new(MockBackend { state }))
    }
}
