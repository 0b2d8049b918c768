//! FIFO of track mutations gated by the negotiation state
//!
//! A command leaves the queue only while the endpoint is [`NegotiationState::Idle`]
//! and the connection is not unstable. Commands whose effect needs a
//! renegotiation keep their responder in flight until the answer is applied.

use std::collections::VecDeque;

use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::{ClientError, Result};
use crate::track::TrackId;

/// When the caller of a command is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// As soon as the handler returns
    Immediately,
    /// Once the renegotiation started by the handler has completed
    AfterRenegotiation,
}

/// What currently blocks the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Idle,
    /// Waiting for `offerData` / `sdpAnswer`
    Negotiating,
    /// A sender track replacement is in progress
    ReplacingTrack,
}

/// Reply channel of a queued command
#[derive(Debug)]
pub enum Responder {
    Unit(oneshot::Sender<Result<()>>),
    /// Resolves with the id generated when the command was enqueued
    Track(oneshot::Sender<Result<TrackId>>, TrackId),
}

impl Responder {
    // Send errors mean the caller stopped waiting
    pub fn resolve(self) {
        match self {
            Responder::Unit(tx) => {
                let _ = tx.send(Ok(()));
            }
            Responder::Track(tx, id) => {
                let _ = tx.send(Ok(id));
            }
        }
    }

    pub fn reject(self, error: ClientError) {
        match self {
            Responder::Unit(tx) => {
                let _ = tx.send(Err(error));
            }
            Responder::Track(tx, _) => {
                let _ = tx.send(Err(error));
            }
        }
    }
}

#[derive(Debug)]
pub struct Command<P> {
    pub payload: P,
    pub policy: ResolutionPolicy,
    pub responder: Responder,
}

pub struct CommandQueue<P> {
    pending: VecDeque<Command<P>>,
    in_flight: Option<Responder>,
    state: NegotiationState,
}

impl<P> CommandQueue<P> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: None,
            state: NegotiationState::Idle,
        }
    }

    pub fn push(&mut self, command: Command<P>) {
        self.pending.push_back(command);
        trace!("Command queued, {} pending", self.pending.len());
    }

    /// Take the next command if nothing blocks the queue
    pub fn next(&mut self, connection_unstable: bool) -> Option<Command<P>> {
        if self.state != NegotiationState::Idle || connection_unstable {
            return None;
        }
        self.pending.pop_front()
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn set_state(&mut self, state: NegotiationState) {
        if self.state != state {
            debug!("Negotiation state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Hold `responder` until the renegotiation completes
    pub fn begin_renegotiation(&mut self, responder: Option<Responder>) {
        if let Some(responder) = responder {
            if let Some(previous) = self.in_flight.replace(responder) {
                previous.resolve();
            }
        }
        self.set_state(NegotiationState::Negotiating);
    }

    /// Resolve the command waiting for the renegotiation and unblock the queue
    pub fn finish_renegotiation(&mut self) {
        if let Some(responder) = self.in_flight.take() {
            responder.resolve();
        }
        self.set_state(NegotiationState::Idle);
    }

    /// Reject everything queued or in flight
    pub fn clear(&mut self) {
        let rejected = self.pending.len() + usize::from(self.in_flight.is_some());
        if let Some(responder) = self.in_flight.take() {
            responder.reject(ClientError::Disconnected);
        }
        for command in self.pending.drain(..) {
            command.responder.reject(ClientError::Disconnected);
        }
        if rejected > 0 {
            debug!("Rejected {} queued commands", rejected);
        }
        self.state = NegotiationState::Idle;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<P> Default for CommandQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}
