//! Peer connection layer
//!
//! ```text
//! EndpointActor
//!        |
//!        v
//! Connection (senders, cached states, unstable predicate)
//!        |
//!        v
//! dyn PeerConnectionBackend ---- ConnectionEvent ----> actor mailbox
//!        |
//!        v
//! webrtc-rs RTCPeerConnection
//! ```

pub mod backend;
pub mod config;
pub mod connection;
#[cfg(test)]
pub mod mock;
pub mod peer;
pub mod signaling;

pub use backend::{
    ConnectionEvent, ConnectionFactory, PeerConnectionBackend, SenderEncoding, TransceiverDirection,
    TransceiverId, TransceiverInfo,
};
pub use config::{ice_configuration, IceConfiguration, IceServer, IceTransportPolicy};
pub use connection::Connection;
pub use peer::{PeerConnection, WebRtcConnectionFactory};
pub use signaling::{
    ConnectionState, IceCandidate, IceConnectionState, IceGatheringState, SdpType,
    SessionDescription, SignalingState,
};
