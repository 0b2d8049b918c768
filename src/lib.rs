//! engine-rtc-client - WebRTC signaling client for a media-routing engine
//!
//! The crate negotiates a single peer connection with the engine, keeps
//! track of local and remote tracks and endpoints, and speaks the engine's
//! media-event protocol. [`endpoint::WebRtcEndpoint`] is the core and only
//! exchanges serialized media events; [`client::SignalingClient`] carries
//! them over a websocket.

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod media_event;
pub mod registry;
pub mod track;
pub mod webrtc;

pub use endpoint::{EndpointOptions, WebRtcEndpoint};
pub use error::{ClientError, Result};
