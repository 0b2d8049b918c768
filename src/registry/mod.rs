//! Local and remote state of a session
//!
//! Both registries store tracks inside their owning [`Endpoint`] and hand
//! out snapshots; only the endpoint actor mutates them.

pub mod endpoint;
pub mod local;
pub mod remote;

pub use endpoint::{Endpoint, WEBRTC_ENDPOINT_TYPE};
pub use local::{AnswerOutcome, LocalTrackRegistry, MetadataUpdate};
pub use remote::RemoteTrackRegistry;
