use thiserror::Error;

/// Client-wide error type
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Unknown track: {0}")]
    UnknownTrack(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Track already attached: {0}")]
    DuplicateTrack(String),

    #[error("Invalid bandwidth: {0}")]
    InvalidBandwidth(String),

    #[error("Track {0} is not a simulcast track")]
    NotSimulcast(String),

    #[error("Invalid encoding {encoding} for track {track_id}")]
    InvalidEncoding { track_id: String, encoding: String },

    #[error("Metadata parsing failed: {0}")]
    Metadata(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Envelope error: {0}")]
    Envelope(String),

    #[error("WebRTC error: {0}")]
    WebRtc(String),

    #[error("Endpoint disconnected")]
    Disconnected,

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Usage errors are attributable to the caller and never retried
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownTrack(_)
                | Self::DuplicateTrack(_)
                | Self::InvalidBandwidth(_)
                | Self::NotSimulcast(_)
                | Self::InvalidEncoding { .. }
                | Self::Metadata(_)
        )
    }
}

/// Result type alias for the client
pub type Result<T> = std::result::Result<T, ClientError>;
