use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Main client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Websocket URL of the engine signaling socket
    pub server_url: String,
    /// Token sent in the authentication request
    pub token: String,
    /// Metadata of the local endpoint, sent with `connect`
    pub metadata: Value,
    /// Endpoint (negotiation core) settings
    pub endpoint: EndpointConfig,
    /// Reconnection policy
    pub reconnect: ReconnectConfig,
    /// ICE settings
    pub ice: IceConfig,
    /// Interval between statistics reports in seconds, 0 disables
    pub stats_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:5002/socket/peer/websocket".to_string(),
            token: String::new(),
            metadata: Value::Null,
            endpoint: EndpointConfig::default(),
            reconnect: ReconnectConfig::default(),
            ice: IceConfig::default(),
            stats_interval_secs: 10,
        }
    }
}

/// Endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Bitrate reported for audio tracks without a limit (bps)
    pub default_audio_bitrate: u64,
    /// Bitrate reported for video tracks without a limit (bps)
    pub default_video_bitrate: u64,
    /// Per-encoding defaults for simulcast tracks (bps)
    pub simulcast_bitrates: SimulcastBitrates,
    /// Capacity of the event bus ring buffer
    pub event_capacity: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            default_audio_bitrate: 50_000,
            default_video_bitrate: 2_500_000,
            simulcast_bitrates: SimulcastBitrates::default(),
            event_capacity: 256,
        }
    }
}

/// Default bitrates of the simulcast layers (bps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulcastBitrates {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

impl Default for SimulcastBitrates {
    fn default() -> Self {
        Self {
            low: 150_000,
            medium: 500_000,
            high: 2_500_000,
        }
    }
}

/// Reconnection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reconnect after the connection is lost
    pub enabled: bool,
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt (ms)
    pub initial_delay_ms: u64,
    /// Added to the delay on every following attempt (ms)
    pub delay_ms: u64,
    /// Publish the previous local tracks again after reconnecting
    pub add_tracks_on_reconnect: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 500,
            delay_ms: 500,
            add_tracks_on_reconnect: true,
        }
    }
}

/// ICE configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    /// STUN servers used when the engine provides no relays
    pub stun_servers: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}
