//! ICE configuration of the peer connection

use serde::{Deserialize, Serialize};

use crate::config::IceConfig;
use crate::media_event::IntegratedTurnServer;

/// ICE transport policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    /// Host, reflexive and relay candidates
    #[default]
    All,
    /// Relay candidates only
    Relay,
}

/// ICE server entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    /// Server URLs (e.g., ["turn:turn.example.com:3478?transport=udp"])
    pub urls: Vec<String>,
    /// Username for TURN authentication
    pub username: String,
    /// Credential for TURN authentication
    pub credential: String,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: String::new(),
            credential: String::new(),
        }
    }
}

/// ICE setup of one peer connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceConfiguration {
    pub ice_servers: Vec<IceServer>,
    pub ice_transport_policy: IceTransportPolicy,
}

impl From<&IntegratedTurnServer> for IceServer {
    fn from(server: &IntegratedTurnServer) -> Self {
        // TLS relays are reached as turns: over tcp
        let (scheme, transport) = match server.transport.as_str() {
            "tls" => ("turns", "tcp"),
            other => ("turn", other),
        };
        Self {
            urls: vec![format!(
                "{}:{}:{}?transport={}",
                scheme, server.server_addr, server.server_port, transport
            )],
            username: server.username.clone(),
            credential: server.password.clone(),
        }
    }
}

/// Derive the ICE setup from the relays announced in `offerData`
///
/// Engine-managed relays force relay-only gathering. Without relays the
/// configured public STUN servers are used with all candidate types.
pub fn ice_configuration(turn_servers: &[IntegratedTurnServer], config: &IceConfig) -> IceConfiguration {
    if turn_servers.is_empty() {
        IceConfiguration {
            ice_servers: config.stun_servers.iter().map(IceServer::stun).collect(),
            ice_transport_policy: IceTransportPolicy::All,
        }
    } else {
        IceConfiguration {
            ice_servers: turn_servers.iter().map(IceServer::from).collect(),
            ice_transport_policy: IceTransportPolicy::Relay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(transport: &str) -> IntegratedTurnServer {
        IntegratedTurnServer {
            server_addr: "10.0.0.5".to_string(),
            server_port: 50018,
            transport: transport.to_string(),
            username: "user".to_string(),
            password: "secret".to_string(),
        }
    }

    #[test]
    fn test_relays_force_relay_policy() {
        let ice = ice_configuration(&[turn("udp"), turn("tls")], &IceConfig::default());
        assert_eq!(ice.ice_transport_policy, IceTransportPolicy::Relay);
        assert_eq!(ice.ice_servers.len(), 2);
        assert_eq!(ice.ice_servers[0].urls, vec!["turn:10.0.0.5:50018?transport=udp"]);
        assert_eq!(ice.ice_servers[1].urls, vec!["turns:10.0.0.5:50018?transport=tcp"]);
        assert_eq!(ice.ice_servers[1].username, "user");
        assert_eq!(ice.ice_servers[1].credential, "secret");
    }

    #[test]
    fn test_stun_fallback() {
        let ice = ice_configuration(&[], &IceConfig::default());
        assert_eq!(ice.ice_transport_policy, IceTransportPolicy::All);
        assert_eq!(ice.ice_servers, vec![IceServer::stun("stun:stun.l.google.com:19302")]);
    }
}
