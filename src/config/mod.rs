//! Client configuration
//!
//! Configuration is a plain serde document. Every section has defaults, so
//! a config file only needs the keys it changes.

mod schema;

pub use schema::*;

use std::path::Path;

use crate::error::{ClientError, Result};

impl ClientConfig {
    /// Load configuration from a JSON file
    pub async fn load(path: &Path) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            return Err(ClientError::Config(format!(
                "server_url must be a ws:// or wss:// URL, got {}",
                self.server_url
            )));
        }
        if self.endpoint.event_capacity == 0 {
            return Err(ClientError::Config("event_capacity must be positive".to_string()));
        }
        Ok(())
    }
}
