//! Configuration types for the negotiation client

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Main configuration for [`PeerClient`](crate::PeerClient)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerClientConfig {
    /// WebSocket relay URL (ws:// or wss://)
    pub relay_url: String,

    /// Local peer identifier sent at registration (random numeric id if None)
    pub local_id: Option<String>,

    /// STUN server URLs handed to the media engine
    pub stun_servers: Vec<String>,

    /// Consecutive relay dial attempts before giving up (default: 3)
    pub max_connect_attempts: u32,

    /// Delay between relay dial attempts in milliseconds (default: 1000)
    pub retry_delay_ms: u64,
}

impl Default for PeerClientConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://localhost:8443".to_string(),
            local_id: None,
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            max_connect_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl PeerClientConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `relay_url` is not a ws:// or wss:// URL
    /// - `local_id` is set but empty or contains whitespace (it travels in a
    ///   space-delimited wire frame)
    /// - `max_connect_attempts` is zero
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.relay_url.starts_with("ws://") && !self.relay_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "relay_url must start with ws:// or wss://, got {}",
                self.relay_url
            )));
        }

        if let Some(id) = &self.local_id {
            if id.is_empty() || id.contains(char::is_whitespace) {
                return Err(Error::InvalidConfig(format!(
                    "local_id must be a non-empty token without whitespace, got {:?}",
                    id
                )));
            }
        }

        if self.max_connect_attempts == 0 {
            return Err(Error::InvalidConfig(
                "max_connect_attempts must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// The configured local id, or a freshly drawn random numeric one
    pub fn local_id_or_random(&self) -> String {
        match &self.local_id {
            Some(id) => id.clone(),
            None => rand::thread_rng().gen_range(10..10_000u32).to_string(),
        }
    }
}
