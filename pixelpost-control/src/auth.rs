//! Token authentication for the control socket
//!
//! Tokens are configured as SHA-256 hex digests so the configuration file
//! never holds a usable secret.
//!
//! ```ron
//! control: (
//!     socket_path: "/run/pixelpost/control.sock",
//!     auth: (
//!         enabled: true,
//!         // echo -n "your-secret-token" | sha256sum
//!         token_hashes: ["4c5dc9b7708905f77f5e5d16316b5dfb425e68cb326dcd55a860e90a7707031e"],
//!     ),
//! ),
//! ```

use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ControlAuthConfig {
    /// When disabled, access is governed by the socket's file permissions alone
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub token_hashes: Vec<String>,
}

impl ControlAuthConfig {
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        self.enabled
    }

    /// Whether `token` hashes to one of the configured digests. Always true
    /// when authentication is disabled.
    #[must_use]
    pub fn validate_token(&self, token: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let hash = hex::encode(Sha256::digest(token.as_bytes()));
        self.token_hashes
            .iter()
            .any(|configured| configured.eq_ignore_ascii_case(&hash))
    }

    /// # Errors
    ///
    /// Returns a message suitable for the client when authentication is
    /// enabled and `token` is missing or unknown.
    pub fn authorise(&self, token: Option<&str>) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }

        match token {
            None => Err("Authentication required but no token provided".to_string()),
            Some(token) if self.validate_token(token) => Ok(()),
            Some(_) => Err("Invalid authentication token".to_string()),
        }
    }
}
