//! Channel and server configuration.
//!
//! All structs implement `Default` and `serde::Deserialize`, so an embedding
//! application can load them from JSON (or any serde format) and override
//! single fields.

use core::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};
use sealink_core::frame::DEFAULT_MAX_FRAME_LEN;
use sealink_core::Role;
use sealink_crypto::TransformParams;
use serde::Deserialize;
use zeroize::Zeroizing;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 27015;

/// How transform parameters are obtained.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No transform, untagged frames.
    Plain,
    /// Fixed parameters known to both ends, untagged frames. Insecure.
    PreShared(PresharedSecrets),
    /// ECDH handshake over tagged frames.
    #[default]
    Negotiated,
}

impl SecurityMode {
    /// Whether frames carry a tag byte.
    pub fn is_tagged(&self) -> bool {
        matches!(self, SecurityMode::Negotiated)
    }

    /// Whether messages pass through a transform.
    pub fn has_transform(&self) -> bool {
        !matches!(self, SecurityMode::Plain)
    }
}

impl FromStr for SecurityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "plain" => Ok(SecurityMode::Plain),
            "preshared" | "pre_shared" | "pre-shared" => {
                Ok(SecurityMode::PreShared(PresharedSecrets::default()))
            }
            "negotiated" | "ecdh" => Ok(SecurityMode::Negotiated),
            other => Err(Error::Config(format!("unknown security mode '{}'", other))),
        }
    }
}

/// Fixed transform parameters shared out of band.
///
/// The defaults are public demo values; anyone can decode such a channel.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PresharedSecrets {
    /// Transform secret.
    pub entropy: String,
    /// Client encoder nonce (server decoder).
    pub encoder_nonce: u64,
    /// Client decoder nonce (server encoder).
    pub decoder_nonce: u64,
    /// Personalization for both directions.
    pub personalization: String,
}

impl Default for PresharedSecrets {
    fn default() -> Self {
        Self {
            entropy: "0".repeat(32),
            encoder_nonce: 1,
            decoder_nonce: 0,
            personalization: "demo".into(),
        }
    }
}

impl PresharedSecrets {
    /// Encoder and decoder parameters for `role`. The server swaps nonces.
    pub fn params(&self, role: Role) -> (TransformParams, TransformParams) {
        let (encoder_nonce, decoder_nonce) = match role {
            Role::Client => (self.encoder_nonce, self.decoder_nonce),
            Role::Server => (self.decoder_nonce, self.encoder_nonce),
        };
        let build = |nonce: u64| {
            TransformParams::new(
                Zeroizing::new(self.entropy.as_bytes().to_vec()),
                Zeroizing::new(nonce.to_be_bytes().to_vec()),
                Zeroizing::new(self.personalization.clone()),
            )
        };
        (build(encoder_nonce), build(decoder_nonce))
    }
}

impl fmt::Debug for PresharedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresharedSecrets")
            .field("entropy", &"<redacted>")
            .field("encoder_nonce", &self.encoder_nonce)
            .field("decoder_nonce", &self.decoder_nonce)
            .field("personalization", &self.personalization)
            .finish()
    }
}

/// Limits applied by a framed transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    /// Largest accepted frame body.
    pub max_frame_len: usize,
    /// Connect timeout. `None` waits for the OS.
    pub connect_timeout: Option<Duration>,
    /// Receive timeout. `None` waits forever.
    pub receive_timeout: Option<Duration>,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            connect_timeout: None,
            receive_timeout: None,
        }
    }
}

/// Client channel configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Server host name or IP.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: SecurityMode,
    /// Largest accepted frame body.
    pub max_frame_len: usize,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Receive timeout in milliseconds.
    pub receive_timeout_ms: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            security: SecurityMode::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            connect_timeout_ms: None,
            receive_timeout_ms: None,
        }
    }
}

impl ChannelConfig {
    /// Config for `host:port` with defaults elsewhere.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Set the security mode.
    pub fn with_security(mut self, security: SecurityMode) -> Self {
        self.security = security;
        self
    }

    /// Set the frame size limit.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout_ms = Some(limit.as_millis() as u64);
        self
    }

    /// Set the receive timeout.
    pub fn with_receive_timeout(mut self, limit: Duration) -> Self {
        self.receive_timeout_ms = Some(limit.as_millis() as u64);
        self
    }

    /// Transport limits derived from this config.
    pub fn limits(&self) -> TransportLimits {
        TransportLimits {
            max_frame_len: self.max_frame_len,
            connect_timeout: self.connect_timeout_ms.map(Duration::from_millis),
            receive_timeout: self.receive_timeout_ms.map(Duration::from_millis),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_address: String,
    /// Security mode; must match the clients'.
    pub security: SecurityMode,
    /// Largest accepted frame body.
    pub max_frame_len: usize,
    /// Receive timeout in milliseconds.
    pub receive_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{}", DEFAULT_PORT),
            security: SecurityMode::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            receive_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    /// Config listening on `bind_address`.
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
            ..Self::default()
        }
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Set the security mode.
    pub fn with_security(mut self, security: SecurityMode) -> Self {
        self.security = security;
        self
    }

    /// Set the receive timeout.
    pub fn with_receive_timeout(mut self, limit: Duration) -> Self {
        self.receive_timeout_ms = Some(limit.as_millis() as u64);
        self
    }

    /// Transport limits derived from this config.
    pub fn limits(&self) -> TransportLimits {
        TransportLimits {
            max_frame_len: self.max_frame_len,
            connect_timeout: None,
            receive_timeout: self.receive_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.port, 27015);
        assert_eq!(config.security, SecurityMode::Negotiated);
        assert_eq!(config.limits().receive_timeout, None);
        assert_eq!(ServerConfig::default().bind_address, "0.0.0.0:27015");
    }

    #[test]
    fn test_from_json_partial() {
        let config =
            ChannelConfig::from_json(r#"{"host": "10.0.0.2", "receive_timeout_ms": 1500}"#)
                .unwrap();
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(
            config.limits().receive_timeout,
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_security_mode_json() {
        let config = ServerConfig::from_json(r#"{"security": "plain"}"#).unwrap();
        assert_eq!(config.security, SecurityMode::Plain);

        let config = ServerConfig::from_json(
            r#"{"security": {"pre_shared": {"personalization": "lab"}}}"#,
        )
        .unwrap();
        match config.security {
            SecurityMode::PreShared(secrets) => {
                assert_eq!(secrets.personalization, "lab");
                assert_eq!(secrets.entropy.len(), 32);
                assert_eq!(secrets.encoder_nonce, 1);
            }
            other => panic!("unexpected mode {:?}", other),
        }

        assert!(ChannelConfig::from_json(r#"{"security": "bogus"}"#).is_err());
    }

    #[test]
    fn test_security_mode_from_str() {
        assert_eq!("Plain".parse::<SecurityMode>().unwrap(), SecurityMode::Plain);
        assert!(matches!(
            "preshared".parse::<SecurityMode>().unwrap(),
            SecurityMode::PreShared(_)
        ));
        assert!("negotiated".parse::<SecurityMode>().unwrap().is_tagged());
        assert!("tls".parse::<SecurityMode>().is_err());
    }

    #[test]
    fn test_preshared_nonces_swap_by_role() {
        let secrets = PresharedSecrets::default();
        let (client_enc, client_dec) = secrets.params(Role::Client);
        let (server_enc, server_dec) = secrets.params(Role::Server);

        assert_eq!(client_enc.nonce(), server_dec.nonce());
        assert_eq!(client_dec.nonce(), server_enc.nonce());
        assert_eq!(client_enc.nonce(), &1u64.to_be_bytes());
        assert_eq!(client_enc.secret(), b"00000000000000000000000000000000");
        assert_eq!(client_enc.personalization(), "demo");
    }

    #[test]
    fn test_preshared_debug_redacts_entropy() {
        let rendered = format!("{:?}", PresharedSecrets::default());
        assert!(!rendered.contains("0000"));
        assert!(rendered.contains("demo"));
    }
}
