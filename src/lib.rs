//! QUIC-based room chat server with durable history
//!
//! This library provides a chat server where authenticated clients join
//! named rooms over a persistent duplex channel, exchange broadcast and
//! direct messages, and every mutation is flushed to a durable snapshot
//! before it is acknowledged.

pub mod auth;
pub mod client;
pub mod error;
pub mod protocol;
pub mod server;
pub mod storage;

pub use client::{ChatClient, ChatClientConfig, ClientEvent};
pub use error::{ChatError, Result};
pub use server::ChatServer;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since UNIX epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Chat server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Server listen address
    pub bind_addr: SocketAddr,
    /// Directory holding the durable snapshots
    pub data_dir: PathBuf,
    /// Maximum number of concurrent sessions
    pub max_connections: usize,
    /// Connection idle timeout in seconds
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            data_dir: PathBuf::from("."),
            max_connections: 1000,
            idle_timeout_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.idle_timeout_secs, 300);
    }

    #[test]
    fn test_timestamp_monotonic_enough() {
        let a = current_timestamp();
        let b = current_timestamp();
        assert!(b >= a);
        assert!(a > 0);
    }
}
