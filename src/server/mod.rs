//! Chat server: QUIC endpoint, accept loop and shared state
//!
//! One task is spawned per accepted connection; all of them share the
//! globally locked [`state::ServerState`].

pub mod connection;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::Endpoint;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tracing::{error, info, warn};

use crate::error::{ChatError, Result};
use crate::ServerConfig;
use connection::ConnectionHandler;
use state::ServerState;

/// QUIC-based chat server
pub struct ChatServer {
    state: Arc<ServerState>,
    endpoint: Option<Endpoint>,
}

impl ChatServer {
    /// Load durable state and create the server
    pub async fn load(config: ServerConfig) -> Result<Self> {
        let state = ServerState::load(config).await?;
        Ok(Self {
            state,
            endpoint: None,
        })
    }

    /// Shared state handle, mainly for registration tooling and tests
    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    /// Bind the endpoint and serve connections until shutdown
    pub async fn start(&mut self) -> Result<()> {
        let config = self.state.config().clone();
        info!("Starting chat server on {}", config.bind_addr);

        // Generate a self-signed certificate for development
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()])
            .map_err(|e| ChatError::config(format!("Failed to generate certificate: {}", e)))?;

        let cert_der = CertificateDer::from(
            cert.serialize_der()
                .map_err(|e| ChatError::config(format!("Failed to serialize certificate: {}", e)))?,
        );
        let key_der =
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

        // Configure rustls
        let mut tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der)
            .map_err(|e| ChatError::config(format!("Failed to configure TLS: {}", e)))?;
        tls_config.alpn_protocols = vec![b"parley".to_vec()];

        // Configure QUIC
        let mut quic_config = quinn::ServerConfig::with_crypto(Arc::new(
            quinn::crypto::rustls::QuicServerConfig::try_from(tls_config)
                .map_err(|e| ChatError::config(format!("Failed to create QUIC config: {}", e)))?,
        ));

        let mut transport = quinn::TransportConfig::default();
        transport.max_idle_timeout(Some(
            quinn::IdleTimeout::try_from(Duration::from_secs(config.idle_timeout_secs))
                .map_err(|e| ChatError::config(format!("Invalid idle timeout: {}", e)))?,
        ));
        quic_config.transport_config(Arc::new(transport));

        // Create endpoint
        let endpoint = Endpoint::server(quic_config, config.bind_addr)
            .map_err(|e| ChatError::network(format!("Failed to create endpoint: {}", e)))?;

        info!("Chat server listening on {}", endpoint.local_addr()?);
        self.endpoint = Some(endpoint.clone());

        self.accept_connections(endpoint).await
    }

    /// Accept and handle incoming connections
    async fn accept_connections(&self, endpoint: Endpoint) -> Result<()> {
        while let Some(incoming) = endpoint.accept().await {
            let state = Arc::clone(&self.state);
            tokio::spawn(async move {
                let connection = match incoming.await {
                    Ok(connection) => connection,
                    Err(e) => {
                        error!("Connection setup failed: {}", e);
                        return;
                    }
                };

                let handler = ConnectionHandler::new(state, connection);
                if let Err(e) = handler.run().await {
                    error!("Connection handling failed: {}", e);
                }
            });
        }

        warn!("Endpoint stopped accepting connections");
        Ok(())
    }

    /// The bound address, once the server has started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoint
            .as_ref()
            .and_then(|endpoint| endpoint.local_addr().ok())
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close(0u32.into(), b"Server shutdown");
            info!("Chat server shutdown completed");
        }
        Ok(())
    }
}
