//! QUIC-based chat client
//!
//! Connects to the chat server, performs the login handshake on a single
//! bidirectional stream, then exposes action senders and an event channel
//! of inbound frames.

use std::net::SocketAddr;
use std::sync::Arc;

use quinn::{ClientConfig as QuinnClientConfig, Connection, Endpoint, RecvStream, SendStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::protocol::{codec, ClientAction, FrameCodec, Login, ServerFrame};

/// Chat client configuration
#[derive(Clone, Debug)]
pub struct ChatClientConfig {
    /// Server address to connect to
    pub server_addr: SocketAddr,
    /// Client bind address (use 0.0.0.0:0 for auto)
    pub bind_addr: SocketAddr,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for ChatClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:8080".parse().unwrap(),
            bind_addr: "0.0.0.0:0".parse().unwrap(),
            connect_timeout_secs: 10,
        }
    }
}

/// Events that the client can receive
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A frame arrived from the server
    Frame(ServerFrame),
    /// The connection ended
    Disconnected(String),
}

/// QUIC-based chat client
pub struct ChatClient {
    config: ChatClientConfig,
    username: Option<String>,
    connection: Option<Connection>,
    endpoint: Option<Endpoint>,
    send: Option<Arc<Mutex<SendStream>>>,
}

impl ChatClient {
    /// Create a new chat client with the given configuration
    pub fn new(config: ChatClientConfig) -> Self {
        Self {
            config,
            username: None,
            connection: None,
            endpoint: None,
            send: None,
        }
    }

    /// Connect and authenticate
    ///
    /// Returns the event channel on success. An authentication rejection
    /// surfaces as `ChatError::Auth` carrying the server's error text.
    pub async fn connect(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<mpsc::UnboundedReceiver<ClientEvent>> {
        info!("Connecting to chat server at {}", self.config.server_addr);

        let client_config = self.configure_client()?;

        let mut endpoint = Endpoint::client(self.config.bind_addr)
            .map_err(|e| ChatError::network(format!("Failed to create endpoint: {}", e)))?;
        endpoint.set_default_client_config(client_config);
        self.endpoint = Some(endpoint.clone());

        let connecting = endpoint
            .connect(self.config.server_addr, "localhost")
            .map_err(|e| ChatError::connection(format!("Failed to initiate connection: {}", e)))?;

        let connection = tokio::time::timeout(
            std::time::Duration::from_secs(self.config.connect_timeout_secs),
            connecting,
        )
        .await
        .map_err(|_| ChatError::timeout("Connection timeout"))?
        .map_err(|e| ChatError::connection(format!("Failed to connect: {}", e)))?;

        self.connection = Some(connection.clone());

        // Single duplex stream for the whole session
        let (mut send, mut recv) = connection.open_bi().await?;

        // Handshake: login frame first, then wait for the verdict
        let login = Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let data = codec::encode(&login)
            .map_err(|e| ChatError::serialization(format!("Failed to encode login: {}", e)))?;
        send.write_all(&data).await?;

        match read_one_frame(&mut recv).await? {
            Some(ServerFrame::Success { success }) => {
                debug!("Handshake accepted: {}", success);
            }
            Some(ServerFrame::Error { error }) => {
                return Err(ChatError::auth(error));
            }
            Some(other) => {
                return Err(ChatError::protocol(format!(
                    "Unexpected handshake response: {:?}",
                    other
                )));
            }
            None => {
                return Err(ChatError::connection("Server closed during handshake"));
            }
        }

        info!("Authenticated as '{}'", username);
        self.username = Some(username.to_string());
        self.send = Some(Arc::new(Mutex::new(send)));

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(receive_frames(recv, event_tx));

        Ok(event_rx)
    }

    /// Configure the QUIC client
    fn configure_client(&self) -> Result<QuinnClientConfig> {
        // Accepts the server's self-signed development certificate.
        // WARNING: insecure, development/testing only.
        let mut crypto = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth();
        crypto.alpn_protocols = vec![b"parley".to_vec()];

        Ok(QuinnClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
                .map_err(|e| ChatError::config(format!("Failed to create QUIC config: {}", e)))?,
        )))
    }

    /// Create a room and join it
    pub async fn create_room(&self, room: &str) -> Result<()> {
        self.send_action(&ClientAction::Create {
            room: room.to_string(),
        })
        .await
    }

    /// Join an existing room
    pub async fn join_room(&self, room: &str) -> Result<()> {
        self.send_action(&ClientAction::Join {
            room: room.to_string(),
        })
        .await
    }

    /// Leave a room
    pub async fn leave_room(&self, room: &str) -> Result<()> {
        self.send_action(&ClientAction::Leave {
            room: room.to_string(),
        })
        .await
    }

    /// Send a message to a room
    pub async fn send_message(&self, room: &str, message: &str) -> Result<()> {
        self.send_action(&ClientAction::Message {
            room: room.to_string(),
            message: message.to_string(),
        })
        .await
    }

    /// Send a direct message to a user
    pub async fn direct_message(&self, recipient: &str, message: &str) -> Result<()> {
        self.send_action(&ClientAction::Dm {
            recipient: recipient.to_string(),
            message: message.to_string(),
        })
        .await
    }

    async fn send_action(&self, action: &ClientAction) -> Result<()> {
        let send = self
            .send
            .as_ref()
            .ok_or_else(|| ChatError::connection("Not connected to server"))?;

        let data = codec::encode(action)
            .map_err(|e| ChatError::serialization(format!("Failed to encode action: {}", e)))?;

        let mut send = send.lock().await;
        send.write_all(&data).await?;
        Ok(())
    }

    /// Disconnect from the chat server
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(send) = self.send.take() {
            let mut send = send.lock().await;
            let _ = send.finish();
        }
        if let Some(connection) = self.connection.take() {
            connection.close(0u32.into(), b"Client disconnect");
            info!("Disconnected from chat server");
        }
        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close(0u32.into(), b"Client shutdown");
        }
        self.username = None;
        Ok(())
    }

    /// The authenticated username, if any
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Check if connected to server
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }
}

/// Read exactly one frame from the stream
async fn read_one_frame(recv: &mut RecvStream) -> Result<Option<ServerFrame>> {
    let mut frames = FrameCodec::new();
    let mut buf = vec![0u8; 4096];

    loop {
        if let Some(payload) = frames
            .decode_next()
            .map_err(|e| ChatError::protocol(format!("Frame decode error: {}", e)))?
        {
            let frame = serde_json::from_slice(&payload)?;
            return Ok(Some(frame));
        }

        match recv.read(&mut buf).await {
            Ok(Some(n)) => frames.feed(&buf[..n]),
            Ok(None) => return Ok(None),
            Err(e) => return Err(ChatError::network(format!("Stream read error: {}", e))),
        }
    }
}

/// Pump inbound frames into the event channel until the stream ends
async fn receive_frames(mut recv: RecvStream, event_tx: mpsc::UnboundedSender<ClientEvent>) {
    let mut frames = FrameCodec::new();
    let mut buf = vec![0u8; 4096];

    loop {
        match recv.read(&mut buf).await {
            Ok(Some(n)) => {
                frames.feed(&buf[..n]);
                loop {
                    match frames.decode_next() {
                        Ok(Some(payload)) => match serde_json::from_slice(&payload) {
                            Ok(frame) => {
                                let _ = event_tx.send(ClientEvent::Frame(frame));
                            }
                            Err(e) => warn!("Failed to parse server frame: {}", e),
                        },
                        Ok(None) => break,
                        Err(e) => {
                            let _ = event_tx.send(ClientEvent::Disconnected(format!(
                                "Frame decode error: {}",
                                e
                            )));
                            return;
                        }
                    }
                }
            }
            Ok(None) => {
                let _ = event_tx.send(ClientEvent::Disconnected("Server closed".to_string()));
                return;
            }
            Err(e) => {
                let _ = event_tx.send(ClientEvent::Disconnected(format!("Connection lost: {}", e)));
                return;
            }
        }
    }
}

/// Custom certificate verifier that accepts any certificate (INSECURE - for development only)
#[derive(Debug)]
struct AcceptAnyCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
