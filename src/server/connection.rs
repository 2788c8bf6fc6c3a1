//! Per-connection handler
//!
//! Walks one connection through `Connecting -> Authenticating -> Active ->
//! Closed`: accepts the duplex stream, authenticates the first frame,
//! registers the session, then forwards inbound action frames to the
//! router until the stream ends. The single exit path purges the user from
//! every room and drops the session exactly once.

use std::sync::Arc;

use bytes::Bytes;
use quinn::{Connection, RecvStream, SendStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::protocol::{codec, ClientAction, FrameCodec, Login, ServerFrame};
use crate::server::registry::Sink;
use crate::server::router::MessageRouter;
use crate::server::state::ServerState;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connecting,
    Authenticating,
    Active,
    Closed,
}

/// Handler for a single client connection
pub struct ConnectionHandler {
    state: Arc<ServerState>,
    router: MessageRouter,
    connection: Connection,
    session_id: String,
}

impl ConnectionHandler {
    pub fn new(state: Arc<ServerState>, connection: Connection) -> Self {
        let router = MessageRouter::new(Arc::clone(&state));
        Self {
            state,
            router,
            connection,
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Run the connection to completion
    ///
    /// This is the main entry point that should be spawned as a task.
    pub async fn run(self) -> Result<()> {
        let addr = self.connection.remote_address();
        info!("New connection from {} (session {})", addr, self.session_id);

        let result = self.serve().await;

        match &result {
            Ok(()) => info!("Connection from {} closed", addr),
            Err(e) => info!("Connection from {} closed: {}", addr, e),
        }
        result
    }

    async fn serve(&self) -> Result<()> {
        let mut lifecycle = ConnectionState::Connecting;
        debug!("Session {} is {:?}", self.session_id, lifecycle);

        let (mut send, mut recv) = self.connection.accept_bi().await.map_err(|e| {
            ChatError::connection(format!("Failed to accept duplex stream: {}", e))
        })?;
        lifecycle = ConnectionState::Authenticating;
        debug!("Session {} is {:?}", self.session_id, lifecycle);

        let mut frames = FrameReader::new();

        // The first frame must be the handshake
        let Some(payload) = frames.next(&mut recv).await? else {
            debug!("Session {} ended before handshake", self.session_id);
            return Ok(());
        };
        let login: Login = match serde_json::from_slice(&payload) {
            Ok(login) => login,
            Err(e) => {
                write_frame(&mut send, &ServerFrame::error("Malformed handshake")).await?;
                return Err(ChatError::protocol(format!("Invalid handshake: {}", e)));
            }
        };

        if !self.state.authenticate(&login.username, &login.password).await {
            warn!(
                "Authentication failed for '{}' (session {})",
                login.username, self.session_id
            );
            write_frame(
                &mut send,
                &ServerFrame::error("Invalid username or password"),
            )
            .await?;
            return Ok(());
        }

        let username = login.username;
        let (sink, outbound) = mpsc::unbounded_channel();
        if let Err(e) = self.state.register_session(&username, sink.clone()).await {
            let reason = match e {
                ChatError::AlreadyConnected(_) => "User already connected",
                _ => "Server at capacity",
            };
            write_frame(&mut send, &ServerFrame::error(reason)).await?;
            return Err(e);
        }

        write_frame(&mut send, &ServerFrame::authenticated()).await?;
        lifecycle = ConnectionState::Active;
        info!(
            "User '{}' authenticated (session {}, {:?})",
            username, self.session_id, lifecycle
        );

        // The writer task owns the send half from here on; everything
        // outbound goes through the session sink.
        let writer = tokio::spawn(write_outbound(send, outbound));

        let result = self.read_actions(&mut recv, &mut frames, &username, &sink).await;

        // Exactly-once cleanup on every exit from the read loop
        self.state.disconnect(&username).await;
        drop(sink);
        let _ = writer.await;

        lifecycle = ConnectionState::Closed;
        debug!("Session {} reached {:?}", self.session_id, lifecycle);
        result
    }

    /// Forward inbound action frames to the router until the stream ends
    ///
    /// A read failure is terminal for the connection; it is never retried.
    async fn read_actions(
        &self,
        recv: &mut RecvStream,
        frames: &mut FrameReader,
        username: &str,
        sink: &Sink,
    ) -> Result<()> {
        while let Some(payload) = frames.next(recv).await? {
            match serde_json::from_slice::<ClientAction>(&payload) {
                Ok(action) => self.router.handle(username, action).await,
                Err(e) => {
                    debug!("Unparseable action from '{}': {}", username, e);
                    let _ = sink.send(ServerFrame::error("Unrecognized action"));
                }
            }
        }
        Ok(())
    }
}

/// Incremental frame reader over a receive stream
struct FrameReader {
    codec: FrameCodec,
    buf: Vec<u8>,
}

impl FrameReader {
    fn new() -> Self {
        Self {
            codec: FrameCodec::new(),
            buf: vec![0u8; 4096],
        }
    }

    /// Read the next complete frame payload, or None when the stream is
    /// finished
    async fn next(&mut self, recv: &mut RecvStream) -> Result<Option<Bytes>> {
        loop {
            if let Some(payload) = self
                .codec
                .decode_next()
                .map_err(|e| ChatError::protocol(format!("Frame decode error: {}", e)))?
            {
                return Ok(Some(payload));
            }

            match recv.read(&mut self.buf).await {
                Ok(Some(n)) => self.codec.feed(&self.buf[..n]),
                Ok(None) => return Ok(None),
                Err(e) => {
                    return Err(ChatError::network(format!("Stream read error: {}", e)));
                }
            }
        }
    }
}

/// Write a single frame directly to the send stream
async fn write_frame(send: &mut SendStream, frame: &ServerFrame) -> Result<()> {
    let data = codec::encode(frame)
        .map_err(|e| ChatError::serialization(format!("Failed to encode frame: {}", e)))?;
    send.write_all(&data).await?;
    Ok(())
}

/// Drain the session sink into the send stream until it closes
async fn write_outbound(mut send: SendStream, mut outbound: mpsc::UnboundedReceiver<ServerFrame>) {
    while let Some(frame) = outbound.recv().await {
        let data = match codec::encode(&frame) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to encode outbound frame: {}", e);
                continue;
            }
        };
        if let Err(e) = send.write_all(&data).await {
            warn!("Outbound write failed: {}", e);
            break;
        }
    }
    let _ = send.finish();
}
