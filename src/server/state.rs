//! Shared server state behind the global lock
//!
//! One coarse `Mutex` serializes every read and write of the credential
//! store, the room directory and the session registry, so all concurrent
//! connections observe a single consistent view. The durable flush runs
//! inside the critical section: a mutation is not acknowledged before its
//! snapshot write has completed or been logged as failed.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info};

use crate::auth::CredentialStore;
use crate::error::{ChatError, Result};
use crate::server::registry::{SessionRegistry, Sink};
use crate::server::rooms::RoomDirectory;
use crate::storage::SnapshotStore;
use crate::ServerConfig;

/// Everything guarded by the global lock
#[derive(Debug)]
pub struct World {
    pub credentials: CredentialStore,
    pub rooms: RoomDirectory,
    pub sessions: SessionRegistry,
}

/// Server state shared between all connection handlers
pub struct ServerState {
    config: ServerConfig,
    store: SnapshotStore,
    world: Mutex<World>,
}

impl ServerState {
    /// Open the snapshot store and load the durable state
    pub async fn load(config: ServerConfig) -> Result<Arc<Self>> {
        let store = SnapshotStore::open(&config.data_dir).await?;
        let (credentials, history) = store.load().await;

        let world = World {
            credentials: CredentialStore::from_snapshot(credentials),
            rooms: RoomDirectory::from_snapshot(history),
            sessions: SessionRegistry::new(),
        };

        info!(
            "Loaded {} users and {} rooms from {}",
            world.credentials.len(),
            world.rooms.len(),
            config.data_dir.display()
        );

        Ok(Arc::new(Self {
            config,
            store,
            world: Mutex::new(world),
        }))
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Take the global lock
    pub async fn lock_world(&self) -> MutexGuard<'_, World> {
        self.world.lock().await
    }

    /// Flush both snapshots while still holding the lock
    ///
    /// Failures are logged, never propagated to the client: the write is
    /// recorded as failed and the in-memory state stays authoritative.
    pub async fn flush_world(&self, world: &World) {
        let credentials = world.credentials.snapshot();
        let history = world.rooms.history_snapshot();
        if let Err(e) = self.store.flush(credentials, &history).await {
            error!("Snapshot flush failed: {}", e);
        }
    }

    /// Check a handshake credential pair
    pub async fn authenticate(&self, username: &str, password: &str) -> bool {
        let world = self.world.lock().await;
        world.credentials.verify(username, password)
    }

    /// Register a session for an authenticated user
    pub async fn register_session(&self, username: &str, sink: Sink) -> Result<()> {
        let mut world = self.world.lock().await;
        if world.sessions.len() >= self.config.max_connections {
            return Err(ChatError::resource_limit(format!(
                "Maximum connections reached: {}",
                self.config.max_connections
            )));
        }
        world.sessions.register(username, sink)
    }

    /// Tear down a session: purge the user from every room, then release
    /// the session entry. Idempotent.
    pub async fn disconnect(&self, username: &str) {
        let mut world = self.world.lock().await;
        let world = &mut *world;
        world
            .sessions
            .purge_from_all_rooms(&mut world.rooms, username);
        if world.sessions.remove(username).is_some() {
            info!("Session for '{}' closed", username);
        }
    }

    /// Create a credential record and flush it durably
    ///
    /// Registration happens out-of-band of the wire protocol, against the
    /// same snapshot store the server loads at startup.
    pub async fn register_user(&self, username: &str, password: &str) -> Result<()> {
        let mut world = self.world.lock().await;
        world.credentials.insert(username, password)?;

        let history = world.rooms.history_snapshot();
        self.store
            .flush(world.credentials.snapshot(), &history)
            .await
    }

    /// Number of active sessions
    pub async fn session_count(&self) -> usize {
        self.world.lock().await.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn test_state(dir: &std::path::Path) -> Arc<ServerState> {
        let config = ServerConfig {
            data_dir: dir.to_path_buf(),
            ..Default::default()
        };
        ServerState::load(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_and_authenticate() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        state.register_user("alice", "pw1").await.unwrap();
        assert!(state.authenticate("alice", "pw1").await);
        assert!(!state.authenticate("alice", "wrong").await);
        assert!(!state.authenticate("bob", "pw1").await);
    }

    #[tokio::test]
    async fn test_credentials_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let state = test_state(dir.path()).await;
            state.register_user("alice", "pw1").await.unwrap();
        }

        let state = test_state(dir.path()).await;
        assert!(state.authenticate("alice", "pw1").await);
        assert!(!state.authenticate("alice", "pw2").await);
    }

    #[tokio::test]
    async fn test_duplicate_session_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let (sink, _rx) = mpsc::unbounded_channel();
        state.register_session("alice", sink).await.unwrap();

        let (second, _rx2) = mpsc::unbounded_channel();
        assert!(matches!(
            state.register_session("alice", second).await,
            Err(ChatError::AlreadyConnected(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            data_dir: dir.path().to_path_buf(),
            max_connections: 1,
            ..Default::default()
        };
        let state = ServerState::load(config).await.unwrap();

        let (sink, _rx) = mpsc::unbounded_channel();
        state.register_session("alice", sink).await.unwrap();

        let (second, _rx2) = mpsc::unbounded_channel();
        assert!(matches!(
            state.register_session("bob", second).await,
            Err(ChatError::ResourceLimit(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_purges_rooms() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let (sink, _rx) = mpsc::unbounded_channel();
        state.register_session("alice", sink).await.unwrap();
        {
            let mut world = state.lock_world().await;
            world.rooms.create("general").unwrap().add_member("alice");
            world.sessions.note_joined("alice", "general");
        }

        state.disconnect("alice").await;
        // Disconnecting again is harmless
        state.disconnect("alice").await;

        let world = state.lock_world().await;
        assert!(!world.rooms.get("general").unwrap().is_member("alice"));
        assert_eq!(world.sessions.len(), 0);
    }
}
