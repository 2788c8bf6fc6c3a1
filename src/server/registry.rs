//! Session registry: connected users and their outbound sinks
//!
//! A session binds an authenticated username to the delivery sink of one
//! connection. The joined-room set held here is a back-reference cache;
//! membership truth lives in the room directory.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;

use crate::error::{ChatError, Result};
use crate::protocol::ServerFrame;
use crate::server::rooms::RoomDirectory;

/// Capability to deliver one frame to one connection's outbound stream
pub type Sink = mpsc::UnboundedSender<ServerFrame>;

/// Live binding between a username and its connection
#[derive(Debug)]
pub struct Session {
    sink: Sink,
    rooms: HashSet<String>,
}

impl Session {
    fn new(sink: Sink) -> Self {
        Self {
            sink,
            rooms: HashSet::new(),
        }
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    /// Names of the rooms this session has joined
    pub fn rooms(&self) -> &HashSet<String> {
        &self.rooms
    }
}

/// Registry of active sessions, keyed by username
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Register a session for an authenticated user
    ///
    /// Fails if a session for that username is already active; the second
    /// connection is rejected rather than silently stealing the name.
    pub fn register(&mut self, username: &str, sink: Sink) -> Result<()> {
        if self.sessions.contains_key(username) {
            return Err(ChatError::already_connected(username));
        }
        self.sessions.insert(username.to_string(), Session::new(sink));
        Ok(())
    }

    /// Look up the delivery sink for a user
    pub fn sink(&self, username: &str) -> Option<&Sink> {
        self.sessions.get(username).map(Session::sink)
    }

    /// Record that the user joined a room
    pub fn note_joined(&mut self, username: &str, room: &str) {
        if let Some(session) = self.sessions.get_mut(username) {
            session.rooms.insert(room.to_string());
        }
    }

    /// Record that the user left a room
    pub fn note_left(&mut self, username: &str, room: &str) {
        if let Some(session) = self.sessions.get_mut(username) {
            session.rooms.remove(room);
        }
    }

    /// Remove the user from every room they joined; idempotent
    pub fn purge_from_all_rooms(&mut self, rooms: &mut RoomDirectory, username: &str) {
        if let Some(session) = self.sessions.get_mut(username) {
            let joined = std::mem::take(&mut session.rooms);
            rooms.remove_member_from(&joined, username);
        }
    }

    /// Release the session entry, dropping its sink
    pub fn remove(&mut self, username: &str) -> Option<Session> {
        self.sessions.remove(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.sessions.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink_pair() -> (Sink, mpsc::UnboundedReceiver<ServerFrame>) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_register_and_duplicate() {
        let mut registry = SessionRegistry::new();
        let (sink, _rx) = sink_pair();
        registry.register("alice", sink).unwrap();

        let (second, _rx2) = sink_pair();
        assert!(matches!(
            registry.register("alice", second),
            Err(ChatError::AlreadyConnected(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_sink_lookup_and_delivery() {
        let mut registry = SessionRegistry::new();
        let (sink, mut rx) = sink_pair();
        registry.register("alice", sink).unwrap();

        registry
            .sink("alice")
            .unwrap()
            .send(ServerFrame::info("hello"))
            .unwrap();
        assert_eq!(rx.try_recv().unwrap(), ServerFrame::info("hello"));

        assert!(registry.sink("bob").is_none());
    }

    #[test]
    fn test_joined_room_backreferences() {
        let mut registry = SessionRegistry::new();
        let (sink, _rx) = sink_pair();
        registry.register("alice", sink).unwrap();

        registry.note_joined("alice", "a");
        registry.note_joined("alice", "b");
        registry.note_left("alice", "a");

        let session = registry.sessions.get("alice").unwrap();
        assert!(!session.rooms().contains("a"));
        assert!(session.rooms().contains("b"));
    }

    #[test]
    fn test_purge_from_all_rooms() {
        let mut rooms = RoomDirectory::new();
        rooms.create("a").unwrap().add_member("alice");
        rooms.create("b").unwrap().add_member("alice");

        let mut registry = SessionRegistry::new();
        let (sink, _rx) = sink_pair();
        registry.register("alice", sink).unwrap();
        registry.note_joined("alice", "a");
        registry.note_joined("alice", "b");

        registry.purge_from_all_rooms(&mut rooms, "alice");
        assert!(!rooms.get("a").unwrap().is_member("alice"));
        assert!(!rooms.get("b").unwrap().is_member("alice"));

        // Idempotent: purging again is a no-op
        registry.purge_from_all_rooms(&mut rooms, "alice");

        // Session itself is still registered until removed
        assert!(registry.contains("alice"));
        registry.remove("alice");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_drops_sink() {
        let mut registry = SessionRegistry::new();
        let (sink, mut rx) = sink_pair();
        registry.register("alice", sink).unwrap();

        registry.remove("alice");
        // With the registry's sender gone, the channel reports closed
        assert!(rx.try_recv().is_err());
    }
}
