//! Room directory: room lifecycle, membership and history
//!
//! The directory is the single source of truth for membership. Sessions
//! keep only room-name back-references, so the two views cannot drift as
//! long as both are mutated under the server's global lock.

use std::collections::{HashMap, HashSet};

use crate::current_timestamp;
use crate::error::{ChatError, Result};
use crate::storage::HistorySnapshot;

/// One appended history record
///
/// Entries are never mutated or reordered once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Milliseconds since UNIX epoch; zero for entries reloaded from a
    /// snapshot, which does not store timestamps
    pub timestamp: u64,
    pub sender: String,
    pub text: String,
}

impl HistoryEntry {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp: current_timestamp(),
            sender: sender.into(),
            text: text.into(),
        }
    }

    /// The durable `"sender: text"` form
    pub fn render(&self) -> String {
        format!("{}: {}", self.sender, self.text)
    }

    /// Rebuild an entry from its durable form
    fn parse(line: &str) -> Self {
        let (sender, text) = line.split_once(": ").unwrap_or(("", line));
        Self {
            timestamp: 0,
            sender: sender.to_string(),
            text: text.to_string(),
        }
    }
}

/// A chat room
#[derive(Debug)]
pub struct Room {
    pub name: String,
    members: HashSet<String>,
    history: Vec<HistoryEntry>,
}

impl Room {
    fn new(name: String) -> Self {
        Self {
            name,
            members: HashSet::new(),
            history: Vec::new(),
        }
    }

    /// Add a member; re-joining an existing member is a no-op
    pub fn add_member(&mut self, username: &str) -> bool {
        self.members.insert(username.to_string())
    }

    /// Remove a member; returns false if the user was not a member
    pub fn remove_member(&mut self, username: &str) -> bool {
        self.members.remove(username)
    }

    pub fn is_member(&self, username: &str) -> bool {
        self.members.contains(username)
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Append an entry to the history
    pub fn append(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    /// Full history in append order, exposed for join-time replay
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// History rendered to the durable snapshot form
    pub fn history_lines(&self) -> Vec<String> {
        self.history.iter().map(HistoryEntry::render).collect()
    }
}

/// Directory of all rooms, keyed by name
#[derive(Debug, Default)]
pub struct RoomDirectory {
    rooms: HashMap<String, Room>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self {
            rooms: HashMap::new(),
        }
    }

    /// Seed the directory from a loaded history snapshot
    ///
    /// Reloaded rooms start with zero members; their history persists
    /// across restarts.
    pub fn from_snapshot(snapshot: HistorySnapshot) -> Self {
        let mut directory = Self::new();
        for (name, lines) in snapshot {
            let mut room = Room::new(name.clone());
            room.history = lines.iter().map(|line| HistoryEntry::parse(line)).collect();
            directory.rooms.insert(name, room);
        }
        directory
    }

    /// Create a room
    pub fn create(&mut self, name: &str) -> Result<&mut Room> {
        if self.rooms.contains_key(name) {
            return Err(ChatError::room_exists(name));
        }
        Ok(self
            .rooms
            .entry(name.to_string())
            .or_insert_with(|| Room::new(name.to_string())))
    }

    /// Look up a room
    pub fn get(&self, name: &str) -> Result<&Room> {
        self.rooms
            .get(name)
            .ok_or_else(|| ChatError::room_not_found(name))
    }

    /// Look up a room for mutation
    pub fn get_mut(&mut self, name: &str) -> Result<&mut Room> {
        self.rooms
            .get_mut(name)
            .ok_or_else(|| ChatError::room_not_found(name))
    }

    /// Delete a room outright, returning it
    ///
    /// Nothing on the wire drives this; rooms are never implicitly deleted.
    pub fn delete(&mut self, name: &str) -> Result<Room> {
        self.rooms
            .remove(name)
            .ok_or_else(|| ChatError::room_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rooms.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Find any room the user is currently a member of
    ///
    /// Used by direct-message routing: the first match wins and the scan
    /// stops. Which room matches is irrelevant to delivery, since a user
    /// has exactly one sink.
    pub fn find_member_room(&self, username: &str) -> Option<&Room> {
        self.rooms.values().find(|room| room.is_member(username))
    }

    /// Remove the user from each of the named rooms; missing rooms and
    /// non-members are skipped
    pub fn remove_member_from(&mut self, room_names: &HashSet<String>, username: &str) {
        for name in room_names {
            if let Some(room) = self.rooms.get_mut(name) {
                room.remove_member(username);
            }
        }
    }

    /// Export every room's history in the durable snapshot form
    ///
    /// Rooms that have never had a message appended are omitted, matching
    /// the snapshot contract: only history persists.
    pub fn history_snapshot(&self) -> HistorySnapshot {
        self.rooms
            .values()
            .filter(|room| !room.history.is_empty())
            .map(|room| (room.name.clone(), room.history_lines()))
            .collect()
    }
}
