//! Message router: interprets inbound actions and drives the room
//! directory and session registry
//!
//! Each action runs start-to-finish under the global lock, including the
//! durable flush, so every transition is atomic with respect to the rest
//! of the shared state. Fan-out pushes onto unbounded per-session sinks
//! and never suspends while the lock is held.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::protocol::{ClientAction, ServerFrame};
use crate::server::rooms::HistoryEntry;
use crate::server::state::{ServerState, World};

/// Sender name used for join/leave announcements
const SYSTEM_SENDER: &str = "System";

/// Routes parsed actions from one authenticated connection
#[derive(Clone)]
pub struct MessageRouter {
    state: Arc<ServerState>,
}

impl MessageRouter {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// Dispatch a single inbound action for `username`
    pub async fn handle(&self, username: &str, action: ClientAction) {
        match action {
            ClientAction::Create { room } => self.create_room(username, &room).await,
            ClientAction::Join { room } => self.join_room(username, &room).await,
            ClientAction::Leave { room } => self.leave_room(username, &room).await,
            ClientAction::Message { room, message } => {
                self.broadcast_message(username, &room, &message).await
            }
            ClientAction::Dm { recipient, message } => {
                self.direct_message(username, &recipient, &message).await
            }
        }
    }

    /// Create a room and join it
    pub async fn create_room(&self, username: &str, room: &str) {
        let mut world = self.state.lock_world().await;

        if world.rooms.create(room).is_err() {
            deliver(&world, username, ServerFrame::error("Room already exists"));
            return;
        }
        deliver(&world, username, ServerFrame::info("Room created"));

        join_locked(&mut world, username, room);
        self.state.flush_world(&world).await;
    }

    /// Join an existing room
    pub async fn join_room(&self, username: &str, room: &str) {
        let mut world = self.state.lock_world().await;

        if !world.rooms.contains(room) {
            deliver(&world, username, ServerFrame::error("Room does not exist"));
            return;
        }

        join_locked(&mut world, username, room);
        self.state.flush_world(&world).await;
    }

    /// Leave a room
    ///
    /// Leaving a room the user is not a member of is a complete no-op: no
    /// error frame, no announcement, no history entry.
    pub async fn leave_room(&self, username: &str, room: &str) {
        let mut world = self.state.lock_world().await;

        if !world.rooms.contains(room) {
            deliver(&world, username, ServerFrame::error("Room does not exist"));
            return;
        }

        let removed = world
            .rooms
            .get_mut(room)
            .map(|room| room.remove_member(username))
            .unwrap_or(false);
        if !removed {
            return;
        }

        world.sessions.note_left(username, room);
        deliver(&world, username, ServerFrame::info("Left room"));

        let announcement = format!("{} has left the room", username);
        broadcast_locked(&mut world, room, SYSTEM_SENDER, &announcement);
        self.state.flush_world(&world).await;
    }

    /// Append a message to a room's history and fan it out
    pub async fn broadcast_message(&self, username: &str, room: &str, message: &str) {
        let mut world = self.state.lock_world().await;

        if !world.rooms.contains(room) {
            deliver(&world, username, ServerFrame::error("Room does not exist"));
            return;
        }

        broadcast_locked(&mut world, room, username, message);
        self.state.flush_world(&world).await;
    }

    /// Deliver a direct message to the first room-member match
    ///
    /// A recipient present in no room gets nothing, and the sender gets no
    /// error frame; the drop is deliberate wire behavior.
    pub async fn direct_message(&self, sender: &str, recipient: &str, message: &str) {
        let world = self.state.lock_world().await;

        if world.rooms.find_member_room(recipient).is_none() {
            debug!("Direct message to '{}' dropped: not in any room", recipient);
            return;
        }

        deliver(&world, recipient, ServerFrame::direct(sender, message));
    }
}

/// Push a frame onto a user's sink, if they have one
///
/// A closed sink means the connection is tearing down; the frame is lost
/// by contract (best-effort delivery) and the failure is only logged.
fn deliver(world: &World, username: &str, frame: ServerFrame) {
    match world.sessions.sink(username) {
        Some(sink) => {
            if sink.send(frame).is_err() {
                warn!("Dropped frame for '{}': sink closed", username);
            }
        }
        None => debug!("No active session for '{}'", username),
    }
}

/// Shared join path for `create` and `join`; caller has verified the room
/// exists and still holds the lock
fn join_locked(world: &mut World, username: &str, room: &str) {
    if let Ok(room_entry) = world.rooms.get_mut(room) {
        room_entry.add_member(username);
    }
    world.sessions.note_joined(username, room);
    deliver(world, username, ServerFrame::info("Joined room"));

    let announcement = format!("{} has joined the room", username);
    broadcast_locked(world, room, SYSTEM_SENDER, &announcement);
}

/// Append to history and deliver one rendered copy per current member
///
/// The sender sees `(you): text`, everyone else `(<sender>): text`; the
/// rendering is per-recipient and never stored.
fn broadcast_locked(world: &mut World, room: &str, sender: &str, text: &str) {
    let World {
        rooms, sessions, ..
    } = world;

    let Ok(room_entry) = rooms.get_mut(room) else {
        return;
    };
    room_entry.append(HistoryEntry::new(sender, text));

    for member in room_entry.members() {
        let display = if member == sender {
            format!("(you): {}", text)
        } else {
            format!("({}): {}", sender, text)
        };
        match sessions.sink(member) {
            Some(sink) => {
                if sink.send(ServerFrame::delivery(sender, display)).is_err() {
                    warn!("Dropped broadcast for '{}': sink closed", member);
                }
            }
            None => debug!("No active session for member '{}'", member),
        }
    }
}
