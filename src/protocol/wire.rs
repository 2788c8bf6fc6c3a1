//! Frame payload types for the chat protocol
//!
//! Every frame on the wire is a single JSON document. The first frame a
//! client sends is [`Login`]; everything after that is a [`ClientAction`].
//! The server only ever sends [`ServerFrame`] variants.

use serde::{Deserialize, Serialize};

/// Session handshake, the first frame after connect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Login {
    pub username: String,
    pub password: String,
}

/// Inbound action frame, dispatched on the `action` tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientAction {
    /// Create a room and join it
    Create { room: String },
    /// Join an existing room
    Join { room: String },
    /// Leave a room
    Leave { room: String },
    /// Broadcast a message to a room
    Message { room: String, message: String },
    /// Direct message to a single user
    Dm { recipient: String, message: String },
}

/// Outbound frame from server to client
///
/// Serialized shapes match the wire contract exactly:
/// `{"success": ...}`, `{"error": ...}`, `{"info": ...}` and
/// `{"sender": ..., "message": ..., "dm"?: "true"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// Handshake accepted
    Success { success: String },
    /// Operation or handshake failure, connection stays open
    Error { error: String },
    /// Control acknowledgement
    Info { info: String },
    /// A delivered room or direct message
    Delivery {
        sender: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        dm: Option<String>,
    },
}

impl ServerFrame {
    /// Handshake acceptance frame
    pub fn authenticated() -> Self {
        ServerFrame::Success {
            success: "Authenticated".to_string(),
        }
    }

    /// Error frame with the given message
    pub fn error<T: Into<String>>(msg: T) -> Self {
        ServerFrame::Error { error: msg.into() }
    }

    /// Info frame with the given message
    pub fn info<T: Into<String>>(msg: T) -> Self {
        ServerFrame::Info { info: msg.into() }
    }

    /// Room broadcast delivery, already rendered for the recipient
    pub fn delivery<S: Into<String>, M: Into<String>>(sender: S, message: M) -> Self {
        ServerFrame::Delivery {
            sender: sender.into(),
            message: message.into(),
            dm: None,
        }
    }

    /// Direct message delivery, flagged with `dm: "true"`
    pub fn direct<S: Into<String>, M: Into<String>>(sender: S, message: M) -> Self {
        ServerFrame::Delivery {
            sender: sender.into(),
            message: message.into(),
            dm: Some("true".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_roundtrip() {
        let json = r#"{"username":"alice","password":"pw1"}"#;
        let login: Login = serde_json::from_str(json).unwrap();
        assert_eq!(login.username, "alice");
        assert_eq!(login.password, "pw1");
    }

    #[test]
    fn test_action_tags() {
        let create: ClientAction =
            serde_json::from_str(r#"{"action":"create","room":"general"}"#).unwrap();
        assert_eq!(
            create,
            ClientAction::Create {
                room: "general".to_string()
            }
        );

        let msg: ClientAction =
            serde_json::from_str(r#"{"action":"message","room":"general","message":"hi"}"#)
                .unwrap();
        assert_eq!(
            msg,
            ClientAction::Message {
                room: "general".to_string(),
                message: "hi".to_string()
            }
        );

        let dm: ClientAction =
            serde_json::from_str(r#"{"action":"dm","recipient":"bob","message":"psst"}"#).unwrap();
        assert_eq!(
            dm,
            ClientAction::Dm {
                recipient: "bob".to_string(),
                message: "psst".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<ClientAction, _> =
            serde_json::from_str(r#"{"action":"explode","room":"general"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_action_serializes_with_tag() {
        let leave = ClientAction::Leave {
            room: "general".to_string(),
        };
        let json = serde_json::to_value(&leave).unwrap();
        assert_eq!(json["action"], "leave");
        assert_eq!(json["room"], "general");
    }

    #[test]
    fn test_delivery_shape() {
        let frame = ServerFrame::delivery("alice", "(alice): hi");
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["sender"], "alice");
        assert_eq!(json["message"], "(alice): hi");
        assert!(json.get("dm").is_none());

        let dm = ServerFrame::direct("alice", "psst");
        let json = serde_json::to_value(&dm).unwrap();
        assert_eq!(json["dm"], "true");
    }

    #[test]
    fn test_control_shapes() {
        let json = serde_json::to_value(ServerFrame::authenticated()).unwrap();
        assert_eq!(json["success"], "Authenticated");

        let json = serde_json::to_value(ServerFrame::error("Room does not exist")).unwrap();
        assert_eq!(json["error"], "Room does not exist");

        let json = serde_json::to_value(ServerFrame::info("Joined room")).unwrap();
        assert_eq!(json["info"], "Joined room");
    }

    #[test]
    fn test_server_frame_deserializes_untagged() {
        let frame: ServerFrame = serde_json::from_str(r#"{"info":"Room created"}"#).unwrap();
        assert_eq!(frame, ServerFrame::info("Room created"));

        let frame: ServerFrame =
            serde_json::from_str(r#"{"sender":"bob","message":"hi","dm":"true"}"#).unwrap();
        assert_eq!(frame, ServerFrame::direct("bob", "hi"));
    }
}
