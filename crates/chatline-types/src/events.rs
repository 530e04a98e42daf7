use serde::{Deserialize, Serialize};

use crate::models::{Message, User};

/// Events sent over the realtime channel to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Full roster, sent to everyone whenever someone connects or disconnects
    Users(Vec<User>),

    /// A message that has been persisted
    ReceiveMessage(Message),

    /// Rejection of the client's last command. Only sent to the originating connection.
    Error { kind: ErrorKind, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Persistence,
}

/// Commands sent FROM client TO server over the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    SendMessage {
        /// Raw receiver id; absent, null or "" all mean the public room.
        #[serde(default, rename = "receiverId")]
        receiver_id: Option<String>,
        text: String,
    },
}
