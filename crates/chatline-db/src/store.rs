//! Storage contracts used by the realtime gateway.
//!
//! The gateway only sees these traits so it can run against any store with
//! per-operation atomicity. `Database` is the SQLite implementation. All methods
//! are blocking; async callers should run them on `spawn_blocking`.

use anyhow::{Result, anyhow};
use uuid::Uuid;

use chatline_types::models::{Message, NewMessage, User};

use crate::Database;

/// Durable append-only record of chat messages.
pub trait MessageStore: Send + Sync {
    /// Persist a message and return it with its assigned id and timestamp.
    fn append(&self, message: NewMessage) -> Result<Message>;

    /// History between `me` and `peer`, or the public room when `peer` is `None`.
    /// Sorted ascending by timestamp, ties in insertion order.
    fn query_conversation(&self, me: Uuid, peer: Option<Uuid>) -> Result<Vec<Message>>;
}

/// Durable record of users and their online flag.
pub trait UserDirectory: Send + Sync {
    fn list_all(&self) -> Result<Vec<User>>;

    fn list_all_except(&self, user_id: Uuid) -> Result<Vec<User>>;

    fn find_user(&self, user_id: Uuid) -> Result<Option<User>>;

    /// Idempotent.
    fn set_online(&self, user_id: Uuid, online: bool) -> Result<()>;
}

impl MessageStore for Database {
    fn append(&self, message: NewMessage) -> Result<Message> {
        if message.receiver == Some(message.sender) {
            return Err(anyhow!("sender {} cannot message itself", message.sender));
        }
        self.insert_message(&message)
    }

    fn query_conversation(&self, me: Uuid, peer: Option<Uuid>) -> Result<Vec<Message>> {
        let rows = match peer {
            Some(peer) => self.get_direct_messages(&me.to_string(), &peer.to_string())?,
            None => self.get_public_messages()?,
        };
        rows.into_iter().map(Message::try_from).collect()
    }
}

impl UserDirectory for Database {
    fn list_all(&self) -> Result<Vec<User>> {
        self.get_roster(None)?.into_iter().map(User::try_from).collect()
    }

    fn list_all_except(&self, user_id: Uuid) -> Result<Vec<User>> {
        self.get_roster(Some(&user_id.to_string()))?
            .into_iter()
            .map(User::try_from)
            .collect()
    }

    fn find_user(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.get_user_by_id(&user_id.to_string())?.map(|row| User {
            id: user_id,
            username: row.username,
            online: row.online,
        }))
    }

    fn set_online(&self, user_id: Uuid, online: bool) -> Result<()> {
        self.set_user_online(&user_id.to_string(), online)
    }
}
