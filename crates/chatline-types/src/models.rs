use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One roster entry. `online` reflects live presence when sent over the
/// gateway and the persisted directory flag when served over HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub online: bool,
}

/// A persisted chat message. `receiver: None` is the public room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Uuid,
    pub receiver: Option<Uuid>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A message that has not been stored yet. The store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: Uuid,
    pub receiver: Option<Uuid>,
    pub text: String,
}
