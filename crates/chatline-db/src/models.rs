//! Database row types. These map directly to SQLite rows and stay
//! independent of the wire models in chatline-types.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use chatline_types::models::{Message, User};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub online: bool,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: Option<String>,
    pub text: String,
    pub created_at: String,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let receiver = match row.receiver_id.as_deref() {
            Some(id) => Some(
                id.parse::<Uuid>()
                    .with_context(|| format!("corrupt receiver_id on message {}", row.id))?,
            ),
            None => None,
        };

        Ok(Message {
            id: row
                .id
                .parse()
                .with_context(|| format!("corrupt message id '{}'", row.id))?,
            sender: row
                .sender_id
                .parse()
                .with_context(|| format!("corrupt sender_id on message {}", row.id))?,
            receiver,
            text: row.text,
            timestamp: parse_timestamp(&row.created_at)?,
        })
    }
}

pub struct RosterRow {
    pub id: String,
    pub username: String,
    pub online: bool,
}

impl TryFrom<RosterRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: RosterRow) -> Result<Self> {
        Ok(User {
            id: row
                .id
                .parse()
                .with_context(|| format!("corrupt user id '{}'", row.id))?,
            username: row.username,
            online: row.online,
        })
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("corrupt created_at '{}'", raw))?
        .with_timezone(&Utc))
}

/// RFC 3339 with millisecond precision and a `Z` suffix, so string order is time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
