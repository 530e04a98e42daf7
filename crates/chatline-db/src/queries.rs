use anyhow::Result;
use chrono::{SubsecRound, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use chatline_types::models::{Message, NewMessage};

use crate::Database;
use crate::models::{MessageRow, RosterRow, UserRow, format_timestamp, parse_timestamp};

const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, text, created_at";

impl Database {
    // -- Users --

    /// Insert a user. Returns false if the username is already taken.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Roster rows for every user, optionally excluding one id.
    pub fn get_roster(&self, exclude: Option<&str>) -> Result<Vec<RosterRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, online FROM users
                 WHERE ?1 IS NULL OR id != ?1
                 ORDER BY username",
            )?;

            let rows = stmt
                .query_map([exclude], |row| {
                    Ok(RosterRow {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        online: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    pub fn set_user_online(&self, id: &str, online: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE users SET online = ?1 WHERE id = ?2", rusqlite::params![online, id])?;
            Ok(())
        })
    }

    /// Mark every user offline. Run at startup, since presence does not survive a restart.
    pub fn reset_online_flags(&self) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("UPDATE users SET online = 0 WHERE online != 0", [])?))
    }

    // -- Messages --

    /// Store a message, assigning its id and timestamp under the connection lock.
    /// Timestamps never go backwards even if the wall clock does.
    pub fn insert_message(&self, new: &NewMessage) -> Result<Message> {
        self.with_conn(|conn| {
            // Assigned timestamps rise with seq, so the newest row holds the maximum.
            let last: Option<String> = conn
                .query_row(
                    "SELECT created_at FROM messages ORDER BY seq DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            let mut timestamp = Utc::now().trunc_subsecs(3);
            if let Some(last) = last {
                let last = parse_timestamp(&last)?;
                if last > timestamp {
                    timestamp = last;
                }
            }

            let id = Uuid::new_v4();
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    id.to_string(),
                    new.sender.to_string(),
                    new.receiver.map(|r| r.to_string()),
                    new.text,
                    format_timestamp(&timestamp),
                ],
            )?;

            Ok(Message {
                id,
                sender: new.sender,
                receiver: new.receiver,
                text: new.text.clone(),
                timestamp,
            })
        })
    }

    /// Direct messages between `a` and `b`, oldest first.
    pub fn get_direct_messages(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, seq ASC"
            );
            query_messages(conn, &sql, rusqlite::params![a, b])
        })
    }

    /// Public room messages, oldest first.
    pub fn get_public_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE receiver_id IS NULL
                 ORDER BY created_at ASC, seq ASC"
            );
            query_messages(conn, &sql, rusqlite::params![])
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, password, online FROM users WHERE {column} = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                online: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(sql)?;

    let rows = stmt
        .query_map(params, |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                receiver_id: row.get(2)?,
                text: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users(names: &[&str]) -> (Database, Vec<Uuid>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names
            .iter()
            .map(|name| {
                let id = Uuid::new_v4();
                db.create_user(&id.to_string(), name, "hash").unwrap();
                id
            })
            .collect();
        (db, ids)
    }

    #[test]
    fn lookup_user_by_name_and_id() {
        let (db, ids) = db_with_users(&["alice"]);
        let by_name = db.get_user_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.id, ids[0].to_string());
        assert!(!by_name.online);
        assert!(db.get_user_by_id(&ids[0].to_string()).unwrap().is_some());
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_rejected() {
        let (db, _) = db_with_users(&["alice"]);
        assert!(!db.create_user(&Uuid::new_v4().to_string(), "alice", "x").unwrap());
        assert_eq!(db.get_roster(None).unwrap().len(), 1);
    }

    #[test]
    fn roster_excludes_requested_user() {
        let (db, ids) = db_with_users(&["alice", "bob", "carol"]);
        let all = db.get_roster(None).unwrap();
        assert_eq!(all.len(), 3);

        let others = db.get_roster(Some(&ids[1].to_string())).unwrap();
        let names: Vec<_> = others.iter().map(|r| r.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "carol"]);
    }

    #[test]
    fn timestamps_never_decrease() {
        let (db, ids) = db_with_users(&["alice"]);
        let mut previous = None;
        for i in 0..20 {
            let msg = db
                .insert_message(&NewMessage {
                    sender: ids[0],
                    receiver: None,
                    text: format!("m{i}"),
                })
                .unwrap();
            if let Some(prev) = previous {
                assert!(msg.timestamp >= prev);
            }
            previous = Some(msg.timestamp);
        }
    }

    #[test]
    fn timestamp_follows_newest_stored_message() {
        let (db, ids) = db_with_users(&["alice"]);
        let future = Utc::now().trunc_subsecs(3) + chrono::Duration::hours(1);
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, created_at)
                 VALUES (?1, ?2, NULL, 'from the future', ?3)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    ids[0].to_string(),
                    format_timestamp(&future),
                ],
            )?;
            Ok(())
        })
        .unwrap();

        let msg = db
            .insert_message(&NewMessage {
                sender: ids[0],
                receiver: None,
                text: "now".into(),
            })
            .unwrap();
        assert_eq!(msg.timestamp, future);

        let history = db.get_public_messages().unwrap();
        assert_eq!(history.last().unwrap().text, "now");
    }

    #[test]
    fn unknown_receiver_violates_foreign_key() {
        let (db, ids) = db_with_users(&["alice"]);
        let result = db.insert_message(&NewMessage {
            sender: ids[0],
            receiver: Some(Uuid::new_v4()),
            text: "hello?".into(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn reset_online_flags_clears_everyone() {
        let (db, ids) = db_with_users(&["alice", "bob"]);
        db.set_user_online(&ids[0].to_string(), true).unwrap();
        db.set_user_online(&ids[1].to_string(), true).unwrap();
        assert_eq!(db.reset_online_flags().unwrap(), 2);
        assert!(db.get_roster(None).unwrap().iter().all(|r| !r.online));
    }
}
