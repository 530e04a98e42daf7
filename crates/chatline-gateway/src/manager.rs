use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chatline_db::{MessageStore, UserDirectory};
use chatline_types::api::Claims;
use chatline_types::events::{ClientCommand, ServerEvent};
use chatline_types::models::{Message, NewMessage};

use crate::auth::{AuthError, TokenVerifier};
use crate::error::GatewayError;
use crate::presence::{ConnId, ConnectionHandle, PresenceTracker};

/// Identity of one authenticated realtime connection.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub user_id: Uuid,
    pub username: String,
    pub conn_id: ConnId,
    handle: ConnectionHandle,
}

impl SessionInfo {
    /// Send an event to this connection only.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.handle.send(event)
    }
}

/// An authenticated connection plus the stream of events routed to it.
pub struct Session {
    pub info: SessionInfo,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Owns the presence state and routes chat traffic between connected clients.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    verifier: TokenVerifier,
    messages: Arc<dyn MessageStore>,
    directory: Arc<dyn UserDirectory>,
    presence: PresenceTracker,
    /// Per-user guards ordering directory syncs: user_id -> lock.
    directory_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ChannelManager {
    pub fn new(
        verifier: TokenVerifier,
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn UserDirectory>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                verifier,
                messages,
                directory,
                presence: PresenceTracker::new(),
                directory_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.inner.presence
    }

    /// Handshake gate. Nothing is registered until this succeeds.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Claims, AuthError> {
        self.inner.verifier.verify_optional(token)
    }

    /// Authenticate and join in one step.
    pub async fn connect(&self, token: Option<&str>) -> Result<Session, GatewayError> {
        let claims = self.authenticate(token)?;
        Ok(self.join(claims).await)
    }

    /// Register an authenticated connection: presence entry, directory flag, roster broadcast.
    pub async fn join(&self, claims: Claims) -> Session {
        let (handle, events) = ConnectionHandle::new();
        let info = SessionInfo {
            user_id: claims.sub,
            username: claims.username,
            conn_id: handle.conn_id(),
            handle: handle.clone(),
        };

        // Registering under the user id is also what makes direct delivery by id work.
        let first = self.inner.presence.set(info.user_id, handle).await;
        info!(
            "{} ({}) joined [conn={}, first_session={}]",
            info.username, info.user_id, info.conn_id, first
        );

        self.inner.sync_directory_flag(info.user_id).await;
        self.inner.broadcast_roster().await;

        Session { info, events }
    }

    /// Process one inbound command. Failures are reported to this connection only.
    pub async fn handle_command(&self, session: &SessionInfo, cmd: ClientCommand) {
        match cmd {
            ClientCommand::SendMessage { receiver_id, text } => {
                if let Err(e) = self.send_message(session, receiver_id.as_deref(), text).await {
                    match &e {
                        GatewayError::Persistence(source) => error!(
                            "{} ({}) message not stored: {:#}",
                            session.username, session.user_id, source
                        ),
                        other => warn!(
                            "{} ({}) message rejected: {}",
                            session.username, session.user_id, other
                        ),
                    }
                    if let Some(kind) = e.kind() {
                        session.send(ServerEvent::Error {
                            kind,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    /// Validate, persist, then deliver a chat message.
    ///
    /// Persistence and delivery run in their own task, so a sender disconnecting
    /// mid-flight never cancels a write that the store has already accepted.
    pub async fn send_message(
        &self,
        session: &SessionInfo,
        receiver_id: Option<&str>,
        text: String,
    ) -> Result<Message, GatewayError> {
        if text.trim().is_empty() {
            return Err(GatewayError::Validation("message text is empty".into()));
        }

        let receiver = self.resolve_receiver(session.user_id, receiver_id).await?;

        let new = NewMessage {
            sender: session.user_id,
            receiver,
            text,
        };

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.persist_and_route(new).await })
            .await
            .map_err(|e| {
                error!("message task join error: {}", e);
                GatewayError::Persistence(e.into())
            })?
    }

    /// Tear down a connection. Only the last session of a user flips them offline.
    pub async fn disconnect(&self, session: &SessionInfo) {
        let went_offline = self
            .inner
            .presence
            .remove(session.user_id, session.conn_id)
            .await;

        info!(
            "{} ({}) left [conn={}, offline={}]",
            session.username, session.user_id, session.conn_id, went_offline
        );

        if went_offline {
            self.inner.sync_directory_flag(session.user_id).await;
            self.inner.broadcast_roster().await;
        }
    }

    async fn resolve_receiver(
        &self,
        sender: Uuid,
        receiver_id: Option<&str>,
    ) -> Result<Option<Uuid>, GatewayError> {
        let raw = match receiver_id.map(str::trim) {
            None | Some("") => return Ok(None),
            Some(raw) => raw,
        };

        let receiver: Uuid = raw
            .parse()
            .map_err(|_| GatewayError::Validation(format!("invalid receiverId '{}'", raw)))?;

        if receiver == sender {
            return Err(GatewayError::Validation(
                "cannot send a direct message to yourself".into(),
            ));
        }

        let directory = self.inner.directory.clone();
        let found = tokio::task::spawn_blocking(move || directory.find_user(receiver))
            .await
            .map_err(|e| GatewayError::Persistence(e.into()))?
            .map_err(GatewayError::Persistence)?;

        match found {
            Some(_) => Ok(Some(receiver)),
            None => Err(GatewayError::Validation(format!("unknown receiver {}", receiver))),
        }
    }
}

impl ManagerInner {
    async fn persist_and_route(&self, new: NewMessage) -> Result<Message, GatewayError> {
        let store = self.messages.clone();
        let message = tokio::task::spawn_blocking(move || store.append(new))
            .await
            .map_err(|e| GatewayError::Persistence(e.into()))?
            .map_err(GatewayError::Persistence)?;

        let recipients = match message.receiver {
            None => self.presence.all_handles().await,
            Some(receiver) => self.presence.handles_for(&[message.sender, receiver]).await,
        };

        debug!(
            "routing message {} from {} to {} connection(s)",
            message.id,
            message.sender,
            recipients.len()
        );

        for handle in &recipients {
            handle.send(ServerEvent::ReceiveMessage(message.clone()));
        }

        Ok(message)
    }

    /// Write the user's current presence into the directory. Failures are logged only.
    ///
    /// The presence read and the directory write happen under one per-user lock,
    /// and the lock is held until the write finishes, so the last sync to run
    /// always writes the latest presence state.
    async fn sync_directory_flag(&self, user_id: Uuid) {
        let lock = self
            .directory_locks
            .lock()
            .await
            .entry(user_id)
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;

        let online = self.presence.is_online(user_id).await;
        let directory = self.directory.clone();

        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            directory.set_online(user_id, online)
        })
        .await
        .map_err(anyhow::Error::from)
        .and_then(|r| r);

        if let Err(e) = result {
            warn!(
                "failed to set online={} for {} in directory: {:#}",
                online, user_id, e
            );
        }

        // Only the map and this call hold the lock: nobody else is waiting on it.
        let mut locks = self.directory_locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&user_id);
        }
    }

    /// Send the full roster to every connection. Online flags come from live
    /// presence, so a stale directory flag never leaks into the broadcast.
    async fn broadcast_roster(&self) {
        let directory = self.directory.clone();
        let users = match tokio::task::spawn_blocking(move || directory.list_all()).await {
            Ok(Ok(users)) => users,
            Ok(Err(e)) => {
                warn!("roster broadcast skipped, directory unavailable: {:#}", e);
                return;
            }
            Err(e) => {
                error!("spawn_blocking join error: {}", e);
                return;
            }
        };

        let online = self.presence.snapshot().await;
        let roster: Vec<_> = users
            .into_iter()
            .map(|mut user| {
                user.online = online.contains(&user.id);
                user
            })
            .collect();

        for handle in self.presence.all_handles().await {
            handle.send(ServerEvent::Users(roster.clone()));
        }
    }
}
