pub mod auth;
pub mod connection;
pub mod error;
pub mod manager;
pub mod presence;

pub use auth::{AuthError, TokenVerifier};
pub use error::GatewayError;
pub use manager::{ChannelManager, Session, SessionInfo};
pub use presence::PresenceTracker;
