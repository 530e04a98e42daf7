use chatline_types::events::ErrorKind;

use crate::auth::AuthError;

/// Failures on the realtime channel. Each one is confined to the connection that triggered it.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Authentication error: {0}")]
    Authentication(#[from] AuthError),

    #[error("{0}")]
    Validation(String),

    #[error("message could not be stored")]
    Persistence(#[source] anyhow::Error),
}

impl GatewayError {
    /// Kind reported to the client in an error frame.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Authentication(_) => None,
            Self::Validation(_) => Some(ErrorKind::Validation),
            Self::Persistence(_) => Some(ErrorKind::Persistence),
        }
    }
}
