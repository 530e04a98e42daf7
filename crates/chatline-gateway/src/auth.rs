use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use chatline_types::api::Claims;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no credential supplied")]
    Missing,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("credential expired")]
    ExpiredCredential,
}

/// Issues and verifies HS256 bearer tokens. Verification has no side effects
/// and does no I/O, so it is shared by the HTTP middleware and the realtime handshake.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl TokenVerifier {
    pub fn new(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid, username: &str) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp: (chrono::Utc::now() + self.ttl).timestamp() as usize,
        };
        self.encode(&claims)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::Missing);
        }

        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
                _ => AuthError::InvalidCredential,
            })
    }

    /// Same as [`verify`](Self::verify), treating an absent token as [`AuthError::Missing`].
    pub fn verify_optional(&self, token: Option<&str>) -> Result<Claims, AuthError> {
        token.ok_or(AuthError::Missing).and_then(|t| self.verify(t))
    }

    pub(crate) fn encode(&self, claims: &Claims) -> anyhow::Result<String> {
        Ok(encode(&Header::default(), claims, &self.encoding)?)
    }
}
