use std::net::SocketAddr;
use std::path::PathBuf;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your_jwt_secret_key_here",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CHATLINE_JWT_SECRET is unset or still a placeholder")]
    InsecureSecret,
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl: chrono::Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("CHATLINE_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            return Err(ConfigError::InsecureSecret);
        }

        let db_path = lookup("CHATLINE_DB_PATH").unwrap_or_else(|| "chatline.db".into());
        let host = lookup("CHATLINE_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = lookup("CHATLINE_PORT").unwrap_or_else(|| "3001".into());
        let addr_raw = format!("{}:{}", host, port);
        let addr = addr_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "CHATLINE_HOST/CHATLINE_PORT",
            value: addr_raw.clone(),
        })?;

        let ttl_hours: i64 = match lookup("CHATLINE_TOKEN_TTL_HOURS") {
            Some(raw) => raw
                .parse()
                .ok()
                .filter(|h| *h > 0)
                .ok_or(ConfigError::Invalid {
                    name: "CHATLINE_TOKEN_TTL_HOURS",
                    value: raw,
                })?,
            None => 24,
        };

        Ok(Self {
            jwt_secret,
            db_path: db_path.into(),
            addr,
            token_ttl: chrono::Duration::hours(ttl_hours),
        })
    }
}
