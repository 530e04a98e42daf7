use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, info};
use uuid::Uuid;

use chatline_db::Database;
use chatline_gateway::{ChannelManager, TokenVerifier};
use chatline_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::join_error;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub verifier: TokenVerifier,
    pub manager: ChannelManager,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let RegisterRequest { username, password } = req;

    let name_len = username.chars().count();
    if !(3..=32).contains(&name_len) || password.len() < 8 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Hashing and the insert both block, so neither runs on the async worker.
    // The UNIQUE constraint decides conflicts, which also covers racing registrations.
    let user_id = Uuid::new_v4();
    let db = state.db.clone();
    let name = username.clone();
    let created = tokio::task::spawn_blocking(move || {
        let password_hash = hash_password(&password)?;
        db.create_user(&user_id.to_string(), &name, &password_hash)
            .map_err(|e| {
                error!("failed to create user {}: {:#}", name, e);
                StatusCode::INTERNAL_SERVER_ERROR
            })
    })
    .await
    .map_err(join_error)??;

    if !created {
        return Err(StatusCode::CONFLICT);
    }

    let token = state
        .verifier
        .issue(user_id, &username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    info!("registered {} ({})", username, user_id);

    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || {
        let user = db
            .get_user_by_username(&req.username)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::UNAUTHORIZED)?;
        verify_password(&req.password, &user.password)?;
        Ok::<_, StatusCode>(user)
    })
    .await
    .map_err(join_error)??;

    let user_id: Uuid = user.id.parse().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let token = state
        .verifier
        .issue(user_id, &user.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(LoginResponse {
        user_id,
        username: user.username,
        token,
    }))
}

/// Argon2id with a fresh random salt, in PHC string format.
fn hash_password(password: &str) -> Result<String, StatusCode> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn verify_password(password: &str, stored: &str) -> Result<(), StatusCode> {
    let parsed = PasswordHash::new(stored).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| StatusCode::UNAUTHORIZED)
}
