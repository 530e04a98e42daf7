use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use chatline_api::{AppStateInner, router};
use chatline_db::{Database, MessageStore};
use chatline_gateway::{ChannelManager, TokenVerifier};
use chatline_types::models::NewMessage;

fn app() -> (Router, Arc<Database>) {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let verifier = TokenVerifier::new("http-test-secret", chrono::Duration::hours(1));
    let manager = ChannelManager::new(verifier.clone(), db.clone(), db.clone());
    let state = Arc::new(AppStateInner {
        db: db.clone(),
        verifier,
        manager,
    });
    (router(state), db)
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_authed(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn register(app: &Router, username: &str) -> (Uuid, String) {
    let (status, body) = call(
        app,
        post_json(
            "/auth/register",
            json!({ "username": username, "password": "correct horse" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["user_id"].as_str().unwrap().parse().unwrap();
    (id, body["token"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn register_then_login() {
    let (app, _) = app();
    let (id, _) = register(&app, "alice").await;

    let (status, body) = call(
        &app,
        post_json("/auth/login", json!({ "username": "alice", "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], id.to_string());
    assert_eq!(body["username"], "alice");

    let (status, _) = call(
        &app,
        post_json("/auth/login", json!({ "username": "alice", "password": "wrong password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn register_validation() {
    let (app, _) = app();
    register(&app, "alice").await;

    let (status, _) = call(
        &app,
        post_json("/auth/register", json!({ "username": "alice", "password": "another one" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        post_json("/auth/register", json!({ "username": "al", "password": "long enough" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        post_json("/auth/register", json!({ "username": "bobby", "password": "short" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn protected_routes_need_bearer_token() {
    let (app, _) = app();

    let (status, _) = call(&app, Request::get("/users").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&app, get_authed("/messages", "bogus")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn users_excludes_caller() {
    let (app, _) = app();
    let (_, token) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;

    let (status, body) = call(&app, get_authed("/users", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["id"], bob.to_string());
    assert_eq!(users[0]["username"], "bob");
    assert_eq!(users[0]["online"], false);
}

#[tokio::test]
async fn history_public_and_direct() {
    let (app, db) = app();
    let (alice, token) = register(&app, "alice").await;
    let (bob, _) = register(&app, "bob").await;
    let (carol, _) = register(&app, "carol").await;

    for (sender, receiver, text) in [
        (alice, None, "hello room"),
        (alice, Some(bob), "hi bob"),
        (bob, Some(alice), "hi alice"),
        (carol, Some(bob), "not yours"),
    ] {
        db.append(NewMessage {
            sender,
            receiver,
            text: text.to_string(),
        })
        .unwrap();
    }

    let (status, body) = call(&app, get_authed("/messages", &token)).await;
    assert_eq!(status, StatusCode::OK);
    let public = body.as_array().unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0]["text"], "hello room");
    assert!(public[0]["receiver"].is_null());

    let (status, body) = call(&app, get_authed(&format!("/messages/{}", bob), &token)).await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(texts, vec!["hi bob", "hi alice"]);
}

#[tokio::test]
async fn socket_rejects_missing_or_bad_token() {
    let (app, _) = app();

    let (status, body) = call(&app, Request::get("/socket").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, Value::String("Authentication error".into()));

    let (status, _) = call(
        &app,
        Request::get("/socket?token=nope").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
