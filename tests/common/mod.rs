#![allow(dead_code)]

use std::{convert::Infallible, sync::{Arc, Mutex}};

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use serde_json::{json, Value};
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use turboform::{app, auth::Clients, chat::Upstream, config::ServeSettings, db, AppState};

pub async fn test_pool() -> SqlitePool {
    // a single connection, since every in-memory connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::migrate(&pool).await.unwrap();
    pool
}

pub async fn test_app(upstream_url: &str) -> (Router, SqlitePool) {
    let pool = test_pool().await;
    let state = AppState::new(pool.clone(), Clients::default(), Upstream::new(upstream_url).unwrap());
    (app(state, &ServeSettings::default()), pool)
}

pub async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// An address nothing is listening on.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[derive(Debug, Clone)]
pub struct Seen {
    pub method: &'static str,
    pub path: String,
    pub authorization: Option<String>,
    pub accept: Option<String>,
    pub body: Option<Value>,
}

pub type Recorder = Arc<Mutex<Vec<Seen>>>;

/// Stand-in for the inference backend.
pub struct FakeBackend {
    pub url: String,
    pub seen: Recorder,
}

impl FakeBackend {
    pub fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

pub async fn fake_backend() -> FakeBackend {
    let seen = Recorder::default();
    let router = Router::new()
        .route("/chat/form-responses", post(form_responses))
        .route("/chat/conversations/{form_id}", get(conversations))
        .route("/chat/conversation/{id}/messages", get(messages))
        .route("/chat/conversation/{id}", axum::routing::delete(delete_conversation))
        .with_state(seen.clone());

    FakeBackend { url: spawn(router).await, seen }
}

fn header(headers: &HeaderMap, name: axum::http::HeaderName) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

fn record(seen: &Recorder, method: &'static str, path: String, headers: &HeaderMap, body: Option<Value>) {
    seen.lock().unwrap().push(Seen {
        method,
        path,
        authorization: header(headers, AUTHORIZATION),
        accept: header(headers, ACCEPT),
        body,
    });
}

const HELLO: &str = "data: {\"text\":\"Hel\"}\n\ndata: {\"text\":\"lo\"}\n\ndata: {\"isComplete\":true,\"conversationId\":\"c1\"}\n\n";

async fn form_responses(State(seen): State<Recorder>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    record(&seen, "POST", "/chat/form-responses".to_owned(), &headers, Some(body.clone()));

    let message = body["message"].as_str().unwrap_or_default().to_owned();
    let streaming = header(&headers, ACCEPT).is_some_and(|accept| accept.contains("text/event-stream"));
    if !streaming {
        let conversation_id = body["conversationId"].as_str().unwrap_or("c-buffered");
        return Json(json!({ "response": format!("echo: {message}"), "conversationId": conversation_id }))
            .into_response();
    }

    let frames: &'static str = match message.as_str() {
        "drop" => "data: {\"text\":\"Hel\"}\n\n",
        "garbled" => "data: {\"text\":\"Hel\"}\n\ndata: {nope\n\ndata: {\"text\":\"lo\"}\n\ndata: {\"isComplete\":true,\"conversationId\":\"c2\"}\n\n",
        "compact" => "data: {\"text\":\"Hel\"}\ndata: {\"text\":\"lo\"}\ndata: {\"isComplete\":true,\"conversationId\":\"c4\"}\n",
        "fail" => "data: {\"error\":\"model overloaded\"}\n\n",
        "hang" => {
            let first = futures_util::stream::iter([Ok::<_, Infallible>(Bytes::from_static(b"data: {\"text\":\"Hel\"}\n\n"))]);
            let body = Body::from_stream(first.chain(futures_util::stream::pending()));
            return ([(CONTENT_TYPE, "text/event-stream")], body).into_response();
        }
        "split" => {
            // one frame cut in the middle of its JSON
            let parts = ["data: {\"te", "xt\":\"Hello\"}\n", "\ndata: {\"isComplete\":true,\"conversationId\":\"c3\"}\n\n"];
            let chunks = futures_util::stream::iter(parts.map(|p| Ok::<_, Infallible>(Bytes::from_static(p.as_bytes()))));
            return ([(CONTENT_TYPE, "text/event-stream")], Body::from_stream(chunks)).into_response();
        }
        _ => HELLO,
    };
    ([(CONTENT_TYPE, "text/event-stream")], frames).into_response()
}

async fn conversations(State(seen): State<Recorder>, headers: HeaderMap, Path(form_id): Path<String>) -> Response {
    record(&seen, "GET", format!("/chat/conversations/{form_id}"), &headers, None);
    if form_id == "missing" {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "form not found" }))).into_response();
    }
    Json(json!([
        { "id": "c1", "title": "Response trends", "formId": form_id },
        { "id": "c2", "title": null, "formId": form_id },
    ]))
    .into_response()
}

async fn messages(State(seen): State<Recorder>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    record(&seen, "GET", format!("/chat/conversation/{id}/messages"), &headers, None);
    Json(json!([
        { "role": "user", "content": "hi", "createdAt": "2024-05-01T10:00:00Z" },
        { "role": "assistant", "content": "Hello" },
    ]))
    .into_response()
}

async fn delete_conversation(State(seen): State<Recorder>, headers: HeaderMap, Path(id): Path<String>) -> StatusCode {
    record(&seen, "DELETE", format!("/chat/conversation/{id}"), &headers, None);
    StatusCode::NO_CONTENT
}
