pub mod appresult;
pub mod auth;
pub mod chat;
pub mod config;
pub mod db;
pub mod forms;
pub mod session;
pub mod telemetry;

use anyhow::anyhow;
use axum::{extract::FromRef, Router};
use serde_json::Value;
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};
use config::ServeSettings;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub clients: auth::Clients,
    pub linker: auth::AccountLinker,
    pub upstream: chat::Upstream,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, clients: auth::Clients, upstream: chat::Upstream) -> Self {
        Self {
            linker: auth::AccountLinker::new(db_pool.clone()),
            db_pool,
            clients,
            upstream,
        }
    }
}

/// The whole HTTP surface, with sessions and request tracing attached.
pub fn app(state: AppState, serve: &ServeSettings) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(serve.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(serve.session_inactivity));

    let router = Router::new()
        .merge(auth::router())
        .nest("/api/forms", forms::router())
        .nest("/api/chat", chat::router())
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    if serve.permissive_cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> anyhow::Result<String>;
    fn get_id_field(&self, field: &str) -> anyhow::Result<String>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> anyhow::Result<String> {
        Ok(
            self.get(field)
            .ok_or(anyhow!("expected {field} in {self}"))?
            .as_str()
            .ok_or(anyhow!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }

    /// Ids arrive as strings from some providers and as numbers from others.
    fn get_id_field(&self, field: &str) -> anyhow::Result<String> {
        match self.get(field) {
            Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
            Some(Value::Number(id)) => Ok(id.to_string()),
            _ => Err(anyhow!("expected {field} in {self} to be an id")),
        }
    }
}
