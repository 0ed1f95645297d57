use axum::{debug_handler, extract::{Path, State}, http::Method, response::Response};

use crate::{AppResult, AppState};

use super::{proxy::{ProxyRequest, Relay}, Bearer, Upstream};

#[debug_handler(state = AppState)]
pub(crate) async fn list_conversations(
    State(upstream): State<Upstream>,
    bearer: Bearer,
    Path(form_id): Path<String>,
) -> AppResult<Response> {
    upstream
        .forward(
            ProxyRequest {
                method: Method::GET,
                segments: &["chat", "conversations", form_id.as_str()],
                bearer: &bearer,
                accept: None,
                body: None,
            },
            Relay::Verbatim,
        )
        .await
}

#[debug_handler(state = AppState)]
pub(crate) async fn conversation_messages(
    State(upstream): State<Upstream>,
    bearer: Bearer,
    Path(conversation_id): Path<String>,
) -> AppResult<Response> {
    upstream
        .forward(
            ProxyRequest {
                method: Method::GET,
                segments: &["chat", "conversation", conversation_id.as_str(), "messages"],
                bearer: &bearer,
                accept: None,
                body: None,
            },
            Relay::Verbatim,
        )
        .await
}

#[debug_handler(state = AppState)]
pub(crate) async fn delete_conversation(
    State(upstream): State<Upstream>,
    bearer: Bearer,
    Path(conversation_id): Path<String>,
) -> AppResult<Response> {
    tracing::info!(%conversation_id, "deleting conversation");
    upstream
        .forward(
            ProxyRequest {
                method: Method::DELETE,
                segments: &["chat", "conversation", conversation_id.as_str()],
                bearer: &bearer,
                accept: None,
                body: None,
            },
            Relay::Empty,
        )
        .await
}
