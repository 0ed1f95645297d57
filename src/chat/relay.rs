use axum::{debug_handler, extract::State, http::{header::ACCEPT, HeaderMap, Method}, response::Response, Json};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult, AppState};

use super::{proxy::{is_event_stream, ProxyRequest, Relay}, Bearer, Upstream};

/// One chat turn, as sent by the browser and forwarded to the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRequest {
    pub form_id: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn form_responses(
    State(upstream): State<Upstream>,
    bearer: Bearer,
    headers: HeaderMap,
    Json(mut request): Json<ChatRequest>,
) -> AppResult<Response> {
    if request.form_id.trim().is_empty() {
        return Err(AppError::bad_request("formId is required"));
    }
    if request.message.trim().is_empty() {
        return Err(AppError::bad_request("message is required"));
    }
    request.conversation_id = request.conversation_id.filter(|id| !id.trim().is_empty());

    let accept = headers.get(ACCEPT).cloned();
    let streaming = is_event_stream(accept.as_ref());
    tracing::info!(
        form_id = %request.form_id,
        streaming,
        new_conversation = request.conversation_id.is_none(),
        "relaying chat turn"
    );

    upstream
        .forward(
            ProxyRequest {
                method: Method::POST,
                segments: &["chat", "form-responses"],
                bearer: &bearer,
                accept,
                body: Some(serde_json::to_value(&request)?),
            },
            if streaming { Relay::Stream } else { Relay::Verbatim },
        )
        .await
}
