//! Response-analysis chat: the relay routes in front of the inference
//! backend, and the client that drives a conversation through them.

mod bearer;
mod client;
mod conversations;
mod frame;
mod proxy;
mod relay;
mod sse;
mod state;

use axum::{routing::{delete, get, post}, Router};

use crate::AppState;

pub use bearer::Bearer;
pub use client::{ChatClient, ChatError, ConversationSummary, ReplyMode};
pub use frame::{ChatFrame, ChatReply};
pub use proxy::{ProxyRequest, Relay, Upstream};
pub use relay::ChatRequest;
pub use sse::{SseEvent, SseParser};
pub use state::{Action, ChatState, Message, Phase, Role};

pub const EVENT_STREAM: &str = "text/event-stream";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/form-responses", post(relay::form_responses))
        .route("/conversations/{form_id}", get(conversations::list_conversations))
        .route("/conversation/{conversation_id}/messages", get(conversations::conversation_messages))
        .route("/conversation/{conversation_id}", delete(conversations::delete_conversation))
}
