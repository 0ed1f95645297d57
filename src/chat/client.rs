use futures_util::{future::{AbortRegistration, Abortable}, StreamExt};
use reqwest::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::session::SessionContext;

use super::{frame::{ChatFrame, ChatReply}, proxy::is_event_stream, relay::ChatRequest, sse::{SseEvent, SseParser}, state::{Action, ChatState, Message, Phase}, EVENT_STREAM};

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a reply is still in progress")]
    Busy,
    #[error("not signed in")]
    Unauthorized,
    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),
    #[error("could not reach the chat service: {0}")]
    Network(#[from] reqwest::Error),
    #[error("chat service answered {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("chat service failed: {0}")]
    Remote(String),
    #[error("the reply ended before it completed")]
    Incomplete,
    #[error("unreadable reply: {0}")]
    InvalidReply(String),
    #[error("the reply was cancelled")]
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    Streaming,
    Buffered,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationSummary {
    #[serde(alias = "conversationId")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Drives one form's response-analysis chat against the relay endpoints,
/// feeding every transition through [`ChatState::apply`].
pub struct ChatClient {
    http: reqwest::Client,
    base_url: Url,
    form_id: String,
    session: SessionContext,
    state: ChatState,
}

impl ChatClient {
    pub fn new(base_url: &str, form_id: impl Into<String>, session: SessionContext) -> Result<Self, ChatError> {
        let base_url = Url::parse(base_url).map_err(|e| ChatError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            form_id: form_id.into(),
            session,
            state: ChatState::default(),
        })
    }

    pub fn state(&self) -> &ChatState {
        &self.state
    }

    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.state.draft = draft.into();
    }

    /// Forgets the current conversation; the next send starts a new one.
    pub fn new_chat(&mut self) {
        self.dispatch(Action::NewChat);
    }

    pub fn dismiss_notice(&mut self) {
        self.dispatch(Action::DismissNotice);
    }

    fn dispatch(&mut self, action: Action) {
        self.state = std::mem::take(&mut self.state).apply(action);
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorization(&self) -> Result<String, ChatError> {
        self.session.authorization().ok_or(ChatError::Unauthorized)
    }

    /// Sends one turn. On failure the optimistic messages are rolled back and
    /// `text` is put back into the draft; on abort the partial reply is
    /// dropped. Nothing is retried.
    pub async fn send(
        &mut self,
        text: &str,
        mode: ReplyMode,
        abort: Option<AbortRegistration>,
    ) -> Result<(), ChatError> {
        if text.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if !self.state.can_submit(text) {
            return Err(ChatError::Busy);
        }

        self.dispatch(Action::Submit { text: text.to_owned(), at: OffsetDateTime::now_utc() });

        let outcome = match abort {
            Some(registration) => Abortable::new(self.run_turn(text, mode), registration)
                .await
                .unwrap_or(Err(ChatError::Aborted)),
            None => self.run_turn(text, mode).await,
        };

        match &outcome {
            Ok(()) => {}
            Err(ChatError::Aborted) => {
                tracing::debug!(form_id = %self.form_id, "chat turn aborted");
                self.dispatch(Action::Aborted);
            }
            Err(e) => {
                tracing::warn!(form_id = %self.form_id, error = %e, "chat turn failed");
                self.dispatch(Action::Failed { reason: e.to_string() });
            }
        }
        outcome
    }

    async fn run_turn(&mut self, text: &str, mode: ReplyMode) -> Result<(), ChatError> {
        let authorization = self.authorization()?;
        let request = ChatRequest {
            form_id: self.form_id.clone(),
            message: text.to_owned(),
            conversation_id: self.state.conversation_id.clone(),
        };
        let accept = match mode {
            ReplyMode::Streaming => EVENT_STREAM,
            ReplyMode::Buffered => "application/json",
        };

        let response = self
            .http
            .post(self.endpoint(&["api", "chat", "form-responses"]))
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, accept)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        if is_event_stream(response.headers().get(CONTENT_TYPE)) {
            self.dispatch(Action::StreamOpened { at: OffsetDateTime::now_utc() });
            return self.consume(response).await;
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| ChatError::InvalidReply(e.to_string()))?;
        self.dispatch(Action::Replied {
            content: reply.response,
            conversation_id: reply.conversation_id,
            at: OffsetDateTime::now_utc(),
        });
        Ok(())
    }

    async fn consume(&mut self, response: reqwest::Response) -> Result<(), ChatError> {
        let mut parser = SseParser::new();
        let mut body = std::pin::pin!(response.bytes_stream());

        while let Some(chunk) = body.next().await {
            for event in parser.feed(&chunk?) {
                if self.on_event(event)? {
                    return Ok(());
                }
            }
        }
        if let Some(event) = parser.finish() {
            if self.on_event(event)? {
                return Ok(());
            }
        }

        Err(ChatError::Incomplete)
    }

    /// Applies one record; `true` once the turn is complete.
    fn on_event(&mut self, event: SseEvent) -> Result<bool, ChatError> {
        let frame = match ChatFrame::parse(&event.data) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(false),
            Err(e) => {
                tracing::warn!(error = %e, data = %event.data, "skipping malformed chat frame");
                return Ok(false);
            }
        };

        if let Some(error) = frame.error {
            return Err(ChatError::Remote(error));
        }
        if let Some(text) = frame.text {
            self.dispatch(Action::Chunk(text));
        }
        if frame.is_complete {
            self.dispatch(Action::Completed { conversation_id: frame.conversation_id });
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        let response = self
            .http
            .get(self.endpoint(&["api", "chat", "conversations", self.form_id.as_str()]))
            .header(AUTHORIZATION, self.authorization()?)
            .send()
            .await?;

        read_json(response).await
    }

    /// Replaces the visible messages with a stored conversation.
    pub async fn load_conversation(&mut self, conversation_id: &str) -> Result<(), ChatError> {
        if self.state.phase != Phase::Idle {
            return Err(ChatError::Busy);
        }

        let response = self
            .http
            .get(self.endpoint(&["api", "chat", "conversation", conversation_id, "messages"]))
            .header(AUTHORIZATION, self.authorization()?)
            .send()
            .await?;
        let messages: Vec<Message> = read_json(response).await?;

        self.dispatch(Action::Loaded {
            conversation_id: conversation_id.to_owned(),
            messages,
        });
        Ok(())
    }

    /// Deletes a conversation. If it is the one on screen, the messages and
    /// conversation id are cleared as soon as the deletion is confirmed.
    pub async fn delete_conversation(&mut self, conversation_id: &str) -> Result<(), ChatError> {
        if self.state.phase != Phase::Idle {
            return Err(ChatError::Busy);
        }

        let response = self
            .http
            .delete(self.endpoint(&["api", "chat", "conversation", conversation_id]))
            .header(AUTHORIZATION, self.authorization()?)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Status { status, body });
        }

        tracing::debug!(%conversation_id, "deleted conversation");
        self.dispatch(Action::Deleted { conversation_id: conversation_id.to_owned() });
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ChatError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ChatError::Status { status, body });
    }
    response
        .json()
        .await
        .map_err(|e| ChatError::InvalidReply(e.to_string()))
}
