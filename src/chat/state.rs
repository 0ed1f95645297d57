use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<OffsetDateTime>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, created_at: OffsetDateTime) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Some(created_at),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Sending,
    Streaming,
}

#[derive(Debug, Clone)]
pub enum Action {
    Submit { text: String, at: OffsetDateTime },
    StreamOpened { at: OffsetDateTime },
    Chunk(String),
    Completed { conversation_id: Option<String> },
    Replied { content: String, conversation_id: Option<String>, at: OffsetDateTime },
    Failed { reason: String },
    Aborted,
    NewChat,
    Loaded { conversation_id: String, messages: Vec<Message> },
    Deleted { conversation_id: String },
    DismissNotice,
}

/// Client-side view of one form's response-analysis chat.
///
/// Every transition goes through [`ChatState::apply`], which takes the old
/// value and returns the next one. Actions that make no sense in the
/// current phase leave the state untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatState {
    pub messages: Vec<Message>,
    pub conversation_id: Option<String>,
    /// Composer contents.
    pub draft: String,
    pub phase: Phase,
    /// Last failure to show the user.
    pub notice: Option<String>,
    /// Text of the turn in flight, restored to `draft` on failure.
    pending: Option<String>,
}

impl ChatState {
    pub fn can_submit(&self, text: &str) -> bool {
        self.phase == Phase::Idle && !text.trim().is_empty()
    }

    pub fn apply(mut self, action: Action) -> Self {
        match (self.phase, action) {
            (Phase::Idle, Action::Submit { text, at }) if !text.trim().is_empty() => {
                self.messages.push(Message::new(Role::User, text.clone(), at));
                self.draft.clear();
                self.notice = None;
                self.pending = Some(text);
                self.phase = Phase::Sending;
            }
            (Phase::Sending, Action::StreamOpened { at }) => {
                self.messages.push(Message::new(Role::Assistant, "", at));
                self.phase = Phase::Streaming;
            }
            (Phase::Streaming, Action::Chunk(text)) => {
                if let Some(placeholder) = self.messages.last_mut() {
                    placeholder.content.push_str(&text);
                }
            }
            (Phase::Streaming, Action::Completed { conversation_id }) => {
                self.adopt(conversation_id);
                self.finish_turn();
            }
            (Phase::Sending, Action::Replied { content, conversation_id, at }) => {
                self.messages.push(Message::new(Role::Assistant, content, at));
                self.adopt(conversation_id);
                self.finish_turn();
            }
            (phase @ (Phase::Sending | Phase::Streaming), Action::Failed { reason }) => {
                if phase == Phase::Streaming {
                    self.messages.pop();
                }
                self.messages.pop();
                self.draft = self.pending.take().unwrap_or_default();
                self.notice = Some(reason);
                self.phase = Phase::Idle;
            }
            (phase @ (Phase::Sending | Phase::Streaming), Action::Aborted) => {
                if phase == Phase::Streaming {
                    self.messages.pop();
                }
                self.finish_turn();
            }
            (Phase::Idle, Action::NewChat) => {
                self = ChatState {
                    draft: self.draft,
                    ..ChatState::default()
                };
            }
            (Phase::Idle, Action::Loaded { conversation_id, messages }) => {
                self.messages = messages;
                self.conversation_id = Some(conversation_id);
                self.notice = None;
            }
            (Phase::Idle, Action::Deleted { conversation_id }) => {
                if self.conversation_id.as_deref() == Some(conversation_id.as_str()) {
                    self = ChatState {
                        draft: self.draft,
                        ..ChatState::default()
                    };
                }
            }
            (_, Action::DismissNotice) => self.notice = None,
            (phase, action) => {
                tracing::trace!(?phase, ?action, "ignored chat action");
            }
        }
        self
    }

    fn adopt(&mut self, conversation_id: Option<String>) {
        if self.conversation_id.is_none() {
            self.conversation_id = conversation_id.filter(|id| !id.is_empty());
        }
    }

    fn finish_turn(&mut self) {
        self.pending = None;
        self.phase = Phase::Idle;
    }
}
