use serde::Deserialize;

/// One JSON payload carried by a chat stream record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatFrame {
    pub text: Option<String>,
    pub is_complete: bool,
    pub conversation_id: Option<String>,
    pub error: Option<String>,
}

impl ChatFrame {
    /// `Ok(None)` for the `[DONE]` sentinel some backends append.
    pub fn parse(data: &str) -> serde_json::Result<Option<ChatFrame>> {
        let data = data.trim();
        if data == "[DONE]" {
            return Ok(None);
        }
        serde_json::from_str(data).map(Some)
    }
}

/// A buffered (non-streaming) reply.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    #[serde(alias = "text", alias = "message", alias = "content")]
    pub response: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}
