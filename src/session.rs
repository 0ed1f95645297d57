use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use uuid::Uuid;

use crate::AppResult;

pub const CONTEXT: &str = "session_context";
pub const CSRF_STATE: &str = "csrf_state";
pub const PKCE_VERIFIER: &str = "pkce_verifier";
pub const RETURN_URL: &str = "return_url";
/// Deferred anonymous id waiting to be linked once sign-in completes.
pub const PENDING_LINK: &str = "pending_link";

/// Who the caller is. Handed around explicitly instead of living in a global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub user_id: String,
    pub is_anonymous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self {
            user_id: format!("anon-{}", Uuid::now_v7().simple()),
            is_anonymous: true,
            bearer_token: None,
        }
    }

    pub fn registered(user_id: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_anonymous: false,
            bearer_token,
        }
    }

    /// Value for an `Authorization` header, if this session holds a token.
    pub fn authorization(&self) -> Option<String> {
        self.bearer_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .map(|token| format!("Bearer {token}"))
    }

    pub async fn load(session: &Session) -> AppResult<Option<SessionContext>> {
        Ok(session.get::<SessionContext>(CONTEXT).await?)
    }

    pub async fn store(&self, session: &Session) -> AppResult<()> {
        session.insert(CONTEXT, self).await?;
        Ok(())
    }
}
