use axum::{debug_handler, extract::{rejection::JsonRejection, State}, http::{header::AUTHORIZATION, HeaderMap, StatusCode}, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::db::OWNED_TABLES;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("{0} is required")]
    MissingIdentifier(&'static str),
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("failed to transfer resources")]
    Transfer(#[from] sqlx::Error),
}

impl LinkError {
    pub fn status(&self) -> StatusCode {
        match self {
            LinkError::MissingIdentifier(_) | LinkError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            LinkError::Transfer(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<JsonRejection> for LinkError {
    fn from(rejection: JsonRejection) -> Self {
        LinkError::InvalidBody(rejection.body_text())
    }
}

impl IntoResponse for LinkError {
    fn into_response(self) -> Response {
        if let LinkError::Transfer(e) = &self {
            tracing::error!(error = %e, "anonymous account link failed");
        }

        (
            self.status(),
            Json(json!({ "success": false, "error": self.to_string() })),
        )
            .into_response()
    }
}

/// Moves everything an anonymous identity owns onto a registered one.
#[derive(Clone)]
pub struct AccountLinker {
    db_pool: SqlitePool,
}

impl AccountLinker {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    /// Reassigns every owned row from `anonymous_user_id` to `target_user_id`
    /// and returns how many rows moved. A repeated call moves nothing and
    /// still succeeds. Ids are validated before the database is touched.
    #[tracing::instrument(skip(self, auth_token), fields(has_token = auth_token.is_some()))]
    pub async fn link(
        &self,
        anonymous_user_id: &str,
        target_user_id: &str,
        auth_token: Option<&str>,
    ) -> Result<u64, LinkError> {
        let anonymous_user_id = anonymous_user_id.trim();
        let target_user_id = target_user_id.trim();
        if anonymous_user_id.is_empty() {
            return Err(LinkError::MissingIdentifier("anonymousUserId"));
        }
        if target_user_id.is_empty() {
            return Err(LinkError::MissingIdentifier("targetUserId"));
        }
        if anonymous_user_id == target_user_id {
            return Ok(0);
        }

        // dropped without commit on error, which rolls back
        let mut tx = self.db_pool.begin().await?;
        let mut transferred = 0;
        for table in OWNED_TABLES {
            let sql = format!("UPDATE {table} SET user_id=? WHERE user_id=?");
            transferred += sqlx::query(&sql)
                .bind(target_user_id)
                .bind(anonymous_user_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        tracing::info!(transferred, "linked anonymous account");
        Ok(transferred)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkRequest {
    pub anonymous_user_id: Option<String>,
    pub target_user_id: Option<String>,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn link_anonymous_data(
    State(linker): State<AccountLinker>,
    headers: HeaderMap,
    request: Result<Json<LinkRequest>, JsonRejection>,
) -> Result<Json<Value>, LinkError> {
    let Json(LinkRequest { anonymous_user_id, target_user_id }) = request?;
    let auth_token = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let transferred = linker
        .link(
            anonymous_user_id.as_deref().unwrap_or_default(),
            target_user_id.as_deref().unwrap_or_default(),
            auth_token,
        )
        .await?;
    Ok(Json(json!({ "success": true, "transferred": transferred })))
}
