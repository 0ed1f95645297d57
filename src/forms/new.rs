use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{db::{self, Form}, session::SessionContext, AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub(crate) struct NewFormRequest {
    #[serde(default)]
    title: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_form(
    State(db_pool): State<SqlitePool>,
    session: Session,

    Json(NewFormRequest { title }): Json<NewFormRequest>,
) -> AppResult<(StatusCode, Json<Form>)> {
    let Some(ctx) = SessionContext::load(&session).await? else {
        return Err(AppError::unauthorized("sign in or start an anonymous session first"));
    };
    if title.trim().is_empty() {
        return Err(AppError::bad_request("title is required"));
    }

    let form = db::create_form(&db_pool, &ctx.user_id, title.trim()).await?;
    tracing::info!(form_id = %form.id, user_id = %ctx.user_id, "created form");

    Ok((StatusCode::CREATED, Json(form)))
}
