use axum::{debug_handler, Json};
use tower_sessions::Session;

use crate::{session::SessionContext, AppError, AppResult};

#[debug_handler]
pub(crate) async fn start_anonymous(session: Session) -> AppResult<Json<SessionContext>> {
    if let Some(ctx) = SessionContext::load(&session).await? {
        return Ok(Json(ctx));
    }

    let ctx = SessionContext::anonymous();
    ctx.store(&session).await?;
    tracing::info!(user_id = %ctx.user_id, "started anonymous session");

    Ok(Json(ctx))
}

#[debug_handler]
pub(crate) async fn current_session(session: Session) -> AppResult<Json<SessionContext>> {
    SessionContext::load(&session)
        .await?
        .map(Json)
        .ok_or(AppError::unauthorized("no active session"))
}
