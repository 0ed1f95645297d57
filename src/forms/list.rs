use axum::{debug_handler, extract::State, Json};
use sqlx::SqlitePool;
use tower_sessions::Session;

use crate::{db::{self, Form}, session::SessionContext, AppError, AppResult, AppState};

#[debug_handler(state = AppState)]
pub(crate) async fn my_forms(
    State(db_pool): State<SqlitePool>,
    session: Session,
) -> AppResult<Json<Vec<Form>>> {
    let Some(ctx) = SessionContext::load(&session).await? else {
        return Err(AppError::unauthorized("no active session"));
    };

    Ok(Json(db::forms_owned_by(&db_pool, &ctx.user_id).await?))
}
