mod list;
mod new;

use axum::{routing::get, Router};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list::my_forms).post(new::new_form))
}
