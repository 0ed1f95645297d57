use axum::{routing::{get, post}, Router};

use crate::AppState;

mod anonymous;
mod clients;
mod link;
mod lockin;
mod login;
mod logout;

pub use clients::{ClientProvider, Clients};
pub use link::{AccountLinker, LinkError, LinkRequest};

/// Query parameter carrying a deferred anonymous id through the sign-in redirect.
pub const ANONYMOUS_ID_PARAM: &str = "anonymous_id";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/link-anonymous-data", post(link::link_anonymous_data))
        .route("/api/auth/anonymous", post(anonymous::start_anonymous))
        .route("/api/auth/session", get(anonymous::current_session))
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}
