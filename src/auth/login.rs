use axum::{debug_handler, extract::{Path, Query, State}, response::{IntoResponse, Redirect, Response}};
use oauth2::{CsrfToken, PkceCodeChallenge, Scope};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{session::{CSRF_STATE, PENDING_LINK, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState};

use super::{clients::ClientProvider, Clients};

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
    pub(crate) anonymous_id: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    Path(provider): Path<ClientProvider>,
    Query(LoginQuery { return_url, anonymous_id }): Query<LoginQuery>,
    State(clients): State<Clients>,
    session: Session,
) -> AppResult<Response> {
    let client = clients.get_client(provider)?;

    let (pkce_code_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (authorize_url, csrf_state) = client.authorize_url(CsrfToken::new_random)
        .add_scope(Scope::new(provider.scope().to_string()))
        .set_pkce_challenge(pkce_code_challenge)
        .url();

    session.insert(CSRF_STATE, csrf_state.secret()).await?;
    session.insert(PKCE_VERIFIER, pkce_verifier.secret()).await?;
    if let Some(return_url) = return_url {
        session.insert(RETURN_URL, return_url).await?;
    }
    if let Some(anonymous_id) = anonymous_id.filter(|id| !id.trim().is_empty()) {
        session.insert(PENDING_LINK, anonymous_id).await?;
    }

    tracing::debug!(%provider, "redirecting to provider");
    Ok(Redirect::to(authorize_url.as_str()).into_response())
}
