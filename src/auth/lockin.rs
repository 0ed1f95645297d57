use anyhow::anyhow;
use axum::{debug_handler, extract::{Path, Query, State}, http::header::{ACCEPT, USER_AGENT}, response::{IntoResponse, Redirect}};
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use reqwest::Url;
use serde::Deserialize;
use tower_sessions::Session;

use crate::{session::{SessionContext, CSRF_STATE, PENDING_LINK, PKCE_VERIFIER, RETURN_URL}, AppResult, AppState, GetField};

use super::{clients::ClientProvider, link::AccountLinker, Clients, ANONYMOUS_ID_PARAM};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(clients): State<Clients>,
    State(linker): State<AccountLinker>,
    session: Session,
) -> AppResult<impl IntoResponse> {
    let state = CsrfToken::new(state.ok_or(anyhow!("OAuth: without state"))?);
    let code = AuthorizationCode::new(code.ok_or(anyhow!("OAuth: without code"))?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err(anyhow!("no csrf_state").into());
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err(anyhow!("csrf tokens don't match").into());
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err(anyhow!("no pkce_verifier").into());
    };

    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let body: serde_json::Value = http_client.get(provider.userinfo_url())
        .bearer_auth(access_token)
        .header(USER_AGENT, "turboform")
        .header(ACCEPT, "application/json")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    let user_id = provider.user_id(&body.get_id_field("id")?);

    // captured before the session identity is replaced
    let prior = SessionContext::load(&session).await?;

    SessionContext::registered(user_id.clone(), Some(access_token.to_owned()))
        .store(&session)
        .await?;
    tracing::info!(%user_id, %provider, "signed in");

    let return_url = claim_anonymous_data(&session, &linker, prior, &user_id, Some(access_token.as_str())).await?;
    Ok(Redirect::to(&return_url))
}

/// Links every anonymous identity the signed-in user arrived with: the
/// session's previous anonymous identity, an id deferred at login, and an
/// id carried in the return URL. Each distinct id is linked once, and a
/// failed link does not fail sign-in. Returns the return URL with the
/// marker removed.
pub(crate) async fn claim_anonymous_data(
    session: &Session,
    linker: &AccountLinker,
    prior: Option<SessionContext>,
    user_id: &str,
    auth_token: Option<&str>,
) -> AppResult<String> {
    let deferred = session.remove::<String>(PENDING_LINK).await?;
    let return_url: String = session.remove(RETURN_URL).await?.unwrap_or("/".to_string());

    let candidates = [
        prior.filter(|ctx| ctx.is_anonymous).map(|ctx| ctx.user_id),
        deferred,
        link_marker(&return_url),
    ];
    let mut anonymous_ids: Vec<String> = Vec::new();
    for id in candidates.into_iter().flatten() {
        let id = id.trim().to_owned();
        if !id.is_empty() && id != user_id && !anonymous_ids.contains(&id) {
            anonymous_ids.push(id);
        }
    }

    for anonymous_id in &anonymous_ids {
        match linker.link(anonymous_id, user_id, auth_token).await {
            Ok(transferred) => tracing::info!(%anonymous_id, %user_id, transferred, "claimed anonymous data"),
            Err(e) => tracing::warn!(%anonymous_id, %user_id, error = %e, "could not claim anonymous data"),
        }
    }

    Ok(strip_link_marker(&return_url))
}

/// The anonymous id carried in a return URL's query, if any.
pub(crate) fn link_marker(return_url: &str) -> Option<String> {
    let url = Url::parse("http://localhost/").ok()?.join(return_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == ANONYMOUS_ID_PARAM)
        .map(|(_, id)| id.trim().to_owned())
        .filter(|id| !id.is_empty())
}

/// Drops the anonymous id marker from a return URL so that reloading the
/// landing page cannot trigger a second link.
pub(crate) fn strip_link_marker(return_url: &str) -> String {
    let (rest, fragment) = match return_url.split_once('#') {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (return_url, None),
    };
    let Some((path, query)) = rest.split_once('?') else {
        return return_url.to_owned();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty() && pair.split('=').next() != Some(ANONYMOUS_ID_PARAM))
        .collect();

    let mut url = path.to_owned();
    if !kept.is_empty() {
        url.push('?');
        url.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(fragment);
    }
    url
}
