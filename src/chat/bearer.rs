use axum::{extract::FromRequestParts, http::{header::AUTHORIZATION, request::Parts, HeaderValue}};

use crate::AppError;

/// The caller's `Authorization: Bearer ...` header, kept byte for byte so it
/// can be forwarded unchanged.
#[derive(Debug, Clone)]
pub struct Bearer(pub HeaderValue);

impl Bearer {
    fn accepts(value: &HeaderValue) -> bool {
        let Ok(value) = value.to_str() else {
            return false;
        };
        value.len() > 7
            && value[..7].eq_ignore_ascii_case("bearer ")
            && !value[7..].trim().is_empty()
    }
}

impl<S> FromRequestParts<S> for Bearer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTHORIZATION)
            .filter(|value| Bearer::accepts(value))
            .cloned()
            .map(Bearer)
            .ok_or(AppError::unauthorized("missing bearer token"))
    }
}
