use anyhow::anyhow;
use axum::{body::Body, http::{header::{ACCEPT, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE}, HeaderValue, Method}, response::{IntoResponse, Response}};
use reqwest::Url;
use serde_json::Value;

use crate::AppResult;

use super::{Bearer, EVENT_STREAM};

/// How an upstream reply is handed back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relay {
    /// Status, content type and body, buffered.
    Verbatim,
    /// Successful `text/event-stream` replies are piped through as they
    /// arrive; anything else falls back to `Verbatim`.
    Stream,
    /// Status only on success. Failures are still relayed verbatim.
    Empty,
}

/// One call to forward, described independently of the route that needs it.
pub struct ProxyRequest<'a> {
    pub method: Method,
    pub segments: &'a [&'a str],
    pub bearer: &'a Bearer,
    pub accept: Option<HeaderValue>,
    pub body: Option<Value>,
}

/// The remote backend every chat route proxies to.
#[derive(Clone)]
pub struct Upstream {
    http: reqwest::Client,
    base_url: Url,
}

impl Upstream {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow!("{base_url} cannot be used as an API base URL"));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
        })
    }

    /// Appends percent-encoded path segments to the base URL.
    pub fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    #[tracing::instrument(skip_all, fields(method = %request.method, path = ?request.segments))]
    pub async fn forward(&self, request: ProxyRequest<'_>, relay: Relay) -> AppResult<Response> {
        let url = self.url(request.segments);

        let mut builder = self
            .http
            .request(request.method, url)
            .header(AUTHORIZATION, request.bearer.0.clone());
        if let Some(accept) = request.accept {
            builder = builder.header(ACCEPT, accept);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let upstream = builder.send().await.map_err(|e| {
            tracing::error!(error = %e, "upstream request failed");
            e
        })?;

        let status = upstream.status();
        let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
        tracing::debug!(%status, "upstream replied");

        match relay {
            Relay::Empty if status.is_success() => Ok(status.into_response()),
            Relay::Stream if status.is_success() && is_event_stream(content_type.as_ref()) => {
                Ok(Response::builder()
                    .status(status)
                    .header(CONTENT_TYPE, EVENT_STREAM)
                    .header(CACHE_CONTROL, "no-cache")
                    .body(Body::from_stream(upstream.bytes_stream()))?)
            }
            _ => {
                let bytes = upstream.bytes().await?;
                let mut response = (status, bytes).into_response();
                match content_type {
                    Some(content_type) => {
                        response.headers_mut().insert(CONTENT_TYPE, content_type);
                    }
                    None => {
                        response.headers_mut().remove(CONTENT_TYPE);
                    }
                }
                Ok(response)
            }
        }
    }
}

pub fn is_event_stream(value: Option<&HeaderValue>) -> bool {
    value
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().contains(EVENT_STREAM))
}
