//! Shared request/response pipeline.
//!
//! Both the REST resource client and the RPC bridge go through here, so
//! status mapping, auth headers and body decoding behave identically for
//! both backends.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use hivegate_auth::TokenSource;

use crate::config::GatewayConfig;
use crate::error::GatewayError;

pub(crate) const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// How a request authenticates.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Auth<'a> {
    /// Read the token from the token source at send time.
    Session,
    /// Use this token (e.g. one that was just issued and is not stored yet).
    Token(&'a str),
    /// Public endpoint; no Authorization header.
    Anonymous,
}

#[derive(Clone)]
pub(crate) struct HttpPipeline {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl HttpPipeline {
    pub(crate) fn new(config: &GatewayConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, tokens })
    }

    /// Send a request and return the raw body of a successful response.
    ///
    /// With `Auth::Session` and no token available this fails with
    /// `Unauthorized` before anything goes on the wire.
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        auth: Auth<'_>,
    ) -> Result<Vec<u8>, GatewayError> {
        let token = match auth {
            Auth::Session => Some(self.tokens.bearer_token().ok_or(GatewayError::Unauthorized)?),
            Auth::Token(token) => Some(token.to_string()),
            Auth::Anonymous => None,
        };

        let request_id = Uuid::now_v7();
        let mut req = self
            .http
            .request(method.clone(), url)
            .header(REQUEST_ID_HEADER, request_id.to_string());
        if let Some(token) = &token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            tracing::warn!(%method, url, %request_id, error = %e, "request did not complete");
            GatewayError::Transport(e.to_string())
        })?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(format!("failed to read response body: {e}")))?;

        tracing::debug!(%method, url, %request_id, status = status.as_u16(), "request completed");

        check_status(status, &bytes)?;
        Ok(bytes.to_vec())
    }
}

/// Map a response status onto the error taxonomy.
pub(crate) fn check_status(status: StatusCode, body: &[u8]) -> Result<(), GatewayError> {
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(GatewayError::Unauthorized);
    }

    Err(GatewayError::RequestFailed {
        status: status.as_u16(),
        message: error_message(status, body),
    })
}

/// The server reports failures as `{"error": "..."}`; fall back to the raw
/// text or the canonical reason.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(msg) = value.get("error").and_then(|v| v.as_str()) {
            return msg.to_string();
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
    } else {
        text.chars().take(200).collect()
    }
}

/// Decode a JSON body. An empty body decodes as `null`.
pub(crate) fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, GatewayError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|e| GatewayError::Transport(format!("failed to parse response body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_statuses_pass() {
        assert!(check_status(StatusCode::OK, b"").is_ok());
        assert!(check_status(StatusCode::NO_CONTENT, b"").is_ok());
    }

    #[test]
    fn unauthorized_is_its_own_kind() {
        assert_eq!(
            check_status(StatusCode::UNAUTHORIZED, br#"{"error":"Invalid token"}"#),
            Err(GatewayError::Unauthorized)
        );
    }

    #[test]
    fn other_failures_carry_status_and_server_message() {
        assert_eq!(
            check_status(
                StatusCode::FORBIDDEN,
                br#"{"error":"Access denied: insufficient permissions"}"#
            ),
            Err(GatewayError::RequestFailed {
                status: 403,
                message: "Access denied: insufficient permissions".to_string(),
            })
        );
        assert_eq!(
            check_status(StatusCode::BAD_GATEWAY, b""),
            Err(GatewayError::RequestFailed {
                status: 502,
                message: "Bad Gateway".to_string(),
            })
        );
    }

    #[test]
    fn unparseable_bodies_are_transport_errors() {
        let err = decode::<Vec<i64>>(b"<html>").unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));

        let empty: Option<Vec<i64>> = decode(b"  ").unwrap();
        assert_eq!(empty, None);
    }
}
