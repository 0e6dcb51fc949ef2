//! JSON body parsing.
//!
//! JSON bodies are read once, parsed, and attached to the request as
//! [`ParsedBody`]. Sanitizing stages rewrite that value in place and
//! handlers read the cleaned result through the [`Payload`] extractor.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::http::error::ApiError;

/// Structured request body produced by the parsing stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

impl Default for ParsedBody {
    fn default() -> Self {
        ParsedBody(Value::Object(Map::new()))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BodyParserState {
    pub enabled: bool,
    pub limit: usize,
}

pub(crate) fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let essence = ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
            essence == "application/json" || essence.ends_with("+json")
        })
        .unwrap_or(false)
}

pub async fn body_parser(
    State(state): State<BodyParserState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.enabled {
        return Ok(next.run(req).await);
    }

    if !is_json(req.headers()) {
        let mut req = req;
        req.extensions_mut().insert(ParsedBody::default());
        return Ok(next.run(req).await);
    }

    let (mut parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, state.limit).await.map_err(|_| {
        ApiError::PayloadTooLarge(format!("Request body exceeds {} bytes", state.limit))
    })?;

    let value = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::debug!(error = %e, "Malformed JSON body");
            ApiError::BadRequest(format!("Invalid JSON body: {}", e))
        })?
    };

    parts.extensions.insert(ParsedBody(value));
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

/// Deserializes the (sanitized) parsed body into `T`.
///
/// Requests that never went through the body parser read as `{}`.
#[derive(Debug)]
pub struct Payload<T>(pub T);

impl<T, S> FromRequestParts<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .extensions
            .get::<ParsedBody>()
            .cloned()
            .unwrap_or_default()
            .0;
        serde_json::from_value(value)
            .map(Payload)
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, middleware, routing::post, Json, Router};
    use serde_json::json;
    use tower::ServiceExt;

    fn app(enabled: bool) -> Router {
        async fn echo(Payload(body): Payload<Value>) -> Json<Value> {
            Json(body)
        }
        Router::new().route("/", post(echo)).layer(middleware::from_fn_with_state(
            BodyParserState {
                enabled,
                limit: 1024,
            },
            body_parser,
        ))
    }

    async fn send(app: Router, content_type: &str, body: &'static str) -> (StatusCode, Value) {
        let res = app
            .oneshot(
                Request::post("/")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_json_body_is_parsed() {
        let (status, body) = send(app(true), "application/json", r#"{"name":"Devworks"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"name": "Devworks"}));
    }

    #[tokio::test]
    async fn test_empty_and_non_json_bodies_read_as_empty_object() {
        let (_, body) = send(app(true), "application/json", "  ").await;
        assert_eq!(body, json!({}));

        let (_, body) = send(app(true), "text/plain", "hello").await;
        assert_eq!(body, json!({}));
    }

    #[tokio::test]
    async fn test_malformed_json_is_a_bad_request() {
        let (status, body) = send(app(true), "application/json; charset=utf-8", "{oops").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON body"));
    }

    #[tokio::test]
    async fn test_disabled_stage_skips_parsing() {
        let (status, body) = send(app(false), "application/json", "{oops").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));
    }

    #[test]
    fn test_json_content_types() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/vnd.api+json".parse().unwrap());
        assert!(is_json(&headers));
        headers.insert(header::CONTENT_TYPE, "multipart/form-data; boundary=x".parse().unwrap());
        assert!(!is_json(&headers));
    }
}
