//! Middleware pipeline assembly.
//!
//! # Data Flow
//! ```text
//! Request (outermost first):
//!     → handle_errors (uniform JSON errors, request metrics)
//!     → CatchPanicLayer → request ID → timeout → in-flight bound → body limit
//!     → body_parser → cookie_parser → request_logger → file_upload
//!     → sanitize → security_headers → xss → rate_limit → hpp → cors
//!     → route dispatch (mount table)
//!     → static files from PUBLIC_DIR
//!     → JSON 404
//! ```
//!
//! # Design Decisions
//! - The error handler is the outermost layer so it sees every failure below it
//! - Stage order is fixed; configuration can only switch stages off
//! - Static files are the router fallback, so API routes always win

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{DefaultBodyLimit, Request},
    handler::HandlerWithoutStateExt,
    http::{header, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
};

use crate::config::{AppConfig, Stage};
use crate::http::error::{error_response, ApiError};
use crate::http::middleware::{
    body::{self, body_parser, BodyParserState},
    cookies::cookie_parser,
    logger::request_logger,
    upload::{file_upload, UploadState},
    StageToggle,
};
use crate::observability::metrics;
use crate::security::{
    cors::cors_layer,
    headers::security_headers,
    hpp::hpp,
    limits::{limit_in_flight, InFlightLimit},
    rate_limit::{rate_limit, RateLimitState, RateLimiter},
    sanitize::sanitize,
    xss::xss_clean,
};

/// Largest error body read back when rewriting a plain-text error.
const MAX_ERROR_BODY: usize = 16 * 1024;

/// Wrap `router` (routes already mounted and stateful parts resolved) in the
/// full pipeline.
pub fn apply(router: Router, config: &AppConfig, limiter: Arc<RateLimiter>) -> Router {
    let stages = &config.pipeline;
    let toggle = |stage: Stage| StageToggle::new(stages.is_enabled(stage));
    let max_body = config.server.max_body_bytes;

    let router = if stages.is_enabled(Stage::StaticFiles) {
        let static_files = ServeDir::new(&config.server.public_dir)
            .call_fallback_on_method_not_allowed(true)
            .fallback(not_found.into_service());
        router.fallback_service(static_files)
    } else {
        router.fallback(not_found)
    };

    let router = if stages.is_enabled(Stage::Cors) {
        router.layer(cors_layer(&config.cors))
    } else {
        router
    };

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    router.layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn(handle_errors))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(timeout)
            .layer(middleware::from_fn_with_state(
                InFlightLimit::new(config.server.max_in_flight),
                limit_in_flight,
            ))
            .layer(DefaultBodyLimit::max(max_body))
            .layer(middleware::from_fn_with_state(
                BodyParserState {
                    enabled: stages.is_enabled(Stage::BodyParser),
                    limit: max_body,
                },
                body_parser,
            ))
            .layer(middleware::from_fn_with_state(
                toggle(Stage::CookieParser),
                cookie_parser,
            ))
            .layer(middleware::from_fn_with_state(
                StageToggle::new(config.request_logging()),
                request_logger,
            ))
            .layer(middleware::from_fn_with_state(
                UploadState {
                    enabled: stages.is_enabled(Stage::FileUpload),
                    max_file_bytes: config.upload.max_file_bytes,
                },
                file_upload,
            ))
            .layer(middleware::from_fn_with_state(toggle(Stage::Sanitize), sanitize))
            .layer(middleware::from_fn_with_state(
                toggle(Stage::SecurityHeaders),
                security_headers,
            ))
            .layer(middleware::from_fn_with_state(toggle(Stage::Xss), xss_clean))
            .layer(middleware::from_fn_with_state(
                RateLimitState {
                    enabled: stages.is_enabled(Stage::RateLimit),
                    limiter,
                },
                rate_limit,
            ))
            .layer(middleware::from_fn_with_state(toggle(Stage::Hpp), hpp)),
    )
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("Route {} not found", uri.path()))
}

/// Centralized error handler.
///
/// Handler errors already carry the JSON envelope. Anything else in the
/// 4xx/5xx range (extractor rejections, timeouts, body limits, 405s) is
/// rewritten into it, keeping the original status and headers.
async fn handle_errors(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;
    let status = response.status();
    metrics::record_request(&method, status.as_u16(), start);

    if !(status.is_client_error() || status.is_server_error()) || body::is_json(response.headers())
    {
        return response;
    }

    let (parts, body) = response.into_parts();
    let text = axum::body::to_bytes(body, MAX_ERROR_BODY)
        .await
        .map(|bytes| String::from_utf8_lossy(&bytes).trim().to_string())
        .unwrap_or_default();
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("Server Error").to_string()
    } else {
        text
    };

    if status.is_server_error() {
        tracing::error!(%method, path = %path, status = status.as_u16(), error = %message, "Request failed");
    } else {
        tracing::debug!(%method, path = %path, status = status.as_u16(), error = %message, "Request rejected");
    }

    let mut rewritten = error_response(status, message);
    for (name, value) in parts.headers.iter() {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH {
            continue;
        }
        rewritten.headers_mut().append(name.clone(), value.clone());
    }
    rewritten
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(panic = %detail, "Handler panicked");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server Error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use axum::{body::Body, routing::get};
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_config(public_dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.server.public_dir = public_dir.display().to_string();
        config.server.environment = crate::config::Environment::Test;
        config
    }

    fn app(config: &AppConfig) -> Router {
        let routes = Router::new()
            .route("/api/v1/ping", get(|| async { "pong" }))
            .route(
                "/api/v1/boom",
                get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            );
        apply(
            routes,
            config,
            Arc::new(RateLimiter::from_config(&config.rate_limit)),
        )
    }

    async fn json_body(res: Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unmatched_route_is_json_404() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(&test_config(dir.path()))
            .oneshot(Request::get("/api/v1/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(res.headers().contains_key("x-request-id"));
        let body = json_body(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Route /api/v1/nothing not found");
    }

    #[tokio::test]
    async fn test_static_file_served_when_no_route_matches() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>DevCamper</h1>").unwrap();
        let res = app(&test_config(dir.path()))
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn test_panic_becomes_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(&test_config(dir.path()))
            .oneshot(Request::get("/api/v1/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(res).await["error"], "Server Error");
    }

    #[tokio::test]
    async fn test_method_not_allowed_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let res = app(&test_config(dir.path()))
            .oneshot(Request::delete("/api/v1/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(res.headers().contains_key(header::ALLOW));
        assert_eq!(json_body(res).await["error"], "Method Not Allowed");
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected_through_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.server.max_body_bytes = 64;
        let big = format!("{{\"name\": \"{}\"}}", "x".repeat(256));
        let res = app(&config)
            .oneshot(
                Request::post("/api/v1/ping")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(big))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = json_body(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Request body exceeds 64 bytes");
    }

    #[tokio::test]
    async fn test_disabled_static_stage_skips_public_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "home").unwrap();
        let mut config = test_config(dir.path());
        config.pipeline.disabled.push(Stage::StaticFiles);
        let res = app(&config)
            .oneshot(Request::get("/index.html").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
