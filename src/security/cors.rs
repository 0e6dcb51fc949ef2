//! Cross-origin policy.

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;

const METHODS: [Method; 6] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::OPTIONS,
];

/// Build the CORS layer. A configured origin also allows credentials;
/// without one any origin is accepted and cookies are not exposed.
pub fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let explicit = config
        .allowed_origin
        .as_deref()
        .and_then(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "Ignoring invalid CORS origin; allowing any origin");
                None
            }
        });

    match explicit {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods(METHODS)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(METHODS)
            .allow_headers(Any),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::Request, routing::get, Router};
    use tower::ServiceExt;

    async fn preflight(config: CorsConfig) -> axum::response::Response {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(&config));
        app.oneshot(
            Request::options("/")
                .header(header::ORIGIN, "https://devcamper.io")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_any_origin_by_default() {
        let res = preflight(CorsConfig::default()).await;
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    }

    #[tokio::test]
    async fn test_explicit_origin_allows_credentials() {
        let res = preflight(CorsConfig {
            allowed_origin: Some("https://devcamper.io".to_string()),
        })
        .await;
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://devcamper.io"
        );
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }
}
