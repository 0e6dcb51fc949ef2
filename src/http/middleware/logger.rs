//! Development request log.
//!
//! One line per completed request, in the compact form
//! `GET /api/v1/bootcamps 200 3.214 ms - 512`.

use std::time::Instant;

use axum::{
    body::HttpBody,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::StageToggle;

pub async fn request_logger(
    State(toggle): State<StageToggle>,
    req: Request,
    next: Next,
) -> Response {
    if !toggle.enabled {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let length = response
        .body()
        .size_hint()
        .exact()
        .map_or_else(|| "-".to_string(), |n| n.to_string());

    tracing::info!(
        target: "bootcamp_api::access",
        "{} {} {} {:.3} ms - {}",
        method,
        uri,
        response.status().as_u16(),
        elapsed_ms,
        length
    );
    response
}
