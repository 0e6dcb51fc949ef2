//! Global bound on concurrently processed requests.
//!
//! # Responsibilities
//! - Hold one semaphore permit per request for its whole lifetime
//! - Make excess requests wait for a free slot (the request timeout still applies)
//!
//! # Design Decisions
//! - Bounded per request, not per connection, so keep-alive clients are not penalised
//! - Body size limits live in the pipeline (`RequestBodyLimitLayer`)

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tokio::sync::Semaphore;

use crate::http::error::error_response;

#[derive(Clone, Debug)]
pub struct InFlightLimit {
    permits: Arc<Semaphore>,
    max: usize,
}

impl InFlightLimit {
    pub fn new(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

pub async fn limit_in_flight(
    State(limit): State<InFlightLimit>,
    req: Request,
    next: Next,
) -> Response {
    let Ok(_permit) = limit.permits.clone().acquire_owned().await else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down");
    };
    if limit.available() == 0 {
        tracing::debug!(max_in_flight = limit.max, "In-flight request limit reached");
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_permit_held_for_request_and_released() {
        let limit = InFlightLimit::new(2);
        let gauge = limit.clone();
        let app = Router::new()
            .route(
                "/",
                get(move || {
                    let gauge = gauge.clone();
                    async move { gauge.available().to_string() }
                }),
            )
            .layer(middleware::from_fn_with_state(limit.clone(), limit_in_flight));

        let res = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"1");
        assert_eq!(limit.available(), 2);
    }
}
