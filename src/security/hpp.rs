//! HTTP parameter pollution guard.
//!
//! Repeated query parameters collapse to one. The parameter keeps the
//! position of its first occurrence and the value of its last. The full
//! list of values is kept in [`PollutedQuery`] for handlers that want it.

use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::http::error::ApiError;
use crate::http::middleware::StageToggle;
use crate::security::query::{query_pairs, replace_query};

/// Values of parameters that were repeated, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollutedQuery(pub HashMap<String, Vec<String>>);

/// Collapse duplicate keys. Returns the deduplicated pairs and the polluted keys.
pub fn collapse(pairs: Vec<(String, String)>) -> (Vec<(String, String)>, PollutedQuery) {
    let mut out: Vec<(String, String)> = Vec::with_capacity(pairs.len());
    let mut seen: HashMap<String, Vec<String>> = HashMap::new();

    for (key, value) in pairs {
        let values = seen.entry(key.clone()).or_default();
        values.push(value.clone());
        if values.len() == 1 {
            out.push((key, value));
        } else if let Some(slot) = out.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        }
    }

    seen.retain(|_, values| values.len() > 1);
    (out, PollutedQuery(seen))
}

pub async fn hpp(
    State(toggle): State<StageToggle>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !toggle.enabled {
        return Ok(next.run(req).await);
    }

    let (pairs, polluted) = collapse(query_pairs(req.uri()));
    if !polluted.0.is_empty() {
        tracing::debug!(keys = ?polluted.0.keys().collect::<Vec<_>>(), "Duplicate query parameters collapsed");
        replace_query(&mut req, &pairs)?;
        req.extensions_mut().insert(polluted);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, extract::RawQuery, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_last_value_wins_in_first_position() {
        let (out, polluted) = collapse(pairs(&[("sort", "name"), ("page", "1"), ("sort", "-createdAt")]));
        assert_eq!(out, pairs(&[("sort", "-createdAt"), ("page", "1")]));
        assert_eq!(polluted.0["sort"], vec!["name".to_string(), "-createdAt".to_string()]);
        assert!(!polluted.0.contains_key("page"));
    }

    #[tokio::test]
    async fn test_handler_sees_single_value() {
        let app = Router::new()
            .route("/", get(|RawQuery(q): RawQuery| async move { q.unwrap_or_default() }))
            .layer(middleware::from_fn_with_state(StageToggle::new(true), hpp));

        let res = app
            .oneshot(Request::get("/?a=1&b=x&a=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"a=2&b=x");
    }
}
