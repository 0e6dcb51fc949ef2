//! Operator-injection guard.
//!
//! Keys that start with `$` or contain `.` could be read as query operators
//! or nested paths by the store. They are removed from the parsed body at
//! any depth and from the query string.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::http::error::ApiError;
use crate::http::middleware::{ParsedBody, StageToggle};
use crate::security::query::{query_pairs, replace_query};

fn is_operator_key(key: &str) -> bool {
    key.starts_with('$') || key.contains('.')
}

fn is_operator_query_key(key: &str) -> bool {
    key.contains('$') || key.contains('.')
}

/// Remove operator keys from `value` recursively. Returns how many were removed.
pub fn strip_operator_keys(value: &mut Value) -> usize {
    match value {
        Value::Object(map) => {
            let before = map.len();
            map.retain(|key, _| !is_operator_key(key));
            let mut removed = before - map.len();
            for child in map.values_mut() {
                removed += strip_operator_keys(child);
            }
            removed
        }
        Value::Array(items) => items.iter_mut().map(strip_operator_keys).sum(),
        _ => 0,
    }
}

pub async fn sanitize(
    State(toggle): State<StageToggle>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !toggle.enabled {
        return Ok(next.run(req).await);
    }

    let mut removed = req
        .extensions_mut()
        .get_mut::<ParsedBody>()
        .map_or(0, |body| strip_operator_keys(&mut body.0));

    let pairs = query_pairs(req.uri());
    let total = pairs.len();
    let kept: Vec<(String, String)> = pairs
        .into_iter()
        .filter(|(key, _)| !is_operator_query_key(key))
        .collect();
    if kept.len() != total {
        removed += total - kept.len();
        replace_query(&mut req, &kept)?;
    }

    if removed > 0 {
        tracing::warn!(removed, path = %req.uri().path(), "Operator keys stripped from request");
    }
    Ok(next.run(req).await)
}
