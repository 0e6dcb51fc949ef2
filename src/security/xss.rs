//! Markup cleaning for user input.
//!
//! Every string in the parsed body and every query value that contains
//! markup is passed through `ammonia`, which drops scripts, event handlers
//! and unknown tags while keeping harmless formatting.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::http::error::ApiError;
use crate::http::middleware::{ParsedBody, StageToggle};
use crate::security::query::{query_pairs, replace_query};

/// Clean one string. Plain text is returned unchanged.
pub fn clean_str(input: &str) -> Option<String> {
    if !input.contains('<') {
        return None;
    }
    let cleaned = ammonia::clean(input);
    (cleaned != input).then_some(cleaned)
}

/// Clean every string inside `value`. Returns how many strings changed.
pub fn clean_value(value: &mut Value) -> usize {
    match value {
        Value::String(s) => match clean_str(s) {
            Some(cleaned) => {
                *s = cleaned;
                1
            }
            None => 0,
        },
        Value::Array(items) => items.iter_mut().map(clean_value).sum(),
        Value::Object(map) => map.values_mut().map(clean_value).sum(),
        _ => 0,
    }
}

pub async fn xss_clean(
    State(toggle): State<StageToggle>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !toggle.enabled {
        return Ok(next.run(req).await);
    }

    let mut cleaned = req
        .extensions_mut()
        .get_mut::<ParsedBody>()
        .map_or(0, |body| clean_value(&mut body.0));

    let mut pairs = query_pairs(req.uri());
    let mut query_changed = false;
    for (_, value) in pairs.iter_mut() {
        if let Some(clean) = clean_str(value) {
            *value = clean;
            query_changed = true;
            cleaned += 1;
        }
    }
    if query_changed {
        replace_query(&mut req, &pairs)?;
    }

    if cleaned > 0 {
        tracing::debug!(cleaned, path = %req.uri().path(), "Markup removed from request input");
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scripts_are_removed() {
        let mut value = json!({
            "description": "<script>alert('x')</script>Great camp",
            "careers": ["<img src=x onerror=alert(1)>Web"],
            "rating": 8,
            "plain": "no markup & fine"
        });
        assert_eq!(clean_value(&mut value), 2);
        assert_eq!(value["description"], "Great camp");
        assert!(!value["careers"][0].as_str().unwrap().contains("onerror"));
        assert_eq!(value["rating"], 8);
        assert_eq!(value["plain"], "no markup & fine");
    }

    #[test]
    fn test_harmless_formatting_is_kept() {
        assert_eq!(clean_str("<b>bold</b>"), None);
        assert_eq!(clean_str("text"), None);
    }
}
