//! Cookie header parsing.

use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use super::StageToggle;

/// Cookies sent with the request, by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies(pub HashMap<String, String>);

impl Cookies {
    /// Parse every `Cookie` header. The first occurrence of a name wins.
    pub fn parse(headers: &HeaderMap) -> Self {
        let mut map = HashMap::new();
        for value in headers.get_all(header::COOKIE) {
            let Ok(raw) = value.to_str() else {
                continue;
            };
            for pair in raw.split(';') {
                let Some((name, value)) = pair.split_once('=') else {
                    continue;
                };
                let name = name.trim();
                if name.is_empty() {
                    continue;
                }
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                map.entry(name.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        Cookies(map)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

pub async fn cookie_parser(
    State(toggle): State<StageToggle>,
    mut req: Request,
    next: Next,
) -> Response {
    if toggle.enabled {
        let cookies = Cookies::parse(req.headers());
        req.extensions_mut().insert(cookies);
    }
    next.run(req).await
}
