//! Query-string rewriting shared by the input-cleaning stages.

use axum::{
    extract::Request,
    http::{uri::PathAndQuery, Uri},
};
use url::form_urlencoded;

use crate::http::error::ApiError;

/// Decoded query pairs in their original order.
pub fn query_pairs(uri: &Uri) -> Vec<(String, String)> {
    uri.query()
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// Replace the request's query string with `pairs`.
pub fn replace_query(req: &mut Request, pairs: &[(String, String)]) -> Result<(), ApiError> {
    let path = req.uri().path().to_string();
    let path_and_query = if pairs.is_empty() {
        path
    } else {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        format!("{}?{}", path, query)
    };

    let mut parts = req.uri().clone().into_parts();
    parts.path_and_query = Some(
        PathAndQuery::try_from(path_and_query)
            .map_err(|e| ApiError::BadRequest(format!("Invalid query string: {}", e)))?,
    );
    *req.uri_mut() = Uri::from_parts(parts)
        .map_err(|e| ApiError::BadRequest(format!("Invalid query string: {}", e)))?;
    Ok(())
}
