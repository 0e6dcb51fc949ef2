//! Success envelopes.
//!
//! Single resources are sent as `{"success": true, "data": ...}`; lists add
//! `count` (items on this page) and `pagination` (`next`/`prev` when present).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::{Page, Pagination};

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            count: None,
            pagination: None,
            data,
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> Response {
    Json(Envelope::new(data)).into_response()
}

pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(Envelope::new(data))).into_response()
}

pub fn page(page: Page) -> Response {
    Json(Envelope {
        success: true,
        count: Some(page.data.len()),
        pagination: Some(page.pagination),
        data: page.data,
    })
    .into_response()
}
