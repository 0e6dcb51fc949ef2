//! Multipart upload parsing.
//!
//! `multipart/form-data` bodies are buffered into [`UploadedFiles`]; plain
//! text fields are merged into the [`ParsedBody`] so they pass through the
//! same sanitizing stages as JSON input.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{FromRequest, FromRequestParts, Multipart, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use super::ParsedBody;
use crate::http::error::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct UploadState {
    pub enabled: bool,
    pub max_file_bytes: usize,
}

/// One file received in a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Extension of the original file name, including the dot.
    pub fn extension(&self) -> Option<&str> {
        let dot = self.file_name.rfind('.')?;
        let ext = &self.file_name[dot..];
        (ext.len() > 1).then_some(ext)
    }

    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("image/"))
    }
}

/// Files received with the request. Empty when the body was not multipart.
#[derive(Debug, Clone, Default)]
pub struct UploadedFiles(pub Arc<Vec<UploadedFile>>);

impl UploadedFiles {
    pub fn field(&self, name: &str) -> Option<&UploadedFile> {
        self.0.iter().find(|f| f.field == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S> FromRequestParts<S> for UploadedFiles
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<UploadedFiles>()
            .cloned()
            .unwrap_or_default())
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

fn multipart_error(status: StatusCode, message: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(message)
    } else {
        ApiError::BadRequest(message)
    }
}

pub async fn file_upload(
    State(state): State<UploadState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.enabled || !is_multipart(req.headers()) {
        return Ok(next.run(req).await);
    }

    let (mut parts, body) = req.into_parts();
    let mut multipart = Multipart::from_request(Request::from_parts(parts.clone(), body), &())
        .await
        .map_err(|rej| multipart_error(rej.status(), rej.body_text()))?;

    let mut files = Vec::new();
    let mut fields = serde_json::Map::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e.status(), e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_string);
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e.status(), e.body_text()))?;
                if data.len() > state.max_file_bytes {
                    return Err(ApiError::PayloadTooLarge(format!(
                        "File {} exceeds the {} byte upload limit",
                        file_name, state.max_file_bytes
                    )));
                }
                tracing::debug!(field = %name, file = %file_name, bytes = data.len(), "File received");
                files.push(UploadedFile {
                    field: name,
                    file_name,
                    content_type,
                    data,
                });
            }
            None => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e.status(), e.body_text()))?;
                fields.insert(name, Value::String(text));
            }
        }
    }

    let mut parsed = parts.extensions.remove::<ParsedBody>().unwrap_or_default();
    if let Value::Object(map) = &mut parsed.0 {
        map.extend(fields);
    }
    parts.extensions.insert(parsed);
    parts.extensions.insert(UploadedFiles(Arc::new(files)));

    Ok(next.run(Request::from_parts(parts, Body::empty())).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::Payload;
    use axum::{middleware, routing::post, Json, Router};
    use serde_json::json;
    use tower::ServiceExt;

    const BOUNDARY: &str = "XBOUNDARYX";

    fn multipart_body(file_bytes: &str) -> String {
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"caption\"\r\n\r\nfront door\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"camp.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n{data}\r\n--{b}--\r\n",
            b = BOUNDARY,
            data = file_bytes
        )
    }

    fn app(max_file_bytes: usize) -> Router {
        async fn inspect(files: UploadedFiles, Payload(body): Payload<Value>) -> Json<Value> {
            let file = files.field("file");
            Json(json!({
                "body": body,
                "file": file.map(|f| f.file_name.clone()),
                "ext": file.and_then(|f| f.extension().map(str::to_string)),
                "image": file.map(UploadedFile::is_image),
                "size": file.map(UploadedFile::size),
            }))
        }
        Router::new().route("/", post(inspect)).layer(middleware::from_fn_with_state(
            UploadState {
                enabled: true,
                max_file_bytes,
            },
            file_upload,
        ))
    }

    async fn send(app: Router, body: String) -> (StatusCode, Value) {
        let res = app
            .oneshot(
                Request::post("/")
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_files_and_fields_are_extracted() {
        let (status, body) = send(app(1024), multipart_body("JPEGDATA")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"], json!({"caption": "front door"}));
        assert_eq!(body["file"], "camp.jpg");
        assert_eq!(body["ext"], ".jpg");
        assert_eq!(body["image"], true);
        assert_eq!(body["size"], 8);
    }

    #[tokio::test]
    async fn test_oversized_file_is_rejected() {
        let (status, body) = send(app(4), multipart_body("JPEGDATA")).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
    }
}
