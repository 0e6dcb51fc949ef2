//! Bootcamp routes.

use axum::{
    extract::{Path, RawQuery, State},
    response::Response,
    routing::{get, put},
    Router,
};
use serde_json::{json, Value};

use crate::api::auth::CurrentUser;
use crate::api::courses::COURSES;
use crate::api::resource::{doc_id, ensure_owner, list_query, str_field, strip_fields};
use crate::api::reviews::REVIEWS;
use crate::db::{CollectionSpec, Document};
use crate::http::middleware::{Payload, UploadedFiles};
use crate::http::response;
use crate::http::{ApiError, ApiResult, AppState};

pub static BOOTCAMPS: CollectionSpec = CollectionSpec {
    name: "bootcamps",
    required: &["name", "description"],
    unique: &["name"],
};

const PUBLISHERS: [&str; 2] = ["publisher", "admin"];

/// Fields derived from other collections or owned by the server.
const DERIVED_FIELDS: [&str; 6] = ["_id", "createdAt", "user", "slug", "averageCost", "averageRating"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bootcamps).post(create_bootcamp))
        .route(
            "/{id}",
            get(get_bootcamp).put(update_bootcamp).delete(delete_bootcamp),
        )
        .route("/{id}/courses", get(bootcamp_courses))
        .route("/{id}/reviews", get(bootcamp_reviews))
        .route("/{id}/photo", put(upload_photo))
}

/// URL-friendly form of a bootcamp name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

fn set_slug(doc: &mut Document) {
    if let Some(name) = doc.get("name").and_then(Value::as_str) {
        let slug = slugify(name);
        doc.insert("slug".into(), Value::String(slug));
    }
}

async fn list_bootcamps(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Response> {
    let page = state.db.collection(&BOOTCAMPS).find(&list_query(raw)?, None);
    Ok(response::page(page))
}

async fn get_bootcamp(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let bootcamp = state.db.collection(&BOOTCAMPS).find_by_id(&id)?;
    Ok(response::ok(bootcamp))
}

async fn create_bootcamp(
    State(state): State<AppState>,
    user: CurrentUser,
    Payload(body): Payload<Document>,
) -> ApiResult<Response> {
    user.authorize(&PUBLISHERS)?;
    let bootcamps = state.db.collection(&BOOTCAMPS);

    if !user.is_admin() {
        let owner = Value::String(user.id.clone());
        if bootcamps.find_by_field("user", &owner).is_some() {
            return Err(ApiError::BadRequest(format!(
                "The user with ID {} has already published a bootcamp",
                user.id
            )));
        }
    }

    let mut doc = strip_fields(body, &DERIVED_FIELDS);
    doc.insert("user".into(), Value::String(user.id.clone()));
    doc.entry("photo").or_insert_with(|| json!("no-photo.jpg"));
    set_slug(&mut doc);

    let bootcamp = bootcamps.insert(doc).await?;
    tracing::info!(bootcamp = doc_id(&bootcamp), user = %user.id, "Bootcamp created");
    Ok(response::created(bootcamp))
}

async fn update_bootcamp(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<Document>,
) -> ApiResult<Response> {
    user.authorize(&PUBLISHERS)?;
    let bootcamps = state.db.collection(&BOOTCAMPS);
    let existing = bootcamps.find_by_id(&id)?;
    ensure_owner(&existing, &user, "update", "bootcamp")?;

    let mut patch = strip_fields(body, &DERIVED_FIELDS);
    set_slug(&mut patch);
    let updated = bootcamps.update(&id, patch).await?;
    Ok(response::ok(updated))
}

async fn delete_bootcamp(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    user.authorize(&PUBLISHERS)?;
    let bootcamps = state.db.collection(&BOOTCAMPS);
    let existing = bootcamps.find_by_id(&id)?;
    ensure_owner(&existing, &user, "delete", "bootcamp")?;

    bootcamps.delete(&id).await?;
    let key = Value::String(id.clone());
    let courses = state.db.collection(&COURSES).delete_where("bootcamp", &key).await?;
    let reviews = state.db.collection(&REVIEWS).delete_where("bootcamp", &key).await?;
    tracing::info!(bootcamp = %id, courses, reviews, "Bootcamp deleted with its courses and reviews");
    Ok(response::ok(json!({})))
}

/// List documents of `spec` that belong to bootcamp `id`.
fn children(
    state: &AppState,
    spec: &'static CollectionSpec,
    id: &str,
    raw: Option<String>,
) -> ApiResult<Response> {
    state.db.collection(&BOOTCAMPS).find_by_id(id)?;
    let query = list_query(raw)?;
    let belongs: &dyn Fn(&Document) -> bool = &|doc| str_field(doc, "bootcamp") == Some(id);
    let page = state.db.collection(spec).find(&query, Some(belongs));
    Ok(response::page(page))
}

async fn bootcamp_courses(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Response> {
    children(&state, &COURSES, &id, raw)
}

async fn bootcamp_reviews(
    State(state): State<AppState>,
    Path(id): Path<String>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Response> {
    children(&state, &REVIEWS, &id, raw)
}

async fn upload_photo(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    files: UploadedFiles,
) -> ApiResult<Response> {
    user.authorize(&PUBLISHERS)?;
    let bootcamps = state.db.collection(&BOOTCAMPS);
    let existing = bootcamps.find_by_id(&id)?;
    ensure_owner(&existing, &user, "update", "bootcamp")?;

    let file = files
        .field("file")
        .ok_or_else(|| ApiError::BadRequest("Please upload a file".to_string()))?;
    if !file.is_image() {
        return Err(ApiError::BadRequest("Please upload an image file".to_string()));
    }
    let max = state.config.upload.max_file_bytes;
    if file.size() > max {
        return Err(ApiError::BadRequest(format!(
            "Please upload an image less than {} bytes",
            max
        )));
    }

    let file_name = format!("photo_{}{}", id, file.extension().unwrap_or_default());
    let dir = std::path::Path::new(&state.config.upload.path);
    let written = async {
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(dir.join(&file_name), &file.data).await
    }
    .await;
    if let Err(e) = written {
        tracing::error!(error = %e, path = %dir.display(), "Failed to store upload");
        return Err(ApiError::Internal("Problem with file upload".to_string()));
    }

    let mut patch = Document::new();
    patch.insert("photo".into(), Value::String(file_name.clone()));
    bootcamps.update(&id, patch).await?;
    tracing::info!(bootcamp = %id, file = %file_name, bytes = file.size(), "Bootcamp photo stored");
    Ok(response::ok(file_name))
}
