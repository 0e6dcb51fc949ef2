//! Review routes.

use axum::{
    extract::{Path, RawQuery, State},
    response::Response,
    routing::get,
    Router,
};
use serde_json::{json, Value};

use crate::api::auth::CurrentUser;
use crate::api::bootcamps::BOOTCAMPS;
use crate::api::resource::{doc_id, ensure_owner, list_query, str_field, strip_fields};
use crate::db::{CollectionSpec, Database, DbError, Document, ListQuery};
use crate::http::middleware::Payload;
use crate::http::response;
use crate::http::{ApiError, ApiResult, AppState};

pub static REVIEWS: CollectionSpec = CollectionSpec {
    name: "reviews",
    required: &["title", "text", "rating", "bootcamp"],
    unique: &[],
};

const REVIEWERS: [&str; 2] = ["user", "admin"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_reviews).post(create_review))
        .route("/{id}", get(get_review).put(update_review).delete(delete_review))
}

/// Ratings are whole numbers from 1 to 10.
fn check_rating(doc: &Document) -> ApiResult<()> {
    let Some(rating) = doc.get("rating") else {
        return Ok(());
    };
    match rating.as_u64() {
        Some(1..=10) => Ok(()),
        _ => Err(ApiError::BadRequest(
            "Please add a rating between 1 and 10".to_string(),
        )),
    }
}

pub fn average_rating(reviews: &[Document]) -> Option<f64> {
    let ratings: Vec<f64> = reviews
        .iter()
        .filter_map(|r| r.get("rating").and_then(Value::as_f64))
        .collect();
    if ratings.is_empty() {
        return None;
    }
    Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
}

async fn refresh_average_rating(db: &Database, bootcamp_id: &str) -> ApiResult<()> {
    let reviews = {
        let belongs: &dyn Fn(&Document) -> bool = &|doc| str_field(doc, "bootcamp") == Some(bootcamp_id);
        let query = ListQuery {
            limit: usize::MAX,
            ..Default::default()
        };
        db.collection(&REVIEWS).find(&query, Some(belongs)).data
    };

    let mut patch = Document::new();
    patch.insert(
        "averageRating".into(),
        average_rating(&reviews).map_or(Value::Null, |rating| json!(rating)),
    );
    match db.collection(&BOOTCAMPS).update(bootcamp_id, patch).await {
        Ok(_) | Err(DbError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn list_reviews(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Response> {
    let page = state.db.collection(&REVIEWS).find(&list_query(raw)?, None);
    Ok(response::page(page))
}

async fn get_review(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let review = state.db.collection(&REVIEWS).find_by_id(&id)?;
    Ok(response::ok(review))
}

async fn create_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Payload(body): Payload<Document>,
) -> ApiResult<Response> {
    user.authorize(&REVIEWERS)?;

    let mut doc = strip_fields(body, &["user"]);
    check_rating(&doc)?;
    let bootcamp_id = str_field(&doc, "bootcamp")
        .ok_or_else(|| ApiError::BadRequest("Please add a bootcamp".to_string()))?
        .to_string();
    state
        .db
        .collection(&BOOTCAMPS)
        .find_by_id(&bootcamp_id)
        .map_err(|_| ApiError::NotFound(format!("No bootcamp with the id of {}", bootcamp_id)))?;

    let reviews = state.db.collection(&REVIEWS);
    let already = reviews.find_one(|r| {
        str_field(r, "bootcamp") == Some(bootcamp_id.as_str())
            && str_field(r, "user") == Some(user.id.as_str())
    });
    if already.is_some() {
        return Err(ApiError::BadRequest(
            "User has already reviewed this bootcamp".to_string(),
        ));
    }

    doc.insert("user".into(), Value::String(user.id.clone()));
    let review = reviews.insert(doc).await?;
    refresh_average_rating(&state.db, &bootcamp_id).await?;

    tracing::info!(review = doc_id(&review), bootcamp = %bootcamp_id, "Review added");
    Ok(response::created(review))
}

async fn update_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<Document>,
) -> ApiResult<Response> {
    user.authorize(&REVIEWERS)?;
    let reviews = state.db.collection(&REVIEWS);
    let existing = reviews.find_by_id(&id)?;
    ensure_owner(&existing, &user, "update", "review")?;

    let patch = strip_fields(body, &["user", "bootcamp"]);
    check_rating(&patch)?;
    let updated = reviews.update(&id, patch).await?;
    if let Some(bootcamp_id) = str_field(&updated, "bootcamp") {
        refresh_average_rating(&state.db, bootcamp_id).await?;
    }
    Ok(response::ok(updated))
}

async fn delete_review(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    user.authorize(&REVIEWERS)?;
    let reviews = state.db.collection(&REVIEWS);
    let existing = reviews.find_by_id(&id)?;
    ensure_owner(&existing, &user, "delete", "review")?;

    reviews.delete(&id).await?;
    if let Some(bootcamp_id) = str_field(&existing, "bootcamp") {
        refresh_average_rating(&state.db, bootcamp_id).await?;
    }
    Ok(response::ok(json!({})))
}
