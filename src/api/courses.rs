//! Course routes.
//!
//! Courses belong to a bootcamp. After every write the owning bootcamp's
//! `averageCost` is recomputed from the tuition of its courses.

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

pub static COURSES: CollectionSpec = CollectionSpec {
    name: "courses",
    required: &["title", "description", "bootcamp"],
    unique: &[],
};

const PUBLISHERS: [&str; 2] = ["publisher", "admin"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_courses).post(create_course))
        .route("/{id}", get(get_course).put(update_course).delete(delete_course))
}

/// Mean tuition of the bootcamp's courses, rounded up to a multiple of ten.
pub fn average_cost(courses: &[Document]) -> Option<f64> {
    let tuitions: Vec<f64> = courses
        .iter()
        .filter_map(|c| c.get("tuition").and_then(Value::as_f64))
        .collect();
    if tuitions.is_empty() {
        return None;
    }
    let mean = tuitions.iter().sum::<f64>() / tuitions.len() as f64;
    Some((mean / 10.0).ceil() * 10.0)
}

async fn refresh_average_cost(db: &Database, bootcamp_id: &str) -> ApiResult<()> {
    let courses = {
        let belongs: &dyn Fn(&Document) -> bool = &|doc| str_field(doc, "bootcamp") == Some(bootcamp_id);
        let query = ListQuery {
            limit: usize::MAX,
            ..Default::default()
        };
        db.collection(&COURSES).find(&query, Some(belongs)).data
    };

    let mut patch = Document::new();
    patch.insert(
        "averageCost".into(),
        average_cost(&courses).map_or(Value::Null, |cost| json!(cost)),
    );
    match db.collection(&BOOTCAMPS).update(bootcamp_id, patch).await {
        Ok(_) | Err(DbError::NotFound(_)) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn list_courses(
    State(state): State<AppState>,
    RawQuery(raw): RawQuery,
) -> ApiResult<Response> {
    let page = state.db.collection(&COURSES).find(&list_query(raw)?, None);
    Ok(response::page(page))
}

async fn get_course(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let course = state.db.collection(&COURSES).find_by_id(&id)?;
    Ok(response::ok(course))
}

async fn create_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Payload(body): Payload<Document>,
) -> ApiResult<Response> {
    user.authorize(&PUBLISHERS)?;

    let mut doc = strip_fields(body, &["user"]);
    let bootcamp_id = str_field(&doc, "bootcamp")
        .ok_or_else(|| ApiError::BadRequest("Please add a bootcamp".to_string()))?
        .to_string();
    let bootcamp = state
        .db
        .collection(&BOOTCAMPS)
        .find_by_id(&bootcamp_id)
        .map_err(|_| ApiError::NotFound(format!("No bootcamp with the id of {}", bootcamp_id)))?;
    ensure_owner(&bootcamp, &user, "add a course to", "bootcamp")?;

    doc.insert("user".into(), Value::String(user.id.clone()));
    let course = state.db.collection(&COURSES).insert(doc).await?;
    refresh_average_cost(&state.db, &bootcamp_id).await?;

    tracing::info!(course = doc_id(&course), bootcamp = %bootcamp_id, "Course created");
    Ok(response::created(course))
}

async fn update_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<Document>,
) -> ApiResult<Response> {
    user.authorize(&PUBLISHERS)?;
    let courses = state.db.collection(&COURSES);
    let existing = courses.find_by_id(&id)?;
    ensure_owner(&existing, &user, "update", "course")?;

    let updated = courses.update(&id, strip_fields(body, &["user", "bootcamp"])).await?;
    if let Some(bootcamp_id) = str_field(&updated, "bootcamp") {
        refresh_average_cost(&state.db, bootcamp_id).await?;
    }
    Ok(response::ok(updated))
}

async fn delete_course(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    user.authorize(&PUBLISHERS)?;
    let courses = state.db.collection(&COURSES);
    let existing = courses.find_by_id(&id)?;
    ensure_owner(&existing, &user, "delete", "course")?;

    courses.delete(&id).await?;
    if let Some(bootcamp_id) = str_field(&existing, "bootcamp") {
        refresh_average_cost(&state.db, bootcamp_id).await?;
    }
    Ok(response::ok(json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_cost_rounds_up_to_tens() {
        let courses: Vec<Document> = [json!({"tuition": 8000}), json!({"tuition": 10001}), json!({"title": "free"})]
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect();
        assert_eq!(average_cost(&courses), Some(9010.0));
        assert_eq!(average_cost(&[]), None);
    }

    #[tokio::test]
    async fn test_refresh_writes_bootcamp_average() {
        let db = Database::in_memory();
        let bootcamp = db
            .collection(&BOOTCAMPS)
            .insert(json!({"name": "Devworks", "description": "d"}).as_object().cloned().unwrap())
            .await
            .unwrap();
        let id = doc_id(&bootcamp).to_string();
        for tuition in [1000, 2000] {
            db.collection(&COURSES)
                .insert(
                    json!({"title": "t", "description": "d", "bootcamp": id, "tuition": tuition})
                        .as_object()
                        .cloned()
                        .unwrap(),
                )
                .await
                .unwrap();
        }

        refresh_average_cost(&db, &id).await.unwrap();
        let bootcamp = db.collection(&BOOTCAMPS).find_by_id(&id).unwrap();
        assert_eq!(bootcamp["averageCost"], 1500.0);

        // A bootcamp that no longer exists is not an error.
        refresh_average_cost(&db, "gone").await.unwrap();
    }
}
