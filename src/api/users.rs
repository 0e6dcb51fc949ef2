//! User administration. Every route requires the `admin` role.

use axum::{
    extract::{Path, RawQuery, State},
    response::Response,
    routing::get,
    Router,
};
use serde_json::{json, Value};

use crate::api::auth::{
    hash_password, public_user, validate_email, validate_password, CurrentUser, PASSWORD_FIELD,
    ROLES, USERS,
};
use crate::api::resource::{list_query, strip_fields};
use crate::db::Document;
use crate::http::middleware::Payload;
use crate::http::response;
use crate::http::{ApiError, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/{id}", get(get_user).put(update_user).delete(delete_user))
}

fn check_role(doc: &Document) -> ApiResult<()> {
    match doc.get("role") {
        None => Ok(()),
        Some(Value::String(role)) if ROLES.contains(&role.as_str()) => Ok(()),
        Some(other) => Err(ApiError::BadRequest(format!("Invalid role {}", other))),
    }
}

/// Turn a client `password` field into the stored hash and normalise `email`.
fn prepare(mut doc: Document, require_password: bool) -> ApiResult<Document> {
    doc.remove(PASSWORD_FIELD);
    check_role(&doc)?;

    if let Some(email) = doc.get("email").and_then(Value::as_str) {
        let email = validate_email(email)?;
        doc.insert("email".into(), Value::String(email));
    }

    match doc.remove("password") {
        Some(Value::String(password)) => {
            let password = validate_password(Some(password.as_str()))?;
            doc.insert(PASSWORD_FIELD.into(), Value::String(hash_password(password)?));
        }
        Some(_) => return Err(ApiError::BadRequest("Please add a password".to_string())),
        None if require_password => validate_password(None).map(|_| ())?,
        None => {}
    }
    Ok(doc)
}

async fn list_users(
    State(state): State<AppState>,
    admin: CurrentUser,
    RawQuery(raw): RawQuery,
) -> ApiResult<Response> {
    admin.authorize(&["admin"])?;
    let mut page = state.db.collection(&USERS).find(&list_query(raw)?, None);
    page.data = page.data.into_iter().map(public_user).collect();
    Ok(response::page(page))
}

async fn get_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    admin.authorize(&["admin"])?;
    let user = state.db.collection(&USERS).find_by_id(&id)?;
    Ok(response::ok(public_user(user)))
}

async fn create_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    Payload(body): Payload<Document>,
) -> ApiResult<Response> {
    admin.authorize(&["admin"])?;
    let mut doc = prepare(body, true)?;
    doc.entry("role").or_insert_with(|| json!("user"));
    let user = state.db.collection(&USERS).insert(doc).await?;
    tracing::info!(admin = %admin.id, user = %user["_id"], "User created");
    Ok(response::created(public_user(user)))
}

async fn update_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(id): Path<String>,
    Payload(body): Payload<Document>,
) -> ApiResult<Response> {
    admin.authorize(&["admin"])?;
    let patch = prepare(strip_fields(body, &["_id", "createdAt"]), false)?;
    let user = state.db.collection(&USERS).update(&id, patch).await?;
    Ok(response::ok(public_user(user)))
}

async fn delete_user(
    State(state): State<AppState>,
    admin: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    admin.authorize(&["admin"])?;
    state.db.collection(&USERS).delete(&id).await?;
    tracing::info!(admin = %admin.id, user = %id, "User deleted");
    Ok(response::ok(json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_prepare_hashes_password_and_ignores_raw_hash() {
        let prepared = prepare(
            doc(json!({"name": "Jane", "email": "JANE@x.io", "password": "123456", "passwordHash": "forged"})),
            true,
        )
        .unwrap();
        assert_eq!(prepared["email"], "jane@x.io");
        assert!(!prepared.contains_key("password"));
        assert!(prepared[PASSWORD_FIELD].as_str().unwrap().starts_with("$argon2"));
    }

    #[test]
    fn test_prepare_rejects_bad_input() {
        assert!(prepare(doc(json!({"name": "Jane", "email": "jane@x.io"})), true).is_err());
        assert!(prepare(doc(json!({"role": "superuser"})), false).is_err());
        assert!(prepare(doc(json!({"name": "Renamed"})), false).is_ok());
    }
}
