//! Authentication: registration, login, tokens and the current-user extractor.
//!
//! Tokens are HS256 JWTs carrying the user id. They are returned in the
//! response body and in an HttpOnly `token` cookie; protected routes accept
//! either `Authorization: Bearer <jwt>` or that cookie.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use password_hash::rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::resource::{doc_id, str_field};
use crate::config::AppConfig;
use crate::db::{CollectionSpec, Document};
use crate::http::middleware::{Cookies, Payload};
use crate::http::response;
use crate::http::{ApiError, ApiResult, AppState};

pub static USERS: CollectionSpec = CollectionSpec {
    name: "users",
    required: &["name", "email", "role"],
    unique: &["email"],
};

pub const PASSWORD_FIELD: &str = "passwordHash";
const MIN_PASSWORD_LEN: usize = 6;
const SELF_ASSIGNABLE_ROLES: [&str; 2] = ["user", "publisher"];
pub const ROLES: [&str; 3] = ["user", "publisher", "admin"];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/me", get(me))
        .route("/updatedetails", put(update_details))
        .route("/updatepassword", put(update_password))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

/// The authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub role: String,
}

impl CurrentUser {
    pub fn new(id: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Require one of `roles`.
    pub fn authorize(&self, roles: &[&str]) -> ApiResult<()> {
        if roles.contains(&self.role.as_str()) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "User role {} is not authorized to access this route",
                self.role
            )))
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| {
                parts
                    .extensions
                    .get::<Cookies>()
                    .and_then(|c| c.get("token"))
                    .filter(|t| *t != "none")
                    .map(str::to_string)
            })
            .ok_or_else(ApiError::not_authorized)?;

        let claims = decode_token(&token, &state.config.auth.jwt_secret).ok_or_else(|| {
            tracing::debug!("Rejected invalid or expired token");
            ApiError::not_authorized()
        })?;

        let user = state
            .db
            .collection(&USERS)
            .find_by_id(&claims.sub)
            .map_err(|_| ApiError::not_authorized())?;

        Ok(CurrentUser::new(
            claims.sub,
            str_field(&user, "role").unwrap_or("user"),
        ))
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn issue_token(user_id: &str, config: &AppConfig) -> ApiResult<String> {
    let now = chrono::Utc::now().timestamp().max(0) as u64;
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now.saturating_add(config.auth.jwt_expire_secs),
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.auth.jwt_secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("failed to sign token: {}", e)))
}

pub fn decode_token(token: &str, secret: &str) -> Option<Claims> {
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

/// Argon2 work runs on the blocking pool.
async fn hash_password_blocking(password: String) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
}

async fn verify_password_blocking(password: String, hash: String) -> ApiResult<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub fn validate_password(password: Option<&str>) -> ApiResult<&str> {
    match password {
        None | Some("") => Err(ApiError::BadRequest("Please add a password".to_string())),
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ))),
        Some(p) => Ok(p),
    }
}

pub fn validate_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty()
                && !domain.starts_with('.')
                && domain.contains('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        });
    if valid {
        Ok(email)
    } else {
        Err(ApiError::BadRequest("Please add a valid email".to_string()))
    }
}

/// User document as sent to clients.
pub fn public_user(mut doc: Document) -> Document {
    doc.remove(PASSWORD_FIELD);
    doc
}

fn token_cookie(value: &str, max_age_secs: u64, secure: bool) -> String {
    let secure_attr = if secure { "; Secure" } else { "" };
    format!(
        "token={}; HttpOnly{}; Path=/; Max-Age={}; SameSite=Lax",
        value, secure_attr, max_age_secs
    )
}

fn with_cookie(mut response: Response, cookie: &str) -> ApiResult<Response> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| ApiError::Internal(format!("invalid cookie: {}", e)))?;
    response.headers_mut().insert(header::SET_COOKIE, value);
    Ok(response)
}

/// Sign a token for `user_id` and send it in the body and the `token` cookie.
fn send_token_response(user_id: &str, config: &AppConfig) -> ApiResult<Response> {
    let token = issue_token(user_id, config)?;
    let cookie = token_cookie(
        &token,
        config.auth.cookie_expire_days.saturating_mul(24 * 60 * 60),
        config.server.environment.is_production(),
    );
    with_cookie(
        Json(json!({"success": true, "token": token})).into_response(),
        &cookie,
    )
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    name: Option<Value>,
    email: Option<String>,
    password: Option<String>,
    role: Option<String>,
}

async fn register(
    State(state): State<AppState>,
    Payload(req): Payload<RegisterRequest>,
) -> ApiResult<Response> {
    let role = req.role.unwrap_or_else(|| "user".to_string());
    if !SELF_ASSIGNABLE_ROLES.contains(&role.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "Role {} cannot be chosen at registration",
            role
        )));
    }
    let email = validate_email(req.email.as_deref().unwrap_or_default())?;
    let password = validate_password(req.password.as_deref())?.to_string();
    let hash = hash_password_blocking(password).await?;

    let mut doc = Document::new();
    doc.insert("name".into(), req.name.unwrap_or(Value::Null));
    doc.insert("email".into(), Value::String(email));
    doc.insert("role".into(), Value::String(role));
    doc.insert(PASSWORD_FIELD.into(), Value::String(hash));

    let user = state.db.collection(&USERS).insert(doc).await?;
    tracing::info!(user = doc_id(&user), role = str_field(&user, "role"), "User registered");
    send_token_response(doc_id(&user), &state.config)
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

async fn login(
    State(state): State<AppState>,
    Payload(req): Payload<LoginRequest>,
) -> ApiResult<Response> {
    let (Some(email), Some(password)) = (req.email, req.password) else {
        return Err(ApiError::BadRequest(
            "Please provide an email and password".to_string(),
        ));
    };

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());
    let user = state
        .db
        .collection(&USERS)
        .find_by_field("email", &Value::String(email.trim().to_lowercase()))
        .ok_or_else(invalid)?;
    let hash = str_field(&user, PASSWORD_FIELD).unwrap_or_default().to_string();
    if !verify_password_blocking(password, hash).await? {
        return Err(invalid());
    }

    send_token_response(doc_id(&user), &state.config)
}

async fn logout() -> ApiResult<Response> {
    with_cookie(response::ok(json!({})), &token_cookie("none", 10, false))
}

async fn me(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Response> {
    let doc = state.db.collection(&USERS).find_by_id(&user.id)?;
    Ok(response::ok(public_user(doc)))
}

#[derive(Debug, Deserialize)]
struct UpdateDetailsRequest {
    name: Option<Value>,
    email: Option<String>,
}

async fn update_details(
    State(state): State<AppState>,
    user: CurrentUser,
    Payload(req): Payload<UpdateDetailsRequest>,
) -> ApiResult<Response> {
    let mut patch = Document::new();
    if let Some(name) = req.name {
        patch.insert("name".into(), name);
    }
    if let Some(email) = req.email {
        patch.insert("email".into(), Value::String(validate_email(&email)?));
    }
    let updated = state.db.collection(&USERS).update(&user.id, patch).await?;
    Ok(response::ok(public_user(updated)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePasswordRequest {
    current_password: Option<String>,
    new_password: Option<String>,
}

async fn update_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Payload(req): Payload<UpdatePasswordRequest>,
) -> ApiResult<Response> {
    let users = state.db.collection(&USERS);
    let doc = users.find_by_id(&user.id)?;
    let hash = str_field(&doc, PASSWORD_FIELD).unwrap_or_default().to_string();

    let current = req.current_password.unwrap_or_default();
    if !verify_password_blocking(current, hash).await? {
        return Err(ApiError::Unauthorized("Password is incorrect".to_string()));
    }

    let new_password = validate_password(req.new_password.as_deref())?.to_string();
    let new_hash = hash_password_blocking(new_password).await?;
    let mut patch = Document::new();
    patch.insert(PASSWORD_FIELD.into(), Value::String(new_hash));
    users.update(&user.id, patch).await?;

    tracing::info!(user = %user.id, "Password changed");
    send_token_response(&user.id, &state.config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("123456").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("123456", &hash));
        assert!(!verify_password("654321", &hash));
        assert!(!verify_password("123456", "not-a-hash"));
    }

    #[test]
    fn test_token_round_trip_and_wrong_secret() {
        let config = AppConfig::default();
        let token = issue_token("user-1", &config).unwrap();
        let claims = decode_token(&token, &config.auth.jwt_secret).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert!(claims.exp > claims.iat);
        assert!(decode_token(&token, "another-secret").is_none());
    }

    #[test]
    fn test_input_validation() {
        assert_eq!(validate_email(" John@Gmail.com ").unwrap(), "john@gmail.com");
        assert!(validate_email("john@localhost").is_err());
        assert!(validate_email("@gmail.com").is_err());
        assert!(validate_password(Some("12345")).is_err());
        assert!(validate_password(None).is_err());
        assert_eq!(validate_password(Some("123456")).unwrap(), "123456");
    }

    #[test]
    fn test_role_checks() {
        let publisher = CurrentUser::new("u1", "publisher");
        assert!(publisher.authorize(&["publisher", "admin"]).is_ok());
        let err = publisher.authorize(&["user", "admin"]).unwrap_err();
        assert_eq!(err.to_string(), "User role publisher is not authorized to access this route");
    }

    #[test]
    fn test_public_user_hides_hash() {
        let mut doc = Document::new();
        doc.insert(PASSWORD_FIELD.into(), Value::String("secret".into()));
        doc.insert("name".into(), Value::String("John".into()));
        let public = public_user(doc);
        assert!(!public.contains_key(PASSWORD_FIELD));
        assert_eq!(public["name"], "John");
    }

    #[test]
    fn test_oversized_lifetimes_saturate() {
        let mut config = AppConfig::default();
        config.auth.jwt_expire_secs = u64::MAX;
        config.auth.cookie_expire_days = u64::MAX / 1000;

        assert!(issue_token("user-1", &config).is_ok());

        let res = send_token_response("user-1", &config).unwrap();
        let cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.contains(&format!("Max-Age={}", u64::MAX)));
    }
}
