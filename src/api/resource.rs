//! Helpers shared by the resource handlers.

use serde_json::Value;
use url::form_urlencoded;

use crate::api::auth::CurrentUser;
use crate::db::{Document, ListQuery};
use crate::http::{ApiError, ApiResult};

/// Parse the raw query string into a list query.
pub fn list_query(raw: Option<String>) -> ApiResult<ListQuery> {
    let pairs: Vec<(String, String)> = raw
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();
    Ok(ListQuery::from_pairs(pairs)?)
}

pub fn doc_id(doc: &Document) -> &str {
    doc.get("_id").and_then(Value::as_str).unwrap_or_default()
}

pub fn str_field<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field).and_then(Value::as_str)
}

/// Admins may touch anything; everyone else only documents they created.
pub fn ensure_owner(doc: &Document, user: &CurrentUser, action: &str, kind: &str) -> ApiResult<()> {
    if user.is_admin() || str_field(doc, "user") == Some(user.id.as_str()) {
        return Ok(());
    }
    Err(ApiError::Forbidden(format!(
        "User {} is not authorized to {} this {}",
        user.id,
        action,
        kind
    )))
}

/// Drop fields a client may never set directly.
pub fn strip_fields(mut doc: Document, fields: &[&str]) -> Document {
    for field in fields {
        doc.remove(*field);
    }
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ownership() {
        let doc = json!({"_id": "b1", "user": "u1"}).as_object().cloned().unwrap();
        let owner = CurrentUser::new("u1", "publisher");
        let other = CurrentUser::new("u2", "publisher");
        let admin = CurrentUser::new("u3", "admin");

        assert!(ensure_owner(&doc, &owner, "update", "bootcamp").is_ok());
        assert!(ensure_owner(&doc, &admin, "update", "bootcamp").is_ok());
        let err = ensure_owner(&doc, &other, "update", "bootcamp").unwrap_err();
        assert_eq!(err.to_string(), "User u2 is not authorized to update this bootcamp");
    }

    #[test]
    fn test_list_query_from_raw() {
        let query = list_query(Some("select=name&limit=5&averageCost%5Blt%5D=100".into())).unwrap();
        assert_eq!(query.limit, 5);
        assert_eq!(query.filters.len(), 1);
        assert!(list_query(Some("page=zero".into())).is_err());
    }
}
