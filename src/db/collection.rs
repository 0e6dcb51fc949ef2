//! Validated CRUD over one collection.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::db::query::{self, ListQuery, Page};
use crate::db::{Database, DbError, Document};

/// Fields the store manages itself; never taken from client input.
const MANAGED_FIELDS: [&str; 2] = ["_id", "createdAt"];

/// Static description of a collection.
#[derive(Debug)]
pub struct CollectionSpec {
    pub name: &'static str,
    /// Fields that must be present and non-empty.
    pub required: &'static [&'static str],
    /// Fields whose values must be unique across the collection.
    pub unique: &'static [&'static str],
}

impl CollectionSpec {
    fn check_required(&self, doc: &Document) -> Result<(), DbError> {
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|field| is_blank(doc.get(**field)))
            .map(|field| format!("Please add a {}", field))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DbError::Validation(missing))
        }
    }

    fn check_unique(&self, docs: &[Document], candidate: &Document) -> Result<(), DbError> {
        let id = candidate.get("_id");
        for field in self.unique {
            let Some(value) = candidate.get(*field) else {
                continue;
            };
            let clash = docs
                .iter()
                .filter(|doc| doc.get("_id") != id)
                .any(|doc| doc.get(*field) == Some(value));
            if clash {
                return Err(DbError::Duplicate((*field).to_string()));
            }
        }
        Ok(())
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// A borrowed view of one collection.
pub struct Collection<'a> {
    db: &'a Database,
    spec: &'static CollectionSpec,
}

impl<'a> Collection<'a> {
    pub(crate) fn new(db: &'a Database, spec: &'static CollectionSpec) -> Self {
        Self { db, spec }
    }

    /// Validate and store a new document, returning it with `_id` and `createdAt`.
    pub async fn insert(&self, mut doc: Document) -> Result<Document, DbError> {
        for field in MANAGED_FIELDS {
            doc.remove(field);
        }
        doc.insert("_id".into(), Value::String(Uuid::new_v4().to_string()));
        doc.insert(
            "createdAt".into(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        self.spec.check_required(&doc)?;

        let spec = self.spec;
        let doc = self
            .db
            .write(spec.name, move |docs| {
                spec.check_unique(docs, &doc)?;
                docs.push(doc.clone());
                Ok(doc)
            })
            .await?;

        tracing::debug!(collection = self.spec.name, id = %doc["_id"], "Document inserted");
        Ok(doc)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Document, DbError> {
        self.find_one(|doc| has_id(doc, id))
            .ok_or_else(|| DbError::NotFound(id.to_string()))
    }

    /// First document matching `predicate`, in insertion order.
    pub fn find_one<P>(&self, predicate: P) -> Option<Document>
    where
        P: Fn(&Document) -> bool,
    {
        self.db
            .collections()
            .get(self.spec.name)
            .and_then(|docs| docs.iter().find(|doc| predicate(*doc)).cloned())
    }

    /// First document whose `field` equals `value`.
    pub fn find_by_field(&self, field: &str, value: &Value) -> Option<Document> {
        self.find_one(|doc| doc.get(field) == Some(value))
    }

    /// Run a list query, optionally restricted by a fixed `scope` predicate.
    pub fn find(&self, list: &ListQuery, scope: Option<&dyn Fn(&Document) -> bool>) -> Page {
        let docs: Vec<Document> = self
            .db
            .collections()
            .get(self.spec.name)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| scope.map_or(true, |f| f(*doc)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        query::execute(docs, list)
    }

    /// Merge `patch` into the document with `id`.
    pub async fn update(&self, id: &str, mut patch: Document) -> Result<Document, DbError> {
        for field in MANAGED_FIELDS {
            patch.remove(field);
        }

        let spec = self.spec;
        let updated = self
            .db
            .write(spec.name, |docs| {
                let idx = position(docs, id)?;
                let mut candidate = docs[idx].clone();
                for (key, value) in patch {
                    candidate.insert(key, value);
                }
                spec.check_required(&candidate)?;
                spec.check_unique(docs, &candidate)?;
                docs[idx] = candidate.clone();
                Ok(candidate)
            })
            .await?;

        tracing::debug!(collection = self.spec.name, id, "Document updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<Document, DbError> {
        let removed = self
            .db
            .write(self.spec.name, |docs| {
                let idx = position(docs, id)?;
                Ok(docs.remove(idx))
            })
            .await?;

        tracing::debug!(collection = self.spec.name, id, "Document deleted");
        Ok(removed)
    }

    /// Remove every document whose `field` equals `value`. Returns the count removed.
    pub async fn delete_where(&self, field: &str, value: &Value) -> Result<usize, DbError> {
        if self.find_by_field(field, value).is_none() {
            return Ok(0);
        }
        self.db
            .write(self.spec.name, |docs| {
                let before = docs.len();
                docs.retain(|doc| doc.get(field) != Some(value));
                Ok(before - docs.len())
            })
            .await
    }

    pub fn count(&self) -> usize {
        self.db
            .collections()
            .get(self.spec.name)
            .map_or(0, |docs| docs.len())
    }
}

fn position(docs: &[Document], id: &str) -> Result<usize, DbError> {
    docs.iter()
        .position(|doc| has_id(doc, id))
        .ok_or_else(|| DbError::NotFound(id.to_string()))
}

fn has_id(doc: &Document, id: &str) -> bool {
    doc.get("_id").and_then(Value::as_str) == Some(id)
}
