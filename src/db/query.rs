//! List query language.
//!
//! Query-string pairs become a [`ListQuery`]:
//! - `select=name,description` keeps only those fields (plus `_id`)
//! - `sort=-averageCost,name` orders by fields, `-` for descending
//! - `page` / `limit` paginate (defaults 1 / 25)
//! - `field=value` filters on equality
//! - `field[gt|gte|lt|lte|ne|in]=value` filters with an operator;
//!   `in` takes a comma separated list
//!
//! Comparison is numeric when both sides are numbers, textual otherwise.
//! Array fields match equality when any element matches.

use std::cmp::Ordering;

use serde::Serialize;
use serde_json::Value;

use crate::db::{DbError, Document};

const DEFAULT_LIMIT: usize = 25;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl Op {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "gt" => Some(Op::Gt),
            "gte" => Some(Op::Gte),
            "lt" => Some(Op::Lt),
            "lte" => Some(Op::Lte),
            "ne" => Some(Op::Ne),
            "in" => Some(Op::In),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    pub value: String,
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        let actual = doc.get(&self.field);
        match self.op {
            Op::Eq => matches_eq(actual, &self.value),
            Op::Ne => !matches_eq(actual, &self.value),
            Op::In => self
                .value
                .split(',')
                .map(str::trim)
                .any(|candidate| matches_eq(actual, candidate)),
            Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
                let Some(ordering) = actual.and_then(|v| compare_raw(v, &self.value)) else {
                    return false;
                };
                match self.op {
                    Op::Gt => ordering == Ordering::Greater,
                    Op::Gte => ordering != Ordering::Less,
                    Op::Lt => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// A parsed list request.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub select: Option<Vec<String>>,
    pub sort: Vec<SortKey>,
    pub page: usize,
    pub limit: usize,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            select: None,
            sort: vec![SortKey {
                field: "createdAt".to_string(),
                descending: true,
            }],
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl ListQuery {
    /// Build a query from decoded query-string pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, DbError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut query = ListQuery::default();

        for (key, value) in pairs {
            let (key, value) = (key.as_ref(), value.as_ref().trim());
            match key {
                "select" => {
                    query.select = Some(split_list(value));
                }
                "sort" => {
                    let keys: Vec<SortKey> = split_list(value)
                        .into_iter()
                        .map(|field| match field.strip_prefix('-') {
                            Some(rest) => SortKey {
                                field: rest.to_string(),
                                descending: true,
                            },
                            None => SortKey {
                                field,
                                descending: false,
                            },
                        })
                        .collect();
                    if !keys.is_empty() {
                        query.sort = keys;
                    }
                }
                "page" => {
                    query.page = parse_positive("page", value)?;
                }
                "limit" => {
                    query.limit = parse_positive("limit", value)?.min(MAX_LIMIT);
                }
                _ => query.filters.push(parse_filter(key, value)?),
            }
        }

        Ok(query)
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_positive(name: &str, value: &str) -> Result<usize, DbError> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(DbError::InvalidQuery(format!(
            "{} must be a positive integer",
            name
        ))),
    }
}

fn parse_filter(key: &str, value: &str) -> Result<Filter, DbError> {
    let Some((field, rest)) = key.split_once('[') else {
        return Ok(Filter {
            field: key.to_string(),
            op: Op::Eq,
            value: value.to_string(),
        });
    };
    let op = rest
        .strip_suffix(']')
        .and_then(Op::parse)
        .ok_or_else(|| DbError::InvalidQuery(format!("unsupported filter '{}'", key)))?;
    Ok(Filter {
        field: field.to_string(),
        op,
        value: value.to_string(),
    })
}

fn matches_eq(actual: Option<&Value>, raw: &str) -> bool {
    match actual {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare_raw(item, raw) == Some(Ordering::Equal)),
        Some(value) => compare_raw(value, raw) == Some(Ordering::Equal),
        None => false,
    }
}

/// Compare a stored value with a raw query value.
fn compare_raw(actual: &Value, raw: &str) -> Option<Ordering> {
    match actual {
        Value::Number(n) => {
            let lhs = n.as_f64()?;
            let rhs: f64 = raw.parse().ok()?;
            lhs.partial_cmp(&rhs)
        }
        Value::String(s) => Some(s.as_str().cmp(raw)),
        Value::Bool(b) => raw.parse::<bool>().ok().map(|rhs| b.cmp(&rhs)),
        _ => None,
    }
}

/// Order two optional values for sorting. Missing values sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRef {
    pub page: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PageRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageRef>,
}

/// One page of list results.
#[derive(Debug, Clone)]
pub struct Page {
    pub data: Vec<Document>,
    /// Matches before pagination.
    pub total: usize,
    pub pagination: Pagination,
}

/// Filter, sort, paginate and project `docs`.
pub(crate) fn execute(docs: Vec<Document>, query: &ListQuery) -> Page {
    let mut matched: Vec<Document> = docs
        .into_iter()
        .filter(|doc| query.filters.iter().all(|f| f.matches(doc)))
        .collect();

    matched.sort_by(|a, b| {
        query
            .sort
            .iter()
            .map(|key| {
                let ord = compare_values(a.get(&key.field), b.get(&key.field));
                if key.descending {
                    ord.reverse()
                } else {
                    ord
                }
            })
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });

    let total = matched.len();
    let start = (query.page - 1).saturating_mul(query.limit);
    let end = start.saturating_add(query.limit);

    let mut pagination = Pagination::default();
    if end < total {
        pagination.next = Some(PageRef {
            page: query.page + 1,
            limit: query.limit,
        });
    }
    if start > 0 {
        pagination.prev = Some(PageRef {
            page: query.page - 1,
            limit: query.limit,
        });
    }

    let data = matched
        .into_iter()
        .skip(start)
        .take(query.limit)
        .map(|doc| project(doc, query.select.as_deref()))
        .collect();

    Page {
        data,
        total,
        pagination,
    }
}

fn project(doc: Document, select: Option<&[String]>) -> Document {
    match select {
        None => doc,
        Some(fields) => doc
            .into_iter()
            .filter(|(key, _)| key == "_id" || fields.iter().any(|f| f == key))
            .collect(),
    }
}
