//! Backend request/response vocabulary.
//!
//! The query tree mirrors a search engine's boolean DSL. Aggregations are
//! nested `terms` levels (one per group-by field, outermost first) with the
//! metrics computed at the innermost level.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Boolean query tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryDsl {
    MatchAll,
    Bool {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        must: Vec<QueryDsl>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        should: Vec<QueryDsl>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        must_not: Vec<QueryDsl>,
    },
    Term {
        field: String,
        value: Value,
    },
    Range {
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gt: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gte: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lt: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lte: Option<Value>,
    },
    Exists {
        field: String,
    },
    /// `*` matches any run, `?` one character
    Wildcard {
        field: String,
        pattern: String,
    },
}

impl QueryDsl {
    pub fn must(clauses: Vec<QueryDsl>) -> Self {
        QueryDsl::Bool {
            must: clauses,
            should: Vec::new(),
            must_not: Vec::new(),
        }
    }

    pub fn should(clauses: Vec<QueryDsl>) -> Self {
        QueryDsl::Bool {
            must: Vec::new(),
            should: clauses,
            must_not: Vec::new(),
        }
    }

    /// `field` present and `clause` not matching.
    pub fn exists_and_not(field: &str, clause: QueryDsl) -> Self {
        QueryDsl::Bool {
            must: vec![QueryDsl::Exists {
                field: field.to_string(),
            }],
            should: Vec::new(),
            must_not: vec![clause],
        }
    }

    pub fn not(clause: QueryDsl) -> Self {
        QueryDsl::Bool {
            must: Vec::new(),
            should: Vec::new(),
            must_not: vec![clause],
        }
    }

    /// ANDs two trees, flattening nested `must` lists.
    pub fn and(self, other: QueryDsl) -> Self {
        let mut clauses = Vec::new();
        for q in [self, other] {
            match q {
                QueryDsl::MatchAll => {}
                QueryDsl::Bool {
                    must,
                    should,
                    must_not,
                } if should.is_empty() && must_not.is_empty() => clauses.extend(must),
                other => clauses.push(other),
            }
        }
        match clauses.len() {
            0 => QueryDsl::MatchAll,
            1 => clauses.remove(0),
            _ => QueryDsl::must(clauses),
        }
    }
}

/// Ordering of the buckets of one terms level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketOrder {
    KeyAsc,
    KeyDesc,
    CountAsc,
    CountDesc,
}

/// One `terms` level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsLevel {
    pub field: String,
    /// Emit a bucket for documents without a value
    pub missing_bucket: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// `None` keeps first-seen bucket order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<BucketOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Output name in each bucket's `metrics`
    pub name: String,
    pub kind: MetricKind,
    /// `None` counts documents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub levels: Vec<TermsLevel>,
    pub metrics: Vec<MetricSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub descending: bool,
}

/// A single backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub index: String,
    pub query: QueryDsl,
    /// Fields to return per hit; `None` returns every field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortSpec>,
    /// Hits skipped before the first returned one
    pub from: usize,
    /// Total hits to return across all pages; `None` is unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    /// Hits per response page
    pub page_size: usize,
    /// Continuation token from the previous page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl SearchRequest {
    /// Match-all hit request over `index`.
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            query: QueryDsl::MatchAll,
            columns: None,
            aggregation: None,
            sort: Vec::new(),
            from: 0,
            size: None,
            page_size: 1_000,
            cursor: None,
            timeout_ms: None,
        }
    }
}

/// One bucket; the root bucket of a response has a null key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: Value,
    pub doc_count: u64,
    /// Metric values, present at the innermost level only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, Value>,
    /// Next terms level
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Flattened documents (dotted field names)
    #[serde(default)]
    pub hits: Vec<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Bucket>,
    /// Matching documents before paging
    pub total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_serializes_snake_case() {
        let q = QueryDsl::exists_and_not(
            "status",
            QueryDsl::Term {
                field: "status".into(),
                value: json!(500),
            },
        );
        assert_eq!(
            serde_json::to_value(&q).unwrap(),
            json!({"bool": {
                "must": [{"exists": {"field": "status"}}],
                "must_not": [{"term": {"field": "status", "value": 500}}]
            }})
        );
    }

    #[test]
    fn and_flattens_must_lists() {
        let term = |v: i64| QueryDsl::Term {
            field: "a".into(),
            value: json!(v),
        };
        let q = QueryDsl::MatchAll.and(term(1)).and(term(2)).and(term(3));
        let QueryDsl::Bool { must, .. } = q else {
            panic!("expected bool");
        };
        assert_eq!(must.len(), 3);
    }
}
