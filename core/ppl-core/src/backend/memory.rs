//! In-memory search backend.
//!
//! Documents are JSON objects kept per index, flattened to dotted keys on
//! insert. Every request is answered exactly the way a search engine would
//! answer it: boolean query matching, stable multi-key sort with nulls
//! last, from/size windows served in cursor pages, and nested terms
//! bucket aggregation.

use crate::backend::{
    AggregationSpec, Bucket, BucketOrder, MetricKind, MetricSpec, QueryDsl, SearchBackend,
    SearchRequest, SearchResponse, SortSpec, TermsLevel,
};
use crate::error::{PplError, PplResult};
use crate::ppl::analyzer::functions::AggregateFunction;
use crate::ppl::executor::Accumulator;
use crate::schema::{SchemaProvider, Statistics, field_type, flatten_schema};
use crate::value::ScalarValue;
use ahash::AHashMap;
use arrow::datatypes::{DataType, Schema, SchemaRef};
use dashmap::DashMap;
use regex::Regex;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const NAME: &str = "MemoryBackend";

type Document = Map<String, Value>;

/// Per-index document store
struct IndexData {
    /// Flattened schema
    schema: SchemaRef,
    docs: parking_lot::RwLock<Vec<Document>>,
}

/// Search backend holding every index in process memory.
#[derive(Default)]
pub struct MemoryBackend {
    /// Index name → documents
    indices: DashMap<String, Arc<IndexData>>,
    /// Every request received, in arrival order
    requests: parking_lot::Mutex<Vec<SearchRequest>>,
    /// Artificial delay per request
    latency: Option<Duration>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `latency` before answering each request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Builder form of [`create_index`](Self::create_index) + [`insert`](Self::insert).
    pub fn with_index(self, name: &str, schema: Schema, docs: Vec<Value>) -> PplResult<Self> {
        self.create_index(name, schema);
        self.insert(name, docs)?;
        Ok(self)
    }

    /// Creates (or replaces) an empty index.
    pub fn create_index(&self, name: &str, schema: Schema) {
        let data = IndexData {
            schema: Arc::new(flatten_schema(&schema)),
            docs: parking_lot::RwLock::new(Vec::new()),
        };
        self.indices.insert(name.to_string(), Arc::new(data));
    }

    /// Appends documents; nested objects are flattened to dotted keys.
    pub fn insert(&self, name: &str, docs: impl IntoIterator<Item = Value>) -> PplResult<()> {
        let index = self.index(name)?;
        let mut flattened = Vec::new();
        for doc in docs {
            let Value::Object(object) = doc else {
                return Err(PplError::Serialization(format!(
                    "documents for `{name}` must be JSON objects"
                )));
            };
            let mut flat = Document::new();
            flatten_doc("", object, &mut flat);
            flattened.push(flat);
        }
        index.docs.write().extend(flattened);
        Ok(())
    }

    pub fn doc_count(&self, name: &str) -> usize {
        self.indices
            .get(name)
            .map(|index| index.docs.read().len())
            .unwrap_or(0)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().clear();
    }

    fn index(&self, name: &str) -> PplResult<Arc<IndexData>> {
        self.indices
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PplError::execution(NAME, format!("unknown index `{name}`")))
    }
}

fn flatten_doc(prefix: &str, object: Document, out: &mut Document) {
    for (key, value) in object {
        let name = if prefix.is_empty() {
            key
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) => flatten_doc(&name, inner, out),
            other => {
                out.insert(name, other);
            }
        }
    }
}

impl SchemaProvider for MemoryBackend {
    fn schema(&self, source: &str) -> Option<SchemaRef> {
        self.indices.get(source).map(|index| Arc::clone(&index.schema))
    }

    fn statistics(&self, source: &str) -> Option<Statistics> {
        self.indices
            .get(source)
            .map(|index| Statistics::new(index.docs.read().len() as u64))
    }
}

impl SearchBackend for MemoryBackend {
    fn search(&self, request: &SearchRequest) -> PplResult<SearchResponse> {
        self.requests.lock().push(request.clone());
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        if let Some(timeout) = request.timeout_ms
            && self.latency.is_some_and(|l| l.as_millis() as u64 > timeout)
        {
            return Err(PplError::Timeout {
                elapsed_ms: timeout,
            });
        }

        let index = self.index(&request.index)?;
        let matcher = Matcher::compile(&request.query, &index.schema)?;
        let docs = index.docs.read();
        let mut matched: Vec<&Document> = docs.iter().filter(|d| matcher.matches(d)).collect();
        let total = matched.len() as u64;

        if let Some(spec) = &request.aggregation {
            let root = aggregate(&matched, spec, &index.schema)?;
            return Ok(SearchResponse {
                hits: Vec::new(),
                aggregation: Some(root),
                total,
                cursor: None,
            });
        }

        if !request.sort.is_empty() {
            matched.sort_by(|a, b| compare_docs(a, b, &request.sort, &index.schema));
        }

        let end = match request.size {
            Some(size) => request.from.saturating_add(size).min(matched.len()),
            None => matched.len(),
        };
        let start = match &request.cursor {
            None => request.from,
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| PplError::execution(NAME, format!("invalid cursor `{cursor}`")))?,
        }
        .min(end);
        let page_end = start.saturating_add(request.page_size.max(1)).min(end);

        let hits = matched[start..page_end]
            .iter()
            .map(|doc| match &request.columns {
                None => (*doc).clone(),
                Some(columns) => columns
                    .iter()
                    .filter_map(|c| doc.get(c).map(|v| (c.clone(), v.clone())))
                    .collect(),
            })
            .collect();
        Ok(SearchResponse {
            hits,
            aggregation: None,
            total,
            cursor: (page_end < end).then(|| page_end.to_string()),
        })
    }
}

/// Field reference resolved against the index schema.
///
/// Documents are read the same way the coordinator reads hits: the value is
/// converted to the declared type and an array contributes its first element.
struct FieldRef {
    name: String,
    data_type: DataType,
}

impl FieldRef {
    fn new(name: &str, schema: &Schema) -> Self {
        Self {
            name: name.to_string(),
            data_type: field_type(schema, name).unwrap_or(DataType::Null),
        }
    }

    fn read(&self, doc: &Document) -> ScalarValue {
        doc_value(doc, &self.name, &self.data_type)
    }
}

/// Query tree with fields resolved and wildcard patterns compiled.
enum Matcher {
    All,
    Bool {
        must: Vec<Matcher>,
        should: Vec<Matcher>,
        must_not: Vec<Matcher>,
    },
    Term {
        field: FieldRef,
        value: ScalarValue,
    },
    Range {
        field: FieldRef,
        bounds: Vec<(Ordering, bool, ScalarValue)>,
    },
    Exists(FieldRef),
    Wildcard {
        field: FieldRef,
        regex: Regex,
    },
}

impl Matcher {
    fn compile(query: &QueryDsl, schema: &Schema) -> PplResult<Matcher> {
        let all = |clauses: &[QueryDsl]| {
            clauses
                .iter()
                .map(|c| Matcher::compile(c, schema))
                .collect::<PplResult<Vec<_>>>()
        };
        Ok(match query {
            QueryDsl::MatchAll => Matcher::All,
            QueryDsl::Bool {
                must,
                should,
                must_not,
            } => Matcher::Bool {
                must: all(must)?,
                should: all(should)?,
                must_not: all(must_not)?,
            },
            QueryDsl::Term { field, value } => Matcher::Term {
                field: FieldRef::new(field, schema),
                value: ScalarValue::infer_json(value),
            },
            QueryDsl::Range {
                field,
                gt,
                gte,
                lt,
                lte,
            } => {
                // (ordering of doc value vs bound that passes, equality passes)
                let mut bounds = Vec::new();
                for (bound, ordering, inclusive) in [
                    (gt, Ordering::Greater, false),
                    (gte, Ordering::Greater, true),
                    (lt, Ordering::Less, false),
                    (lte, Ordering::Less, true),
                ] {
                    if let Some(v) = bound {
                        bounds.push((ordering, inclusive, ScalarValue::infer_json(v)));
                    }
                }
                Matcher::Range {
                    field: FieldRef::new(field, schema),
                    bounds,
                }
            }
            QueryDsl::Exists { field } => Matcher::Exists(FieldRef::new(field, schema)),
            QueryDsl::Wildcard { field, pattern } => Matcher::Wildcard {
                field: FieldRef::new(field, schema),
                regex: wildcard_regex(pattern)?,
            },
        })
    }

    fn matches(&self, doc: &Document) -> bool {
        match self {
            Matcher::All => true,
            Matcher::Bool {
                must,
                should,
                must_not,
            } => {
                must.iter().all(|m| m.matches(doc))
                    && (should.is_empty() || should.iter().any(|m| m.matches(doc)))
                    && !must_not.iter().any(|m| m.matches(doc))
            }
            Matcher::Term { field, value } => {
                field.read(doc).partial_cmp_value(value) == Some(Ordering::Equal)
            }
            Matcher::Range { field, bounds } => {
                let v = field.read(doc);
                !v.is_null()
                    && bounds.iter().all(|(wanted, inclusive, bound)| {
                        match v.partial_cmp_value(bound) {
                            Some(Ordering::Equal) => *inclusive,
                            Some(o) => o == *wanted,
                            None => false,
                        }
                    })
            }
            Matcher::Exists(field) => !field.read(doc).is_null(),
            Matcher::Wildcard { field, regex } => match field.read(doc) {
                ScalarValue::Utf8(s) => regex.is_match(&s),
                _ => false,
            },
        }
    }
}

/// Value of `field` converted to `data_type`; missing fields are null.
fn doc_value(doc: &Document, field: &str, data_type: &DataType) -> ScalarValue {
    doc.get(field)
        .map(|v| ScalarValue::from_json(v, data_type))
        .unwrap_or(ScalarValue::Null)
}

fn wildcard_regex(pattern: &str) -> PplResult<Regex> {
    let mut source = String::from("(?s)^");
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| PplError::execution(NAME, format!("bad wildcard: {e}")))
}

fn compare_docs(a: &Document, b: &Document, keys: &[SortSpec], schema: &Schema) -> Ordering {
    for key in keys {
        let data_type = field_type(schema, &key.field).unwrap_or(DataType::Null);
        let (x, y) = (
            doc_value(a, &key.field, &data_type),
            doc_value(b, &key.field, &data_type),
        );
        let ordering = match (x.is_null(), y.is_null()) {
            (false, false) if key.descending => y.sort_cmp(&x),
            _ => x.sort_cmp(&y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn aggregate(docs: &[&Document], spec: &AggregationSpec, schema: &Schema) -> PplResult<Bucket> {
    let mut root = Bucket {
        key: Value::Null,
        doc_count: docs.len() as u64,
        ..Default::default()
    };
    if spec.levels.is_empty() {
        root.metrics = metrics(docs, &spec.metrics, schema)?;
    } else {
        root.buckets = buckets(docs, &spec.levels, &spec.metrics, schema)?;
    }
    Ok(root)
}

fn buckets(
    docs: &[&Document],
    levels: &[TermsLevel],
    metric_specs: &[MetricSpec],
    schema: &Schema,
) -> PplResult<Vec<Bucket>> {
    let Some((level, deeper)) = levels.split_first() else {
        return Ok(Vec::new());
    };
    let data_type = field_type(schema, &level.field).unwrap_or(DataType::Null);

    let mut slots: AHashMap<Vec<u8>, usize> = AHashMap::new();
    let mut groups: Vec<(ScalarValue, Vec<&Document>)> = Vec::new();
    for doc in docs {
        let key = doc
            .get(&level.field)
            .map(|v| ScalarValue::from_json(v, &data_type))
            .unwrap_or(ScalarValue::Null);
        if key.is_null() && !level.missing_bucket {
            continue;
        }
        let mut encoded = Vec::new();
        key.append_to_key(&mut encoded);
        let slot = *slots.entry(encoded).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(doc);
    }

    match level.order {
        None => {}
        Some(BucketOrder::KeyAsc) => groups.sort_by(|a, b| a.0.sort_cmp(&b.0)),
        Some(BucketOrder::KeyDesc) => groups.sort_by(|a, b| match (a.0.is_null(), b.0.is_null()) {
            (false, false) => b.0.sort_cmp(&a.0),
            _ => a.0.sort_cmp(&b.0),
        }),
        Some(BucketOrder::CountAsc) => groups.sort_by_key(|g| g.1.len()),
        Some(BucketOrder::CountDesc) => groups.sort_by(|a, b| b.1.len().cmp(&a.1.len())),
    }
    if let Some(size) = level.size {
        groups.truncate(size);
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut bucket = Bucket {
                key: key.to_json(),
                doc_count: members.len() as u64,
                ..Default::default()
            };
            if deeper.is_empty() {
                bucket.metrics = metrics(&members, metric_specs, schema)?;
            } else {
                bucket.buckets = buckets(&members, deeper, metric_specs, schema)?;
            }
            Ok(bucket)
        })
        .collect()
}

fn metrics(docs: &[&Document], specs: &[MetricSpec], schema: &Schema) -> PplResult<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for spec in specs {
        let input_type = spec
            .field
            .as_ref()
            .and_then(|f| field_type(schema, f))
            .unwrap_or(DataType::Null);
        let (func, output) = match spec.kind {
            MetricKind::Count => (AggregateFunction::Count, DataType::Int64),
            MetricKind::Sum if input_type == DataType::Float64 => (AggregateFunction::Sum, DataType::Float64),
            MetricKind::Sum => (AggregateFunction::Sum, DataType::Int64),
            MetricKind::Avg => (AggregateFunction::Avg, DataType::Float64),
            MetricKind::Min => (AggregateFunction::Min, input_type.clone()),
            MetricKind::Max => (AggregateFunction::Max, input_type.clone()),
        };
        let mut acc = Accumulator::new(func, &output);
        for doc in docs {
            let updated = match &spec.field {
                None => acc.update(None),
                Some(field) => {
                    let value = doc
                        .get(field)
                        .map(|v| ScalarValue::from_json(v, &input_type))
                        .unwrap_or(ScalarValue::Null);
                    acc.update(Some(&value))
                }
            };
            updated.map_err(|e| e.in_operator(NAME))?;
        }
        out.insert(spec.name.clone(), acc.finish().to_json());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::schema_from_pairs;
    use serde_json::json;

    fn backend() -> MemoryBackend {
        let schema = schema_from_pairs([
            ("host", DataType::Utf8),
            ("status", DataType::Int64),
            ("bytes", DataType::Float64),
        ]);
        MemoryBackend::new()
            .with_index(
                "logs",
                schema.as_ref().clone(),
                vec![
                    json!({"host": "a", "status": 500, "bytes": 10.0}),
                    json!({"host": "b", "status": 200, "bytes": 20.0}),
                    json!({"host": "a", "status": 500, "bytes": 30.0}),
                    json!({"host": "c", "status": 404}),
                    json!({"status": 500, "bytes": 5.5}),
                ],
            )
            .unwrap()
    }

    #[test]
    fn term_and_range_queries() {
        let backend = backend();
        let mut request = SearchRequest::new("logs");
        request.query = QueryDsl::Term {
            field: "status".into(),
            value: json!(500),
        };
        assert_eq!(backend.search(&request).unwrap().total, 3);

        request.query = QueryDsl::Range {
            field: "bytes".into(),
            gt: None,
            gte: Some(json!(10)),
            lt: Some(json!(30)),
            lte: None,
        };
        assert_eq!(backend.search(&request).unwrap().total, 2);
    }

    #[test]
    fn fields_read_with_declared_type() {
        let schema = schema_from_pairs([("host", DataType::Utf8), ("status", DataType::Int64)]);
        let backend = MemoryBackend::new()
            .with_index(
                "t",
                schema.as_ref().clone(),
                vec![
                    json!({"host": ["x", "a"], "status": [500, 200]}),
                    json!({"host": "a", "status": "oops"}),
                ],
            )
            .unwrap();
        let mut request = SearchRequest::new("t");

        // arrays contribute their first element only
        request.query = QueryDsl::Term {
            field: "host".into(),
            value: json!("a"),
        };
        assert_eq!(backend.search(&request).unwrap().total, 1);
        request.query = QueryDsl::Term {
            field: "status".into(),
            value: json!(200),
        };
        assert_eq!(backend.search(&request).unwrap().total, 0);

        // a string in an integer field reads as null
        request.query = QueryDsl::Exists {
            field: "status".into(),
        };
        assert_eq!(backend.search(&request).unwrap().total, 1);
    }

    #[test]
    fn exists_and_wildcard() {
        let backend = backend();
        let mut request = SearchRequest::new("logs");
        request.query = QueryDsl::not(QueryDsl::Exists { field: "host".into() });
        assert_eq!(backend.search(&request).unwrap().total, 1);

        request.query = QueryDsl::Wildcard {
            field: "host".into(),
            pattern: "?".into(),
        };
        assert_eq!(backend.search(&request).unwrap().total, 4);
    }

    #[test]
    fn cursor_pages_cover_window() {
        let backend = backend();
        let mut request = SearchRequest::new("logs");
        request.sort = vec![SortSpec {
            field: "bytes".into(),
            descending: true,
        }];
        request.from = 1;
        request.size = Some(3);
        request.page_size = 2;

        let first = backend.search(&request).unwrap();
        assert_eq!(first.hits.len(), 2);
        assert_eq!(first.hits[0]["bytes"], json!(20.0));
        let cursor = first.cursor.clone().unwrap();

        request.cursor = Some(cursor);
        let second = backend.search(&request).unwrap();
        assert_eq!(second.hits.len(), 1);
        assert_eq!(second.hits[0]["bytes"], json!(5.5));
        assert_eq!(second.cursor, None);
        assert_eq!(backend.request_count(), 2);
    }

    #[test]
    fn terms_aggregation_with_missing_bucket() {
        let backend = backend();
        let mut request = SearchRequest::new("logs");
        request.aggregation = Some(AggregationSpec {
            levels: vec![TermsLevel {
                field: "host".into(),
                missing_bucket: true,
                size: None,
                order: Some(BucketOrder::CountDesc),
            }],
            metrics: vec![
                MetricSpec {
                    name: "count".into(),
                    kind: MetricKind::Count,
                    field: None,
                },
                MetricSpec {
                    name: "total".into(),
                    kind: MetricKind::Sum,
                    field: Some("bytes".into()),
                },
            ],
        });
        let root = backend.search(&request).unwrap().aggregation.unwrap();
        let keys: Vec<Value> = root.buckets.iter().map(|b| b.key.clone()).collect();
        assert_eq!(keys, vec![json!("a"), json!("b"), json!("c"), Value::Null]);
        assert_eq!(root.buckets[0].metrics["total"], json!(40.0));
        assert_eq!(root.buckets[2].metrics["total"], Value::Null);
    }

    #[test]
    fn ungrouped_metrics_on_root() {
        let backend = backend();
        let mut request = SearchRequest::new("logs");
        request.query = QueryDsl::Term {
            field: "status".into(),
            value: json!(999),
        };
        request.aggregation = Some(AggregationSpec {
            levels: vec![],
            metrics: vec![MetricSpec {
                name: "c".into(),
                kind: MetricKind::Count,
                field: None,
            }],
        });
        let root = backend.search(&request).unwrap().aggregation.unwrap();
        assert_eq!(root.metrics["c"], json!(0));
    }

    #[test]
    fn nested_documents_are_flattened() {
        let backend = MemoryBackend::new();
        backend.create_index("users", Schema::empty());
        backend
            .insert("users", vec![json!({"user": {"name": "kim", "age": 3}})])
            .unwrap();
        let hits = backend.search(&SearchRequest::new("users")).unwrap().hits;
        assert_eq!(hits[0]["user.name"], json!("kim"));
        assert!(backend.insert("users", vec![json!(1)]).is_err());
        assert!(backend.search(&SearchRequest::new("nope")).is_err());
    }
}
