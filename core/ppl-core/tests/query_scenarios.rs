// End-to-end query scenarios
//
// 전체 파이프라인(lex → execute)을 인메모리 백엔드 위에서 검증

use ppl_core::backend::QueryDsl;
use ppl_core::{
    EngineConfig, MemoryBackend, PplError, PushdownConfig, QueryEngine, QueryResult, ScalarValue,
};

use arrow::datatypes::{DataType, Field, Fields, Schema};
use serde_json::json;
use std::sync::Arc;

// ─── Helpers ────────────────────────────────────────────

fn backend() -> MemoryBackend {
    let logs = Schema::new(vec![
        Field::new("host", DataType::Utf8, true),
        Field::new("status", DataType::Int64, true),
        Field::new("bytes", DataType::Float64, true),
        Field::new("message", DataType::Utf8, true),
        Field::new(
            "user",
            DataType::Struct(Fields::from(vec![Field::new("name", DataType::Utf8, true)])),
            true,
        ),
    ]);
    let users = Schema::new(vec![
        Field::new("host", DataType::Utf8, true),
        Field::new("team", DataType::Utf8, true),
    ]);
    MemoryBackend::new()
        .with_index(
            "logs",
            logs,
            vec![
                json!({"host": "a", "status": 500, "bytes": 100.0, "message": "GET /index", "user": {"name": "kim"}}),
                json!({"host": "b", "status": 200, "bytes": 250.0, "message": "POST /login"}),
                json!({"host": "a", "status": 500, "bytes": 50.0, "user": {"name": "lee"}}),
                json!({"host": "c", "status": 404, "bytes": 10.0}),
                json!({"status": 500, "bytes": 75.0}),
            ],
        )
        .unwrap()
        .with_index(
            "users",
            users,
            vec![
                json!({"host": "a", "team": "x"}),
                json!({"host": "a", "team": "y"}),
                json!({"host": "b", "team": "z"}),
                json!({"host": "d", "team": "w"}),
            ],
        )
        .unwrap()
        .with_index(
            "tags",
            Schema::new(vec![
                Field::new("host", DataType::Utf8, true),
                Field::new("status", DataType::Int64, true),
            ]),
            vec![
                json!({"host": ["x", "a"], "status": [200, 500]}),
                json!({"host": "a", "status": 500}),
                json!({"host": "b", "status": "n/a"}),
                json!({"host": [], "status": 404}),
            ],
        )
        .unwrap()
}

fn engine(config: EngineConfig) -> (QueryEngine, Arc<MemoryBackend>) {
    let backend = Arc::new(backend());
    let engine = QueryEngine::new(backend.clone(), backend.clone(), config).unwrap();
    (engine, backend)
}

fn run(engine: &QueryEngine, text: &str) -> QueryResult {
    engine
        .execute(text)
        .unwrap_or_else(|e| panic!("{text}: {e}"))
        .collect_result()
        .unwrap_or_else(|e| panic!("{text}: {e}"))
}

fn utf8(s: &str) -> ScalarValue {
    ScalarValue::Utf8(s.to_string())
}

// ─── Scenarios ──────────────────────────────────────────

#[test]
fn test_filtered_count_by_host() {
    let (engine, backend) = engine(EngineConfig::default());
    let result = run(&engine, "source=logs | where status=500 | stats count() by host");

    let names: Vec<&str> = result.schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, vec!["host", "count"]);
    assert_eq!(
        result.rows,
        vec![
            vec![utf8("a"), ScalarValue::Int64(2)],
            vec![ScalarValue::Null, ScalarValue::Int64(1)],
        ]
    );

    // one request carrying both the filter and the bucket aggregation
    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].aggregation.is_some());
    assert_eq!(
        requests[0].query,
        QueryDsl::Term {
            field: "status".into(),
            value: json!(500)
        }
    );
}

#[test]
fn test_sort_desc_head() {
    let (engine, backend) = engine(EngineConfig::default());
    let result = run(&engine, "source=logs | sort status DESC | head 2 | fields host, status");
    assert_eq!(
        result.rows,
        vec![
            vec![utf8("a"), ScalarValue::Int64(500)],
            vec![utf8("a"), ScalarValue::Int64(500)],
        ]
    );
    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].size, Some(2));
    assert!(requests[0].sort[0].descending);
}

#[test]
fn test_unknown_field_never_reaches_backend() {
    let (engine, backend) = engine(EngineConfig::default());
    let err = engine.execute("source=logs | where nope = 1").err().unwrap();
    match &err {
        PplError::Semantic { message, .. } => assert!(message.contains("nope"), "{message}"),
        other => panic!("expected semantic error, got {other:?}"),
    }
    assert!(err.is_compile_error());
    assert_eq!(backend.request_count(), 0);
}

#[test]
fn test_syntax_errors_are_terminal() {
    let (engine, backend) = engine(EngineConfig::default());
    assert!(matches!(engine.execute("source=logs | where"), Err(PplError::Parse { .. })));
    assert!(matches!(engine.execute("source=logs | where a ~ 1"), Err(PplError::Lex { .. })));
    assert_eq!(backend.request_count(), 0);
}

#[test]
fn test_inner_and_left_join_cardinality() {
    let (engine, _) = engine(EngineConfig::default());
    // a matches two users twice, b matches once
    let inner = run(&engine, "source=logs | join users as u on logs.host = u.host");
    assert_eq!(inner.len(), 5);
    let team = inner.column("team").unwrap();
    assert!(team.iter().all(|t| !t.is_null()));

    // unmatched c and the host-less document are padded
    let left = run(&engine, "source=logs | left join users as u on logs.host = u.host");
    assert_eq!(left.len(), 7);
    let nulls = left.column("team").unwrap().iter().filter(|t| t.is_null()).count();
    assert_eq!(nulls, 2);

    // d has no log lines
    let right = run(&engine, "source=logs | right join users as u on logs.host = u.host");
    assert_eq!(right.len(), 6);
}

#[test]
fn test_non_equi_join_uses_nested_loop() {
    let (engine, _) = engine(EngineConfig::default());
    let explain = engine
        .explain("source=logs | join users as u on logs.host < u.host")
        .unwrap();
    assert!(explain.physical.contains("NestedLoopJoin"), "{}", explain.physical);
    // each `a` row pairs with b and d; then b < d and c < d
    let result = run(&engine, "source=logs | join users as u on logs.host < u.host");
    assert_eq!(result.len(), 2 * 2 + 1 + 1);
}

#[test]
fn test_top_counts() {
    let (engine, _) = engine(EngineConfig::default());
    let result = run(&engine, "source=logs | top 2 host");
    assert_eq!(result.rows[0], vec![utf8("a"), ScalarValue::Int64(2)]);
    assert_eq!(result.len(), 2);
}

#[test]
fn test_parse_and_nested_fields() {
    let (engine, _) = engine(EngineConfig::default());
    let result = run(
        &engine,
        r#"source=logs | parse message "(?<verb>\w+) (?<path>\S+)" | fields verb, path, user.name | head 1"#,
    );
    assert_eq!(result.rows, vec![vec![utf8("GET"), utf8("/index"), utf8("kim")]]);
}

#[test]
fn test_rename_and_stats_metrics() {
    let (engine, _) = engine(EngineConfig::default());
    let result = run(
        &engine,
        "source=logs | rename host as server | stats sum(bytes) as total, avg(status) by server",
    );
    let totals = result.column("total").unwrap();
    assert_eq!(totals[0], ScalarValue::Float64(150.0));
    let names: Vec<&str> = result.schema.fields().iter().map(|f| f.name().as_str()).collect();
    assert_eq!(names, vec!["server", "total", "avg(status)"]);
}

#[test]
fn test_distinct_count_runs_locally() {
    let (engine, _) = engine(EngineConfig::default());
    let explain = engine.explain("source=logs | stats dc(host)").unwrap();
    assert!(explain.local_operators().contains(&"Aggregate"));
    let result = run(&engine, "source=logs | stats dc(host)");
    assert_eq!(result.rows, vec![vec![ScalarValue::Int64(3)]]);
}

#[test]
fn test_pushdown_prefix_invariant() {
    let (engine, _) = engine(EngineConfig::default());
    for text in [
        "source=logs | where status = 500 | eval kb = bytes / 1000 | sort kb | head 1",
        "source=logs | where upper(host) = 'A' and status > 100 | fields host",
        "source=logs | sort bytes | head 3 | stats count()",
        "source=logs | fields host, bytes | where bytes > 20 | head 2",
    ] {
        let explain = engine.explain(text).unwrap();
        let first_local = explain
            .decisions
            .iter()
            .position(|d| !d.pushed)
            .unwrap_or(explain.decisions.len());
        assert!(
            explain.decisions[first_local..].iter().all(|d| !d.pushed),
            "{text}: {:?}",
            explain.decisions
        );
    }
}

#[test]
fn test_disabled_pushdown_gives_same_rows() {
    let (pushed, _) = engine(EngineConfig::default());
    let (local, local_backend) = engine(EngineConfig::default().with_pushdown(PushdownConfig::disabled()));
    for text in [
        "source=logs | where status=500 | stats count() by host",
        "source=logs | sort status DESC | head 2 | fields host, status",
        "source=logs | where host != 'a' | fields host, bytes",
        "source=logs | where isnull(host) or bytes >= 100 | sort - bytes",
        "source=logs | stats min(bytes), max(bytes), sum(status) by status | sort status",
        "source=logs | head 3 from 1",
    ] {
        assert_eq!(run(&pushed, text).rows, run(&local, text).rows, "{text}");
    }
    // nothing but plain scans reached the backend
    assert!(
        local_backend
            .requests()
            .iter()
            .all(|r| r.query == QueryDsl::MatchAll && r.aggregation.is_none() && r.sort.is_empty())
    );
}

#[test]
fn test_results_convert_to_json_and_arrow() {
    let (engine, _) = engine(EngineConfig::default());
    let result = run(&engine, "source=logs | where status = 404 | fields host, bytes");
    assert_eq!(result.to_json_rows(), vec![json!({"host": "c", "bytes": 10.0})]);
    let batch = result.to_record_batch().unwrap();
    assert_eq!(batch.num_rows(), 1);
    assert!(result.pretty().unwrap().contains("bytes"));
}

#[test]
fn test_small_pages_are_followed() {
    let (engine, backend) = engine(EngineConfig::default().with_page_size(2));
    let result = run(&engine, "source=logs | fields host");
    assert_eq!(result.len(), 5);
    assert_eq!(backend.request_count(), 3);
}

#[test]
fn test_constant_filter_after_ungrouped_stats() {
    let (pushed, _) = engine(EngineConfig::default());
    let (local, _) = engine(EngineConfig::default().with_pushdown(PushdownConfig::disabled()));
    for engine in [&pushed, &local] {
        assert!(run(engine, "source=logs | stats count() | where false").is_empty());
        assert!(run(engine, "source=logs | stats count() | where 1 = 2").is_empty());
        assert_eq!(
            run(engine, "source=logs | stats count() | where 1 = 1").rows,
            vec![vec![ScalarValue::Int64(5)]]
        );
    }
}

#[test]
fn test_array_and_mistyped_fields_read_alike_remote_and_local() {
    let (pushed, _) = engine(EngineConfig::default());
    let (local, _) = engine(EngineConfig::default().with_pushdown(PushdownConfig::disabled()));
    for text in [
        "source=tags | where host = 'a' | fields host, status",
        "source=tags | where host = 'x' | fields host",
        "source=tags | where status = 500 | fields host",
        "source=tags | where status >= 200 | fields host",
        "source=tags | where isnull(status) | fields host",
        "source=tags | where isnotnull(host) | sort host | fields host",
        "source=tags | where like(host, 'a%') | fields host",
    ] {
        assert_eq!(run(&pushed, text).rows, run(&local, text).rows, "{text}");
    }

    // arrays read as their first element
    let rows = run(&pushed, "source=tags | where host = 'a' | fields host").rows;
    assert_eq!(rows, vec![vec![utf8("a")]]);
    let rows = run(&pushed, "source=tags | where isnull(status) | fields host").rows;
    assert_eq!(rows, vec![vec![utf8("b")]]);
}

#[test]
fn test_division_by_zero_aborts_query() {
    let (engine, _) = engine(EngineConfig::default());
    let err = engine
        .execute("source=logs | eval x = status / 0")
        .unwrap()
        .collect_result()
        .unwrap_err();
    match &err {
        PplError::Execution { cause, .. } => assert!(cause.contains("division by zero"), "{cause}"),
        other => panic!("expected execution error, got {other:?}"),
    }
    assert!(!err.is_resource_limit());

    // the constant expression survives compilation unfolded
    let explain = engine.explain("source=logs | eval x = 1 / 0").unwrap();
    assert!(explain.logical.contains("1 / 0"), "{}", explain.logical);
}
