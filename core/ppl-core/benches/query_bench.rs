// PPL 쿼리 성능 벤치마크
//
// Section 1: 컴파일 (lex → physical plan, 캐시 미사용)
// Section 2: 실행 (push-down 사용 vs 로컬 실행)

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use ppl_core::{EngineConfig, MemoryBackend, PushdownConfig, QueryEngine};

use arrow::datatypes::{DataType, Field, Schema};
use serde_json::json;
use std::sync::Arc;

const QUERIES: &[(&str, &str)] = &[
    ("filter", "source=logs | where status = 500 and bytes > 100 | fields host, bytes"),
    ("stats", "source=logs | where status >= 400 | stats count(), avg(bytes) by host"),
    ("sort_head", "source=logs | sort - bytes | head 20"),
    ("eval_sort", "source=logs | eval kb = bytes / 1024 | sort - kb, host | head 50"),
];

fn backend(rows: usize) -> Arc<MemoryBackend> {
    let schema = Schema::new(vec![
        Field::new("host", DataType::Utf8, true),
        Field::new("status", DataType::Int64, true),
        Field::new("bytes", DataType::Float64, true),
    ]);
    let statuses = [200, 301, 404, 500, 503];
    let docs = (0..rows)
        .map(|i| {
            json!({
                "host": format!("host-{}", i % 64),
                "status": statuses[i % statuses.len()],
                "bytes": (i * 37 % 10_000) as f64,
            })
        })
        .collect::<Vec<_>>();
    Arc::new(MemoryBackend::new().with_index("logs", schema, docs).unwrap())
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 1: 컴파일 벤치마크
// ═══════════════════════════════════════════════════════════════════════════

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let backend = backend(10);
    let engine = QueryEngine::new(
        backend.clone(),
        backend,
        EngineConfig::default().with_plan_cache_size(0),
    )
    .unwrap();

    for (name, text) in QUERIES {
        group.bench_function(*name, |b| b.iter(|| engine.compile(black_box(text)).unwrap()));
    }
    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 2: 실행 벤치마크
// ═══════════════════════════════════════════════════════════════════════════

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_10k");
    let backend = backend(10_000);
    let pushed = QueryEngine::new(backend.clone(), backend.clone(), EngineConfig::default()).unwrap();
    let local = QueryEngine::new(
        backend.clone(),
        backend,
        EngineConfig::default().with_pushdown(PushdownConfig::disabled()),
    )
    .unwrap();

    for (name, text) in QUERIES {
        group.bench_function(format!("{name}_pushdown"), |b| {
            b.iter(|| pushed.execute(black_box(text)).unwrap().collect_result().unwrap())
        });
        group.bench_function(format!("{name}_local"), |b| {
            b.iter(|| local.execute(black_box(text)).unwrap().collect_result().unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_execute);
criterion_main!(benches);
