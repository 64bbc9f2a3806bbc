//! Operator-level tests over in-memory inputs
//!
//! Each operator is driven directly through the pull interface, fed by a
//! `Values` source that hands out a fixed row list.

use super::*;
use crate::config::EngineConfig;
use crate::error::{PplError, PplResult};
use crate::ppl::analyzer::functions::{AggregateFunction, ScalarFunction};
use crate::ppl::ast::{BinaryOp, JoinType};
use crate::ppl::executor::context::ExecutionContext;
use crate::ppl::executor::expr::PhysicalExpr;
use crate::ppl::planner::types::{BuildSide, Expr};
use crate::schema::schema_from_pairs;
use crate::value::{Row, ScalarValue};
use arrow::datatypes::{DataType, SchemaRef};
use regex::Regex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Values {
    schema: SchemaRef,
    rows: std::vec::IntoIter<Row>,
    pulls: Arc<AtomicUsize>,
}

impl PhysicalOperator for Values {
    fn name(&self) -> &'static str {
        "Values"
    }
    fn schema(&self) -> &SchemaRef {
        &self.schema
    }
    fn next(&mut self) -> PplResult<Option<Row>> {
        self.pulls.fetch_add(1, Ordering::Relaxed);
        Ok(self.rows.next())
    }
}

fn values(schema: SchemaRef, rows: Vec<Row>) -> Box<dyn PhysicalOperator> {
    Box::new(Values {
        schema,
        rows: rows.into_iter(),
        pulls: Arc::new(AtomicUsize::new(0)),
    })
}

fn s(v: &str) -> ScalarValue {
    ScalarValue::Utf8(v.to_string())
}

fn i(v: i64) -> ScalarValue {
    ScalarValue::Int64(v)
}

fn drain(mut op: Box<dyn PhysicalOperator>) -> PplResult<Vec<Row>> {
    let mut rows = Vec::new();
    while let Some(row) = op.next()? {
        rows.push(row);
    }
    Ok(rows)
}

fn logs() -> (SchemaRef, Vec<Row>) {
    let schema = schema_from_pairs([("host", DataType::Utf8), ("status", DataType::Int64)]);
    let rows = vec![
        vec![s("a"), i(500)],
        vec![s("b"), i(200)],
        vec![s("a"), i(500)],
        vec![s("c"), i(500)],
        vec![s("b"), ScalarValue::Null],
    ];
    (schema, rows)
}

fn ctx() -> Arc<ExecutionContext> {
    Arc::new(ExecutionContext::new(&EngineConfig::default()))
}

#[test]
fn test_filter_drops_null_and_false() {
    let (schema, rows) = logs();
    let predicate = PhysicalExpr::bind(
        &Expr::binary(Expr::column("status"), BinaryOp::Eq, Expr::literal(i(500))),
        &schema,
    )
    .unwrap();
    let out = drain(Box::new(FilterOperator::new(values(schema, rows), predicate))).unwrap();
    assert_eq!(out.len(), 3);
}

#[test]
fn test_filter_error_names_operator() {
    let (schema, rows) = logs();
    let predicate = PhysicalExpr::bind(
        &Expr::binary(
            Expr::binary(Expr::column("status"), BinaryOp::Div, Expr::literal(i(0))),
            BinaryOp::Gt,
            Expr::literal(i(1)),
        ),
        &schema,
    )
    .unwrap();
    let err = drain(Box::new(FilterOperator::new(values(schema, rows), predicate))).unwrap_err();
    assert!(matches!(err, PplError::Execution { ref operator, .. } if operator == "Filter"));
}

#[test]
fn test_limit_stops_pulling() {
    let (schema, rows) = logs();
    let pulls = Arc::new(AtomicUsize::new(0));
    let input = Box::new(Values {
        schema,
        rows: rows.into_iter(),
        pulls: Arc::clone(&pulls),
    });
    let out = drain(Box::new(LimitOperator::new(input, 2, 1))).unwrap();
    assert_eq!(out, vec![vec![s("b"), i(200)], vec![s("a"), i(500)]]);
    assert_eq!(pulls.load(Ordering::Relaxed), 3);
}

#[test]
fn test_sort_desc_nulls_last_and_stable() {
    let (schema, rows) = logs();
    let keys = vec![SortKey {
        index: 1,
        descending: true,
    }];
    let out = drain(Box::new(SortOperator::new(
        values(schema, rows),
        keys,
        ctx().reservation(),
    )))
    .unwrap();
    let hosts: Vec<ScalarValue> = out.iter().map(|r| r[0].clone()).collect();
    assert_eq!(hosts, vec![s("a"), s("a"), s("c"), s("b"), s("b")]);
    assert_eq!(out[4][1], ScalarValue::Null);
}

#[test]
fn test_sort_respects_memory_limit() {
    let (schema, rows) = logs();
    let ctx = Arc::new(ExecutionContext::new(&EngineConfig::default().with_memory_limit(64)));
    let keys = vec![SortKey {
        index: 0,
        descending: false,
    }];
    let err = drain(Box::new(SortOperator::new(values(schema, rows), keys, ctx.reservation())))
        .unwrap_err();
    assert!(matches!(err, PplError::MemoryLimit { .. }));
}

#[test]
fn test_hash_aggregate_counts_by_key() {
    let (schema, rows) = logs();
    let out_schema = schema_from_pairs([("host", DataType::Utf8), ("count", DataType::Int64)]);
    let op = HashAggregateOperator::new(
        values(schema, rows),
        vec![0],
        vec![AggregateCall {
            func: AggregateFunction::Count,
            arg: None,
            data_type: DataType::Int64,
        }],
        out_schema,
        100,
        ctx().reservation(),
    );
    let out = drain(Box::new(op)).unwrap();
    assert_eq!(
        out,
        vec![vec![s("a"), i(2)], vec![s("b"), i(2)], vec![s("c"), i(1)]]
    );
}

#[test]
fn test_ungrouped_aggregate_on_empty_input() {
    let schema = schema_from_pairs([("status", DataType::Int64)]);
    let out_schema = schema_from_pairs([("c", DataType::Int64), ("total", DataType::Int64)]);
    let arg = PhysicalExpr::bind(&Expr::column("status"), &schema).unwrap();
    let op = HashAggregateOperator::new(
        values(schema, vec![]),
        vec![],
        vec![
            AggregateCall {
                func: AggregateFunction::Count,
                arg: None,
                data_type: DataType::Int64,
            },
            AggregateCall {
                func: AggregateFunction::Sum,
                arg: Some(arg),
                data_type: DataType::Int64,
            },
        ],
        out_schema,
        100,
        ctx().reservation(),
    );
    assert_eq!(drain(Box::new(op)).unwrap(), vec![vec![i(0), ScalarValue::Null]]);
}

#[test]
fn test_too_many_groups() {
    let (schema, rows) = logs();
    let out_schema = schema_from_pairs([("host", DataType::Utf8), ("count", DataType::Int64)]);
    let op = HashAggregateOperator::new(
        values(schema, rows),
        vec![0],
        vec![AggregateCall {
            func: AggregateFunction::Count,
            arg: None,
            data_type: DataType::Int64,
        }],
        out_schema,
        2,
        ctx().reservation(),
    );
    assert!(matches!(
        drain(Box::new(op)),
        Err(PplError::TooManyGroups { limit: 2 })
    ));
}

#[test]
fn test_eval_overwrites_and_appends() {
    let (schema, rows) = logs();
    let out_schema = schema_from_pairs([
        ("host", DataType::Utf8),
        ("status", DataType::Int64),
        ("ratio", DataType::Float64),
    ]);
    let columns = vec![
        EvalColumn {
            expr: PhysicalExpr::bind(
                &Expr::binary(Expr::column("status"), BinaryOp::Add, Expr::literal(i(1))),
                &out_schema,
            )
            .unwrap(),
            target: 1,
            data_type: DataType::Int64,
        },
        EvalColumn {
            expr: PhysicalExpr::bind(&Expr::column("status"), &out_schema).unwrap(),
            target: 2,
            data_type: DataType::Float64,
        },
    ];
    let out = drain(Box::new(EvalOperator::new(
        values(schema, rows),
        columns,
        out_schema,
    )))
    .unwrap();
    assert_eq!(out[0], vec![s("a"), i(501), ScalarValue::Float64(501.0)]);
    assert_eq!(out[4], vec![s("b"), ScalarValue::Null, ScalarValue::Null]);
}

#[test]
fn test_parse_extracts_groups() {
    let schema = schema_from_pairs([("message", DataType::Utf8)]);
    let out_schema = schema_from_pairs([
        ("message", DataType::Utf8),
        ("user", DataType::Utf8),
    ]);
    let rows = vec![
        vec![s("login user=alice")],
        vec![s("logout")],
        vec![ScalarValue::Null],
    ];
    let op = ParseOperator::new(
        values(schema, rows),
        0,
        Regex::new(r"user=(?P<user>\w+)").unwrap(),
        vec![("user".to_string(), 1)],
        out_schema,
    );
    let out = drain(Box::new(op)).unwrap();
    assert_eq!(out[0][1], s("alice"));
    assert_eq!(out[1][1], s(""));
    assert_eq!(out[2][1], ScalarValue::Null);
}

fn join_inputs() -> (Box<dyn PhysicalOperator>, Box<dyn PhysicalOperator>, SchemaRef) {
    let left_schema = schema_from_pairs([("user_id", DataType::Int64), ("action", DataType::Utf8)]);
    let right_schema = schema_from_pairs([("id", DataType::Int64), ("team", DataType::Utf8)]);
    let out = schema_from_pairs([
        ("user_id", DataType::Int64),
        ("action", DataType::Utf8),
        ("id", DataType::Int64),
        ("team", DataType::Utf8),
    ]);
    let left = values(
        left_schema,
        vec![
            vec![i(1), s("login")],
            vec![i(2), s("view")],
            vec![i(1), s("logout")],
            vec![ScalarValue::Null, s("orphan")],
        ],
    );
    let right = values(
        right_schema,
        vec![vec![i(1), s("red")], vec![i(3), s("blue")]],
    );
    (left, right, out)
}

#[test]
fn test_hash_join_inner_cardinality() {
    for build in [BuildSide::Left, BuildSide::Right] {
        let (left, right, schema) = join_inputs();
        let op = HashJoinOperator::new(
            left,
            right,
            JoinType::Inner,
            vec![0],
            vec![0],
            None,
            build,
            schema,
            ctx().reservation(),
        );
        let out = drain(Box::new(op)).unwrap();
        assert_eq!(out.len(), 2, "build side {build:?}");
        assert!(out.iter().all(|r| r[0] == r[2] && r[3] == s("red")));
    }
}

#[test]
fn test_hash_join_full_outer() {
    let (left, right, schema) = join_inputs();
    let op = HashJoinOperator::new(
        left,
        right,
        JoinType::Full,
        vec![0],
        vec![0],
        None,
        BuildSide::Right,
        schema,
        ctx().reservation(),
    );
    let out = drain(Box::new(op)).unwrap();
    // 2 matches, 2 unmatched left (user 2, null key), 1 unmatched right (id 3)
    assert_eq!(out.len(), 5);
    assert_eq!(
        out.last().unwrap(),
        &vec![ScalarValue::Null, ScalarValue::Null, i(3), s("blue")]
    );
}

#[test]
fn test_hash_join_residual() {
    let (left, right, schema) = join_inputs();
    let residual = PhysicalExpr::bind(
        &Expr::binary(Expr::column("action"), BinaryOp::Eq, Expr::literal(s("login"))),
        &schema,
    )
    .unwrap();
    let op = HashJoinOperator::new(
        left,
        right,
        JoinType::Left,
        vec![0],
        vec![0],
        Some(residual),
        BuildSide::Right,
        schema,
        ctx().reservation(),
    );
    let out = drain(Box::new(op)).unwrap();
    assert_eq!(out.len(), 4);
    assert_eq!(out[0][3], s("red"));
    assert_eq!(out[2][3], ScalarValue::Null);
}

#[test]
fn test_nested_loop_join_range_condition() {
    let (left, right, schema) = join_inputs();
    let condition = PhysicalExpr::bind(
        &Expr::binary(Expr::column("user_id"), BinaryOp::Lt, Expr::column("id")),
        &schema,
    )
    .unwrap();
    let op = NestedLoopJoinOperator::new(
        left,
        right,
        JoinType::Right,
        condition,
        schema,
        ctx().reservation(),
    );
    let out = drain(Box::new(op)).unwrap();
    // 1<3, 2<3, 1<3; id 1 never matched and is emitted with null left columns
    assert_eq!(out.len(), 4);
    assert_eq!(out[3], vec![ScalarValue::Null, ScalarValue::Null, i(1), s("red")]);
}

#[test]
fn test_monitored_tree_reports_error_once() {
    let (schema, rows) = logs();
    let ctx = ctx();
    let predicate = PhysicalExpr::bind(
        &Expr::Function {
            func: ScalarFunction::IsNull,
            args: vec![Expr::column("status")],
        },
        &schema,
    )
    .unwrap();
    let filter = Box::new(FilterOperator::new(values(schema, rows), predicate));
    let mut op = Monitored::new(filter, Arc::clone(&ctx));
    assert!(op.next().unwrap().is_some());
    ctx.cancel();
    assert!(matches!(op.next(), Err(PplError::Timeout { .. })));
    assert_eq!(op.state(), OperatorState::Exhausted);
    assert!(op.next().unwrap().is_none());
}
