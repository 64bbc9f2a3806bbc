//! PPL Query Executor Module
//!
//! Turns a [`PhysicalPlan`] into a tree of pull-based operators. Every
//! operator is wrapped in [`Monitored`], which checks the query deadline
//! before each pull and enforces the end-of-stream-after-error contract.

use crate::backend::SearchBackend;
use crate::error::{PplError, PplResult};
use crate::ppl::planner::{PhysicalPlan, types::Expr};
use arrow::datatypes::Schema;
use regex::Regex;
use std::sync::Arc;

pub mod context;
pub mod expr;
pub mod operators;

pub use context::{ExecutionContext, MemoryReservation, MemoryTracker};
pub use expr::PhysicalExpr;
pub(crate) use operators::Accumulator;
pub use operators::{
    AggregateCall, EvalColumn, EvalOperator, FilterOperator, HashAggregateOperator,
    HashJoinOperator, LimitOperator, Monitored, NestedLoopJoinOperator, OperatorState,
    ParseOperator, PhysicalOperator, ProjectionOperator, RemoteScanOperator, SortKey,
    SortOperator,
};

fn position(schema: &Schema, name: &str) -> PplResult<usize> {
    schema
        .index_of(name)
        .map_err(|_| PplError::Internal(format!("column `{name}` missing from operator input")))
}

fn bind(expr: &Expr, schema: &Schema) -> PplResult<PhysicalExpr> {
    PhysicalExpr::bind(expr, schema)
}

/// Builds the operator tree for `plan`.
pub fn build_operator(
    plan: &PhysicalPlan,
    ctx: &Arc<ExecutionContext>,
    backend: &Arc<dyn SearchBackend>,
) -> PplResult<Box<dyn PhysicalOperator>> {
    let op: Box<dyn PhysicalOperator> = match plan {
        PhysicalPlan::RemoteScan {
            request,
            output,
            schema,
            ..
        } => Box::new(RemoteScanOperator::new(
            Arc::clone(backend),
            Arc::clone(ctx),
            request.clone(),
            output.clone(),
            schema.clone(),
        )),

        PhysicalPlan::Filter { input, predicate } => {
            let input = build_operator(input, ctx, backend)?;
            let predicate = bind(predicate, input.schema())?;
            Box::new(FilterOperator::new(input, predicate))
        }

        PhysicalPlan::Project {
            input,
            items,
            schema,
        } => {
            let input = build_operator(input, ctx, backend)?;
            let indices = items
                .iter()
                .map(|item| position(input.schema(), &item.source))
                .collect::<PplResult<Vec<_>>>()?;
            Box::new(ProjectionOperator::new(input, indices, schema.clone()))
        }

        PhysicalPlan::Eval {
            input,
            assignments,
            schema,
        } => {
            let input = build_operator(input, ctx, backend)?;
            // bound against the output row: overwritten columns keep their
            // slot, new columns are appended in order
            let columns = assignments
                .iter()
                .map(|a| {
                    Ok(EvalColumn {
                        expr: bind(&a.expr, schema)?,
                        target: position(schema, &a.name)?,
                        data_type: a.data_type.clone(),
                    })
                })
                .collect::<PplResult<Vec<_>>>()?;
            Box::new(EvalOperator::new(input, columns, schema.clone()))
        }

        PhysicalPlan::Parse {
            input,
            field,
            pattern,
            outputs,
            schema,
        } => {
            let input = build_operator(input, ctx, backend)?;
            let source = position(input.schema(), field)?;
            let regex = Regex::new(pattern)
                .map_err(|e| PplError::Internal(format!("parse pattern failed to compile: {e}")))?;
            let outputs = outputs
                .iter()
                .map(|name| Ok((name.clone(), position(schema, name)?)))
                .collect::<PplResult<Vec<_>>>()?;
            Box::new(ParseOperator::new(input, source, regex, outputs, schema.clone()))
        }

        PhysicalPlan::HashAggregate {
            input,
            group_by,
            aggregates,
            schema,
        } => {
            let input = build_operator(input, ctx, backend)?;
            let group_by = group_by
                .iter()
                .map(|g| position(input.schema(), g))
                .collect::<PplResult<Vec<_>>>()?;
            let calls = aggregates
                .iter()
                .map(|a| {
                    Ok(AggregateCall {
                        func: a.func,
                        arg: a.arg.as_ref().map(|e| bind(e, input.schema())).transpose()?,
                        data_type: a.data_type.clone(),
                    })
                })
                .collect::<PplResult<Vec<_>>>()?;
            Box::new(HashAggregateOperator::new(
                input,
                group_by,
                calls,
                schema.clone(),
                ctx.max_groups(),
                ctx.reservation(),
            ))
        }

        PhysicalPlan::Sort { input, keys } => {
            let input = build_operator(input, ctx, backend)?;
            let keys = keys
                .iter()
                .map(|k| {
                    Ok(SortKey {
                        index: position(input.schema(), &k.column)?,
                        descending: k.descending,
                    })
                })
                .collect::<PplResult<Vec<_>>>()?;
            Box::new(SortOperator::new(input, keys, ctx.reservation()))
        }

        PhysicalPlan::Limit {
            input,
            count,
            offset,
        } => {
            let input = build_operator(input, ctx, backend)?;
            Box::new(LimitOperator::new(input, *count, *offset))
        }

        PhysicalPlan::HashJoin {
            left,
            right,
            join_type,
            left_keys,
            right_keys,
            residual,
            build,
            schema,
        } => {
            let left = build_operator(left, ctx, backend)?;
            let right = build_operator(right, ctx, backend)?;
            let left_keys = left_keys
                .iter()
                .map(|k| position(left.schema(), k))
                .collect::<PplResult<Vec<_>>>()?;
            let right_keys = right_keys
                .iter()
                .map(|k| position(right.schema(), k))
                .collect::<PplResult<Vec<_>>>()?;
            let residual = residual.as_ref().map(|e| bind(e, schema)).transpose()?;
            Box::new(HashJoinOperator::new(
                left,
                right,
                *join_type,
                left_keys,
                right_keys,
                residual,
                *build,
                schema.clone(),
                ctx.reservation(),
            ))
        }

        PhysicalPlan::NestedLoopJoin {
            left,
            right,
            join_type,
            condition,
            schema,
        } => {
            let left = build_operator(left, ctx, backend)?;
            let right = build_operator(right, ctx, backend)?;
            let condition = bind(condition, schema)?;
            Box::new(NestedLoopJoinOperator::new(
                left,
                right,
                *join_type,
                condition,
                schema.clone(),
                ctx.reservation(),
            ))
        }
    };
    Ok(Box::new(Monitored::new(op, Arc::clone(ctx))))
}
