//! Cardinality and cost estimates for logical plans.
//!
//! Estimates drive join build-side selection and are reported by explain.
//! They never affect results.

use super::types::{Expr, LogicalPlan, split_conjunction};
use crate::ppl::ast::BinaryOp;
use serde::Serialize;

/// Row count assumed for sources without statistics when costing.
pub const DEFAULT_CARDINALITY: f64 = 100_000.0;

const SEQ_READ_COST: f64 = 0.001;
const HASH_TABLE_COST: f64 = 0.002;
const COMPARISON_COST: f64 = 0.0001;
const AGGREGATION_COST: f64 = 0.005;
const TRANSFER_COST: f64 = 0.001;

/// Relative weights of the cost components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostModel {
    pub cpu_weight: f64,
    pub io_weight: f64,
    pub network_weight: f64,
    pub memory_weight: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            cpu_weight: 1.0,
            io_weight: 5.0,
            network_weight: 10.0,
            memory_weight: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Cost {
    pub cpu: f64,
    pub io: f64,
    pub network: f64,
    pub memory: f64,
}

impl Cost {
    pub fn total(&self, model: &CostModel) -> f64 {
        self.cpu * model.cpu_weight
            + self.io * model.io_weight
            + self.network * model.network_weight
            + self.memory * model.memory_weight
    }

    fn add(self, other: Cost) -> Cost {
        Cost {
            cpu: self.cpu + other.cpu,
            io: self.io + other.io,
            network: self.network + other.network,
            memory: self.memory + other.memory,
        }
    }
}

/// Fraction of rows a predicate is expected to keep.
pub fn selectivity(expr: &Expr) -> f64 {
    match expr {
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => selectivity(left) * selectivity(right),
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => (selectivity(left) + selectivity(right)).min(1.0),
        Expr::Binary { op: BinaryOp::Eq, .. } => 0.1,
        Expr::Binary {
            op: BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq,
            ..
        } => 0.33,
        Expr::Literal(v) if v.is_true() => 1.0,
        _ => 0.5,
    }
}

/// Estimated output rows; `None` when a source lacks statistics.
pub fn estimated_rows(plan: &LogicalPlan) -> Option<f64> {
    match plan {
        LogicalPlan::Scan {
            statistics, filter, ..
        } => {
            let rows = statistics.as_ref()?.row_count as f64;
            Some(match filter {
                Some(f) => rows * selectivity(f),
                None => rows,
            })
        }
        LogicalPlan::Filter { input, predicate } => {
            Some(estimated_rows(input)? * selectivity(predicate))
        }
        LogicalPlan::Project { input, .. }
        | LogicalPlan::Eval { input, .. }
        | LogicalPlan::Parse { input, .. }
        | LogicalPlan::Sort { input, .. } => estimated_rows(input),
        LogicalPlan::Aggregate {
            input, group_by, ..
        } => {
            if group_by.is_empty() {
                Some(1.0)
            } else {
                Some((estimated_rows(input)? / 10.0).max(1.0))
            }
        }
        LogicalPlan::Limit {
            input,
            count,
            offset,
        } => {
            let rows = estimated_rows(input).unwrap_or(f64::INFINITY);
            Some((rows - *offset as f64).max(0.0).min(*count as f64))
        }
        LogicalPlan::Join { left, right, .. } => {
            Some(estimated_rows(left)?.max(estimated_rows(right)?))
        }
    }
}

/// Cumulative cost of producing every row of `plan`.
pub fn estimate_cost(plan: &LogicalPlan) -> Cost {
    let rows_of = |p: &LogicalPlan| estimated_rows(p).unwrap_or(DEFAULT_CARDINALITY);
    let children = plan
        .inputs()
        .into_iter()
        .map(estimate_cost)
        .fold(Cost::default(), Cost::add);

    let own = match plan {
        LogicalPlan::Scan { filter, .. } => {
            let out = rows_of(plan);
            let read = match filter {
                Some(f) => out / selectivity(f).max(f64::EPSILON),
                None => out,
            };
            Cost {
                io: read * SEQ_READ_COST,
                network: out * TRANSFER_COST,
                ..Default::default()
            }
        }
        LogicalPlan::Filter { input, predicate } => Cost {
            cpu: rows_of(input) * COMPARISON_COST * split_conjunction(predicate.clone()).len() as f64,
            ..Default::default()
        },
        LogicalPlan::Project { input, .. }
        | LogicalPlan::Eval { input, .. }
        | LogicalPlan::Parse { input, .. } => Cost {
            cpu: rows_of(input) * COMPARISON_COST,
            ..Default::default()
        },
        LogicalPlan::Aggregate { input, .. } => Cost {
            cpu: rows_of(input) * AGGREGATION_COST,
            memory: rows_of(plan) * HASH_TABLE_COST,
            ..Default::default()
        },
        LogicalPlan::Sort { input, .. } => {
            let n = rows_of(input).max(1.0);
            Cost {
                cpu: n * n.log2().max(1.0) * COMPARISON_COST,
                memory: n * HASH_TABLE_COST,
                ..Default::default()
            }
        }
        LogicalPlan::Limit { .. } => Cost::default(),
        LogicalPlan::Join { left, right, .. } => {
            let (l, r) = (rows_of(left), rows_of(right));
            Cost {
                cpu: (l + r) * HASH_TABLE_COST,
                memory: l.min(r) * HASH_TABLE_COST,
                ..Default::default()
            }
        }
    };
    children.add(own)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Statistics, schema_from_pairs};
    use crate::value::ScalarValue;
    use arrow::datatypes::DataType;

    fn scan(rows: Option<u64>) -> LogicalPlan {
        LogicalPlan::Scan {
            source: "t".into(),
            table_schema: schema_from_pairs([("a", DataType::Int64)]),
            columns: None,
            filter: None,
            statistics: rows.map(Statistics::new),
        }
    }

    fn eq(v: i64) -> Expr {
        Expr::binary(Expr::column("a"), BinaryOp::Eq, Expr::literal(ScalarValue::Int64(v)))
    }

    #[test]
    fn selectivity_combines() {
        assert!((selectivity(&Expr::and(eq(1), eq(2))) - 0.01).abs() < 1e-9);
        let or = Expr::binary(eq(1), BinaryOp::Or, eq(2));
        assert!((selectivity(&or) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn rows_flow_through_operators() {
        let plan = LogicalPlan::Limit {
            input: Box::new(LogicalPlan::Filter {
                input: Box::new(scan(Some(1_000))),
                predicate: eq(1),
            }),
            count: 30,
            offset: 0,
        };
        assert_eq!(estimated_rows(&plan), Some(30.0));
        assert_eq!(estimated_rows(&scan(None)), None);
    }

    #[test]
    fn cost_grows_with_input() {
        let model = CostModel::default();
        let small = estimate_cost(&scan(Some(10))).total(&model);
        let large = estimate_cost(&scan(Some(10_000))).total(&model);
        assert!(large > small);
    }
}
