//! Rule 6: Aggregation Pushdown
//!
//! 백엔드 버킷 집계로 변환 가능한 Aggregate를 표시

use crate::error::PplResult;
use crate::ppl::analyzer::functions::AggregateFunction;
use crate::ppl::planner::{AggregateExpr, LogicalPlan};

use super::OptimizationRule;

/// Marks Aggregates the backend can compute as bucket aggregations.
pub struct AggregationPushdownRule;

impl OptimizationRule for AggregationPushdownRule {
    fn name(&self) -> &str {
        "AggregationPushdown"
    }

    fn apply(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        let plan = plan.map_inputs(|input| self.apply(input))?;
        Ok(match plan {
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
                ..
            } => {
                let pushdown = scan_chain(&input) && aggregates.iter().all(metric_supported);
                LogicalPlan::Aggregate {
                    input,
                    group_by,
                    aggregates,
                    pushdown,
                }
            }
            other => other,
        })
    }
}

/// Metrics with an exact backend counterpart. Distinct counts are
/// approximate on search backends and always run locally.
pub fn backend_supports(func: AggregateFunction) -> bool {
    !matches!(func, AggregateFunction::DistinctCount)
}

fn metric_supported(aggregate: &AggregateExpr) -> bool {
    backend_supports(aggregate.func)
        && aggregate
            .arg
            .as_ref()
            .is_none_or(|arg| arg.as_column().is_some())
}

/// Only Scan and plain-column Projects between the Aggregate and the source.
fn scan_chain(plan: &LogicalPlan) -> bool {
    match plan {
        LogicalPlan::Scan { .. } => true,
        LogicalPlan::Project { input, items } => {
            items.iter().all(|item| !item.is_rename()) && scan_chain(input)
        }
        _ => false,
    }
}
