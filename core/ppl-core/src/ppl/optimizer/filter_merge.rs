//! Rule 2: Filter Merge
//!
//! 연속된 Filter를 하나의 AND 조건으로 병합

use crate::error::PplResult;
use crate::ppl::planner::{Expr, LogicalPlan};

use super::OptimizationRule;

/// Filter(Filter(x, a), b) → Filter(x, a AND b)
pub struct FilterMergeRule;

impl OptimizationRule for FilterMergeRule {
    fn name(&self) -> &str {
        "FilterMerge"
    }

    fn apply(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        let plan = plan.map_inputs(|input| self.apply(input))?;
        Ok(match plan {
            LogicalPlan::Filter { input, predicate } => match *input {
                LogicalPlan::Filter {
                    input: inner,
                    predicate: inner_predicate,
                } => LogicalPlan::Filter {
                    input: inner,
                    predicate: Expr::and(inner_predicate, predicate),
                },
                other => LogicalPlan::Filter {
                    input: Box::new(other),
                    predicate,
                },
            },
            other => other,
        })
    }
}
