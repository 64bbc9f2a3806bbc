//! Rule 4: Limit Pushdown
//!
//! LIMIT을 row-preserving 연산자(Project, Eval, Parse) 아래로 이동하고
//! 연속된 LIMIT을 병합

use crate::error::PplResult;
use crate::ppl::planner::LogicalPlan;

use super::OptimizationRule;

/// LIMIT을 가능한 한 아래로 이동
pub struct LimitPushdownRule;

impl OptimizationRule for LimitPushdownRule {
    fn name(&self) -> &str {
        "LimitPushdown"
    }

    fn apply(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        self.push_down(plan)
    }
}

impl LimitPushdownRule {
    fn push_down(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        let plan = plan.map_inputs(|input| self.push_down(input))?;
        let LogicalPlan::Limit {
            input,
            count,
            offset,
        } = plan
        else {
            return Ok(plan);
        };
        match *input {
            // Limit(c1, o1) over Limit(c2, o2) keeps rows o2+o1 .. o2+min(c2, o1+c1)
            LogicalPlan::Limit {
                input: inner,
                count: inner_count,
                offset: inner_offset,
            } => Ok(LogicalPlan::Limit {
                input: inner,
                count: count.min(inner_count.saturating_sub(offset)),
                offset: inner_offset + offset,
            }),
            // One-row-in, one-row-out operators commute with the limit
            row_preserving @ (LogicalPlan::Project { .. }
            | LogicalPlan::Eval { .. }
            | LogicalPlan::Parse { .. }) => row_preserving.map_inputs(|child| {
                self.push_down(LogicalPlan::Limit {
                    input: Box::new(child),
                    count,
                    offset,
                })
            }),
            other => Ok(LogicalPlan::Limit {
                input: Box::new(other),
                count,
                offset,
            }),
        }
    }
}
