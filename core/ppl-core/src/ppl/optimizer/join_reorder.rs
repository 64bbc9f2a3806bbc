//! Rule 7: Join Reorder
//!
//! 통계가 있으면 더 작은 입력을 해시 빌드 측으로 선택

use crate::error::PplResult;
use crate::ppl::planner::cost::estimated_rows;
use crate::ppl::planner::{BuildSide, LogicalPlan};

use super::OptimizationRule;

/// Picks the smaller join input as the hash build side. Without estimates
/// for both inputs the current choice stands.
pub struct JoinReorderRule;

impl OptimizationRule for JoinReorderRule {
    fn name(&self) -> &str {
        "JoinReorder"
    }

    fn apply(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        let plan = plan.map_inputs(|input| self.apply(input))?;
        Ok(match plan {
            LogicalPlan::Join {
                left,
                right,
                join_type,
                on,
                build_side,
            } => {
                let build_side = match (estimated_rows(&left), estimated_rows(&right)) {
                    (Some(l), Some(r)) if l < r => BuildSide::Left,
                    (Some(_), Some(_)) => BuildSide::Right,
                    _ => build_side,
                };
                LogicalPlan::Join {
                    left,
                    right,
                    join_type,
                    on,
                    build_side,
                }
            }
            other => other,
        })
    }
}
