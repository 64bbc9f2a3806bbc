//! PPL 쿼리 옵티마이저: 규칙 기반 최적화
//!
//! LogicalPlan을 고정점에 도달할 때까지 반복적으로 재작성합니다.
//! Rule order: ConstantFolding, FilterMerge, PredicatePushdown,
//! LimitPushdown, ProjectionPushdown, AggregationPushdown, JoinReorder.
//! Every rule is idempotent; reaching the pass cap is not an error.

mod aggregation_pushdown;
mod constant_folding;
mod filter_merge;
mod join_reorder;
mod limit_pushdown;
mod predicate_pushdown;
mod projection_pushdown;


use crate::error::PplResult;
use crate::ppl::planner::LogicalPlan;

pub use aggregation_pushdown::AggregationPushdownRule;
pub use constant_folding::ConstantFoldingRule;
pub use filter_merge::FilterMergeRule;
pub use join_reorder::JoinReorderRule;
pub use limit_pushdown::LimitPushdownRule;
pub use predicate_pushdown::PredicatePushdownRule;
pub use projection_pushdown::ProjectionPushdownRule;

/// Default fixed-point iteration cap.
pub const DEFAULT_MAX_PASSES: usize = 10;

/// 최적화 규칙 트레이트
pub trait OptimizationRule: Send + Sync {
    /// 규칙 이름
    fn name(&self) -> &str;

    /// LogicalPlan에 규칙 적용
    fn apply(&self, plan: LogicalPlan) -> PplResult<LogicalPlan>;
}

/// 쿼리 옵티마이저
pub struct QueryOptimizer {
    rules: Vec<Box<dyn OptimizationRule>>,
    max_passes: usize,
}

impl QueryOptimizer {
    /// 기본 최적화 규칙으로 생성
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(ConstantFoldingRule),
                Box::new(FilterMergeRule),
                Box::new(PredicatePushdownRule),
                Box::new(LimitPushdownRule),
                Box::new(ProjectionPushdownRule),
                Box::new(AggregationPushdownRule),
                Box::new(JoinReorderRule),
            ],
            max_passes: DEFAULT_MAX_PASSES,
        }
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// 고정점까지 모든 규칙 적용
    pub fn optimize(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        let mut current = plan;
        for pass in 1..=self.max_passes {
            let before = current.clone();
            for rule in &self.rules {
                current = rule.apply(current)?;
            }
            if current == before {
                tracing::debug!(passes = pass, "optimizer reached fixed point");
                return Ok(current);
            }
        }
        tracing::debug!(
            passes = self.max_passes,
            "optimizer stopped at pass limit"
        );
        Ok(current)
    }
}

impl Default for QueryOptimizer {
    fn default() -> Self {
        Self::new()
    }
}
