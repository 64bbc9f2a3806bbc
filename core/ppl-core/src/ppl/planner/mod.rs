//! PPL 플래너 모듈
//!
//! LogicalPlan을 만들고, 비용을 추정하고, 백엔드 요청과 로컬 연산자로
//! 나뉜 PhysicalPlan으로 낮춥니다.

pub mod cost;
pub mod logical;
pub mod physical;
mod translate;
pub mod types;

// Re-export main types
pub use cost::{Cost, CostModel};
pub use logical::LogicalPlanner;
pub use physical::{
    COMMAND_PUSHDOWN, PhysicalPlan, PhysicalPlanner, Placement, PushdownDecision, RemoteOutput,
};
pub use translate::PushDownError;
pub use types::*;
