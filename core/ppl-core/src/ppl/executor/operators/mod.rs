//! Physical Operators Module

mod filter;
mod hash_aggregate;
mod join;
mod limit;
mod parse;
mod physical_operator;
mod projection;
mod remote_scan;
mod sort;

#[cfg(test)]
mod operator_tests;

pub use filter::FilterOperator;
pub(crate) use hash_aggregate::Accumulator;
pub use hash_aggregate::{AggregateCall, HashAggregateOperator};
pub use join::{HashJoinOperator, NestedLoopJoinOperator};
pub use limit::LimitOperator;
pub use parse::ParseOperator;
pub use physical_operator::{Monitored, OperatorState, PhysicalOperator};
pub use projection::{EvalColumn, EvalOperator, ProjectionOperator};
pub use remote_scan::RemoteScanOperator;
pub use sort::{SortKey, SortOperator, compare_rows};
