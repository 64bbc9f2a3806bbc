// PPL 모듈 진입점
pub mod analyzer;
pub mod ast;
pub mod executor;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod planner;

#[cfg(test)]
mod parser_tests;

use crate::error::PplResult;

pub use analyzer::{AnalyzedQuery, SourceRef, TypedCommand, analyze};
pub use analyzer::functions::{AggregateFunction, FunctionRegistry, ScalarFunction};
pub use executor::{ExecutionContext, PhysicalOperator, build_operator};
pub use optimizer::{OptimizationRule, QueryOptimizer};
pub use parser::{DEFAULT_HEAD_SIZE, Parser};
pub use planner::{
    LogicalPlan, LogicalPlanner, PhysicalPlan, PhysicalPlanner, PushdownDecision,
};

/// Tokenizes and parses `text` with the default `head` size.
pub fn parse_query(text: &str) -> PplResult<ast::Query> {
    parser::parse(lexer::tokenize(text)?)
}
