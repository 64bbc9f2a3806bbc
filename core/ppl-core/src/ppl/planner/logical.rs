//! Logical Planner: AnalyzedQuery → LogicalPlan 변환
//!
//! A purely structural mapping; every name and type was settled by the
//! analyzer.

use super::types::{AggregateExpr, BuildSide, LogicalPlan, ProjectItem, SortExpr};
use crate::ppl::analyzer::functions::AggregateFunction;
use crate::ppl::analyzer::{AnalyzedQuery, SourceRef, TypedCommand};
use arrow::datatypes::DataType;

/// Builds the unoptimized plan for an analyzed query.
pub struct LogicalPlanner;

impl LogicalPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, query: &AnalyzedQuery) -> LogicalPlan {
        let mut plan = scan(&query.source);
        for command in &query.commands {
            plan = self.apply(plan, command);
        }
        plan
    }

    fn apply(&self, input: LogicalPlan, command: &TypedCommand) -> LogicalPlan {
        let input = Box::new(input);
        match command {
            TypedCommand::Filter(predicate) => LogicalPlan::Filter {
                input,
                predicate: predicate.clone(),
            },
            TypedCommand::Project(items) => LogicalPlan::Project {
                input,
                items: items.clone(),
            },
            TypedCommand::Eval(assignments) => LogicalPlan::Eval {
                input,
                assignments: assignments.clone(),
            },
            TypedCommand::Parse {
                field,
                pattern,
                outputs,
            } => LogicalPlan::Parse {
                input,
                field: field.clone(),
                pattern: pattern.clone(),
                outputs: outputs.clone(),
            },
            TypedCommand::Stats {
                group_by,
                aggregates,
            } => LogicalPlan::Aggregate {
                input,
                group_by: group_by.clone(),
                aggregates: aggregates.clone(),
                pushdown: false,
            },
            TypedCommand::Sort(keys) => LogicalPlan::Sort {
                input,
                keys: keys.clone(),
            },
            TypedCommand::Limit { count, offset } => LogicalPlan::Limit {
                input,
                count: *count,
                offset: *offset,
            },
            TypedCommand::Top { count, fields } => {
                // top N f ⇒ stats count() by f | sort - count | head N
                let aggregate = LogicalPlan::Aggregate {
                    input,
                    group_by: fields.clone(),
                    aggregates: vec![AggregateExpr {
                        func: AggregateFunction::Count,
                        arg: None,
                        name: "count".to_string(),
                        data_type: DataType::Int64,
                    }],
                    pushdown: false,
                };
                let sorted = LogicalPlan::Sort {
                    input: Box::new(aggregate),
                    keys: vec![SortExpr {
                        column: "count".to_string(),
                        descending: true,
                    }],
                };
                LogicalPlan::Limit {
                    input: Box::new(sorted),
                    count: *count,
                    offset: 0,
                }
            }
            TypedCommand::Join {
                join_type,
                right,
                right_items,
                on,
            } => {
                let right_plan = match right_items {
                    Some(items) => LogicalPlan::Project {
                        input: Box::new(scan(right)),
                        items: items.iter().map(ProjectItem::clone).collect(),
                    },
                    None => scan(right),
                };
                LogicalPlan::Join {
                    left: input,
                    right: Box::new(right_plan),
                    join_type: *join_type,
                    on: on.clone(),
                    build_side: BuildSide::Right,
                }
            }
        }
    }
}

impl Default for LogicalPlanner {
    fn default() -> Self {
        Self::new()
    }
}

fn scan(source: &SourceRef) -> LogicalPlan {
    LogicalPlan::Scan {
        source: source.name.clone(),
        table_schema: source.schema.clone(),
        columns: None,
        filter: None,
        statistics: source.statistics,
    }
}
