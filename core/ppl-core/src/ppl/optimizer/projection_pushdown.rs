//! Rule 5: Projection Pushdown
//!
//! 필요한 컬럼만 Scan에서 읽도록 컬럼 목록을 하향 전파
//!
//! Required columns are computed top-down starting from the root schema.
//! Nodes bind columns by name, so pruning below a node never changes the
//! columns it reads; Eval and Parse keep the input columns they overwrite so
//! the relative order of surviving columns is unchanged.

use crate::error::PplResult;
use crate::ppl::planner::LogicalPlan;
use std::collections::BTreeSet;

use super::OptimizationRule;

/// 필요한 컬럼만 Scan에서 읽도록 컬럼 목록을 하향 전파
pub struct ProjectionPushdownRule;

impl OptimizationRule for ProjectionPushdownRule {
    fn name(&self) -> &str {
        "ProjectionPushdown"
    }

    fn apply(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        let required: BTreeSet<String> = plan
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        self.prune(plan, required)
    }
}

fn output_names(plan: &LogicalPlan) -> BTreeSet<String> {
    plan.schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

impl ProjectionPushdownRule {
    fn prune(&self, plan: LogicalPlan, mut required: BTreeSet<String>) -> PplResult<LogicalPlan> {
        match plan {
            LogicalPlan::Scan {
                source,
                table_schema,
                filter,
                statistics,
                ..
            } => {
                if let Some(filter) = &filter {
                    required.extend(filter.columns());
                }
                let columns = table_schema
                    .fields()
                    .iter()
                    .map(|f| f.name())
                    .filter(|name| required.contains(*name))
                    .cloned()
                    .collect();
                Ok(LogicalPlan::Scan {
                    source,
                    table_schema,
                    columns: Some(columns),
                    filter,
                    statistics,
                })
            }
            LogicalPlan::Filter { input, predicate } => {
                required.extend(predicate.columns());
                Ok(LogicalPlan::Filter {
                    input: Box::new(self.prune(*input, required)?),
                    predicate,
                })
            }
            LogicalPlan::Sort { input, keys } => {
                required.extend(keys.iter().map(|k| k.column.clone()));
                Ok(LogicalPlan::Sort {
                    input: Box::new(self.prune(*input, required)?),
                    keys,
                })
            }
            LogicalPlan::Limit {
                input,
                count,
                offset,
            } => Ok(LogicalPlan::Limit {
                input: Box::new(self.prune(*input, required)?),
                count,
                offset,
            }),
            LogicalPlan::Project { input, items } => {
                let items: Vec<_> = items
                    .into_iter()
                    .filter(|item| required.contains(&item.name))
                    .collect();
                let needed = items.iter().map(|item| item.source.clone()).collect();
                Ok(LogicalPlan::Project {
                    input: Box::new(self.prune(*input, needed)?),
                    items,
                })
            }
            LogicalPlan::Eval { input, assignments } => {
                let input_names = output_names(&input);
                let mut need = required;
                let mut kept = Vec::with_capacity(assignments.len());
                for assignment in assignments.into_iter().rev() {
                    if !need.contains(&assignment.name) {
                        continue;
                    }
                    if !input_names.contains(&assignment.name) {
                        need.remove(&assignment.name);
                    }
                    need.extend(assignment.expr.columns());
                    kept.push(assignment);
                }
                kept.reverse();
                let input = self.prune(*input, need)?;
                if kept.is_empty() {
                    return Ok(input);
                }
                Ok(LogicalPlan::Eval {
                    input: Box::new(input),
                    assignments: kept,
                })
            }
            LogicalPlan::Parse {
                input,
                field,
                pattern,
                outputs,
            } => {
                if !outputs.iter().any(|o| required.contains(o)) {
                    return self.prune(*input, required);
                }
                let input_names = output_names(&input);
                for output in &outputs {
                    if !input_names.contains(output) {
                        required.remove(output);
                    }
                }
                required.insert(field.clone());
                Ok(LogicalPlan::Parse {
                    input: Box::new(self.prune(*input, required)?),
                    field,
                    pattern,
                    outputs,
                })
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
                pushdown,
            } => {
                let mut need: BTreeSet<String> = group_by.iter().cloned().collect();
                for aggregate in &aggregates {
                    if let Some(arg) = &aggregate.arg {
                        need.extend(arg.columns());
                    }
                }
                Ok(LogicalPlan::Aggregate {
                    input: Box::new(self.prune(*input, need)?),
                    group_by,
                    aggregates,
                    pushdown,
                })
            }
            LogicalPlan::Join {
                left,
                right,
                join_type,
                on,
                build_side,
            } => {
                required.extend(on.columns());
                let left_names = output_names(&left);
                let right_names = output_names(&right);
                let left_need = required.intersection(&left_names).cloned().collect();
                let right_need = required.intersection(&right_names).cloned().collect();
                Ok(LogicalPlan::Join {
                    left: Box::new(self.prune(*left, left_need)?),
                    right: Box::new(self.prune(*right, right_need)?),
                    join_type,
                    on,
                    build_side,
                })
            }
        }
    }
}
