//! Rule 3: Predicate Pushdown
//!
//! Filter를 Scan에 가까이 이동하여 I/O 감소
//!
//! Conjuncts travel down independently. A conjunct stops at the first node
//! it cannot legally cross and is re-attached there as a Filter.

use crate::error::PplResult;
use crate::ppl::planner::{Expr, LogicalPlan, conjunction, split_conjunction};
use ahash::AHashMap;
use std::collections::BTreeSet;

use super::OptimizationRule;

/// Filter를 Scan에 가까이 이동하여 I/O 감소
pub struct PredicatePushdownRule;

impl OptimizationRule for PredicatePushdownRule {
    fn name(&self) -> &str {
        "PredicatePushdown"
    }

    fn apply(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        self.push_down(plan, Vec::new())
    }
}

/// Places `kept` as a Filter directly above `plan`.
fn with_filter(plan: LogicalPlan, kept: Vec<Expr>) -> LogicalPlan {
    match conjunction(kept) {
        Some(predicate) => LogicalPlan::Filter {
            input: Box::new(plan),
            predicate,
        },
        None => plan,
    }
}

impl PredicatePushdownRule {
    /// Pushes `preds` (conjuncts that sit above `plan`) as deep as possible.
    fn push_down(&self, plan: LogicalPlan, preds: Vec<Expr>) -> PplResult<LogicalPlan> {
        match plan {
            LogicalPlan::Filter { input, predicate } => {
                let mut all = split_conjunction(predicate);
                all.extend(preds);
                self.push_down(*input, all)
            }
            LogicalPlan::Scan {
                source,
                table_schema,
                columns,
                filter,
                statistics,
            } => {
                let mut all = filter.map(split_conjunction).unwrap_or_default();
                all.extend(preds);
                Ok(LogicalPlan::Scan {
                    source,
                    table_schema,
                    columns,
                    filter: conjunction(all),
                    statistics,
                })
            }
            LogicalPlan::Sort { input, keys } => Ok(LogicalPlan::Sort {
                input: Box::new(self.push_down(*input, preds)?),
                keys,
            }),
            LogicalPlan::Project { input, items } => {
                let sources: AHashMap<&str, &str> = items
                    .iter()
                    .map(|i| (i.name.as_str(), i.source.as_str()))
                    .collect();
                let (pushed, kept): (Vec<Expr>, Vec<Expr>) = preds
                    .into_iter()
                    .partition(|p| p.columns().iter().all(|c| sources.contains_key(c.as_str())));
                let pushed: Vec<Expr> = pushed
                    .into_iter()
                    .map(|p| p.rename_columns(&|c| sources.get(c).map(|s| s.to_string())))
                    .collect();
                let input = self.push_down(*input, pushed)?;
                Ok(with_filter(
                    LogicalPlan::Project {
                        input: Box::new(input),
                        items,
                    },
                    kept,
                ))
            }
            LogicalPlan::Eval { input, assignments } => {
                let generated: BTreeSet<String> =
                    assignments.iter().map(|a| a.name.clone()).collect();
                let (pushed, kept) = partition_disjoint(preds, &generated);
                let input = self.push_down(*input, pushed)?;
                Ok(with_filter(
                    LogicalPlan::Eval {
                        input: Box::new(input),
                        assignments,
                    },
                    kept,
                ))
            }
            LogicalPlan::Parse {
                input,
                field,
                pattern,
                outputs,
            } => {
                let generated: BTreeSet<String> = outputs.iter().cloned().collect();
                let (pushed, kept) = partition_disjoint(preds, &generated);
                let input = self.push_down(*input, pushed)?;
                Ok(with_filter(
                    LogicalPlan::Parse {
                        input: Box::new(input),
                        field,
                        pattern,
                        outputs,
                    },
                    kept,
                ))
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
                pushdown,
            } => {
                // A predicate without columns filters the aggregate's output
                // rows; below an ungrouped aggregate it would still leave one row.
                let (pushed, kept): (Vec<Expr>, Vec<Expr>) = preds.into_iter().partition(|p| {
                    let columns = p.columns();
                    !columns.is_empty() && columns.iter().all(|c| group_by.contains(c))
                });
                let input = self.push_down(*input, pushed)?;
                Ok(with_filter(
                    LogicalPlan::Aggregate {
                        input: Box::new(input),
                        group_by,
                        aggregates,
                        pushdown,
                    },
                    kept,
                ))
            }
            LogicalPlan::Limit {
                input,
                count,
                offset,
            } => {
                // Filtering before a limit changes which rows survive it
                let input = self.push_down(*input, Vec::new())?;
                Ok(with_filter(
                    LogicalPlan::Limit {
                        input: Box::new(input),
                        count,
                        offset,
                    },
                    preds,
                ))
            }
            LogicalPlan::Join {
                left,
                right,
                join_type,
                on,
                build_side,
            } => {
                let left_columns: BTreeSet<String> = left
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.name().clone())
                    .collect();
                let right_columns: BTreeSet<String> = right
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.name().clone())
                    .collect();
                let (mut to_left, mut to_right, mut kept) = (Vec::new(), Vec::new(), Vec::new());
                for pred in preds {
                    let cols = pred.columns();
                    if !join_type.preserves_right() && cols.is_subset(&left_columns) {
                        to_left.push(pred);
                    } else if !join_type.preserves_left() && cols.is_subset(&right_columns) {
                        to_right.push(pred);
                    } else {
                        kept.push(pred);
                    }
                }
                let left = self.push_down(*left, to_left)?;
                let right = self.push_down(*right, to_right)?;
                Ok(with_filter(
                    LogicalPlan::Join {
                        left: Box::new(left),
                        right: Box::new(right),
                        join_type,
                        on,
                        build_side,
                    },
                    kept,
                ))
            }
        }
    }
}

/// Splits `preds` into those that avoid `generated` and those that do not.
fn partition_disjoint(preds: Vec<Expr>, generated: &BTreeSet<String>) -> (Vec<Expr>, Vec<Expr>) {
    preds
        .into_iter()
        .partition(|p| p.columns().is_disjoint(generated))
}
