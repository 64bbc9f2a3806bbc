//! Rule 1: Constant Folding
//!
//! 상수 표현식을 컴파일 타임에 평가 (1 + 2 → 3)
//!
//! Folding uses the execution evaluator, so a folded literal is exactly
//! what the row-by-row evaluation would have produced.

use crate::error::PplResult;
use crate::ppl::ast::BinaryOp;
use crate::ppl::executor::expr::evaluate_constant;
use crate::ppl::planner::{Assignment, Expr, LogicalPlan};
use crate::value::ScalarValue;
use arrow::datatypes::Schema;

use super::OptimizationRule;

/// 상수 표현식을 컴파일 타임에 평가 (1 + 2 → 3)
pub struct ConstantFoldingRule;

impl OptimizationRule for ConstantFoldingRule {
    fn name(&self) -> &str {
        "ConstantFolding"
    }

    fn apply(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        self.fold(plan)
    }
}

impl ConstantFoldingRule {
    fn fold(&self, plan: LogicalPlan) -> PplResult<LogicalPlan> {
        let plan = plan.map_inputs(|input| self.fold(input))?;
        Ok(match plan {
            LogicalPlan::Filter { input, predicate } => {
                let predicate = fold_expr(predicate);
                // TRUE 조건은 필터 자체를 제거
                if is_true(&predicate) {
                    *input
                } else {
                    LogicalPlan::Filter { input, predicate }
                }
            }
            LogicalPlan::Scan {
                source,
                table_schema,
                columns,
                filter,
                statistics,
            } => LogicalPlan::Scan {
                source,
                table_schema,
                columns,
                filter: filter.map(fold_expr).filter(|f| !is_true(f)),
                statistics,
            },
            LogicalPlan::Eval { input, assignments } => LogicalPlan::Eval {
                input,
                assignments: assignments
                    .into_iter()
                    .map(|a| Assignment {
                        expr: fold_expr(a.expr),
                        ..a
                    })
                    .collect(),
            },
            LogicalPlan::Join {
                left,
                right,
                join_type,
                on,
                build_side,
            } => LogicalPlan::Join {
                left,
                right,
                join_type,
                on: fold_expr(on),
                build_side,
            },
            other => other,
        })
    }
}

fn is_true(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(ScalarValue::Boolean(true)))
}

fn is_false(expr: &Expr) -> bool {
    matches!(expr, Expr::Literal(ScalarValue::Boolean(false)))
}

/// Folds bottom-up; sub-expressions whose evaluation fails stay as written
/// so the error surfaces at execution time.
pub(crate) fn fold_expr(expr: Expr) -> Expr {
    let expr = match expr {
        Expr::Binary { op, left, right } => {
            let left = fold_expr(*left);
            let right = fold_expr(*right);
            match op {
                BinaryOp::And if is_true(&left) => return right,
                BinaryOp::And if is_true(&right) => return left,
                BinaryOp::Or if is_false(&left) => return right,
                BinaryOp::Or if is_false(&right) => return left,
                _ => Expr::binary(left, op, right),
            }
        }
        Expr::Unary { op, expr } => Expr::Unary {
            op,
            expr: Box::new(fold_expr(*expr)),
        },
        Expr::Function { func, args } => Expr::Function {
            func,
            args: args.into_iter().map(fold_expr).collect(),
        },
        leaf => return leaf,
    };

    if !expr.columns().is_empty() {
        return expr;
    }
    let declared = expr.data_type(&Schema::empty());
    match evaluate_constant(&expr) {
        Ok(ScalarValue::Float64(f)) if !f.is_finite() => expr,
        Ok(value) => Expr::Literal(value.cast_to(&declared)),
        Err(_) => expr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Expr {
        Expr::literal(ScalarValue::Int64(v))
    }

    #[test]
    fn folds_nested_arithmetic() {
        let expr = Expr::binary(
            Expr::column("a"),
            BinaryOp::Gt,
            Expr::binary(int(2), BinaryOp::Mul, int(3)),
        );
        assert_eq!(
            fold_expr(expr),
            Expr::binary(Expr::column("a"), BinaryOp::Gt, int(6))
        );
    }

    #[test]
    fn keeps_failing_expressions() {
        let expr = Expr::binary(int(1), BinaryOp::Div, int(0));
        assert_eq!(fold_expr(expr.clone()), expr);
        let inf = Expr::binary(
            Expr::literal(ScalarValue::Float64(1.0)),
            BinaryOp::Div,
            Expr::literal(ScalarValue::Float64(1e-320)),
        );
        assert_eq!(fold_expr(inf.clone()), inf);
    }

    #[test]
    fn promotes_to_declared_type() {
        let expr = Expr::Function {
            func: crate::ppl::analyzer::functions::ScalarFunction::Coalesce,
            args: vec![int(1), Expr::literal(ScalarValue::Float64(2.5))],
        };
        assert_eq!(fold_expr(expr), Expr::literal(ScalarValue::Float64(1.0)));
    }

    #[test]
    fn simplifies_boolean_identities() {
        let pred = Expr::binary(Expr::column("a"), BinaryOp::Eq, int(1));
        let expr = Expr::and(Expr::binary(int(1), BinaryOp::Lt, int(2)), pred.clone());
        assert_eq!(fold_expr(expr), pred);
    }
}
