//! Physical Expression Evaluation
//!
//! Logical expressions are bound once against the input schema (column
//! names become positions) and then evaluated row by row. Nulls propagate
//! through every operator except the three-valued `AND` / `OR` and the
//! null-testing functions.

use crate::error::{PplError, PplResult};
use crate::ppl::analyzer::functions::ScalarFunction;
use crate::ppl::ast::{BinaryOp, UnaryOp};
use crate::ppl::planner::types::Expr;
use crate::value::ScalarValue;
use arrow::datatypes::Schema;
use regex::Regex;
use std::cmp::Ordering;

const OPERATOR: &str = "expression";

/// 바인딩된 표현식: 컬럼 이름 대신 위치를 참조
#[derive(Debug, Clone)]
pub enum PhysicalExpr {
    Column(usize),
    Literal(ScalarValue),
    Binary {
        op: BinaryOp,
        left: Box<PhysicalExpr>,
        right: Box<PhysicalExpr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<PhysicalExpr>,
    },
    Function {
        func: ScalarFunction,
        args: Vec<PhysicalExpr>,
    },
    /// `like` with a literal pattern, compiled once at bind time
    Like {
        expr: Box<PhysicalExpr>,
        regex: Regex,
    },
}

impl PhysicalExpr {
    /// Resolves column names against `schema`.
    pub fn bind(expr: &Expr, schema: &Schema) -> PplResult<PhysicalExpr> {
        Ok(match expr {
            Expr::Column(name) => {
                let index = schema.index_of(name).map_err(|_| {
                    PplError::Internal(format!("column `{name}` missing from operator input"))
                })?;
                PhysicalExpr::Column(index)
            }
            Expr::Literal(value) => PhysicalExpr::Literal(value.clone()),
            Expr::Binary { op, left, right } => PhysicalExpr::Binary {
                op: *op,
                left: Box::new(Self::bind(left, schema)?),
                right: Box::new(Self::bind(right, schema)?),
            },
            Expr::Unary { op, expr } => PhysicalExpr::Unary {
                op: *op,
                expr: Box::new(Self::bind(expr, schema)?),
            },
            Expr::Function { func, args } => {
                if *func == ScalarFunction::Like
                    && let [value, Expr::Literal(ScalarValue::Utf8(pattern))] = args.as_slice()
                {
                    return Ok(PhysicalExpr::Like {
                        expr: Box::new(Self::bind(value, schema)?),
                        regex: like_regex(pattern)?,
                    });
                }
                PhysicalExpr::Function {
                    func: *func,
                    args: args
                        .iter()
                        .map(|a| Self::bind(a, schema))
                        .collect::<PplResult<Vec<_>>>()?,
                }
            }
        })
    }

    /// Evaluates against one input row.
    pub fn evaluate(&self, row: &[ScalarValue]) -> PplResult<ScalarValue> {
        match self {
            PhysicalExpr::Column(index) => row.get(*index).cloned().ok_or_else(|| {
                PplError::Internal(format!(
                    "column index {index} out of range ({})",
                    row.len()
                ))
            }),
            PhysicalExpr::Literal(value) => Ok(value.clone()),
            PhysicalExpr::Binary { op, left, right } => {
                let l = left.evaluate(row)?;
                // AND / OR short-circuit on a decisive left operand
                match (op, &l) {
                    (BinaryOp::And, ScalarValue::Boolean(false)) => {
                        return Ok(ScalarValue::Boolean(false));
                    }
                    (BinaryOp::Or, ScalarValue::Boolean(true)) => {
                        return Ok(ScalarValue::Boolean(true));
                    }
                    _ => {}
                }
                let r = right.evaluate(row)?;
                evaluate_binary(*op, l, r)
            }
            PhysicalExpr::Unary { op, expr } => evaluate_unary(*op, expr.evaluate(row)?),
            PhysicalExpr::Function { func, args } => {
                let values = args
                    .iter()
                    .map(|a| a.evaluate(row))
                    .collect::<PplResult<Vec<_>>>()?;
                evaluate_function(*func, values)
            }
            PhysicalExpr::Like { expr, regex } => Ok(match expr.evaluate(row)? {
                ScalarValue::Utf8(s) => ScalarValue::Boolean(regex.is_match(&s)),
                _ => ScalarValue::Null,
            }),
        }
    }
}

/// Evaluates an expression that references no columns.
pub fn evaluate_constant(expr: &Expr) -> PplResult<ScalarValue> {
    PhysicalExpr::bind(expr, &Schema::empty())?.evaluate(&[])
}

/// Compiles a SQL `like` pattern (`%` any run, `_` one character).
pub fn like_regex(pattern: &str) -> PplResult<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            c => source.push_str(&regex::escape(&c.to_string())),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| PplError::execution(OPERATOR, format!("invalid like pattern: {e}")))
}

fn overflow(op: &str) -> PplError {
    PplError::execution(OPERATOR, format!("integer overflow in {op}"))
}

fn evaluate_binary(op: BinaryOp, l: ScalarValue, r: ScalarValue) -> PplResult<ScalarValue> {
    use ScalarValue::*;
    match op {
        BinaryOp::And => Ok(match (&l, &r) {
            (_, Boolean(false)) => Boolean(false),
            (Boolean(true), Boolean(true)) => Boolean(true),
            _ => Null,
        }),
        BinaryOp::Or => Ok(match (&l, &r) {
            (_, Boolean(true)) => Boolean(true),
            (Boolean(false), Boolean(false)) => Boolean(false),
            _ => Null,
        }),
        BinaryOp::Xor => Ok(match (l, r) {
            (Boolean(a), Boolean(b)) => Boolean(a != b),
            _ => Null,
        }),
        _ if l.is_null() || r.is_null() => Ok(Null),
        op if op.is_comparison() => {
            let ordering = l.partial_cmp_value(&r).ok_or_else(|| {
                PplError::execution(
                    OPERATOR,
                    format!("cannot compare {} with {}", l.data_type(), r.data_type()),
                )
            })?;
            Ok(Boolean(match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::NotEq => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::LtEq => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        op => arithmetic(op, l, r),
    }
}

fn arithmetic(op: BinaryOp, l: ScalarValue, r: ScalarValue) -> PplResult<ScalarValue> {
    use ScalarValue::*;
    if let (Int64(a), Int64(b)) = (&l, &r) {
        let (a, b) = (*a, *b);
        if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0 {
            return Err(PplError::execution(OPERATOR, "division by zero"));
        }
        let result = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div => a.checked_div(b),
            _ => a.checked_rem(b),
        };
        return result.map(Int64).ok_or_else(|| overflow(op.symbol()));
    }
    let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
        return Err(PplError::execution(
            OPERATOR,
            format!(
                "operator {op} expects numeric operands, got {} and {}",
                l.data_type(),
                r.data_type()
            ),
        ));
    };
    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b == 0.0 {
        return Err(PplError::execution(OPERATOR, "division by zero"));
    }
    Ok(Float64(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a % b,
    }))
}

fn evaluate_unary(op: UnaryOp, value: ScalarValue) -> PplResult<ScalarValue> {
    use ScalarValue::*;
    match (op, value) {
        (_, Null) => Ok(Null),
        (UnaryOp::Not, Boolean(b)) => Ok(Boolean(!b)),
        (UnaryOp::Neg, Int64(v)) => v.checked_neg().map(Int64).ok_or_else(|| overflow("negation")),
        (UnaryOp::Neg, Float64(v)) => Ok(Float64(-v)),
        (op, v) => Err(PplError::execution(
            OPERATOR,
            format!("operator {op:?} cannot be applied to {}", v.data_type()),
        )),
    }
}

fn to_int(value: f64, function: &str) -> PplResult<ScalarValue> {
    if value.is_finite() && value >= i64::MIN as f64 && value < i64::MAX as f64 {
        Ok(ScalarValue::Int64(value as i64))
    } else {
        Err(PplError::execution(
            OPERATOR,
            format!("{function}() result {value} does not fit an integer"),
        ))
    }
}

fn evaluate_function(func: ScalarFunction, args: Vec<ScalarValue>) -> PplResult<ScalarValue> {
    use ScalarValue::*;
    match func {
        ScalarFunction::IsNull => return Ok(Boolean(args[0].is_null())),
        ScalarFunction::IsNotNull => return Ok(Boolean(!args[0].is_null())),
        ScalarFunction::Coalesce => {
            return Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Null));
        }
        ScalarFunction::If => {
            let mut args = args.into_iter();
            let cond = args.next().unwrap_or(Null);
            let then = args.next().unwrap_or(Null);
            let otherwise = args.next().unwrap_or(Null);
            return Ok(if cond.is_true() { then } else { otherwise });
        }
        _ => {}
    }
    if args.iter().any(ScalarValue::is_null) {
        return Ok(Null);
    }

    let number = |i: usize| -> PplResult<f64> {
        args[i].as_f64().ok_or_else(|| {
            PplError::execution(OPERATOR, format!("{func}() expects a numeric argument"))
        })
    };
    let text = |i: usize| -> PplResult<&str> {
        args[i].as_str().ok_or_else(|| {
            PplError::execution(OPERATOR, format!("{func}() expects a string argument"))
        })
    };

    match func {
        ScalarFunction::Abs => match &args[0] {
            Int64(v) => v.checked_abs().map(Int64).ok_or_else(|| overflow("abs")),
            _ => Ok(Float64(number(0)?.abs())),
        },
        ScalarFunction::Ceil => match &args[0] {
            Int64(v) => Ok(Int64(*v)),
            _ => to_int(number(0)?.ceil(), "ceil"),
        },
        ScalarFunction::Floor => match &args[0] {
            Int64(v) => Ok(Int64(*v)),
            _ => to_int(number(0)?.floor(), "floor"),
        },
        ScalarFunction::Round => {
            let digits = if args.len() > 1 { number(1)? as i32 } else { 0 };
            let scale = 10f64.powi(digits);
            Ok(Float64((number(0)? * scale).round() / scale))
        }
        ScalarFunction::Sqrt => {
            let v = number(0)?;
            Ok(if v < 0.0 { Null } else { Float64(v.sqrt()) })
        }
        ScalarFunction::Pow => Ok(Float64(number(0)?.powf(number(1)?))),
        ScalarFunction::Lower => Ok(Utf8(text(0)?.to_lowercase())),
        ScalarFunction::Upper => Ok(Utf8(text(0)?.to_uppercase())),
        ScalarFunction::Trim => Ok(Utf8(text(0)?.trim().to_string())),
        ScalarFunction::Length => Ok(Int64(text(0)?.chars().count() as i64)),
        ScalarFunction::Concat => {
            let mut out = String::new();
            for i in 0..args.len() {
                out.push_str(text(i)?);
            }
            Ok(Utf8(out))
        }
        ScalarFunction::Substring => {
            // 1-based start; positions before the string clamp to its start
            let s = text(0)?;
            let start = match &args[1] {
                Int64(v) => (*v).max(1) as usize - 1,
                _ => 0,
            };
            let taken: String = match args.get(2) {
                Some(Int64(len)) => s.chars().skip(start).take((*len).max(0) as usize).collect(),
                _ => s.chars().skip(start).collect(),
            };
            Ok(Utf8(taken))
        }
        ScalarFunction::Like => {
            let regex = like_regex(text(1)?)?;
            Ok(Boolean(regex.is_match(text(0)?)))
        }
        ScalarFunction::IsNull
        | ScalarFunction::IsNotNull
        | ScalarFunction::Coalesce
        | ScalarFunction::If => Err(PplError::Internal(format!(
            "{func}() reached strict evaluation"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::schema_from_pairs;
    use arrow::datatypes::DataType;

    fn lit(v: ScalarValue) -> Expr {
        Expr::literal(v)
    }

    fn int(v: i64) -> Expr {
        lit(ScalarValue::Int64(v))
    }

    fn eval(expr: Expr) -> PplResult<ScalarValue> {
        evaluate_constant(&expr)
    }

    #[test]
    fn integer_arithmetic_is_checked() {
        assert_eq!(
            eval(Expr::binary(int(7), BinaryOp::Div, int(2))).unwrap(),
            ScalarValue::Int64(3)
        );
        assert!(eval(Expr::binary(int(1), BinaryOp::Div, int(0))).is_err());
        assert!(eval(Expr::binary(int(i64::MAX), BinaryOp::Add, int(1))).is_err());
        assert_eq!(
            eval(Expr::binary(int(1), BinaryOp::Add, lit(ScalarValue::Float64(0.5)))).unwrap(),
            ScalarValue::Float64(1.5)
        );
    }

    #[test]
    fn three_valued_logic() {
        let null = lit(ScalarValue::Null);
        let t = lit(ScalarValue::Boolean(true));
        let f = lit(ScalarValue::Boolean(false));
        assert_eq!(eval(Expr::and(null.clone(), f.clone())).unwrap(), ScalarValue::Boolean(false));
        assert_eq!(eval(Expr::and(null.clone(), t.clone())).unwrap(), ScalarValue::Null);
        assert_eq!(
            eval(Expr::binary(null.clone(), BinaryOp::Or, t)).unwrap(),
            ScalarValue::Boolean(true)
        );
        assert_eq!(eval(Expr::binary(null, BinaryOp::Or, f)).unwrap(), ScalarValue::Null);
    }

    #[test]
    fn comparisons_propagate_null() {
        assert_eq!(
            eval(Expr::binary(int(2), BinaryOp::Gt, lit(ScalarValue::Float64(1.5)))).unwrap(),
            ScalarValue::Boolean(true)
        );
        assert_eq!(
            eval(Expr::binary(lit(ScalarValue::Null), BinaryOp::Eq, int(1))).unwrap(),
            ScalarValue::Null
        );
    }

    #[test]
    fn scalar_functions() {
        let call = |func, args| Expr::Function { func, args };
        let s = |v: &str| lit(ScalarValue::Utf8(v.into()));
        assert_eq!(
            eval(call(ScalarFunction::Substring, vec![s("abcdef"), int(2), int(3)])).unwrap(),
            ScalarValue::Utf8("bcd".into())
        );
        assert_eq!(
            eval(call(ScalarFunction::Concat, vec![s("a"), s("b")])).unwrap(),
            ScalarValue::Utf8("ab".into())
        );
        assert_eq!(
            eval(call(ScalarFunction::Round, vec![lit(ScalarValue::Float64(2.456)), int(1)])).unwrap(),
            ScalarValue::Float64(2.5)
        );
        assert_eq!(
            eval(call(ScalarFunction::Coalesce, vec![lit(ScalarValue::Null), int(4)])).unwrap(),
            ScalarValue::Int64(4)
        );
        assert_eq!(
            eval(call(ScalarFunction::Length, vec![lit(ScalarValue::Null)])).unwrap(),
            ScalarValue::Null
        );
        assert_eq!(
            eval(call(ScalarFunction::Floor, vec![lit(ScalarValue::Float64(-1.5))])).unwrap(),
            ScalarValue::Int64(-2)
        );
    }

    #[test]
    fn like_binds_literal_pattern() {
        let schema = schema_from_pairs([("host", DataType::Utf8)]);
        let expr = Expr::Function {
            func: ScalarFunction::Like,
            args: vec![Expr::column("host"), lit(ScalarValue::Utf8("web-_1%".into()))],
        };
        let bound = PhysicalExpr::bind(&expr, &schema).unwrap();
        assert!(matches!(bound, PhysicalExpr::Like { .. }));
        let row = vec![ScalarValue::Utf8("web-a1.example".into())];
        assert_eq!(bound.evaluate(&row).unwrap(), ScalarValue::Boolean(true));
        let row = vec![ScalarValue::Utf8("db-a1".into())];
        assert_eq!(bound.evaluate(&row).unwrap(), ScalarValue::Boolean(false));
    }

    #[test]
    fn unknown_column_fails_to_bind() {
        let schema = schema_from_pairs([("a", DataType::Int64)]);
        assert!(PhysicalExpr::bind(&Expr::column("b"), &schema).is_err());
    }
}
