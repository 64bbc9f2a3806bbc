//! Predicate → backend boolean query translation.
//!
//! Only shapes with an exact backend counterpart translate; anything else
//! is reported as a [`PushDownError`] and the caller keeps the predicate
//! local.

use crate::backend::QueryDsl;
use crate::ppl::analyzer::functions::ScalarFunction;
use crate::ppl::ast::{BinaryOp, UnaryOp};
use crate::ppl::planner::types::Expr;
use crate::value::ScalarValue;
use serde_json::Value;
use std::fmt;

/// Why a logical fragment could not be expressed in the backend DSL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushDownError {
    pub reason: String,
}

impl PushDownError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for PushDownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reason)
    }
}

impl std::error::Error for PushDownError {}

type TranslateResult = Result<QueryDsl, PushDownError>;

/// Translates a whole predicate.
pub fn translate_predicate(expr: &Expr) -> TranslateResult {
    match expr {
        Expr::Literal(ScalarValue::Boolean(true)) => Ok(QueryDsl::MatchAll),
        Expr::Literal(ScalarValue::Boolean(false)) => Ok(QueryDsl::not(QueryDsl::MatchAll)),
        Expr::Column(name) => Ok(QueryDsl::Term {
            field: name.clone(),
            value: Value::Bool(true),
        }),
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => Ok(translate_predicate(left)?.and(translate_predicate(right)?)),
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => {
            let mut clauses = Vec::new();
            for side in [left, right] {
                match translate_predicate(side)? {
                    QueryDsl::Bool {
                        must,
                        should,
                        must_not,
                    } if must.is_empty() && must_not.is_empty() => clauses.extend(should),
                    other => clauses.push(other),
                }
            }
            Ok(QueryDsl::should(clauses))
        }
        Expr::Binary { op, left, right } if op.is_comparison() => comparison(*op, left, right),
        Expr::Unary {
            op: UnaryOp::Not,
            expr,
        } => negation(expr),
        Expr::Function { func, args } => function(*func, args),
        other => Err(PushDownError::new(format!("`{other}` has no backend query form"))),
    }
}

/// `column op literal` (either order); the literal must be non-null.
fn comparison(op: BinaryOp, left: &Expr, right: &Expr) -> TranslateResult {
    let (field, value, op) = match (left, right) {
        (Expr::Column(field), Expr::Literal(value)) => (field, value, op),
        (Expr::Literal(value), Expr::Column(field)) => (field, value, op.flip()),
        (Expr::Column(_), Expr::Column(_)) => {
            return Err(PushDownError::new("field-to-field comparison"));
        }
        _ => {
            return Err(PushDownError::new(format!(
                "comparison `{left} {op} {right}` is not column against literal"
            )));
        }
    };
    if value.is_null() {
        return Err(PushDownError::new("comparison with a null literal"));
    }
    let value = value.to_json();
    if value.is_null() {
        return Err(PushDownError::new("non-finite literal"));
    }
    let field = field.clone();
    let range = |gt, gte, lt, lte| QueryDsl::Range {
        field: field.clone(),
        gt,
        gte,
        lt,
        lte,
    };
    Ok(match op {
        BinaryOp::Eq => QueryDsl::Term {
            field: field.clone(),
            value,
        },
        BinaryOp::NotEq => QueryDsl::exists_and_not(
            &field,
            QueryDsl::Term {
                field: field.clone(),
                value,
            },
        ),
        BinaryOp::Gt => range(Some(value), None, None, None),
        BinaryOp::GtEq => range(None, Some(value), None, None),
        BinaryOp::Lt => range(None, None, Some(value), None),
        BinaryOp::LtEq => range(None, None, None, Some(value)),
        other => return Err(PushDownError::new(format!("operator {other} is not a comparison"))),
    })
}

fn negation(inner: &Expr) -> TranslateResult {
    match inner {
        Expr::Binary { op, left, right } if op.is_comparison() => {
            let positive = comparison(*op, left, right)?;
            let field = left
                .as_column()
                .or_else(|| right.as_column())
                .ok_or_else(|| PushDownError::new("negated comparison without a column"))?;
            Ok(QueryDsl::exists_and_not(field, positive))
        }
        Expr::Function {
            func: ScalarFunction::IsNull,
            args,
        } => exists(args),
        Expr::Function {
            func: ScalarFunction::IsNotNull,
            args,
        } => Ok(QueryDsl::not(exists(args)?)),
        other => Err(PushDownError::new(format!("negation of `{other}`"))),
    }
}

fn exists(args: &[Expr]) -> TranslateResult {
    match args {
        [Expr::Column(field)] => Ok(QueryDsl::Exists {
            field: field.clone(),
        }),
        _ => Err(PushDownError::new("null test on a computed value")),
    }
}

fn function(func: ScalarFunction, args: &[Expr]) -> TranslateResult {
    match func {
        ScalarFunction::IsNull => Ok(QueryDsl::not(exists(args)?)),
        ScalarFunction::IsNotNull => exists(args),
        ScalarFunction::Like => match args {
            [Expr::Column(field), Expr::Literal(ScalarValue::Utf8(pattern))] => {
                if pattern.contains(['*', '?']) {
                    return Err(PushDownError::new("like pattern contains wildcard metacharacters"));
                }
                let pattern = pattern.replace('%', "*").replace('_', "?");
                Ok(QueryDsl::Wildcard {
                    field: field.clone(),
                    pattern,
                })
            }
            _ => Err(PushDownError::new("like() needs a column and a literal pattern")),
        },
        other => Err(PushDownError::new(format!("function {other}() runs locally"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(name: &str) -> Expr {
        Expr::column(name)
    }

    fn int(v: i64) -> Expr {
        Expr::literal(ScalarValue::Int64(v))
    }

    #[test]
    fn equality_and_range() {
        let expr = Expr::and(
            Expr::binary(col("status"), BinaryOp::Eq, int(500)),
            Expr::binary(int(100), BinaryOp::Lt, col("bytes")),
        );
        let dsl = translate_predicate(&expr).unwrap();
        assert_eq!(
            serde_json::to_value(&dsl).unwrap(),
            json!({"bool": {"must": [
                {"term": {"field": "status", "value": 500}},
                {"range": {"field": "bytes", "gt": 100}}
            ]}})
        );
    }

    #[test]
    fn not_equal_requires_existence() {
        let dsl = translate_predicate(&Expr::binary(col("host"), BinaryOp::NotEq, Expr::literal(ScalarValue::Utf8("a".into())))).unwrap();
        assert_eq!(
            dsl,
            QueryDsl::exists_and_not(
                "host",
                QueryDsl::Term {
                    field: "host".into(),
                    value: json!("a")
                }
            )
        );
    }

    #[test]
    fn or_becomes_should() {
        let expr = Expr::binary(
            Expr::binary(col("a"), BinaryOp::Eq, int(1)),
            BinaryOp::Or,
            Expr::binary(
                Expr::binary(col("a"), BinaryOp::Eq, int(2)),
                BinaryOp::Or,
                Expr::binary(col("a"), BinaryOp::Eq, int(3)),
            ),
        );
        let QueryDsl::Bool { should, .. } = translate_predicate(&expr).unwrap() else {
            panic!("expected bool query");
        };
        assert_eq!(should.len(), 3);
    }

    #[test]
    fn null_tests() {
        let isnull = Expr::Function {
            func: ScalarFunction::IsNull,
            args: vec![col("user")],
        };
        assert_eq!(
            translate_predicate(&isnull).unwrap(),
            QueryDsl::not(QueryDsl::Exists { field: "user".into() })
        );
        let not_isnull = Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(isnull),
        };
        assert_eq!(
            translate_predicate(&not_isnull).unwrap(),
            QueryDsl::Exists { field: "user".into() }
        );
    }

    #[test]
    fn like_becomes_wildcard() {
        let expr = Expr::Function {
            func: ScalarFunction::Like,
            args: vec![col("host"), Expr::literal(ScalarValue::Utf8("web_%".into()))],
        };
        assert_eq!(
            translate_predicate(&expr).unwrap(),
            QueryDsl::Wildcard {
                field: "host".into(),
                pattern: "web?*".into()
            }
        );
    }

    #[test]
    fn untranslatable_shapes() {
        let field_cmp = Expr::binary(col("a"), BinaryOp::Eq, col("b"));
        assert!(translate_predicate(&field_cmp).is_err());

        let null_cmp = Expr::binary(col("a"), BinaryOp::Eq, Expr::literal(ScalarValue::Null));
        assert!(translate_predicate(&null_cmp).is_err());

        let arithmetic = Expr::binary(
            Expr::binary(col("a"), BinaryOp::Add, int(1)),
            BinaryOp::Gt,
            int(3),
        );
        assert!(translate_predicate(&arithmetic).is_err());

        let upper = Expr::binary(
            Expr::Function {
                func: ScalarFunction::Upper,
                args: vec![col("host")],
            },
            BinaryOp::Eq,
            Expr::literal(ScalarValue::Utf8("A".into())),
        );
        assert!(translate_predicate(&upper).is_err());
    }
}
