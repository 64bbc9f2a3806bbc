//! Function registry: names, arities and type rules of built-in functions.
//!
//! The registry is plain data handed to the analyzer; nothing here consults
//! global state.

use crate::schema::is_numeric;
use ahash::AHashMap;
use arrow::datatypes::DataType;
use serde::Serialize;
use std::fmt;

/// Row-level (scalar) functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScalarFunction {
    Abs,
    Ceil,
    Floor,
    Round,
    Sqrt,
    Pow,
    Lower,
    Upper,
    Trim,
    Length,
    Concat,
    Substring,
    Coalesce,
    IsNull,
    IsNotNull,
    If,
    Like,
}

impl ScalarFunction {
    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunction::Abs => "abs",
            ScalarFunction::Ceil => "ceil",
            ScalarFunction::Floor => "floor",
            ScalarFunction::Round => "round",
            ScalarFunction::Sqrt => "sqrt",
            ScalarFunction::Pow => "pow",
            ScalarFunction::Lower => "lower",
            ScalarFunction::Upper => "upper",
            ScalarFunction::Trim => "trim",
            ScalarFunction::Length => "length",
            ScalarFunction::Concat => "concat",
            ScalarFunction::Substring => "substring",
            ScalarFunction::Coalesce => "coalesce",
            ScalarFunction::IsNull => "isnull",
            ScalarFunction::IsNotNull => "isnotnull",
            ScalarFunction::If => "if",
            ScalarFunction::Like => "like",
        }
    }

    /// Result type for the given argument types, or a message describing
    /// the mismatch. Arity has already been checked.
    pub fn return_type(&self, args: &[DataType]) -> Result<DataType, String> {
        let numeric = |i: usize| -> Result<(), String> {
            if is_numeric(&args[i]) || args[i] == DataType::Null {
                Ok(())
            } else {
                Err(format!(
                    "{}() expects a numeric argument {}, got {}",
                    self.name(),
                    i + 1,
                    args[i]
                ))
            }
        };
        let string = |i: usize| -> Result<(), String> {
            if matches!(args[i], DataType::Utf8 | DataType::Null) {
                Ok(())
            } else {
                Err(format!(
                    "{}() expects a string argument {}, got {}",
                    self.name(),
                    i + 1,
                    args[i]
                ))
            }
        };

        match self {
            ScalarFunction::Abs => {
                numeric(0)?;
                Ok(match args[0] {
                    DataType::Null => DataType::Int64,
                    ref t => t.clone(),
                })
            }
            ScalarFunction::Ceil | ScalarFunction::Floor => {
                numeric(0)?;
                Ok(DataType::Int64)
            }
            ScalarFunction::Round => {
                numeric(0)?;
                if args.len() == 2 {
                    numeric(1)?;
                }
                Ok(DataType::Float64)
            }
            ScalarFunction::Sqrt => {
                numeric(0)?;
                Ok(DataType::Float64)
            }
            ScalarFunction::Pow => {
                numeric(0)?;
                numeric(1)?;
                Ok(DataType::Float64)
            }
            ScalarFunction::Lower | ScalarFunction::Upper | ScalarFunction::Trim => {
                string(0)?;
                Ok(DataType::Utf8)
            }
            ScalarFunction::Length => {
                string(0)?;
                Ok(DataType::Int64)
            }
            ScalarFunction::Concat => {
                for i in 0..args.len() {
                    string(i)?;
                }
                Ok(DataType::Utf8)
            }
            ScalarFunction::Substring => {
                string(0)?;
                for i in 1..args.len() {
                    if !matches!(args[i], DataType::Int64 | DataType::Null) {
                        return Err(format!(
                            "substring() expects an integer argument {}, got {}",
                            i + 1,
                            args[i]
                        ));
                    }
                }
                Ok(DataType::Utf8)
            }
            ScalarFunction::Coalesce => unify(self.name(), args),
            ScalarFunction::IsNull | ScalarFunction::IsNotNull => Ok(DataType::Boolean),
            ScalarFunction::If => {
                if !matches!(args[0], DataType::Boolean | DataType::Null) {
                    return Err(format!("if() condition must be boolean, got {}", args[0]));
                }
                unify(self.name(), &args[1..])
            }
            ScalarFunction::Like => {
                string(0)?;
                string(1)?;
                Ok(DataType::Boolean)
            }
        }
    }
}

impl fmt::Display for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Common type of `types`: identical types unify, Int64 widens to Float64,
/// and Null unifies with anything.
pub fn unify(function: &str, types: &[DataType]) -> Result<DataType, String> {
    let mut result = DataType::Null;
    for t in types {
        result = match (&result, t) {
            (DataType::Null, other) | (other, DataType::Null) => other.clone(),
            (a, b) if a == b => a.clone(),
            (a, b) if is_numeric(a) && is_numeric(b) => DataType::Float64,
            (a, b) => {
                return Err(format!(
                    "{function}() arguments have incompatible types {a} and {b}"
                ));
            }
        };
    }
    Ok(result)
}

/// Functions only legal inside `stats` / `top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    /// Distinct count
    DistinctCount,
}

impl AggregateFunction {
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::DistinctCount => "dc",
        }
    }

    /// Result type; `arg` is `None` for `count()`.
    pub fn return_type(&self, arg: Option<&DataType>) -> Result<DataType, String> {
        match (self, arg) {
            (AggregateFunction::Count | AggregateFunction::DistinctCount, _) => Ok(DataType::Int64),
            (AggregateFunction::Sum, Some(DataType::Int64 | DataType::Null)) => Ok(DataType::Int64),
            (AggregateFunction::Sum, Some(DataType::Float64)) => Ok(DataType::Float64),
            (AggregateFunction::Avg, Some(t)) if is_numeric(t) || *t == DataType::Null => {
                Ok(DataType::Float64)
            }
            (AggregateFunction::Min | AggregateFunction::Max, Some(t)) if *t != DataType::Boolean => {
                Ok(t.clone())
            }
            (f, Some(t)) => Err(format!("{}() does not accept {t} arguments", f.name())),
            (f, None) => Err(format!("{}() requires an argument", f.name())),
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exact(k) => n == k,
            Arity::Range(lo, hi) => (lo..=hi).contains(&n),
            Arity::AtLeast(lo) => n >= lo,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Arity::Exact(k) => write!(f, "{k}"),
            Arity::Range(lo, hi) => write!(f, "{lo} to {hi}"),
            Arity::AtLeast(lo) => write!(f, "at least {lo}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Scalar(ScalarFunction),
    Aggregate(AggregateFunction),
}

#[derive(Debug, Clone, Copy)]
pub struct FunctionDef {
    pub kind: FunctionKind,
    pub arity: Arity,
}

/// Known functions, looked up case-insensitively.
#[derive(Debug, Clone)]
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    pub fn empty() -> Self {
        Self {
            functions: AHashMap::new(),
        }
    }

    /// Registry holding every built-in scalar and aggregate function.
    pub fn builtin() -> Self {
        use AggregateFunction as A;
        use ScalarFunction as S;

        let mut registry = Self::empty();
        let scalars = [
            (S::Abs, Arity::Exact(1)),
            (S::Ceil, Arity::Exact(1)),
            (S::Floor, Arity::Exact(1)),
            (S::Round, Arity::Range(1, 2)),
            (S::Sqrt, Arity::Exact(1)),
            (S::Pow, Arity::Exact(2)),
            (S::Lower, Arity::Exact(1)),
            (S::Upper, Arity::Exact(1)),
            (S::Trim, Arity::Exact(1)),
            (S::Length, Arity::Exact(1)),
            (S::Concat, Arity::AtLeast(1)),
            (S::Substring, Arity::Range(2, 3)),
            (S::Coalesce, Arity::AtLeast(1)),
            (S::IsNull, Arity::Exact(1)),
            (S::IsNotNull, Arity::Exact(1)),
            (S::If, Arity::Exact(3)),
            (S::Like, Arity::Exact(2)),
        ];
        for (func, arity) in scalars {
            registry.register(func.name(), FunctionKind::Scalar(func), arity);
        }
        registry.register("power", FunctionKind::Scalar(S::Pow), Arity::Exact(2));
        registry.register("substr", FunctionKind::Scalar(S::Substring), Arity::Range(2, 3));

        let aggregates = [
            (A::Count, Arity::Range(0, 1)),
            (A::Sum, Arity::Exact(1)),
            (A::Avg, Arity::Exact(1)),
            (A::Min, Arity::Exact(1)),
            (A::Max, Arity::Exact(1)),
            (A::DistinctCount, Arity::Exact(1)),
        ];
        for (func, arity) in aggregates {
            registry.register(func.name(), FunctionKind::Aggregate(func), arity);
        }
        registry.register(
            "distinct_count",
            FunctionKind::Aggregate(A::DistinctCount),
            Arity::Exact(1),
        );
        registry
    }

    pub fn register(&mut self, name: &str, kind: FunctionKind, arity: Arity) {
        self.functions
            .insert(name.to_ascii_lowercase(), FunctionDef { kind, arity });
    }

    pub fn lookup(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_ascii_lowercase())
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let registry = FunctionRegistry::builtin();
        let def = registry.lookup("ABS").unwrap();
        assert_eq!(def.kind, FunctionKind::Scalar(ScalarFunction::Abs));
        assert!(registry.lookup("nope").is_none());
        assert!(matches!(
            registry.lookup("distinct_count").unwrap().kind,
            FunctionKind::Aggregate(AggregateFunction::DistinctCount)
        ));
    }

    #[test]
    fn arity_ranges() {
        assert!(Arity::Range(1, 2).accepts(2));
        assert!(!Arity::Range(1, 2).accepts(3));
        assert!(Arity::AtLeast(1).accepts(5));
        assert!(!Arity::Exact(1).accepts(0));
    }

    #[test]
    fn scalar_type_rules() {
        assert_eq!(
            ScalarFunction::Abs.return_type(&[DataType::Float64]),
            Ok(DataType::Float64)
        );
        assert!(ScalarFunction::Upper.return_type(&[DataType::Int64]).is_err());
        assert_eq!(
            ScalarFunction::Coalesce.return_type(&[DataType::Null, DataType::Int64, DataType::Float64]),
            Ok(DataType::Float64)
        );
        assert!(
            ScalarFunction::If
                .return_type(&[DataType::Boolean, DataType::Utf8, DataType::Int64])
                .is_err()
        );
    }

    #[test]
    fn aggregate_type_rules() {
        assert_eq!(AggregateFunction::Count.return_type(None), Ok(DataType::Int64));
        assert_eq!(
            AggregateFunction::Sum.return_type(Some(&DataType::Float64)),
            Ok(DataType::Float64)
        );
        assert!(AggregateFunction::Avg.return_type(Some(&DataType::Utf8)).is_err());
        assert_eq!(
            AggregateFunction::Max.return_type(Some(&DataType::Utf8)),
            Ok(DataType::Utf8)
        );
    }
}
