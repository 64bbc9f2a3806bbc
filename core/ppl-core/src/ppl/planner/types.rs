//! 플래너 타입 정의
//!
//! LogicalPlan, Expr 등 분석 이후 단계가 공유하는 핵심 타입들을 정의합니다.
//! Field references are already resolved to canonical column names.

use crate::ppl::analyzer::functions::{AggregateFunction, ScalarFunction};
use crate::ppl::ast::{BinaryOp, JoinType, UnaryOp};
use crate::schema::{Statistics, field_type, is_numeric};
use crate::value::ScalarValue;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// 표현식: 컬럼, 리터럴, 연산자, 함수
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// 컬럼 참조
    Column(String),
    /// 리터럴 값
    Literal(ScalarValue),
    /// 이항 연산
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// 단항 연산 (NOT, -)
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// 스칼라 함수 호출
    Function {
        func: ScalarFunction,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn literal(value: ScalarValue) -> Self {
        Expr::Literal(value)
    }

    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Expr::binary(left, BinaryOp::And, right)
    }

    /// Result type against `schema`. Unknown columns type as Null.
    pub fn data_type(&self, schema: &Schema) -> DataType {
        match self {
            Expr::Column(name) => field_type(schema, name).unwrap_or(DataType::Null),
            Expr::Literal(value) => value.data_type(),
            Expr::Binary { op, left, right } => {
                if op.is_logical() || op.is_comparison() {
                    DataType::Boolean
                } else {
                    promote(&left.data_type(schema), &right.data_type(schema))
                }
            }
            Expr::Unary {
                op: UnaryOp::Not, ..
            } => DataType::Boolean,
            Expr::Unary {
                op: UnaryOp::Neg,
                expr,
            } => expr.data_type(schema),
            Expr::Function { func, args } => {
                let arg_types: Vec<DataType> = args.iter().map(|a| a.data_type(schema)).collect();
                func.return_type(&arg_types).unwrap_or(DataType::Null)
            }
        }
    }

    /// Column names referenced anywhere in the expression.
    pub fn columns(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Column(name) => {
                out.insert(name.clone());
            }
            Expr::Literal(_) => {}
            Expr::Binary { left, right, .. } => {
                left.collect_columns(out);
                right.collect_columns(out);
            }
            Expr::Unary { expr, .. } => expr.collect_columns(out),
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// Rewrites column names through `rename`; names it maps to `None` stay.
    pub fn rename_columns(self, rename: &impl Fn(&str) -> Option<String>) -> Expr {
        match self {
            Expr::Column(name) => Expr::Column(rename(&name).unwrap_or(name)),
            Expr::Literal(v) => Expr::Literal(v),
            Expr::Binary { op, left, right } => Expr::Binary {
                op,
                left: Box::new(left.rename_columns(rename)),
                right: Box::new(right.rename_columns(rename)),
            },
            Expr::Unary { op, expr } => Expr::Unary {
                op,
                expr: Box::new(expr.rename_columns(rename)),
            },
            Expr::Function { func, args } => Expr::Function {
                func,
                args: args.into_iter().map(|a| a.rename_columns(rename)).collect(),
            },
        }
    }

    pub fn as_column(&self) -> Option<&str> {
        match self {
            Expr::Column(name) => Some(name),
            _ => None,
        }
    }
}

/// Int64 op Int64 stays Int64; any Float64 operand widens the result.
pub fn promote(left: &DataType, right: &DataType) -> DataType {
    match (left, right) {
        (DataType::Null, other) | (other, DataType::Null) => other.clone(),
        (DataType::Int64, DataType::Int64) => DataType::Int64,
        (a, b) if is_numeric(a) && is_numeric(b) => DataType::Float64,
        (a, _) => a.clone(),
    }
}

/// Splits nested ANDs into their conjuncts (left to right).
pub fn split_conjunction(expr: Expr) -> Vec<Expr> {
    let mut out = Vec::new();
    fn walk(expr: Expr, out: &mut Vec<Expr>) {
        match expr {
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                walk(*left, out);
                walk(*right, out);
            }
            other => out.push(other),
        }
    }
    walk(expr, &mut out);
    out
}

/// Left-deep AND of `exprs`; `None` when empty.
pub fn conjunction(exprs: impl IntoIterator<Item = Expr>) -> Option<Expr> {
    exprs.into_iter().reduce(Expr::and)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{name}"),
            Expr::Literal(ScalarValue::Utf8(s)) => write!(f, "'{s}'"),
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Unary {
                op: UnaryOp::Not,
                expr,
            } => write!(f, "NOT {expr}"),
            Expr::Unary {
                op: UnaryOp::Neg,
                expr,
            } => write!(f, "-{expr}"),
            Expr::Function { func, args } => {
                write!(f, "{func}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// 집계 표현식
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggregateFunction,
    /// `None` for `count()`
    pub arg: Option<Expr>,
    /// Output column name
    pub name: String,
    pub data_type: DataType,
}

/// Output column of a Project: `source` from the input, renamed to `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectItem {
    pub source: String,
    pub name: String,
}

impl ProjectItem {
    pub fn keep(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            name,
        }
    }

    pub fn renamed(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }

    pub fn is_rename(&self) -> bool {
        self.source != self.name
    }
}

/// One `eval` assignment with its analyzed type.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub expr: Expr,
    pub data_type: DataType,
}

/// 정렬 키
#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub column: String,
    pub descending: bool,
}

/// Which join input is materialized into the hash table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum BuildSide {
    Left,
    Right,
}

/// 논리 플랜: 쿼리의 논리적 표현
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    /// 인덱스 스캔
    Scan {
        source: String,
        /// Flattened schema of the whole index
        table_schema: SchemaRef,
        /// Columns the scan must return; `None` means all
        columns: Option<Vec<String>>,
        /// Pushed-down predicate
        filter: Option<Expr>,
        statistics: Option<Statistics>,
    },
    /// WHERE 조건 필터
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
    },
    /// 컬럼 선택/이름 변경
    Project {
        input: Box<LogicalPlan>,
        items: Vec<ProjectItem>,
    },
    /// eval: computed columns (overwrite in place or append)
    Eval {
        input: Box<LogicalPlan>,
        assignments: Vec<Assignment>,
    },
    /// parse / grok: regex extraction into string columns
    Parse {
        input: Box<LogicalPlan>,
        field: String,
        pattern: String,
        outputs: Vec<String>,
    },
    /// stats: GROUP BY + 집계
    Aggregate {
        input: Box<LogicalPlan>,
        group_by: Vec<String>,
        aggregates: Vec<AggregateExpr>,
        /// Eligible for translation into backend bucket aggregation
        pushdown: bool,
    },
    /// 정렬
    Sort {
        input: Box<LogicalPlan>,
        keys: Vec<SortExpr>,
    },
    /// head: LIMIT/OFFSET
    Limit {
        input: Box<LogicalPlan>,
        count: usize,
        offset: usize,
    },
    /// JOIN; output is left columns followed by right columns
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        join_type: JoinType,
        on: Expr,
        build_side: BuildSide,
    },
}

fn nullable(name: &str, data_type: DataType) -> Field {
    Field::new(name, data_type, true)
}

impl LogicalPlan {
    /// Output schema, derived deterministically from the inputs.
    pub fn schema(&self) -> SchemaRef {
        match self {
            LogicalPlan::Scan {
                table_schema,
                columns,
                ..
            } => match columns {
                None => Arc::clone(table_schema),
                Some(cols) => {
                    let fields: Vec<Field> = table_schema
                        .fields()
                        .iter()
                        .filter(|f| cols.contains(f.name()))
                        .map(|f| f.as_ref().clone())
                        .collect();
                    Arc::new(Schema::new(fields))
                }
            },
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. } => input.schema(),
            LogicalPlan::Project { input, items } => {
                let input_schema = input.schema();
                let fields: Vec<Field> = items
                    .iter()
                    .map(|item| {
                        let dt = field_type(&input_schema, &item.source).unwrap_or(DataType::Null);
                        nullable(&item.name, dt)
                    })
                    .collect();
                Arc::new(Schema::new(fields))
            }
            LogicalPlan::Eval { input, assignments } => {
                let mut fields: Vec<Field> = input
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.as_ref().clone())
                    .collect();
                for a in assignments {
                    upsert(&mut fields, nullable(&a.name, a.data_type.clone()));
                }
                Arc::new(Schema::new(fields))
            }
            LogicalPlan::Parse { input, outputs, .. } => {
                let mut fields: Vec<Field> = input
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.as_ref().clone())
                    .collect();
                for name in outputs {
                    upsert(&mut fields, nullable(name, DataType::Utf8));
                }
                Arc::new(Schema::new(fields))
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
                ..
            } => {
                let input_schema = input.schema();
                let mut fields: Vec<Field> = group_by
                    .iter()
                    .map(|g| nullable(g, field_type(&input_schema, g).unwrap_or(DataType::Null)))
                    .collect();
                fields.extend(
                    aggregates
                        .iter()
                        .map(|a| nullable(&a.name, a.data_type.clone())),
                );
                Arc::new(Schema::new(fields))
            }
            LogicalPlan::Join { left, right, .. } => {
                let mut fields: Vec<Field> = left
                    .schema()
                    .fields()
                    .iter()
                    .map(|f| f.as_ref().clone())
                    .collect();
                fields.extend(right.schema().fields().iter().map(|f| f.as_ref().clone()));
                Arc::new(Schema::new(fields))
            }
        }
    }

    /// Short operator name used in explain output and logs.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalPlan::Scan { .. } => "Scan",
            LogicalPlan::Filter { .. } => "Filter",
            LogicalPlan::Project { .. } => "Project",
            LogicalPlan::Eval { .. } => "Eval",
            LogicalPlan::Parse { .. } => "Parse",
            LogicalPlan::Aggregate { .. } => "Aggregate",
            LogicalPlan::Sort { .. } => "Sort",
            LogicalPlan::Limit { .. } => "Limit",
            LogicalPlan::Join { .. } => "Join",
        }
    }

    pub fn inputs(&self) -> Vec<&LogicalPlan> {
        match self {
            LogicalPlan::Scan { .. } => vec![],
            LogicalPlan::Filter { input, .. }
            | LogicalPlan::Project { input, .. }
            | LogicalPlan::Eval { input, .. }
            | LogicalPlan::Parse { input, .. }
            | LogicalPlan::Aggregate { input, .. }
            | LogicalPlan::Sort { input, .. }
            | LogicalPlan::Limit { input, .. } => vec![input],
            LogicalPlan::Join { left, right, .. } => vec![left, right],
        }
    }

    /// Rebuilds this node with each direct input replaced by `f(input)`.
    pub fn map_inputs<F>(self, mut f: F) -> crate::error::PplResult<LogicalPlan>
    where
        F: FnMut(LogicalPlan) -> crate::error::PplResult<LogicalPlan>,
    {
        Ok(match self {
            scan @ LogicalPlan::Scan { .. } => scan,
            LogicalPlan::Filter { input, predicate } => LogicalPlan::Filter {
                input: Box::new(f(*input)?),
                predicate,
            },
            LogicalPlan::Project { input, items } => LogicalPlan::Project {
                input: Box::new(f(*input)?),
                items,
            },
            LogicalPlan::Eval { input, assignments } => LogicalPlan::Eval {
                input: Box::new(f(*input)?),
                assignments,
            },
            LogicalPlan::Parse {
                input,
                field,
                pattern,
                outputs,
            } => LogicalPlan::Parse {
                input: Box::new(f(*input)?),
                field,
                pattern,
                outputs,
            },
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
                pushdown,
            } => LogicalPlan::Aggregate {
                input: Box::new(f(*input)?),
                group_by,
                aggregates,
                pushdown,
            },
            LogicalPlan::Sort { input, keys } => LogicalPlan::Sort {
                input: Box::new(f(*input)?),
                keys,
            },
            LogicalPlan::Limit {
                input,
                count,
                offset,
            } => LogicalPlan::Limit {
                input: Box::new(f(*input)?),
                count,
                offset,
            },
            LogicalPlan::Join {
                left,
                right,
                join_type,
                on,
                build_side,
            } => LogicalPlan::Join {
                left: Box::new(f(*left)?),
                right: Box::new(f(*right)?),
                join_type,
                on,
                build_side,
            },
        })
    }

    /// Indented one-node-per-line rendering.
    pub fn display_indent(&self) -> String {
        let mut out = String::new();
        self.write_indent(0, &mut out);
        out
    }

    fn write_indent(&self, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&self.describe());
        out.push('\n');
        for input in self.inputs() {
            input.write_indent(depth + 1, out);
        }
    }

    /// One-line description of this node (without its inputs).
    pub fn describe(&self) -> String {
        match self {
            LogicalPlan::Scan {
                source,
                columns,
                filter,
                ..
            } => {
                let mut s = format!("Scan: {source}");
                if let Some(cols) = columns {
                    s.push_str(&format!(" columns=[{}]", cols.join(", ")));
                }
                if let Some(filter) = filter {
                    s.push_str(&format!(" filter={filter}"));
                }
                s
            }
            LogicalPlan::Filter { predicate, .. } => format!("Filter: {predicate}"),
            LogicalPlan::Project { items, .. } => {
                let cols: Vec<String> = items
                    .iter()
                    .map(|i| {
                        if i.is_rename() {
                            format!("{} AS {}", i.source, i.name)
                        } else {
                            i.name.clone()
                        }
                    })
                    .collect();
                format!("Project: {}", cols.join(", "))
            }
            LogicalPlan::Eval { assignments, .. } => {
                let cols: Vec<String> = assignments
                    .iter()
                    .map(|a| format!("{} = {}", a.name, a.expr))
                    .collect();
                format!("Eval: {}", cols.join(", "))
            }
            LogicalPlan::Parse {
                field, outputs, ..
            } => format!("Parse: {field} -> [{}]", outputs.join(", ")),
            LogicalPlan::Aggregate {
                group_by,
                aggregates,
                pushdown,
                ..
            } => {
                let aggs: Vec<String> = aggregates
                    .iter()
                    .map(|a| match &a.arg {
                        Some(arg) => format!("{}({arg}) AS {}", a.func, a.name),
                        None => format!("{}() AS {}", a.func, a.name),
                    })
                    .collect();
                format!(
                    "Aggregate: [{}] by [{}]{}",
                    aggs.join(", "),
                    group_by.join(", "),
                    if *pushdown { " pushdown" } else { "" }
                )
            }
            LogicalPlan::Sort { keys, .. } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{} {}", k.column, if k.descending { "DESC" } else { "ASC" }))
                    .collect();
                format!("Sort: {}", keys.join(", "))
            }
            LogicalPlan::Limit { count, offset, .. } => format!("Limit: {count} offset {offset}"),
            LogicalPlan::Join {
                join_type,
                on,
                build_side,
                ..
            } => format!("Join: {join_type} on {on} build={build_side:?}"),
        }
    }
}

fn upsert(fields: &mut Vec<Field>, field: Field) {
    match fields.iter().position(|f| f.name() == field.name()) {
        Some(i) => fields[i] = field,
        None => fields.push(field),
    }
}
