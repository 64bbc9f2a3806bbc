//! Semantic analyzer: validates a parsed query against source schemas.
//!
//! Checks run per command in pipeline order: field resolution (dotted
//! paths, join qualifiers, fields dropped by `stats`), function resolution
//! and arity, then bottom-up type inference with Int64 → Float64
//! promotion. The result carries canonical column names and types, so later
//! stages never resolve names again.

pub mod functions;
mod grok;


use crate::error::{PplError, PplResult};
use crate::ppl::ast::{self, BinaryOp, Command, JoinType, ParseKind, Query, UnaryOp};
use crate::ppl::lexer::Position;
use crate::ppl::planner::types::{AggregateExpr, Assignment, Expr, ProjectItem, SortExpr, promote};
use crate::schema::{SchemaProvider, Statistics, flatten_schema, is_numeric, schema_from_pairs};
use ahash::{AHashMap, AHashSet};
use arrow::datatypes::{DataType, SchemaRef};
use functions::{FunctionKind, FunctionRegistry};
use regex::Regex;
use std::sync::Arc;

/// A resolved source index.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRef {
    pub name: String,
    /// Flattened, type-normalized schema
    pub schema: SchemaRef,
    pub statistics: Option<Statistics>,
}

/// One analyzed pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedCommand {
    /// `search` expression or `where`
    Filter(Expr),
    /// `fields`, `rename` and the tail of `lookup`
    Project(Vec<ProjectItem>),
    Eval(Vec<Assignment>),
    /// `parse` / `grok`; `pattern` is always a plain regex
    Parse {
        field: String,
        pattern: String,
        outputs: Vec<String>,
    },
    Stats {
        group_by: Vec<String>,
        aggregates: Vec<AggregateExpr>,
    },
    Sort(Vec<SortExpr>),
    Limit { count: usize, offset: usize },
    Top { count: usize, fields: Vec<String> },
    Join {
        join_type: JoinType,
        right: SourceRef,
        /// Renames applied to the right input before joining
        right_items: Option<Vec<ProjectItem>>,
        on: Expr,
    },
}

/// Output of semantic analysis: the typed pipeline and its result schema.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzedQuery {
    pub source: SourceRef,
    pub commands: Vec<TypedCommand>,
    pub schema: SchemaRef,
}

/// Analyzes `query` against the provider's schemas.
pub fn analyze(
    query: &Query,
    schemas: &dyn SchemaProvider,
    functions: &FunctionRegistry,
) -> PplResult<AnalyzedQuery> {
    Analyzer { schemas, functions }.analyze(query)
}

fn error(message: impl Into<String>, position: Position) -> PplError {
    PplError::Semantic {
        message: message.into(),
        position,
    }
}

/// Columns visible at one point of the pipeline.
#[derive(Debug, Clone, Default)]
struct Scope {
    fields: Vec<(String, DataType)>,
    /// Qualified spellings (`alias.field`) to canonical names
    aliases: AHashMap<String, String>,
    /// Fields removed by the most recent `stats`, with its position
    dropped: Option<(AHashSet<String>, Position)>,
}

impl Scope {
    fn from_schema(schema: &SchemaRef) -> Self {
        Self {
            fields: schema
                .fields()
                .iter()
                .map(|f| (f.name().clone(), f.data_type().clone()))
                .collect(),
            ..Default::default()
        }
    }

    fn get(&self, name: &str) -> Option<&DataType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn names(&self) -> Vec<String> {
        self.fields.iter().map(|(n, _)| n.clone()).collect()
    }

    fn upsert(&mut self, name: &str, data_type: DataType) {
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = data_type,
            None => self.fields.push((name.to_string(), data_type)),
        }
    }

    fn resolve(&self, ident: &ast::Ident) -> PplResult<(String, DataType)> {
        if let Some(t) = self.get(&ident.name) {
            return Ok((ident.name.clone(), t.clone()));
        }
        if let Some(canonical) = self.aliases.get(&ident.name)
            && let Some(t) = self.get(canonical)
        {
            return Ok((canonical.clone(), t.clone()));
        }
        if let Some((dropped, stats_at)) = &self.dropped
            && dropped.contains(&ident.name)
        {
            return Err(error(
                format!(
                    "field `{}` is not available after the stats command at {stats_at}; \
                     only its group-by fields and aggregates remain",
                    ident.name
                ),
                ident.span.start,
            ));
        }
        Err(error(
            format!("unknown field `{}`", ident.name),
            ident.span.start,
        ))
    }

    fn schema(&self) -> SchemaRef {
        schema_from_pairs(self.fields.iter().map(|(n, t)| (n.clone(), t.clone())))
    }
}

struct Analyzer<'a> {
    schemas: &'a dyn SchemaProvider,
    functions: &'a FunctionRegistry,
}

impl Analyzer<'_> {
    fn analyze(&self, query: &Query) -> PplResult<AnalyzedQuery> {
        let source = self.source(&query.search.source)?;
        let mut scope = Scope::from_schema(&source.schema);
        let mut commands = Vec::new();

        if let Some(filter) = &query.search.filter {
            commands.push(TypedCommand::Filter(self.predicate(filter, &scope)?));
        }

        for command in &query.commands {
            self.command(command, &source.name, &mut scope, &mut commands)?;
        }

        Ok(AnalyzedQuery {
            source,
            commands,
            schema: scope.schema(),
        })
    }

    fn source(&self, ident: &ast::Ident) -> PplResult<SourceRef> {
        let schema = self.schemas.schema(&ident.name).ok_or_else(|| {
            error(
                format!("unknown source `{}`", ident.name),
                ident.span.start,
            )
        })?;
        Ok(SourceRef {
            name: ident.name.clone(),
            schema: Arc::new(flatten_schema(&schema)),
            statistics: self.schemas.statistics(&ident.name),
        })
    }

    fn command(
        &self,
        command: &Command,
        left_source: &str,
        scope: &mut Scope,
        out: &mut Vec<TypedCommand>,
    ) -> PplResult<()> {
        match command {
            Command::Where(c) => {
                out.push(TypedCommand::Filter(self.predicate(&c.predicate, scope)?));
            }
            Command::Fields(c) => {
                let mut listed = Vec::new();
                for ident in &c.fields {
                    let (name, _) = scope.resolve(ident)?;
                    if listed.contains(&name) {
                        return Err(error(
                            format!("field `{name}` listed twice"),
                            ident.span.start,
                        ));
                    }
                    listed.push(name);
                }
                let kept: Vec<String> = if c.exclude {
                    scope.names().into_iter().filter(|n| !listed.contains(n)).collect()
                } else {
                    listed
                };
                if kept.is_empty() {
                    return Err(error("fields cannot remove every field", c.span.start));
                }
                scope.fields.retain(|(n, _)| kept.contains(n));
                if !c.exclude {
                    let mut ordered = Vec::with_capacity(kept.len());
                    for name in &kept {
                        if let Some(t) = scope.get(name) {
                            ordered.push((name.clone(), t.clone()));
                        }
                    }
                    scope.fields = ordered;
                }
                scope.aliases.retain(|_, canonical| kept.contains(canonical));
                out.push(TypedCommand::Project(
                    kept.into_iter().map(ProjectItem::keep).collect(),
                ));
            }
            Command::Rename(c) => {
                let mut items: Vec<ProjectItem> =
                    scope.names().into_iter().map(ProjectItem::keep).collect();
                for (from, to) in &c.renames {
                    let (current, _) = scope.resolve(from)?;
                    if current != to.name && scope.contains(&to.name) {
                        return Err(error(
                            format!("cannot rename `{current}` to `{}`: field already exists", to.name),
                            to.span.start,
                        ));
                    }
                    for item in items.iter_mut().filter(|i| i.name == current) {
                        item.name = to.name.clone();
                    }
                    for field in scope.fields.iter_mut().filter(|(n, _)| *n == current) {
                        field.0 = to.name.clone();
                    }
                    scope.aliases.retain(|_, canonical| *canonical != current);
                }
                out.push(TypedCommand::Project(items));
            }
            Command::Eval(c) => {
                let mut assignments = Vec::with_capacity(c.assignments.len());
                for (name, expr) in &c.assignments {
                    let (expr, data_type) = self.expr(expr, scope)?;
                    scope.upsert(&name.name, data_type.clone());
                    assignments.push(Assignment {
                        name: name.name.clone(),
                        expr,
                        data_type,
                    });
                }
                out.push(TypedCommand::Eval(assignments));
            }
            Command::Parse(c) => {
                let (field, data_type) = scope.resolve(&c.field)?;
                if !matches!(data_type, DataType::Utf8) {
                    return Err(error(
                        format!("{} source field `{field}` must be a string, got {data_type}", command.name()),
                        c.field.span.start,
                    ));
                }
                let pattern = match c.kind {
                    ParseKind::Regex => c.pattern.clone(),
                    ParseKind::Grok => {
                        grok::expand(&c.pattern).map_err(|e| error(e, c.span.start))?
                    }
                };
                let regex = Regex::new(&pattern)
                    .map_err(|e| error(format!("invalid pattern: {e}"), c.span.start))?;
                let outputs: Vec<String> =
                    regex.capture_names().flatten().map(str::to_string).collect();
                if outputs.is_empty() {
                    return Err(error(
                        "pattern must contain at least one named group",
                        c.span.start,
                    ));
                }
                for name in &outputs {
                    scope.upsert(name, DataType::Utf8);
                }
                out.push(TypedCommand::Parse {
                    field,
                    pattern,
                    outputs,
                });
            }
            Command::Stats(c) => {
                let group_by = self.group_fields(&c.group_by, scope)?;
                let mut aggregates = Vec::with_capacity(c.aggregations.len());
                for call in &c.aggregations {
                    aggregates.push(self.aggregate(call, scope)?);
                }
                let mut seen = AHashSet::new();
                for name in group_by.iter().chain(aggregates.iter().map(|a| &a.name)) {
                    if !seen.insert(name.clone()) {
                        return Err(error(
                            format!("stats produces duplicate column `{name}`"),
                            c.span.start,
                        ));
                    }
                }
                *scope = self.after_aggregate(scope, &group_by, &aggregates, c.span.start);
                out.push(TypedCommand::Stats {
                    group_by,
                    aggregates,
                });
            }
            Command::Top(c) => {
                let fields = self.group_fields(&c.fields, scope)?;
                if fields.iter().any(|f| f == "count") {
                    return Err(error(
                        "top cannot group by a field named `count`",
                        c.span.start,
                    ));
                }
                let count = AggregateExpr {
                    func: functions::AggregateFunction::Count,
                    arg: None,
                    name: "count".to_string(),
                    data_type: DataType::Int64,
                };
                *scope = self.after_aggregate(scope, &fields, &[count], c.span.start);
                out.push(TypedCommand::Top {
                    count: c.count,
                    fields,
                });
            }
            Command::Sort(c) => {
                let mut keys = Vec::with_capacity(c.keys.len());
                for key in &c.keys {
                    let (column, _) = scope.resolve(&key.field)?;
                    keys.push(SortExpr {
                        column,
                        descending: key.descending,
                    });
                }
                out.push(TypedCommand::Sort(keys));
            }
            Command::Head(c) => out.push(TypedCommand::Limit {
                count: c.count,
                offset: c.offset,
            }),
            Command::Join(c) => {
                let right = self.source(&c.source)?;
                let alias = c.alias.as_ref().unwrap_or(&c.source).name.clone();
                let (right_items, combined) = join_scope(scope, left_source, &alias, &right);
                let on = self.predicate(&c.condition, &combined)?;
                *scope = combined;
                out.push(TypedCommand::Join {
                    join_type: c.join_type,
                    right,
                    right_items,
                    on,
                });
            }
            Command::Lookup(c) => self.lookup(c, scope, out)?,
        }
        Ok(())
    }

    fn group_fields(&self, idents: &[ast::Ident], scope: &Scope) -> PplResult<Vec<String>> {
        let mut fields = Vec::with_capacity(idents.len());
        for ident in idents {
            let (name, _) = scope.resolve(ident)?;
            if fields.contains(&name) {
                return Err(error(
                    format!("group-by field `{name}` listed twice"),
                    ident.span.start,
                ));
            }
            fields.push(name);
        }
        Ok(fields)
    }

    fn after_aggregate(
        &self,
        scope: &Scope,
        group_by: &[String],
        aggregates: &[AggregateExpr],
        position: Position,
    ) -> Scope {
        let mut fields: Vec<(String, DataType)> = group_by
            .iter()
            .map(|g| (g.clone(), scope.get(g).cloned().unwrap_or(DataType::Null)))
            .collect();
        fields.extend(aggregates.iter().map(|a| (a.name.clone(), a.data_type.clone())));
        let dropped: AHashSet<String> = scope
            .names()
            .into_iter()
            .chain(scope.aliases.keys().cloned())
            .filter(|n| !fields.iter().any(|(f, _)| f == n))
            .collect();
        Scope {
            fields,
            aliases: AHashMap::new(),
            dropped: Some((dropped, position)),
        }
    }

    fn aggregate(&self, call: &ast::AggCall, scope: &Scope) -> PplResult<AggregateExpr> {
        let position = call.span.start;
        let def = self.functions.lookup(&call.function).ok_or_else(|| {
            error(format!("unknown function `{}`", call.function), position)
        })?;
        let FunctionKind::Aggregate(func) = def.kind else {
            return Err(error(
                format!("`{}` is not an aggregate function", call.function),
                position,
            ));
        };
        if !def.arity.accepts(call.args.len()) {
            return Err(error(
                format!(
                    "{}() expects {} argument(s), got {}",
                    call.function,
                    def.arity,
                    call.args.len()
                ),
                position,
            ));
        }
        let arg = match call.args.first() {
            Some(a) => Some(self.expr(a, scope)?),
            None => None,
        };
        let data_type = func
            .return_type(arg.as_ref().map(|(_, t)| t))
            .map_err(|e| error(e, position))?;
        let name = match &call.alias {
            Some(alias) => alias.name.clone(),
            None if call.args.is_empty() => func.name().to_string(),
            None => {
                let args: Vec<String> = call.args.iter().map(|a| a.to_string()).collect();
                format!("{}({})", call.function.to_ascii_lowercase(), args.join(", "))
            }
        };
        Ok(AggregateExpr {
            func,
            arg: arg.map(|(e, _)| e),
            name,
            data_type,
        })
    }

    fn lookup(
        &self,
        c: &ast::LookupCommand,
        scope: &mut Scope,
        out: &mut Vec<TypedCommand>,
    ) -> PplResult<()> {
        let right = self.source(&c.source)?;
        let right_scope = Scope::from_schema(&right.schema);
        let (key, key_type) = right_scope.resolve(&c.key)?;
        let local_ident = c.local_key.as_ref().unwrap_or(&c.key);
        let (local, local_type) = scope.resolve(local_ident)?;
        check_comparable(BinaryOp::Eq, &local_type, &key_type)
            .map_err(|e| error(e, c.span.start))?;

        let outputs: Vec<String> = if c.outputs.is_empty() {
            right_scope.names().into_iter().filter(|n| *n != key).collect()
        } else {
            let mut outputs = Vec::new();
            for ident in &c.outputs {
                outputs.push(right_scope.resolve(ident)?.0);
            }
            outputs
        };
        for name in &outputs {
            if scope.contains(name) {
                return Err(error(
                    format!("lookup output field `{name}` already exists"),
                    c.span.start,
                ));
            }
        }

        let key_alias = format!("{}.{}", c.source.name, key);
        let mut right_items = vec![ProjectItem::renamed(key.clone(), key_alias.clone())];
        right_items.extend(outputs.iter().cloned().map(ProjectItem::keep));

        let mut final_items: Vec<ProjectItem> =
            scope.names().into_iter().map(ProjectItem::keep).collect();
        final_items.extend(outputs.iter().cloned().map(ProjectItem::keep));

        out.push(TypedCommand::Join {
            join_type: JoinType::Left,
            right,
            right_items: Some(right_items),
            on: Expr::binary(Expr::Column(local), BinaryOp::Eq, Expr::Column(key_alias)),
        });
        out.push(TypedCommand::Project(final_items));

        for name in outputs {
            let t = right_scope.get(&name).cloned().unwrap_or(DataType::Null);
            scope.upsert(&name, t);
        }
        Ok(())
    }

    fn predicate(&self, expr: &ast::Expr, scope: &Scope) -> PplResult<Expr> {
        let (typed, data_type) = self.expr(expr, scope)?;
        if !matches!(data_type, DataType::Boolean | DataType::Null) {
            return Err(error(
                format!("filter condition must be boolean, got {data_type}"),
                expr.span().start,
            ));
        }
        Ok(typed)
    }

    fn expr(&self, expr: &ast::Expr, scope: &Scope) -> PplResult<(Expr, DataType)> {
        match expr {
            ast::Expr::Field(ident) => {
                let (name, t) = scope.resolve(ident)?;
                Ok((Expr::Column(name), t))
            }
            ast::Expr::Literal { value, .. } => Ok((Expr::Literal(value.clone()), value.data_type())),
            ast::Expr::Unary { op, operand, span } => {
                let (inner, t) = self.expr(operand, scope)?;
                let ok = match op {
                    UnaryOp::Not => matches!(t, DataType::Boolean | DataType::Null),
                    UnaryOp::Neg => is_numeric(&t) || t == DataType::Null,
                };
                if !ok {
                    return Err(error(
                        format!("operator {op:?} cannot be applied to {t}"),
                        span.start,
                    ));
                }
                let result = match op {
                    UnaryOp::Not => DataType::Boolean,
                    UnaryOp::Neg => t,
                };
                Ok((
                    Expr::Unary {
                        op: *op,
                        expr: Box::new(inner),
                    },
                    result,
                ))
            }
            ast::Expr::Binary {
                op,
                left,
                right,
                span,
            } => {
                let (l, lt) = self.expr(left, scope)?;
                let (r, rt) = self.expr(right, scope)?;
                let result = binary_type(*op, &lt, &rt).map_err(|e| error(e, span.start))?;
                Ok((Expr::binary(l, *op, r), result))
            }
            ast::Expr::Call { name, args, span } => {
                let def = self
                    .functions
                    .lookup(name)
                    .ok_or_else(|| error(format!("unknown function `{name}`"), span.start))?;
                let FunctionKind::Scalar(func) = def.kind else {
                    return Err(error(
                        format!("aggregate function `{name}` is only allowed in stats"),
                        span.start,
                    ));
                };
                if !def.arity.accepts(args.len()) {
                    return Err(error(
                        format!("{name}() expects {} argument(s), got {}", def.arity, args.len()),
                        span.start,
                    ));
                }
                let mut typed_args = Vec::with_capacity(args.len());
                let mut arg_types = Vec::with_capacity(args.len());
                for arg in args {
                    let (e, t) = self.expr(arg, scope)?;
                    typed_args.push(e);
                    arg_types.push(t);
                }
                let result = func
                    .return_type(&arg_types)
                    .map_err(|e| error(e, span.start))?;
                Ok((
                    Expr::Function {
                        func,
                        args: typed_args,
                    },
                    result,
                ))
            }
        }
    }
}

/// Combined scope of a join plus the renames applied to the right input.
fn join_scope(
    left: &Scope,
    left_source: &str,
    alias: &str,
    right: &SourceRef,
) -> (Option<Vec<ProjectItem>>, Scope) {
    let mut combined = left.clone();
    combined.dropped = None;
    for (name, _) in &left.fields {
        let qualified = format!("{left_source}.{name}");
        if !left.contains(&qualified) {
            combined.aliases.entry(qualified).or_insert_with(|| name.clone());
        }
    }

    let mut items = Vec::new();
    let mut renamed = false;
    for field in right.schema.fields() {
        let name = field.name();
        let qualified = format!("{alias}.{name}");
        let output = if combined.contains(name) {
            renamed = true;
            qualified.clone()
        } else {
            name.clone()
        };
        if output != qualified {
            combined.aliases.insert(qualified, output.clone());
        }
        combined.fields.push((output.clone(), field.data_type().clone()));
        items.push(ProjectItem::renamed(name.clone(), output));
    }
    (renamed.then_some(items), combined)
}

fn check_comparable(op: BinaryOp, left: &DataType, right: &DataType) -> Result<(), String> {
    let ok = match (left, right) {
        (DataType::Null, _) | (_, DataType::Null) => true,
        (a, b) if is_numeric(a) && is_numeric(b) => true,
        (DataType::Utf8, DataType::Utf8) => true,
        (DataType::Boolean, DataType::Boolean) => matches!(op, BinaryOp::Eq | BinaryOp::NotEq),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("cannot compare {left} with {right} using '{op}'"))
    }
}

fn binary_type(op: BinaryOp, left: &DataType, right: &DataType) -> Result<DataType, String> {
    if op.is_logical() {
        for t in [left, right] {
            if !matches!(t, DataType::Boolean | DataType::Null) {
                return Err(format!("operator {op} expects boolean operands, got {t}"));
            }
        }
        return Ok(DataType::Boolean);
    }
    if op.is_comparison() {
        check_comparable(op, left, right)?;
        return Ok(DataType::Boolean);
    }
    for t in [left, right] {
        if !(is_numeric(t) || *t == DataType::Null) {
            return Err(format!("operator {op} expects numeric operands, got {t}"));
        }
    }
    Ok(promote(left, right))
}
