//! Physical Planner: LogicalPlan → PhysicalPlan
//!
//! Walks the optimized plan bottom-up and folds every node it can into the
//! backend request of the scan below it. A node is remote only when it is
//! translatable and its input is remote; the first node that is not turns
//! the fragment into a `RemoteScan` leaf and everything above it runs on
//! the coordinator.

use super::translate::{PushDownError, translate_predicate};
use super::types::{
    AggregateExpr, Assignment, BuildSide, Expr, LogicalPlan, ProjectItem, SortExpr,
    conjunction, split_conjunction,
};
use crate::backend::{
    AggregationSpec, BucketOrder, MetricKind, MetricSpec, QueryDsl, SearchRequest, SortSpec,
    TermsLevel,
};
use crate::config::PushdownConfig;
use crate::ppl::analyzer::functions::AggregateFunction;
use crate::ppl::ast::{BinaryOp, JoinType};
use crate::schema::field_names;
use arrow::datatypes::SchemaRef;
use serde::Serialize;

/// Where a physical node runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Placement {
    Remote,
    Local,
}

/// Shape of the rows a remote scan produces.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutput {
    /// One row per hit, columns looked up by schema field name
    Hits,
    /// Flattened buckets: one key per terms level, then metrics by name
    Buckets {
        group_by: Vec<String>,
        metrics: Vec<String>,
    },
}

/// One push-down classification, reported by explain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushdownDecision {
    pub operator: String,
    pub pushed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Command classes and whether they can ever run in the backend.
pub const COMMAND_PUSHDOWN: &[(&str, bool)] = &[
    ("search", true),
    ("where", true),
    ("fields", true),
    ("stats", true),
    ("sort", true),
    ("head", true),
    ("top", true),
    ("eval", false),
    ("rename", false),
    ("parse", false),
    ("grok", false),
    ("join", false),
    ("lookup", false),
];

/// 물리 플랜
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalPlan {
    /// Maximal remote subtree, executed as backend requests
    RemoteScan {
        request: SearchRequest,
        output: RemoteOutput,
        schema: SchemaRef,
        /// Logical operators folded into the request, bottom-up
        folded: Vec<String>,
    },
    Filter {
        input: Box<PhysicalPlan>,
        predicate: Expr,
    },
    Project {
        input: Box<PhysicalPlan>,
        items: Vec<ProjectItem>,
        schema: SchemaRef,
    },
    Eval {
        input: Box<PhysicalPlan>,
        assignments: Vec<Assignment>,
        schema: SchemaRef,
    },
    Parse {
        input: Box<PhysicalPlan>,
        field: String,
        pattern: String,
        outputs: Vec<String>,
        schema: SchemaRef,
    },
    HashAggregate {
        input: Box<PhysicalPlan>,
        group_by: Vec<String>,
        aggregates: Vec<AggregateExpr>,
        schema: SchemaRef,
    },
    Sort {
        input: Box<PhysicalPlan>,
        keys: Vec<SortExpr>,
    },
    Limit {
        input: Box<PhysicalPlan>,
        count: usize,
        offset: usize,
    },
    HashJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        join_type: JoinType,
        left_keys: Vec<String>,
        right_keys: Vec<String>,
        residual: Option<Expr>,
        build: BuildSide,
        schema: SchemaRef,
    },
    NestedLoopJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        join_type: JoinType,
        condition: Expr,
        schema: SchemaRef,
    },
}

impl PhysicalPlan {
    pub fn schema(&self) -> SchemaRef {
        match self {
            PhysicalPlan::RemoteScan { schema, .. }
            | PhysicalPlan::Project { schema, .. }
            | PhysicalPlan::Eval { schema, .. }
            | PhysicalPlan::Parse { schema, .. }
            | PhysicalPlan::HashAggregate { schema, .. }
            | PhysicalPlan::HashJoin { schema, .. }
            | PhysicalPlan::NestedLoopJoin { schema, .. } => schema.clone(),
            PhysicalPlan::Filter { input, .. }
            | PhysicalPlan::Sort { input, .. }
            | PhysicalPlan::Limit { input, .. } => input.schema(),
        }
    }

    pub fn placement(&self) -> Placement {
        match self {
            PhysicalPlan::RemoteScan { .. } => Placement::Remote,
            _ => Placement::Local,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PhysicalPlan::RemoteScan { .. } => "RemoteScan",
            PhysicalPlan::Filter { .. } => "Filter",
            PhysicalPlan::Project { .. } => "Project",
            PhysicalPlan::Eval { .. } => "Eval",
            PhysicalPlan::Parse { .. } => "Parse",
            PhysicalPlan::HashAggregate { .. } => "HashAggregate",
            PhysicalPlan::Sort { .. } => "Sort",
            PhysicalPlan::Limit { .. } => "Limit",
            PhysicalPlan::HashJoin { .. } => "HashJoin",
            PhysicalPlan::NestedLoopJoin { .. } => "NestedLoopJoin",
        }
    }

    pub fn inputs(&self) -> Vec<&PhysicalPlan> {
        match self {
            PhysicalPlan::RemoteScan { .. } => vec![],
            PhysicalPlan::Filter { input, .. }
            | PhysicalPlan::Project { input, .. }
            | PhysicalPlan::Eval { input, .. }
            | PhysicalPlan::Parse { input, .. }
            | PhysicalPlan::HashAggregate { input, .. }
            | PhysicalPlan::Sort { input, .. }
            | PhysicalPlan::Limit { input, .. } => vec![input],
            PhysicalPlan::HashJoin { left, right, .. }
            | PhysicalPlan::NestedLoopJoin { left, right, .. } => vec![left, right],
        }
    }

    /// Every remote scan in the tree, left to right.
    pub fn remote_scans(&self) -> Vec<&PhysicalPlan> {
        let mut out = Vec::new();
        fn walk<'a>(plan: &'a PhysicalPlan, out: &mut Vec<&'a PhysicalPlan>) {
            if plan.placement() == Placement::Remote {
                out.push(plan);
            }
            for input in plan.inputs() {
                walk(input, out);
            }
        }
        walk(self, &mut out);
        out
    }

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

    fn describe(&self) -> String {
        match self {
            PhysicalPlan::RemoteScan {
                request, folded, ..
            } => {
                let dsl = serde_json::to_string(&request.query).unwrap_or_default();
                let mut s = format!("RemoteScan: {} query={dsl}", request.index);
                if let Some(columns) = &request.columns {
                    s.push_str(&format!(" columns=[{}]", columns.join(", ")));
                }
                if let Some(aggregation) = &request.aggregation {
                    let levels: Vec<&str> =
                        aggregation.levels.iter().map(|l| l.field.as_str()).collect();
                    s.push_str(&format!(" buckets=[{}]", levels.join(", ")));
                }
                if !request.sort.is_empty() {
                    let keys: Vec<String> = request
                        .sort
                        .iter()
                        .map(|k| format!("{} {}", k.field, if k.descending { "DESC" } else { "ASC" }))
                        .collect();
                    s.push_str(&format!(" sort=[{}]", keys.join(", ")));
                }
                if let Some(size) = request.size {
                    s.push_str(&format!(" from={} size={size}", request.from));
                }
                s.push_str(&format!(" folded=[{}]", folded.join(", ")));
                s
            }
            PhysicalPlan::Filter { predicate, .. } => format!("Filter: {predicate}"),
            PhysicalPlan::Project { items, .. } => {
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
            PhysicalPlan::Eval { assignments, .. } => {
                let cols: Vec<String> = assignments
                    .iter()
                    .map(|a| format!("{} = {}", a.name, a.expr))
                    .collect();
                format!("Eval: {}", cols.join(", "))
            }
            PhysicalPlan::Parse { field, outputs, .. } => {
                format!("Parse: {field} -> [{}]", outputs.join(", "))
            }
            PhysicalPlan::HashAggregate {
                group_by,
                aggregates,
                ..
            } => {
                let aggs: Vec<&str> = aggregates.iter().map(|a| a.name.as_str()).collect();
                format!("HashAggregate: [{}] by [{}]", aggs.join(", "), group_by.join(", "))
            }
            PhysicalPlan::Sort { keys, .. } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|k| format!("{} {}", k.column, if k.descending { "DESC" } else { "ASC" }))
                    .collect();
                format!("Sort: {}", keys.join(", "))
            }
            PhysicalPlan::Limit { count, offset, .. } => format!("Limit: {count} offset {offset}"),
            PhysicalPlan::HashJoin {
                join_type,
                left_keys,
                right_keys,
                residual,
                build,
                ..
            } => {
                let mut s = format!(
                    "HashJoin: {join_type} [{}] = [{}] build={build:?}",
                    left_keys.join(", "),
                    right_keys.join(", ")
                );
                if let Some(residual) = residual {
                    s.push_str(&format!(" residual={residual}"));
                }
                s
            }
            PhysicalPlan::NestedLoopJoin {
                join_type,
                condition,
                ..
            } => format!("NestedLoopJoin: {join_type} on {condition}"),
        }
    }
}

/// Backend request under construction.
struct Fragment {
    index: String,
    query: QueryDsl,
    columns: Option<Vec<String>>,
    aggregation: Option<AggregationSpec>,
    sort: Vec<SortSpec>,
    from: usize,
    size: Option<usize>,
    limited: bool,
    folded: Vec<String>,
    schema: SchemaRef,
}

impl Fragment {
    fn into_plan(self, page_size: usize) -> PhysicalPlan {
        let output = match &self.aggregation {
            None => RemoteOutput::Hits,
            Some(spec) => RemoteOutput::Buckets {
                group_by: spec.levels.iter().map(|l| l.field.clone()).collect(),
                metrics: spec.metrics.iter().map(|m| m.name.clone()).collect(),
            },
        };
        let request = SearchRequest {
            index: self.index,
            query: self.query,
            columns: self.columns,
            aggregation: self.aggregation,
            sort: self.sort,
            from: self.from,
            size: self.size,
            page_size,
            cursor: None,
            timeout_ms: None,
        };
        PhysicalPlan::RemoteScan {
            request,
            output,
            schema: self.schema,
            folded: self.folded,
        }
    }

    /// The single terms level of a one-key aggregation.
    fn single_level(&mut self) -> Option<&mut TermsLevel> {
        match &mut self.aggregation {
            Some(spec) if spec.levels.len() == 1 => spec.levels.first_mut(),
            _ => None,
        }
    }
}

enum Lowered {
    Remote(Fragment),
    Local(PhysicalPlan),
}

/// 물리 플래너
pub struct PhysicalPlanner {
    config: PushdownConfig,
    page_size: usize,
}

impl PhysicalPlanner {
    pub fn new(config: PushdownConfig, page_size: usize) -> Self {
        Self { config, page_size }
    }

    /// Lowers `plan`. Untranslatable nodes degrade to local execution, so
    /// this never fails.
    pub fn plan(&self, plan: LogicalPlan) -> PhysicalPlan {
        self.plan_explained(plan).0
    }

    /// Lowers `plan` and reports every push-down decision taken.
    pub fn plan_explained(&self, plan: LogicalPlan) -> (PhysicalPlan, Vec<PushdownDecision>) {
        let mut decisions = Vec::new();
        let physical = self.finish(self.lower(plan, &mut decisions));
        (physical, decisions)
    }

    fn finish(&self, lowered: Lowered) -> PhysicalPlan {
        match lowered {
            Lowered::Remote(fragment) => fragment.into_plan(self.page_size),
            Lowered::Local(plan) => plan,
        }
    }

    fn lower(&self, plan: LogicalPlan, decisions: &mut Vec<PushdownDecision>) -> Lowered {
        let schema = plan.schema();
        match plan {
            LogicalPlan::Scan {
                source,
                table_schema,
                columns,
                filter,
                ..
            } => self.lower_scan(source, table_schema, columns, filter, schema, decisions),

            LogicalPlan::Filter { input, predicate } => {
                let lowered = self.lower(*input, decisions);
                let lowered = match lowered {
                    Lowered::Remote(mut fragment) => {
                        match self.absorb_filter(&mut fragment, &predicate) {
                            Ok(()) => {
                                record(decisions, "Filter", Ok(()));
                                return Lowered::Remote(fragment);
                            }
                            Err(e) => {
                                record(decisions, "Filter", Err(&e));
                                Lowered::Remote(fragment)
                            }
                        }
                    }
                    local => {
                        record(decisions, "Filter", Err(&input_local()));
                        local
                    }
                };
                Lowered::Local(PhysicalPlan::Filter {
                    input: Box::new(self.finish(lowered)),
                    predicate,
                })
            }

            LogicalPlan::Project { input, items } => {
                let lowered = self.lower(*input, decisions);
                let lowered = match lowered {
                    Lowered::Remote(mut fragment) => {
                        match self.absorb_project(&mut fragment, &items, &schema) {
                            Ok(()) => {
                                record(decisions, "Project", Ok(()));
                                return Lowered::Remote(fragment);
                            }
                            Err(e) => {
                                record(decisions, "Project", Err(&e));
                                Lowered::Remote(fragment)
                            }
                        }
                    }
                    local => {
                        record(decisions, "Project", Err(&input_local()));
                        local
                    }
                };
                Lowered::Local(PhysicalPlan::Project {
                    input: Box::new(self.finish(lowered)),
                    items,
                    schema,
                })
            }

            LogicalPlan::Eval { input, assignments } => {
                let input = self.finish(self.lower(*input, decisions));
                record(decisions, "Eval", Err(&PushDownError::new("eval is not pushable")));
                Lowered::Local(PhysicalPlan::Eval {
                    input: Box::new(input),
                    assignments,
                    schema,
                })
            }

            LogicalPlan::Parse {
                input,
                field,
                pattern,
                outputs,
            } => {
                let input = self.finish(self.lower(*input, decisions));
                record(decisions, "Parse", Err(&PushDownError::new("parse is not pushable")));
                Lowered::Local(PhysicalPlan::Parse {
                    input: Box::new(input),
                    field,
                    pattern,
                    outputs,
                    schema,
                })
            }

            LogicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
                pushdown,
            } => {
                let lowered = self.lower(*input, decisions);
                let lowered = match lowered {
                    Lowered::Remote(mut fragment) => {
                        match self.absorb_aggregate(&mut fragment, &group_by, &aggregates, pushdown, &schema) {
                            Ok(()) => {
                                record(decisions, "Aggregate", Ok(()));
                                return Lowered::Remote(fragment);
                            }
                            Err(e) => {
                                record(decisions, "Aggregate", Err(&e));
                                Lowered::Remote(fragment)
                            }
                        }
                    }
                    local => {
                        record(decisions, "Aggregate", Err(&input_local()));
                        local
                    }
                };
                Lowered::Local(PhysicalPlan::HashAggregate {
                    input: Box::new(self.finish(lowered)),
                    group_by,
                    aggregates,
                    schema,
                })
            }

            LogicalPlan::Sort { input, keys } => {
                let lowered = self.lower(*input, decisions);
                let lowered = match lowered {
                    Lowered::Remote(mut fragment) => match self.absorb_sort(&mut fragment, &keys) {
                        Ok(()) => {
                            record(decisions, "Sort", Ok(()));
                            return Lowered::Remote(fragment);
                        }
                        Err(e) => {
                            record(decisions, "Sort", Err(&e));
                            Lowered::Remote(fragment)
                        }
                    },
                    local => {
                        record(decisions, "Sort", Err(&input_local()));
                        local
                    }
                };
                Lowered::Local(PhysicalPlan::Sort {
                    input: Box::new(self.finish(lowered)),
                    keys,
                })
            }

            LogicalPlan::Limit {
                input,
                count,
                offset,
            } => {
                let lowered = self.lower(*input, decisions);
                let lowered = match lowered {
                    Lowered::Remote(mut fragment) => {
                        match self.absorb_limit(&mut fragment, count, offset) {
                            Ok(()) => {
                                record(decisions, "Limit", Ok(()));
                                return Lowered::Remote(fragment);
                            }
                            Err(e) => {
                                record(decisions, "Limit", Err(&e));
                                Lowered::Remote(fragment)
                            }
                        }
                    }
                    local => {
                        record(decisions, "Limit", Err(&input_local()));
                        local
                    }
                };
                Lowered::Local(PhysicalPlan::Limit {
                    input: Box::new(self.finish(lowered)),
                    count,
                    offset,
                })
            }

            LogicalPlan::Join {
                left,
                right,
                join_type,
                on,
                build_side,
            } => {
                let left_schema = left.schema();
                let right_schema = right.schema();
                let left = self.finish(self.lower(*left, decisions));
                let right = self.finish(self.lower(*right, decisions));
                record(decisions, "Join", Err(&PushDownError::new("join is not pushable")));

                let left_names = field_names(&left_schema);
                let right_names = field_names(&right_schema);
                let mut left_keys = Vec::new();
                let mut right_keys = Vec::new();
                let mut residual = Vec::new();
                for conjunct in split_conjunction(on.clone()) {
                    match equi_key(&conjunct, &left_names, &right_names) {
                        Some((l, r)) => {
                            left_keys.push(l);
                            right_keys.push(r);
                        }
                        None => residual.push(conjunct),
                    }
                }

                if left_keys.is_empty() {
                    Lowered::Local(PhysicalPlan::NestedLoopJoin {
                        left: Box::new(left),
                        right: Box::new(right),
                        join_type,
                        condition: on,
                        schema,
                    })
                } else {
                    Lowered::Local(PhysicalPlan::HashJoin {
                        left: Box::new(left),
                        right: Box::new(right),
                        join_type,
                        left_keys,
                        right_keys,
                        residual: conjunction(residual),
                        build: build_side,
                        schema,
                    })
                }
            }
        }
    }

    fn lower_scan(
        &self,
        source: String,
        table_schema: SchemaRef,
        columns: Option<Vec<String>>,
        filter: Option<Expr>,
        schema: SchemaRef,
        decisions: &mut Vec<PushdownDecision>,
    ) -> Lowered {
        let narrow = if self.config.projection { None } else { columns.clone() };
        let mut fragment = Fragment {
            index: source,
            query: QueryDsl::MatchAll,
            columns: if self.config.projection { columns } else { None },
            aggregation: None,
            sort: Vec::new(),
            from: 0,
            size: None,
            limited: false,
            folded: vec!["Scan".to_string()],
            schema: if self.config.projection {
                schema
            } else {
                table_schema
            },
        };
        record(decisions, "Scan", Ok(()));

        let mut residual = Vec::new();
        if let Some(filter) = filter {
            let mut pushed = false;
            for conjunct in split_conjunction(filter) {
                let translated = if self.config.filter {
                    translate_predicate(&conjunct)
                } else {
                    Err(PushDownError::new("filter push-down disabled"))
                };
                match translated {
                    Ok(dsl) => {
                        fragment.query = std::mem::replace(&mut fragment.query, QueryDsl::MatchAll).and(dsl);
                        pushed = true;
                    }
                    Err(e) => {
                        tracing::info!(predicate = %conjunct, reason = %e, "scan predicate kept local");
                        residual.push(conjunct);
                    }
                }
            }
            if pushed {
                fragment.folded.push("Filter".to_string());
            }
            let kept = PushDownError::new(format!("{} conjunct(s) kept local", residual.len()));
            record(
                decisions,
                "Scan filter",
                if residual.is_empty() { Ok(()) } else { Err(&kept) },
            );
        }

        if residual.is_empty() && narrow.is_none() {
            return Lowered::Remote(fragment);
        }

        let mut plan = fragment.into_plan(self.page_size);
        if let Some(predicate) = conjunction(residual) {
            plan = PhysicalPlan::Filter {
                input: Box::new(plan),
                predicate,
            };
        }
        if let Some(columns) = narrow {
            let table = plan.schema();
            let items: Vec<ProjectItem> = table
                .fields()
                .iter()
                .filter(|f| columns.contains(f.name()))
                .map(|f| ProjectItem::keep(f.name().clone()))
                .collect();
            plan = PhysicalPlan::Project {
                input: Box::new(plan),
                items,
                schema: table_subset(&table, &columns),
            };
        }
        Lowered::Local(plan)
    }

    fn absorb_filter(&self, fragment: &mut Fragment, predicate: &Expr) -> Result<(), PushDownError> {
        if !self.config.filter {
            return Err(PushDownError::new("filter push-down disabled"));
        }
        if fragment.aggregation.is_some() {
            return Err(PushDownError::new("filter above a bucket aggregation"));
        }
        if fragment.limited {
            return Err(PushDownError::new("filter above a size limit"));
        }
        let dsl = translate_predicate(predicate)?;
        fragment.query = std::mem::replace(&mut fragment.query, QueryDsl::MatchAll).and(dsl);
        fragment.folded.push("Filter".to_string());
        Ok(())
    }

    fn absorb_project(
        &self,
        fragment: &mut Fragment,
        items: &[ProjectItem],
        schema: &SchemaRef,
    ) -> Result<(), PushDownError> {
        if !self.config.projection {
            return Err(PushDownError::new("projection push-down disabled"));
        }
        if fragment.aggregation.is_some() {
            return Err(PushDownError::new("projection above a bucket aggregation"));
        }
        if let Some(item) = items.iter().find(|i| i.is_rename()) {
            return Err(PushDownError::new(format!(
                "rename {} -> {} runs locally",
                item.source, item.name
            )));
        }
        fragment.columns = Some(items.iter().map(|i| i.name.clone()).collect());
        fragment.schema = schema.clone();
        fragment.folded.push("Project".to_string());
        Ok(())
    }

    fn absorb_aggregate(
        &self,
        fragment: &mut Fragment,
        group_by: &[String],
        aggregates: &[AggregateExpr],
        pushdown: bool,
        schema: &SchemaRef,
    ) -> Result<(), PushDownError> {
        if !self.config.aggregation {
            return Err(PushDownError::new("aggregation push-down disabled"));
        }
        if !pushdown {
            return Err(PushDownError::new("aggregate not eligible for bucket aggregation"));
        }
        if fragment.aggregation.is_some() || !fragment.sort.is_empty() || fragment.limited {
            return Err(PushDownError::new("aggregate above a sort or size limit"));
        }
        let mut metrics = Vec::with_capacity(aggregates.len());
        for aggregate in aggregates {
            let kind = metric_kind(aggregate.func).ok_or_else(|| {
                PushDownError::new(format!("{}() has no exact backend metric", aggregate.func))
            })?;
            let field = match &aggregate.arg {
                None => None,
                Some(arg) => Some(
                    arg.as_column()
                        .ok_or_else(|| PushDownError::new("metric over a computed value"))?
                        .to_string(),
                ),
            };
            metrics.push(MetricSpec {
                name: aggregate.name.clone(),
                kind,
                field,
            });
        }
        fragment.aggregation = Some(AggregationSpec {
            levels: group_by
                .iter()
                .map(|field| TermsLevel {
                    field: field.clone(),
                    missing_bucket: true,
                    size: None,
                    order: None,
                })
                .collect(),
            metrics,
        });
        fragment.schema = schema.clone();
        fragment.folded.push("Aggregate".to_string());
        Ok(())
    }

    fn absorb_sort(&self, fragment: &mut Fragment, keys: &[SortExpr]) -> Result<(), PushDownError> {
        if !self.config.sort {
            return Err(PushDownError::new("sort push-down disabled"));
        }
        if fragment.limited {
            return Err(PushDownError::new("sort above a size limit"));
        }
        if fragment.aggregation.is_none() {
            let mut sort: Vec<SortSpec> = keys
                .iter()
                .map(|k| SortSpec {
                    field: k.column.clone(),
                    descending: k.descending,
                })
                .collect();
            sort.append(&mut fragment.sort);
            fragment.sort = sort;
            fragment.folded.push("Sort".to_string());
            return Ok(());
        }

        let [key] = keys else {
            return Err(PushDownError::new("bucket sort needs exactly one key"));
        };
        let count_metric = fragment.aggregation.as_ref().is_some_and(|spec| {
            spec.metrics
                .iter()
                .any(|m| m.name == key.column && m.kind == MetricKind::Count && m.field.is_none())
        });
        let Some(level) = fragment.single_level() else {
            return Err(PushDownError::new("bucket sort over several terms levels"));
        };
        if level.order.is_some() {
            return Err(PushDownError::new("buckets already ordered"));
        }
        level.order = Some(if level.field == key.column {
            if key.descending {
                BucketOrder::KeyDesc
            } else {
                BucketOrder::KeyAsc
            }
        } else if count_metric {
            if key.descending {
                BucketOrder::CountDesc
            } else {
                BucketOrder::CountAsc
            }
        } else {
            return Err(PushDownError::new(format!(
                "buckets cannot be ordered by `{}`",
                key.column
            )));
        });
        fragment.folded.push("Sort".to_string());
        Ok(())
    }

    fn absorb_limit(&self, fragment: &mut Fragment, count: usize, offset: usize) -> Result<(), PushDownError> {
        if !self.config.limit {
            return Err(PushDownError::new("limit push-down disabled"));
        }
        if fragment.limited {
            return Err(PushDownError::new("only the first limit is pushed"));
        }
        if fragment.aggregation.is_none() {
            fragment.from = offset;
            fragment.size = Some(count);
        } else {
            if offset > 0 {
                return Err(PushDownError::new("bucket limit with an offset"));
            }
            let Some(level) = fragment.single_level() else {
                return Err(PushDownError::new("bucket limit over several terms levels"));
            };
            level.size = Some(count);
        }
        fragment.limited = true;
        fragment.folded.push("Limit".to_string());
        Ok(())
    }
}

fn input_local() -> PushDownError {
    PushDownError::new("input runs locally")
}

fn record(decisions: &mut Vec<PushdownDecision>, operator: &str, outcome: Result<(), &PushDownError>) {
    if let Err(e) = outcome {
        tracing::info!(operator, reason = %e, "push-down degraded to local execution");
    }
    decisions.push(PushdownDecision {
        operator: operator.to_string(),
        pushed: outcome.is_ok(),
        reason: outcome.err().map(|e| e.reason.clone()),
    });
}

fn metric_kind(func: AggregateFunction) -> Option<MetricKind> {
    match func {
        AggregateFunction::Count => Some(MetricKind::Count),
        AggregateFunction::Sum => Some(MetricKind::Sum),
        AggregateFunction::Avg => Some(MetricKind::Avg),
        AggregateFunction::Min => Some(MetricKind::Min),
        AggregateFunction::Max => Some(MetricKind::Max),
        AggregateFunction::DistinctCount => None,
    }
}

/// `left = right` with one column from each join input, in (left, right)
/// order.
fn equi_key(expr: &Expr, left: &[String], right: &[String]) -> Option<(String, String)> {
    let Expr::Binary {
        op: BinaryOp::Eq,
        left: a,
        right: b,
    } = expr
    else {
        return None;
    };
    let (a, b) = (a.as_column()?, b.as_column()?);
    let is_left = |n: &str| left.iter().any(|c| c == n);
    let is_right = |n: &str| right.iter().any(|c| c == n);
    if is_left(a) && is_right(b) {
        Some((a.to_string(), b.to_string()))
    } else if is_left(b) && is_right(a) {
        Some((b.to_string(), a.to_string()))
    } else {
        None
    }
}

fn table_subset(table: &SchemaRef, columns: &[String]) -> SchemaRef {
    let fields: Vec<arrow::datatypes::Field> = table
        .fields()
        .iter()
        .filter(|f| columns.contains(f.name()))
        .map(|f| f.as_ref().clone())
        .collect();
    std::sync::Arc::new(arrow::datatypes::Schema::new(fields))
}
