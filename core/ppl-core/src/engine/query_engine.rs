//! QueryEngine: compile, execute and explain entry points

use super::explain::Explain;
use super::plan::{CompiledQuery, PlanCache};
use super::result::RowStream;
use crate::backend::SearchBackend;
use crate::config::EngineConfig;
use crate::error::PplResult;
use crate::logging::StageTimer;
use crate::ppl::analyzer::analyze;
use crate::ppl::analyzer::functions::FunctionRegistry;
use crate::ppl::executor::{ExecutionContext, build_operator};
use crate::ppl::lexer::tokenize;
use crate::ppl::optimizer::QueryOptimizer;
use crate::ppl::parser::Parser;
use crate::ppl::planner::{LogicalPlanner, PhysicalPlanner};
use crate::schema::SchemaProvider;
use std::sync::Arc;

/// PPL 쿼리 엔진
///
/// 쿼리 텍스트를 컴파일(lex → parse → analyze → plan → optimize → physical
/// plan)하고, 컴파일된 계획을 백엔드에 대해 실행합니다.
///
/// # 예제
///
/// ```rust
/// use ppl_core::{EngineConfig, MemoryBackend, QueryEngine};
/// use arrow::datatypes::{DataType, Field, Schema};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # fn main() -> ppl_core::PplResult<()> {
/// let schema = Schema::new(vec![
///     Field::new("host", DataType::Utf8, true),
///     Field::new("status", DataType::Int64, true),
/// ]);
/// let backend = Arc::new(MemoryBackend::new().with_index(
///     "logs",
///     schema,
///     vec![json!({"host": "a", "status": 500}), json!({"host": "b", "status": 200})],
/// )?);
/// let engine = QueryEngine::new(backend.clone(), backend, EngineConfig::default())?;
///
/// let result = engine
///     .execute("source=logs | where status = 500 | fields host")?
///     .collect_result()?;
/// assert_eq!(result.len(), 1);
/// # Ok(())
/// # }
/// ```
pub struct QueryEngine {
    backend: Arc<dyn SearchBackend>,
    schemas: Arc<dyn SchemaProvider>,
    config: EngineConfig,
    functions: FunctionRegistry,
    /// Compiled plans keyed by query text
    plans: PlanCache,
}

impl QueryEngine {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        schemas: Arc<dyn SchemaProvider>,
        config: EngineConfig,
    ) -> PplResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            schemas,
            plans: PlanCache::new(config.plan_cache_size),
            functions: FunctionRegistry::builtin(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plans
    }

    /// Compiles `text` into an executable plan. No backend call is made.
    pub fn compile(&self, text: &str) -> PplResult<Arc<CompiledQuery>> {
        if let Some(compiled) = self.plans.get(text) {
            tracing::debug!(query = text, "plan cache hit");
            return Ok(compiled);
        }

        let mut timer = StageTimer::start();
        let tokens = tokenize(text)?;
        timer.mark("lex");
        let query = Parser::new(tokens)
            .with_default_head(self.config.default_head_size)
            .parse_query()?;
        timer.mark("parse");
        let analyzed = analyze(&query, self.schemas.as_ref(), &self.functions)?;
        timer.mark("analyze");
        let logical = LogicalPlanner::new().build(&analyzed);
        timer.mark("logical_plan");
        let logical = QueryOptimizer::new()
            .with_max_passes(self.config.max_optimizer_passes)
            .optimize(logical)?;
        timer.mark("optimize");
        let (physical, decisions) =
            PhysicalPlanner::new(self.config.pushdown.clone(), self.config.page_size)
                .plan_explained(logical.clone());
        timer.mark("physical_plan");
        tracing::debug!(query = text, total_us = timer.total_us(), "query compiled");

        let commands = std::iter::once("search")
            .chain(query.commands.iter().map(|c| c.name()))
            .collect();
        let compiled = Arc::new(CompiledQuery {
            text: text.to_string(),
            commands,
            schema: physical.schema(),
            logical,
            physical,
            decisions,
        });
        self.plans.insert(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Compiles and starts executing `text`.
    pub fn execute(&self, text: &str) -> PplResult<RowStream> {
        let compiled = self.compile(text)?;
        self.execute_compiled(&compiled)
    }

    /// Starts one execution of a compiled plan. Rows are produced lazily as
    /// the stream is pulled.
    pub fn execute_compiled(&self, compiled: &CompiledQuery) -> PplResult<RowStream> {
        let ctx = Arc::new(ExecutionContext::new(&self.config));
        let root = build_operator(&compiled.physical, &ctx, &self.backend)?;
        Ok(RowStream::new(root, ctx, Arc::clone(&compiled.schema)))
    }

    pub fn explain(&self, text: &str) -> PplResult<Explain> {
        let compiled = self.compile(text)?;
        Ok(Explain::new(&compiled))
    }
}
