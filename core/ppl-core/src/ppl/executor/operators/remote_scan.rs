//! Remote Scan Operator: pages rows out of the search backend
//!
//! Hit requests are pulled page by page with the backend's cursor; each
//! request carries the time left before the query deadline. Aggregation
//! requests come back as one nested bucket tree, flattened into
//! `group keys ++ metrics` rows.

use crate::backend::{Bucket, SearchBackend, SearchRequest, SearchResponse};
use crate::error::{PplError, PplResult};
use crate::ppl::executor::context::ExecutionContext;
use crate::ppl::executor::operators::PhysicalOperator;
use crate::ppl::planner::physical::RemoteOutput;
use crate::value::{Row, ScalarValue};
use arrow::datatypes::{DataType, SchemaRef};
use std::collections::VecDeque;
use std::sync::Arc;

const NAME: &str = "RemoteScan";

#[derive(Debug, Clone, PartialEq)]
enum Paging {
    First,
    Next(String),
    Done,
}

/// 원격 스캔 연산자
pub struct RemoteScanOperator {
    backend: Arc<dyn SearchBackend>,
    ctx: Arc<ExecutionContext>,
    request: SearchRequest,
    output: RemoteOutput,
    schema: SchemaRef,
    /// Declared type of every output column
    types: Vec<DataType>,
    buffer: VecDeque<Row>,
    paging: Paging,
}

impl RemoteScanOperator {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        ctx: Arc<ExecutionContext>,
        request: SearchRequest,
        output: RemoteOutput,
        schema: SchemaRef,
    ) -> Self {
        let types = schema.fields().iter().map(|f| f.data_type().clone()).collect();
        Self {
            backend,
            ctx,
            request,
            output,
            schema,
            types,
            buffer: VecDeque::new(),
            paging: Paging::First,
        }
    }

    fn fetch(&mut self) -> PplResult<()> {
        let mut request = self.request.clone();
        request.cursor = match &self.paging {
            Paging::Next(cursor) => Some(cursor.clone()),
            _ => None,
        };
        request.timeout_ms = self.ctx.remaining().map(|d| d.as_millis() as u64);

        let response = self.backend.search(&request).map_err(|e| match e {
            PplError::Execution { cause, .. } => PplError::execution(NAME, cause),
            other => other,
        })?;
        tracing::trace!(
            index = %request.index,
            hits = response.hits.len(),
            total = response.total,
            "backend page received"
        );

        match &self.output {
            RemoteOutput::Hits => {
                self.paging = match &response.cursor {
                    Some(cursor) => Paging::Next(cursor.clone()),
                    None => Paging::Done,
                };
                self.push_hits(response);
            }
            RemoteOutput::Buckets { group_by, metrics } => {
                let root = response.aggregation.ok_or_else(|| {
                    PplError::execution(NAME, "backend returned no aggregation for a bucket request")
                })?;
                let mut rows = Vec::new();
                flatten(&root, group_by.len(), &mut Vec::new(), metrics, &self.types, &mut rows);
                self.buffer.extend(rows);
                self.paging = Paging::Done;
            }
        }
        Ok(())
    }

    fn push_hits(&mut self, response: SearchResponse) {
        for hit in response.hits {
            let row = self
                .schema
                .fields()
                .iter()
                .zip(&self.types)
                .map(|(field, data_type)| match hit.get(field.name()) {
                    Some(value) => ScalarValue::from_json(value, data_type),
                    None => ScalarValue::Null,
                })
                .collect();
            self.buffer.push_back(row);
        }
    }
}

/// Walks `levels` nested terms levels. `keys` holds the bucket keys of the
/// enclosing levels.
fn flatten(
    bucket: &Bucket,
    levels: usize,
    keys: &mut Vec<ScalarValue>,
    metrics: &[String],
    types: &[DataType],
    out: &mut Vec<Row>,
) {
    if keys.len() == levels {
        let mut row = keys.clone();
        for (offset, name) in metrics.iter().enumerate() {
            let data_type = &types[levels + offset];
            row.push(
                bucket
                    .metrics
                    .get(name)
                    .map(|v| ScalarValue::from_json(v, data_type))
                    .unwrap_or(ScalarValue::Null),
            );
        }
        out.push(row);
        return;
    }
    let data_type = &types[keys.len()];
    for child in &bucket.buckets {
        keys.push(ScalarValue::from_json(&child.key, data_type));
        flatten(child, levels, keys, metrics, types, out);
        keys.pop();
    }
}

impl PhysicalOperator for RemoteScanOperator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            if self.paging == Paging::Done {
                return Ok(None);
            }
            self.ctx.check()?;
            self.fetch()?;
        }
    }
}
