//! Query results: the lazy row stream and its materialized form.

use crate::error::{PplError, PplResult};
use crate::ppl::executor::{ExecutionContext, PhysicalOperator};
use crate::value::{Row, ScalarValue, row_to_json};
use arrow::array::{
    ArrayRef, BooleanBuilder, Float64Builder, Int64Builder, NullArray, StringBuilder,
};
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use std::sync::Arc;

/// Lazy, finite, single-pass row stream of one execution.
///
/// After the first error or the end of the stream every later call
/// returns `None`.
pub struct RowStream {
    root: Box<dyn PhysicalOperator>,
    ctx: Arc<ExecutionContext>,
    schema: SchemaRef,
    done: bool,
}

impl RowStream {
    pub(crate) fn new(
        root: Box<dyn PhysicalOperator>,
        ctx: Arc<ExecutionContext>,
        schema: SchemaRef,
    ) -> Self {
        Self {
            root,
            ctx,
            schema,
            done: false,
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Stops the query; the next pull reports `Timeout`.
    pub fn cancel(&self) {
        self.ctx.cancel();
    }

    /// Drains the stream, failing on the first error.
    pub fn collect_result(self) -> PplResult<QueryResult> {
        let schema = Arc::clone(&self.schema);
        let rows = self.collect::<PplResult<Vec<_>>>()?;
        Ok(QueryResult { schema, rows })
    }
}

impl Iterator for RowStream {
    type Item = PplResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.root.next() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                if err.is_resource_limit() {
                    tracing::warn!(error = %err, "query aborted");
                }
                Some(Err(err))
            }
        }
    }
}

/// Fully materialized result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub schema: SchemaRef,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of the column `name`, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<ScalarValue>> {
        let index = self.schema.index_of(name).ok()?;
        Some(self.rows.iter().map(|row| row[index].clone()).collect())
    }

    /// One JSON object per row, keyed by column name.
    pub fn to_json_rows(&self) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row_to_json(row, &self.schema))
            .collect()
    }

    /// Arrow 배치로 변환
    pub fn to_record_batch(&self) -> PplResult<RecordBatch> {
        let columns = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .map(|(i, field)| self.build_column(i, field.data_type()))
            .collect::<PplResult<Vec<_>>>()?;
        Ok(RecordBatch::try_new(Arc::clone(&self.schema), columns)?)
    }

    /// Text table for terminals and logs.
    pub fn pretty(&self) -> PplResult<String> {
        let batch = self.to_record_batch()?;
        Ok(arrow::util::pretty::pretty_format_batches(&[batch])?.to_string())
    }

    fn build_column(&self, index: usize, data_type: &DataType) -> PplResult<ArrayRef> {
        let values = self.rows.iter().map(|row| &row[index]);
        let array: ArrayRef = match data_type {
            DataType::Boolean => {
                let mut b = BooleanBuilder::with_capacity(self.rows.len());
                for v in values {
                    match v {
                        ScalarValue::Boolean(x) => b.append_value(*x),
                        _ => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Int64 => {
                let mut b = Int64Builder::with_capacity(self.rows.len());
                for v in values {
                    match v {
                        ScalarValue::Int64(x) => b.append_value(*x),
                        _ => b.append_null(),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Float64 => {
                let mut b = Float64Builder::with_capacity(self.rows.len());
                for v in values {
                    b.append_option(v.as_f64());
                }
                Arc::new(b.finish())
            }
            DataType::Utf8 => {
                let mut b = StringBuilder::new();
                for v in values {
                    match v {
                        ScalarValue::Null => b.append_null(),
                        other => b.append_value(other.to_string()),
                    }
                }
                Arc::new(b.finish())
            }
            DataType::Null => Arc::new(NullArray::new(self.rows.len())),
            other => {
                return Err(PplError::Internal(format!(
                    "result column type {other} is not a PPL type"
                )));
            }
        };
        Ok(array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::schema_from_pairs;
    use arrow::array::Array;
    use serde_json::json;

    fn result() -> QueryResult {
        QueryResult {
            schema: schema_from_pairs([
                ("host", DataType::Utf8),
                ("count", DataType::Int64),
                ("avg", DataType::Float64),
            ]),
            rows: vec![
                vec![
                    ScalarValue::Utf8("a".into()),
                    ScalarValue::Int64(2),
                    ScalarValue::Float64(1.5),
                ],
                vec![ScalarValue::Null, ScalarValue::Int64(1), ScalarValue::Null],
            ],
        }
    }

    #[test]
    fn json_rows_keep_nulls() {
        let rows = result().to_json_rows();
        assert_eq!(rows[0], json!({"host": "a", "count": 2, "avg": 1.5}));
        assert_eq!(rows[1], json!({"host": null, "count": 1, "avg": null}));
    }

    #[test]
    fn record_batch_conversion() {
        let batch = result().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 3);
        assert!(batch.column(0).is_null(1));
        assert!(result().pretty().unwrap().contains("host"));
    }

    #[test]
    fn column_lookup() {
        let r = result();
        assert_eq!(
            r.column("count"),
            Some(vec![ScalarValue::Int64(2), ScalarValue::Int64(1)])
        );
        assert_eq!(r.column("missing"), None);
    }
}
