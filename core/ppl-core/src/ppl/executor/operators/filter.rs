//! Filter Operator: where / search predicate evaluation

use crate::error::PplResult;
use crate::ppl::executor::expr::PhysicalExpr;
use crate::ppl::executor::operators::PhysicalOperator;
use crate::value::Row;
use arrow::datatypes::SchemaRef;

/// 필터 연산자: predicate가 true인 행만 통과 (null/false는 제외)
pub struct FilterOperator {
    input: Box<dyn PhysicalOperator>,
    predicate: PhysicalExpr,
}

impl FilterOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, predicate: PhysicalExpr) -> Self {
        Self { input, predicate }
    }
}

impl PhysicalOperator for FilterOperator {
    fn name(&self) -> &'static str {
        "Filter"
    }

    fn schema(&self) -> &SchemaRef {
        self.input.schema()
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        while let Some(row) = self.input.next()? {
            let keep = self
                .predicate
                .evaluate(&row)
                .map_err(|e| e.in_operator("Filter"))?;
            if keep.is_true() {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.input.close();
    }
}
