//! Limit Operator: head count / offset handling

use crate::error::PplResult;
use crate::ppl::executor::operators::PhysicalOperator;
use crate::value::Row;
use arrow::datatypes::SchemaRef;

/// Limit 연산자 (head N from M)
///
/// Stops pulling from its input as soon as `count` rows were emitted.
pub struct LimitOperator {
    input: Box<dyn PhysicalOperator>,
    count: usize,
    offset: usize,
    /// Total rows emitted so far
    emitted: usize,
    /// Total rows skipped so far (for offset)
    skipped: usize,
}

impl LimitOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, count: usize, offset: usize) -> Self {
        Self {
            input,
            count,
            offset,
            emitted: 0,
            skipped: 0,
        }
    }
}

impl PhysicalOperator for LimitOperator {
    fn name(&self) -> &'static str {
        "Limit"
    }

    fn schema(&self) -> &SchemaRef {
        self.input.schema()
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        if self.emitted >= self.count {
            return Ok(None);
        }
        while self.skipped < self.offset {
            if self.input.next()?.is_none() {
                return Ok(None);
            }
            self.skipped += 1;
        }
        match self.input.next()? {
            Some(row) => {
                self.emitted += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}
