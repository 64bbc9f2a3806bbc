//! Projection Operators: fields / rename and eval

use crate::error::PplResult;
use crate::ppl::executor::expr::PhysicalExpr;
use crate::ppl::executor::operators::PhysicalOperator;
use crate::value::{Row, ScalarValue};
use arrow::datatypes::{DataType, SchemaRef};

/// 프로젝션 연산자: 입력 컬럼을 위치로 골라서 출력
pub struct ProjectionOperator {
    input: Box<dyn PhysicalOperator>,
    /// Input position of every output column
    indices: Vec<usize>,
    schema: SchemaRef,
}

impl ProjectionOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, indices: Vec<usize>, schema: SchemaRef) -> Self {
        Self {
            input,
            indices,
            schema,
        }
    }
}

impl PhysicalOperator for ProjectionOperator {
    fn name(&self) -> &'static str {
        "Project"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        let Some(row) = self.input.next()? else {
            return Ok(None);
        };
        Ok(Some(self.indices.iter().map(|&i| row[i].clone()).collect()))
    }

    fn close(&mut self) {
        self.input.close();
    }
}

/// One bound eval assignment: where the value goes and its declared type.
pub struct EvalColumn {
    pub expr: PhysicalExpr,
    /// Output position; equal to an input position when overwriting
    pub target: usize,
    pub data_type: DataType,
}

/// eval 연산자
///
/// Assignments run left to right against the row being built, so a later
/// assignment sees the values produced by earlier ones.
pub struct EvalOperator {
    input: Box<dyn PhysicalOperator>,
    columns: Vec<EvalColumn>,
    schema: SchemaRef,
}

impl EvalOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, columns: Vec<EvalColumn>, schema: SchemaRef) -> Self {
        Self {
            input,
            columns,
            schema,
        }
    }
}

impl PhysicalOperator for EvalOperator {
    fn name(&self) -> &'static str {
        "Eval"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        let Some(mut row) = self.input.next()? else {
            return Ok(None);
        };
        row.resize(self.schema.fields().len(), ScalarValue::Null);
        for column in &self.columns {
            let value = column
                .expr
                .evaluate(&row)
                .map_err(|e| e.in_operator("Eval"))?;
            row[column.target] = value.cast_to(&column.data_type);
        }
        Ok(Some(row))
    }

    fn close(&mut self) {
        self.input.close();
    }
}
