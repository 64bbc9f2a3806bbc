//! Parse Operator: regex / grok field extraction

use crate::error::PplResult;
use crate::ppl::executor::operators::PhysicalOperator;
use crate::value::{Row, ScalarValue};
use arrow::datatypes::SchemaRef;
use regex::Regex;

/// Extracts named capture groups of `regex` from one source column.
///
/// A value that does not match yields empty strings for every output; a
/// null source yields nulls.
pub struct ParseOperator {
    input: Box<dyn PhysicalOperator>,
    source: usize,
    regex: Regex,
    /// (capture group name, output position)
    outputs: Vec<(String, usize)>,
    schema: SchemaRef,
}

impl ParseOperator {
    pub fn new(
        input: Box<dyn PhysicalOperator>,
        source: usize,
        regex: Regex,
        outputs: Vec<(String, usize)>,
        schema: SchemaRef,
    ) -> Self {
        Self {
            input,
            source,
            regex,
            outputs,
            schema,
        }
    }
}

impl PhysicalOperator for ParseOperator {
    fn name(&self) -> &'static str {
        "Parse"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        let Some(mut row) = self.input.next()? else {
            return Ok(None);
        };
        let text = match &row[self.source] {
            ScalarValue::Null => None,
            ScalarValue::Utf8(s) => Some(s.clone()),
            other => Some(other.to_string()),
        };
        row.resize(self.schema.fields().len(), ScalarValue::Null);

        let captures = text.as_deref().and_then(|t| self.regex.captures(t));
        for (group, target) in &self.outputs {
            row[*target] = match (&text, &captures) {
                (None, _) => ScalarValue::Null,
                (Some(_), Some(caps)) => ScalarValue::Utf8(
                    caps.name(group)
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                ),
                (Some(_), None) => ScalarValue::Utf8(String::new()),
            };
        }
        Ok(Some(row))
    }

    fn close(&mut self) {
        self.input.close();
    }
}
