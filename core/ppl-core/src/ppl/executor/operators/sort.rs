//! Sort Operator: drain, stable sort, emit

use crate::error::PplResult;
use crate::ppl::executor::context::MemoryReservation;
use crate::ppl::executor::operators::PhysicalOperator;
use crate::value::{Row, row_size};
use arrow::datatypes::SchemaRef;
use std::cmp::Ordering;

/// Bound sort key: input position and direction.
#[derive(Debug, Clone, Copy)]
pub struct SortKey {
    pub index: usize,
    pub descending: bool,
}

/// 정렬 연산자
///
/// Nulls are placed last for both directions; ties keep input order.
pub struct SortOperator {
    input: Box<dyn PhysicalOperator>,
    keys: Vec<SortKey>,
    reservation: MemoryReservation,
    sorted: Option<std::vec::IntoIter<Row>>,
}

impl SortOperator {
    pub fn new(input: Box<dyn PhysicalOperator>, keys: Vec<SortKey>, reservation: MemoryReservation) -> Self {
        Self {
            input,
            keys,
            reservation,
            sorted: None,
        }
    }

    fn drain(&mut self) -> PplResult<Vec<Row>> {
        let mut rows = Vec::new();
        while let Some(row) = self.input.next()? {
            self.reservation.grow(row_size(&row))?;
            rows.push(row);
        }
        let keys = &self.keys;
        rows.sort_by(|a, b| compare_rows(a, b, keys));
        Ok(rows)
    }
}

/// Row comparison for `keys`; nulls are last whatever the direction.
pub fn compare_rows(a: &Row, b: &Row, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let (x, y) = (&a[key.index], &b[key.index]);
        let ordering = match (x.is_null(), y.is_null()) {
            (false, false) if key.descending => y.sort_cmp(x),
            _ => x.sort_cmp(y),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

impl PhysicalOperator for SortOperator {
    fn name(&self) -> &'static str {
        "Sort"
    }

    fn schema(&self) -> &SchemaRef {
        self.input.schema()
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        if self.sorted.is_none() {
            let rows = self.drain()?;
            tracing::trace!(rows = rows.len(), bytes = self.reservation.size(), "sort drained");
            self.sorted = Some(rows.into_iter());
        }
        Ok(self.sorted.as_mut().and_then(Iterator::next))
    }

    fn close(&mut self) {
        self.input.close();
    }
}
