//! Hash Aggregate Operator: stats ... by ...
//!
//! Drains its input into one accumulator set per distinct group key, then
//! emits `group keys ++ aggregate values` rows in first-seen key order.

use crate::error::{PplError, PplResult};
use crate::ppl::analyzer::functions::AggregateFunction;
use crate::ppl::executor::context::MemoryReservation;
use crate::ppl::executor::expr::PhysicalExpr;
use crate::ppl::executor::operators::PhysicalOperator;
use crate::value::{Row, ScalarValue, row_size};
use ahash::{AHashMap, AHashSet};
use arrow::datatypes::{DataType, SchemaRef};
use std::cmp::Ordering;

const NAME: &str = "HashAggregate";

/// Running state of one aggregate function for one group.
#[derive(Debug, Clone)]
pub(crate) enum Accumulator {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Avg { sum: f64, count: i64 },
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
    DistinctCount(AHashSet<Vec<u8>>),
}

impl Accumulator {
    /// `output` is the aggregate's result type; it picks integer or float
    /// summation.
    pub(crate) fn new(func: AggregateFunction, output: &DataType) -> Self {
        match func {
            AggregateFunction::Count => Accumulator::Count(0),
            AggregateFunction::Sum if *output == DataType::Float64 => Accumulator::SumFloat(None),
            AggregateFunction::Sum => Accumulator::SumInt(None),
            AggregateFunction::Avg => Accumulator::Avg { sum: 0.0, count: 0 },
            AggregateFunction::Min => Accumulator::Min(None),
            AggregateFunction::Max => Accumulator::Max(None),
            AggregateFunction::DistinctCount => Accumulator::DistinctCount(AHashSet::new()),
        }
    }

    /// Folds one input value in. `None` stands for a `count()` row; nulls
    /// are skipped by every function. Returns the heap bytes added.
    pub(crate) fn update(&mut self, value: Option<&ScalarValue>) -> PplResult<usize> {
        let value = match value {
            None => {
                if let Accumulator::Count(n) = self {
                    *n += 1;
                }
                return Ok(0);
            }
            Some(ScalarValue::Null) => return Ok(0),
            Some(v) => v,
        };
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::SumInt(sum) => {
                let v = match value {
                    ScalarValue::Int64(v) => *v,
                    other => return Err(type_error("sum", other)),
                };
                let next = sum.unwrap_or(0).checked_add(v).ok_or_else(|| {
                    PplError::execution(NAME, "integer overflow in sum()")
                })?;
                *sum = Some(next);
            }
            Accumulator::SumFloat(sum) => {
                let v = value.as_f64().ok_or_else(|| type_error("sum", value))?;
                *sum = Some(sum.unwrap_or(0.0) + v);
            }
            Accumulator::Avg { sum, count } => {
                *sum += value.as_f64().ok_or_else(|| type_error("avg", value))?;
                *count += 1;
            }
            Accumulator::Min(current) => {
                if replaces(current.as_ref(), value, Ordering::Less)? {
                    let added = value.size_bytes();
                    *current = Some(value.clone());
                    return Ok(added);
                }
            }
            Accumulator::Max(current) => {
                if replaces(current.as_ref(), value, Ordering::Greater)? {
                    let added = value.size_bytes();
                    *current = Some(value.clone());
                    return Ok(added);
                }
            }
            Accumulator::DistinctCount(seen) => {
                let mut key = Vec::new();
                value.append_to_key(&mut key);
                let added = key.len() + std::mem::size_of::<Vec<u8>>();
                if seen.insert(key) {
                    return Ok(added);
                }
            }
        }
        Ok(0)
    }

    /// Final value. Empty sum/avg/min/max are null; counts start at zero.
    pub(crate) fn finish(&self) -> ScalarValue {
        match self {
            Accumulator::Count(n) => ScalarValue::Int64(*n),
            Accumulator::SumInt(sum) => sum.map(ScalarValue::Int64).unwrap_or(ScalarValue::Null),
            Accumulator::SumFloat(sum) => sum.map(ScalarValue::Float64).unwrap_or(ScalarValue::Null),
            Accumulator::Avg { count: 0, .. } => ScalarValue::Null,
            Accumulator::Avg { sum, count } => ScalarValue::Float64(*sum / *count as f64),
            Accumulator::Min(v) | Accumulator::Max(v) => v.clone().unwrap_or(ScalarValue::Null),
            Accumulator::DistinctCount(seen) => ScalarValue::Int64(seen.len() as i64),
        }
    }
}

fn replaces(current: Option<&ScalarValue>, candidate: &ScalarValue, wanted: Ordering) -> PplResult<bool> {
    match current {
        None => Ok(true),
        Some(current) => candidate
            .partial_cmp_value(current)
            .map(|o| o == wanted)
            .ok_or_else(|| {
                PplError::execution(
                    NAME,
                    format!("cannot compare {} with {}", candidate.data_type(), current.data_type()),
                )
            }),
    }
}

fn type_error(func: &str, value: &ScalarValue) -> PplError {
    PplError::execution(NAME, format!("{func}() received a {} value", value.data_type()))
}

/// One bound aggregate call.
pub struct AggregateCall {
    pub func: AggregateFunction,
    /// `None` for `count()`
    pub arg: Option<PhysicalExpr>,
    pub data_type: DataType,
}

struct GroupState {
    keys: Row,
    accumulators: Vec<Accumulator>,
}

/// 해시 집계 연산자
pub struct HashAggregateOperator {
    input: Box<dyn PhysicalOperator>,
    group_by: Vec<usize>,
    aggregates: Vec<AggregateCall>,
    schema: SchemaRef,
    max_groups: usize,
    reservation: MemoryReservation,
    output: Option<std::vec::IntoIter<Row>>,
}

impl HashAggregateOperator {
    pub fn new(
        input: Box<dyn PhysicalOperator>,
        group_by: Vec<usize>,
        aggregates: Vec<AggregateCall>,
        schema: SchemaRef,
        max_groups: usize,
        reservation: MemoryReservation,
    ) -> Self {
        Self {
            input,
            group_by,
            aggregates,
            schema,
            max_groups,
            reservation,
            output: None,
        }
    }

    fn fresh_accumulators(&self) -> Vec<Accumulator> {
        self.aggregates
            .iter()
            .map(|a| Accumulator::new(a.func, &a.data_type))
            .collect()
    }

    fn drain(&mut self) -> PplResult<Vec<Row>> {
        let mut index: AHashMap<Vec<u8>, usize> = AHashMap::new();
        let mut groups: Vec<GroupState> = Vec::new();
        let mut key = Vec::new();

        while let Some(row) = self.input.next()? {
            key.clear();
            for &i in &self.group_by {
                row[i].append_to_key(&mut key);
            }
            let slot = match index.get(&key) {
                Some(&slot) => slot,
                None => {
                    if groups.len() >= self.max_groups {
                        return Err(PplError::TooManyGroups {
                            limit: self.max_groups,
                        });
                    }
                    let keys: Row = self.group_by.iter().map(|&i| row[i].clone()).collect();
                    self.reservation.grow(
                        key.len()
                            + row_size(&keys)
                            + self.aggregates.len() * std::mem::size_of::<Accumulator>(),
                    )?;
                    groups.push(GroupState {
                        keys,
                        accumulators: self.fresh_accumulators(),
                    });
                    index.insert(key.clone(), groups.len() - 1);
                    groups.len() - 1
                }
            };

            let state = &mut groups[slot];
            for (call, acc) in self.aggregates.iter().zip(state.accumulators.iter_mut()) {
                let added = match &call.arg {
                    None => acc.update(None)?,
                    Some(expr) => {
                        let value = expr.evaluate(&row).map_err(|e| e.in_operator(NAME))?;
                        acc.update(Some(&value))?
                    }
                };
                if added > 0 {
                    self.reservation.grow(added)?;
                }
            }
        }

        // stats without by-clause always yields one row
        if groups.is_empty() && self.group_by.is_empty() {
            groups.push(GroupState {
                keys: Vec::new(),
                accumulators: self.fresh_accumulators(),
            });
        }

        Ok(groups
            .into_iter()
            .map(|g| {
                let mut row = g.keys;
                row.extend(
                    g.accumulators
                        .iter()
                        .zip(&self.aggregates)
                        .map(|(acc, call)| acc.finish().cast_to(&call.data_type)),
                );
                row
            })
            .collect())
    }
}

impl PhysicalOperator for HashAggregateOperator {
    fn name(&self) -> &'static str {
        NAME
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        if self.output.is_none() {
            let rows = self.drain()?;
            tracing::trace!(groups = rows.len(), bytes = self.reservation.size(), "aggregate drained");
            self.output = Some(rows.into_iter());
        }
        Ok(self.output.as_mut().and_then(Iterator::next))
    }

    fn close(&mut self) {
        self.input.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulators_skip_nulls() {
        let mut count = Accumulator::new(AggregateFunction::Count, &DataType::Int64);
        let mut avg = Accumulator::new(AggregateFunction::Avg, &DataType::Float64);
        for v in [ScalarValue::Int64(2), ScalarValue::Null, ScalarValue::Int64(4)] {
            count.update(Some(&v)).unwrap();
            avg.update(Some(&v)).unwrap();
        }
        assert_eq!(count.finish(), ScalarValue::Int64(2));
        assert_eq!(avg.finish(), ScalarValue::Float64(3.0));
    }

    #[test]
    fn count_star_counts_rows() {
        let mut count = Accumulator::new(AggregateFunction::Count, &DataType::Int64);
        count.update(None).unwrap();
        count.update(None).unwrap();
        assert_eq!(count.finish(), ScalarValue::Int64(2));
    }

    #[test]
    fn empty_sum_is_null() {
        let sum = Accumulator::new(AggregateFunction::Sum, &DataType::Int64);
        assert_eq!(sum.finish(), ScalarValue::Null);
    }

    #[test]
    fn sum_overflow_is_error() {
        let mut sum = Accumulator::new(AggregateFunction::Sum, &DataType::Int64);
        sum.update(Some(&ScalarValue::Int64(i64::MAX))).unwrap();
        assert!(sum.update(Some(&ScalarValue::Int64(1))).is_err());
    }

    #[test]
    fn min_max_strings() {
        let mut min = Accumulator::new(AggregateFunction::Min, &DataType::Utf8);
        let mut max = Accumulator::new(AggregateFunction::Max, &DataType::Utf8);
        for s in ["m", "a", "z"] {
            let v = ScalarValue::Utf8(s.into());
            min.update(Some(&v)).unwrap();
            max.update(Some(&v)).unwrap();
        }
        assert_eq!(min.finish(), ScalarValue::Utf8("a".into()));
        assert_eq!(max.finish(), ScalarValue::Utf8("z".into()));
    }

    #[test]
    fn distinct_count_treats_integral_floats_as_ints() {
        let mut dc = Accumulator::new(AggregateFunction::DistinctCount, &DataType::Int64);
        assert!(dc.update(Some(&ScalarValue::Int64(1))).unwrap() > 0);
        assert_eq!(dc.update(Some(&ScalarValue::Float64(1.0))).unwrap(), 0);
        dc.update(Some(&ScalarValue::Int64(2))).unwrap();
        assert_eq!(dc.finish(), ScalarValue::Int64(2));
    }
}
