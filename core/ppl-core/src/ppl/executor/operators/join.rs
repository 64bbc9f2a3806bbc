//! Join Operators: HashJoin (equi-join) and NestedLoopJoin
//!
//! Output rows are always `left columns ++ right columns`, whichever side
//! was materialized.

use crate::error::PplResult;
use crate::ppl::ast::JoinType;
use crate::ppl::executor::context::MemoryReservation;
use crate::ppl::executor::expr::PhysicalExpr;
use crate::ppl::executor::operators::PhysicalOperator;
use crate::ppl::planner::types::BuildSide;
use crate::value::{Row, ScalarValue, row_size};
use ahash::AHashMap;
use arrow::datatypes::SchemaRef;
use smallvec::SmallVec;
use std::collections::VecDeque;

/// Materialized build input.
struct BuildTable {
    rows: Vec<Row>,
    buckets: AHashMap<Vec<u8>, SmallVec<[usize; 4]>>,
    matched: Vec<bool>,
}

/// Encodes the join key; `None` when any key column is null (never matches).
fn join_key(row: &[ScalarValue], keys: &[usize]) -> Option<Vec<u8>> {
    let mut key = Vec::new();
    for &i in keys {
        if row[i].is_null() {
            return None;
        }
        row[i].append_to_key(&mut key);
    }
    Some(key)
}

fn drain_build(
    input: &mut dyn PhysicalOperator,
    keys: &[usize],
    reservation: &mut MemoryReservation,
) -> PplResult<BuildTable> {
    let mut rows = Vec::new();
    let mut buckets: AHashMap<Vec<u8>, SmallVec<[usize; 4]>> = AHashMap::new();
    while let Some(row) = input.next()? {
        let mut bytes = row_size(&row);
        if let Some(key) = join_key(&row, keys) {
            bytes += key.len() + std::mem::size_of::<SmallVec<[usize; 4]>>();
            buckets.entry(key).or_default().push(rows.len());
        }
        reservation.grow(bytes)?;
        rows.push(row);
    }
    let matched = vec![false; rows.len()];
    Ok(BuildTable {
        rows,
        buckets,
        matched,
    })
}

fn nulls(width: usize) -> Row {
    vec![ScalarValue::Null; width]
}

/// 해시 조인 연산자
pub struct HashJoinOperator {
    left: Box<dyn PhysicalOperator>,
    right: Box<dyn PhysicalOperator>,
    join_type: JoinType,
    left_keys: Vec<usize>,
    right_keys: Vec<usize>,
    /// Non-equality conjuncts, bound against the output schema
    residual: Option<PhysicalExpr>,
    build: BuildSide,
    schema: SchemaRef,
    reservation: MemoryReservation,
    table: Option<BuildTable>,
    /// Probe row pulled together with the build drain
    first_probe: Option<Row>,
    pending: VecDeque<Row>,
    probe_done: bool,
    /// Next build row to inspect for the unmatched tail
    tail: usize,
}

impl HashJoinOperator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left: Box<dyn PhysicalOperator>,
        right: Box<dyn PhysicalOperator>,
        join_type: JoinType,
        left_keys: Vec<usize>,
        right_keys: Vec<usize>,
        residual: Option<PhysicalExpr>,
        build: BuildSide,
        schema: SchemaRef,
        reservation: MemoryReservation,
    ) -> Self {
        Self {
            left,
            right,
            join_type,
            left_keys,
            right_keys,
            residual,
            build,
            schema,
            reservation,
            table: None,
            first_probe: None,
            pending: VecDeque::new(),
            probe_done: false,
            tail: 0,
        }
    }

    fn probe_preserved(&self) -> bool {
        match self.build {
            BuildSide::Right => self.join_type.preserves_left(),
            BuildSide::Left => self.join_type.preserves_right(),
        }
    }

    fn build_preserved(&self) -> bool {
        match self.build {
            BuildSide::Right => self.join_type.preserves_right(),
            BuildSide::Left => self.join_type.preserves_left(),
        }
    }

    /// Drains the build side while the probe side fetches its first row.
    fn start(&mut self) -> PplResult<()> {
        let (build_input, probe_input, build_keys) = match self.build {
            BuildSide::Right => (&mut self.right, &mut self.left, &self.right_keys),
            BuildSide::Left => (&mut self.left, &mut self.right, &self.left_keys),
        };
        let reservation = &mut self.reservation;
        let (table, first) = rayon::join(
            || drain_build(build_input.as_mut(), build_keys, reservation),
            || probe_input.next(),
        );
        let table = table?;
        tracing::trace!(rows = table.rows.len(), buckets = table.buckets.len(), "join build drained");
        self.first_probe = first?;
        self.probe_done = self.first_probe.is_none();
        self.table = Some(table);
        Ok(())
    }

    fn combine(&self, probe: &[ScalarValue], build: &[ScalarValue]) -> Row {
        let (left, right) = match self.build {
            BuildSide::Right => (probe, build),
            BuildSide::Left => (build, probe),
        };
        let mut row = Vec::with_capacity(left.len() + right.len());
        row.extend_from_slice(left);
        row.extend_from_slice(right);
        row
    }

    fn widths(&self) -> (usize, usize) {
        (self.left.schema().fields().len(), self.right.schema().fields().len())
    }

    /// Queues every output row produced by one probe row.
    fn probe(&mut self, probe: Row) -> PplResult<()> {
        let probe_keys = match self.build {
            BuildSide::Right => &self.left_keys,
            BuildSide::Left => &self.right_keys,
        };
        let candidates: SmallVec<[usize; 4]> = match (&self.table, join_key(&probe, probe_keys)) {
            (Some(table), Some(key)) => table.buckets.get(&key).cloned().unwrap_or_default(),
            _ => SmallVec::new(),
        };

        let mut any = false;
        for index in candidates {
            let Some(table) = &self.table else { break };
            let row = self.combine(&probe, &table.rows[index]);
            let keep = match &self.residual {
                None => true,
                Some(expr) => expr
                    .evaluate(&row)
                    .map_err(|e| e.in_operator("HashJoin"))?
                    .is_true(),
            };
            if keep {
                any = true;
                if let Some(table) = self.table.as_mut() {
                    table.matched[index] = true;
                }
                self.pending.push_back(row);
            }
        }

        if !any && self.probe_preserved() {
            let (lw, rw) = self.widths();
            let row = match self.build {
                BuildSide::Right => self.combine(&probe, &nulls(rw)),
                BuildSide::Left => self.combine(&probe, &nulls(lw)),
            };
            self.pending.push_back(row);
        }
        Ok(())
    }

    fn next_unmatched(&mut self) -> Option<Row> {
        if !self.build_preserved() {
            return None;
        }
        let (lw, rw) = self.widths();
        let table = self.table.as_ref()?;
        while self.tail < table.rows.len() {
            let index = self.tail;
            self.tail += 1;
            if !table.matched[index] {
                let build = &table.rows[index];
                let probe_nulls = match self.build {
                    BuildSide::Right => nulls(lw),
                    BuildSide::Left => nulls(rw),
                };
                return Some(self.combine(&probe_nulls, build));
            }
        }
        None
    }
}

impl PhysicalOperator for HashJoinOperator {
    fn name(&self) -> &'static str {
        "HashJoin"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        if self.table.is_none() {
            self.start()?;
        }
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            if self.probe_done {
                return Ok(self.next_unmatched());
            }
            let probe = match self.first_probe.take() {
                Some(row) => Some(row),
                None => match self.build {
                    BuildSide::Right => self.left.next()?,
                    BuildSide::Left => self.right.next()?,
                },
            };
            match probe {
                Some(row) => self.probe(row)?,
                None => self.probe_done = true,
            }
        }
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
    }
}

/// 중첩 루프 조인: 오른쪽 입력을 한 번 버퍼링하고 왼쪽 행마다 재스캔
pub struct NestedLoopJoinOperator {
    left: Box<dyn PhysicalOperator>,
    right: Box<dyn PhysicalOperator>,
    join_type: JoinType,
    condition: PhysicalExpr,
    schema: SchemaRef,
    reservation: MemoryReservation,
    buffered: Option<Vec<Row>>,
    right_matched: Vec<bool>,
    pending: VecDeque<Row>,
    left_done: bool,
    tail: usize,
}

impl NestedLoopJoinOperator {
    pub fn new(
        left: Box<dyn PhysicalOperator>,
        right: Box<dyn PhysicalOperator>,
        join_type: JoinType,
        condition: PhysicalExpr,
        schema: SchemaRef,
        reservation: MemoryReservation,
    ) -> Self {
        Self {
            left,
            right,
            join_type,
            condition,
            schema,
            reservation,
            buffered: None,
            right_matched: Vec::new(),
            pending: VecDeque::new(),
            left_done: false,
            tail: 0,
        }
    }

    fn buffer_right(&mut self) -> PplResult<()> {
        let mut rows = Vec::new();
        while let Some(row) = self.right.next()? {
            self.reservation.grow(row_size(&row))?;
            rows.push(row);
        }
        self.right_matched = vec![false; rows.len()];
        self.buffered = Some(rows);
        Ok(())
    }

    fn probe(&mut self, left: Row) -> PplResult<()> {
        let Some(rows) = &self.buffered else {
            return Ok(());
        };
        let mut any = false;
        for (index, right) in rows.iter().enumerate() {
            let mut row = left.clone();
            row.extend_from_slice(right);
            let keep = self
                .condition
                .evaluate(&row)
                .map_err(|e| e.in_operator("NestedLoopJoin"))?
                .is_true();
            if keep {
                any = true;
                self.right_matched[index] = true;
                self.pending.push_back(row);
            }
        }
        if !any && self.join_type.preserves_left() {
            let mut row = left;
            row.extend(nulls(self.right.schema().fields().len()));
            self.pending.push_back(row);
        }
        Ok(())
    }
}

impl PhysicalOperator for NestedLoopJoinOperator {
    fn name(&self) -> &'static str {
        "NestedLoopJoin"
    }

    fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        if self.buffered.is_none() {
            self.buffer_right()?;
        }
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            if self.left_done {
                if !self.join_type.preserves_right() {
                    return Ok(None);
                }
                let left_width = self.left.schema().fields().len();
                let Some(rows) = &self.buffered else {
                    return Ok(None);
                };
                while self.tail < rows.len() {
                    let index = self.tail;
                    self.tail += 1;
                    if !self.right_matched[index] {
                        let mut row = nulls(left_width);
                        row.extend_from_slice(&rows[index]);
                        return Ok(Some(row));
                    }
                }
                return Ok(None);
            }
            match self.left.next()? {
                Some(row) => self.probe(row)?,
                None => self.left_done = true,
            }
        }
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
    }
}
