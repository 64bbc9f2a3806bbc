//! Physical Operator Trait: Volcano Execution Model

use crate::error::{PplError, PplResult};
use crate::ppl::executor::context::ExecutionContext;
use crate::value::Row;
use arrow::datatypes::SchemaRef;
use std::sync::Arc;

/// 물리 연산자 트레이트: Volcano 실행 모델 (Pull 기반)
pub trait PhysicalOperator: Send {
    /// Operator name used in errors and logs
    fn name(&self) -> &'static str;

    /// 출력 스키마 반환
    fn schema(&self) -> &SchemaRef;

    /// 다음 Row 반환 (None이면 끝)
    fn next(&mut self) -> PplResult<Option<Row>>;

    /// Ends the subtree after the query aborted. Operators forward this to
    /// their inputs.
    fn close(&mut self) {}
}

/// Lifecycle of one operator. There is no way back to `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorState {
    NotStarted,
    Running,
    Exhausted,
}

/// Enforces the pull contract around an operator: the deadline is checked
/// before each pull, an error is reported once, and every pull after an
/// error or end-of-stream yields end-of-stream.
///
/// When a pull fails the wrapped subtree is closed, so every operator below
/// reaches `Exhausted` too. Each operator that ends because of the deadline
/// records one timeout in the context.
pub struct Monitored {
    inner: Box<dyn PhysicalOperator>,
    ctx: Arc<ExecutionContext>,
    state: OperatorState,
    rows: u64,
}

impl Monitored {
    pub fn new(inner: Box<dyn PhysicalOperator>, ctx: Arc<ExecutionContext>) -> Self {
        Self {
            inner,
            ctx,
            state: OperatorState::NotStarted,
            rows: 0,
        }
    }

    pub fn state(&self) -> OperatorState {
        self.state
    }
}

impl PhysicalOperator for Monitored {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn schema(&self) -> &SchemaRef {
        self.inner.schema()
    }

    fn next(&mut self) -> PplResult<Option<Row>> {
        if self.state == OperatorState::Exhausted {
            return Ok(None);
        }
        self.state = OperatorState::Running;
        let result = self.ctx.check().and_then(|()| self.inner.next());
        match result {
            Ok(Some(row)) => {
                self.rows += 1;
                Ok(Some(row))
            }
            Ok(None) => {
                self.state = OperatorState::Exhausted;
                tracing::trace!(operator = self.inner.name(), rows = self.rows, "operator exhausted");
                Ok(None)
            }
            Err(e) => {
                self.state = OperatorState::Exhausted;
                if matches!(e, PplError::Timeout { .. }) {
                    self.ctx.cancel();
                    self.ctx.record_timeout();
                }
                if e.is_resource_limit() {
                    tracing::warn!(operator = self.inner.name(), error = %e, "operator stopped");
                }
                self.inner.close();
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        if self.state != OperatorState::Exhausted {
            self.state = OperatorState::Exhausted;
            if self.ctx.is_cancelled() {
                self.ctx.record_timeout();
            }
            tracing::trace!(operator = self.inner.name(), rows = self.rows, "operator closed");
        }
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::schema::schema_from_pairs;
    use crate::value::ScalarValue;
    use arrow::datatypes::DataType;

    struct Failing {
        schema: SchemaRef,
        calls: usize,
    }

    impl PhysicalOperator for Failing {
        fn name(&self) -> &'static str {
            "Failing"
        }
        fn schema(&self) -> &SchemaRef {
            &self.schema
        }
        fn next(&mut self) -> PplResult<Option<Row>> {
            self.calls += 1;
            if self.calls == 1 {
                Ok(Some(vec![ScalarValue::Int64(1)]))
            } else {
                Err(PplError::execution("Failing", "boom"))
            }
        }
    }

    #[test]
    fn error_is_reported_once() {
        let ctx = Arc::new(ExecutionContext::new(&EngineConfig::default()));
        let inner = Failing {
            schema: schema_from_pairs([("a", DataType::Int64)]),
            calls: 0,
        };
        let mut op = Monitored::new(Box::new(inner), ctx);
        assert_eq!(op.state(), OperatorState::NotStarted);
        assert!(op.next().unwrap().is_some());
        assert_eq!(op.state(), OperatorState::Running);
        assert!(op.next().is_err());
        assert_eq!(op.state(), OperatorState::Exhausted);
        assert!(op.next().unwrap().is_none());
        assert!(op.next().unwrap().is_none());
    }

    #[test]
    fn cancelled_context_stops_pulls() {
        let ctx = Arc::new(ExecutionContext::new(&EngineConfig::default()));
        let inner = Failing {
            schema: schema_from_pairs([("a", DataType::Int64)]),
            calls: 0,
        };
        let mut op = Monitored::new(Box::new(inner), Arc::clone(&ctx));
        ctx.cancel();
        assert!(matches!(op.next(), Err(PplError::Timeout { .. })));
        assert!(op.next().unwrap().is_none());
    }

    /// Pass-through operator so a tree of wrappers can be built.
    struct Wrap(Box<dyn PhysicalOperator>);

    impl PhysicalOperator for Wrap {
        fn name(&self) -> &'static str {
            "Wrap"
        }
        fn schema(&self) -> &SchemaRef {
            self.0.schema()
        }
        fn next(&mut self) -> PplResult<Option<Row>> {
            self.0.next()
        }
        fn close(&mut self) {
            self.0.close();
        }
    }

    #[test]
    fn timeout_ends_every_operator_once() {
        let ctx = Arc::new(ExecutionContext::new(&EngineConfig::default()));
        let leaf = Failing {
            schema: schema_from_pairs([("a", DataType::Int64)]),
            calls: 0,
        };
        let mut op: Box<dyn PhysicalOperator> = Box::new(Monitored::new(Box::new(leaf), Arc::clone(&ctx)));
        for _ in 0..2 {
            op = Box::new(Monitored::new(Box::new(Wrap(op)), Arc::clone(&ctx)));
        }
        assert!(op.next().unwrap().is_some());

        ctx.cancel();
        assert!(matches!(op.next(), Err(PplError::Timeout { .. })));
        assert_eq!(ctx.timed_out_operators(), 3);
        assert!(op.next().unwrap().is_none());
        op.close();
        assert_eq!(ctx.timed_out_operators(), 3);
    }
}
