//! # PPL Core: Piped Processing Language Query Core
//!
//! PPL Core는 파이프 기반 쿼리 언어(PPL)를 컴파일하고 실행하는 쿼리 코어입니다.
//! 검색 백엔드가 처리할 수 있는 연산(필터, 프로젝션, 집계, 정렬, 리밋)은
//! 백엔드 요청으로 내려보내고, 나머지는 코디네이터에서 스트리밍 실행합니다.
//!
//! ## 주요 특징
//!
//! - **PPL 파이프라인**: `search`, `where`, `fields`, `stats`, `sort`, `head`, `top`,
//!   `eval`, `rename`, `parse`, `grok`, `join`, `lookup`
//! - **규칙 기반 옵티마이저**: 고정점까지 반복 적용
//! - **Push-down 번역**: boolean query DSL + nested bucket aggregation
//! - **Pull 기반 실행기**: 데드라인, 메모리 한도, 그룹 수 한도
//!
//! ## 빠른 시작
//!
//! ```rust
//! use ppl_core::{EngineConfig, MemoryBackend, QueryEngine, ScalarValue};
//! use arrow::datatypes::{DataType, Field, Schema};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> ppl_core::PplResult<()> {
//! let schema = Schema::new(vec![
//!     Field::new("host", DataType::Utf8, true),
//!     Field::new("status", DataType::Int64, true),
//! ]);
//! let backend = Arc::new(MemoryBackend::new().with_index(
//!     "logs",
//!     schema,
//!     vec![
//!         json!({"host": "a", "status": 500}),
//!         json!({"host": "a", "status": 500}),
//!         json!({"host": "b", "status": 200}),
//!     ],
//! )?);
//! let engine = QueryEngine::new(backend.clone(), backend, EngineConfig::default())?;
//!
//! let result = engine
//!     .execute("source=logs | where status = 500 | stats count() by host")?
//!     .collect_result()?;
//! assert_eq!(
//!     result.rows,
//!     vec![vec![ScalarValue::Utf8("a".into()), ScalarValue::Int64(2)]]
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## 실행 파이프라인
//!
//! ```text
//! PPL 문자열 → Lexer → Parser → AST → Analyzer → LogicalPlan
//!          → Optimizer → PhysicalPlanner → Executor → Row stream
//! ```
//!
//! ## 모듈 구조
//!
//! - [`engine`]: 쿼리 엔진 ([`QueryEngine`])
//! - [`ppl`]: 렉서, 파서, 분석기, 플래너, 최적화기, 실행기
//! - [`backend`]: 검색 백엔드 인터페이스와 인메모리 구현
//! - [`config`]: 엔진 설정

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod ppl;
pub mod schema;
pub mod value;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use backend::{MemoryBackend, SearchBackend, SearchRequest, SearchResponse};
pub use config::{EngineConfig, PushdownConfig};
pub use engine::{CompiledQuery, Explain, QueryEngine, QueryResult, RowStream};
pub use error::{PplError, PplResult};
pub use schema::{SchemaProvider, Statistics};
pub use value::{Row, ScalarValue};
