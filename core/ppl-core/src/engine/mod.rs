//! Query Engine Module

pub mod explain;
pub mod plan;
pub mod query_engine;
pub mod result;


pub use explain::{CommandClass, Explain};
pub use plan::{CompiledQuery, PlanCache};
pub use query_engine::QueryEngine;
pub use result::{QueryResult, RowStream};
