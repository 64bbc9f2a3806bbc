//! Search backend interface.
//!
//! Only the execution engine's remote scan talks to a backend. Requests are
//! fully translated before execution starts; a backend never sees PPL.

pub mod dsl;
pub mod memory;

use crate::error::PplResult;

pub use dsl::{
    AggregationSpec, Bucket, BucketOrder, MetricKind, MetricSpec, QueryDsl, SearchRequest,
    SearchResponse, SortSpec, TermsLevel,
};
pub use memory::MemoryBackend;

/// A columnar / inverted-index store answering translated requests.
///
/// Implementations must be shareable across threads: join inputs pull
/// from their scans on separate rayon tasks.
pub trait SearchBackend: Send + Sync {
    /// Executes one request (one page for hit requests).
    fn search(&self, request: &SearchRequest) -> PplResult<SearchResponse>;
}
