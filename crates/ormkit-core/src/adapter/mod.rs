//! Storage adapter contract.
//!
//! An adapter is the only component that touches storage. Everything above it
//! exchanges plain [`Record`]s and [`BatchOp`]s, so a remote API client and an
//! embedded store are interchangeable.

mod memory;

pub use memory::{AdapterCall, MemoryAdapter, DEFAULT_BATCH_LIMIT};

use async_trait::async_trait;
use ormkit_proto::{BatchOp, Record};

use crate::error::AdapterError;
use crate::query::Query;

/// A storage backend.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Fetch one record. A missing record is `Ok(None)`, not an error.
    async fn get(&self, type_name: &str, id: &str) -> Result<Option<Record>, AdapterError>;

    /// Fetch many records of one type, in the order of `ids`.
    async fn get_all(
        &self,
        type_name: &str,
        ids: &[String],
    ) -> Result<Vec<Option<Record>>, AdapterError>;

    /// Run a query and return its matching records.
    async fn execute_query(&self, query: &Query) -> Result<Vec<Record>, AdapterError>;

    /// Apply write operations.
    ///
    /// The outer error means nothing was applied. Otherwise the result has one
    /// entry per operation, in order.
    async fn apply_batch(
        &self,
        ops: &[BatchOp],
    ) -> Result<Vec<Result<(), AdapterError>>, AdapterError>;

    /// Count the records a query matches, respecting skip and limit.
    async fn count(&self, query: &Query) -> Result<usize, AdapterError>;

    /// Describe how the adapter would run a query.
    async fn explain(&self, query: &Query) -> Result<serde_json::Value, AdapterError>;

    /// Maximum ids or operations per physical call.
    fn batch_limit(&self) -> usize;
}
