//! ormkit core - queries, entities and write batching over a storage adapter.
//!
//! A [`Store`] ties an [`Adapter`] to the [`Schema`](ormkit_proto::Schema) it
//! serves. From there:
//!
//! - [`Query`] is an immutable builder; `fetch` hydrates [`Entity`] handles
//!   and preloads requested belongs-to relationships with one `get_all` per
//!   relationship and level.
//! - [`Entity`] tracks dirty attributes and relationships, caches
//!   belongs-to objects (sharing concurrent loads) and has-many queries.
//! - [`Batch`] collects saves and destroys, deduplicated per identity, and
//!   applies them in one adapter call.
//!
//! ```no_run
//! # async fn demo(store: ormkit_core::Store) -> ormkit_core::Result<()> {
//! use ormkit_core::proto::Value;
//!
//! let phones = store
//!     .query("Phone")?
//!     .filter("model = ? and make = ?", &[Value::from("5230"), Value::from("Samsung")])?
//!     .include(&["room.floor"])?
//!     .fetch()
//!     .await?;
//!
//! for phone in &phones {
//!     phone.set("price", 99)?;
//! }
//! let mut batch = store.batch();
//! for phone in &phones {
//!     batch.save(phone)?;
//! }
//! batch.execute().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod batch;
pub mod config;
pub mod entity;
pub mod error;
pub mod query;
pub mod store;

pub use adapter::{Adapter, AdapterCall, MemoryAdapter};
pub use batch::Batch;
pub use config::StoreConfig;
pub use entity::{Entity, Identity};
pub use error::{AdapterError, BatchError, BatchFailure, Error, Result};
pub use query::{OrderBy, PreloadTree, Query};
pub use store::Store;

/// Re-export the expression language.
pub use ormkit_lang as lang;
/// Re-export boundary types.
pub use ormkit_proto as proto;
