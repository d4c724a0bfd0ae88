//! In-memory backend for doccrit.
//!
//! [`InMemoryOperations`] implements [`MongoOperations`](doccrit_core::operations::MongoOperations)
//! without a server: rendered filter, update and pipeline documents are evaluated
//! directly against documents held in memory. It is meant for tests and local
//! development; everything the typed façade offers works against it, except
//! map-reduce.
//!
//! # Features
//!
//! - **Thread-safe access** - concurrent reads and writes behind an async-aware RwLock
//! - **Store query semantics** - dotted paths, implicit array traversal, null matching missing fields
//! - **Updates and upserts** - every update operator, with upserts seeded from the filter
//! - **Aggregation** - `$geoNear`, `$match`, `$sort`, `$skip`, `$limit`, `$count`, `$unwind`,
//!   `$project` and `$group`
//! - **Indexes** - unique and sparse indexes are enforced; geo indexes drive `$geoNear`
//!
//! # Quick Start
//!
//! ```ignore
//! use doccrit::prelude::*;
//! use doccrit::memory::InMemoryOperations;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize, Fields, Entity)]
//! struct User {
//!     name: String,
//!     age: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ops = InMemoryOperations::builder().build().await?;
//!     ops.insert(&User { name: "Alice".to_string(), age: 30 }).await?;
//!
//!     let adults = ops.find::<User>(Query::new(UserFields::age().gte(18))).await?;
//!     assert_eq!(adults.len(), 1);
//!     Ok(())
//! }
//! ```

mod evaluator;
mod path;
mod pipeline;
mod store;
mod updater;

pub use store::{InMemoryOperations, InMemoryOperationsBuilder};
