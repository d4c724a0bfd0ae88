//! Typed criteria and generic operations for MongoDB-style document stores.
//!
//! This crate is the entry point of the doccrit project. It re-exports the core
//! types, the derive macros and the backends:
//!
//! - `#[derive(Fields)]` turns struct fields into typed [`Property`](property::Property)
//!   references, so filters, updates and sorts only compile against real fields with
//!   values of the right type
//! - `#[derive(Entity)]` binds a type to its collection
//! - [`MongoOperationsExt`](extensions::MongoOperationsExt) adds entity-typed methods
//!   to every backend
//!
//! # Quick Start
//!
//! ```ignore
//! use doccrit::{prelude::*, memory::InMemoryOperations};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize, Fields, Entity)]
//! #[entity(collection = "books")]
//! pub struct Book {
//!     pub title: String,
//!     pub year: i32,
//!     pub author: Author,
//!     pub tags: Vec<String>,
//! }
//!
//! #[derive(Debug, Serialize, Deserialize, Fields)]
//! pub struct Author {
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ops = InMemoryOperations::builder().build().await?;
//!
//!     ops.insert(&Book {
//!         title: "Dune".to_string(),
//!         year: 1965,
//!         author: Author { name: "Frank Herbert".to_string() },
//!         tags: vec!["scifi".to_string()],
//!     })
//!     .await?;
//!
//!     let query = Query::new(
//!         (BookFields::author() / AuthorFields::name())
//!             .eq("Frank Herbert")
//!             .and(BookFields::year().lt(1970)),
//!     );
//!     let books = ops.find::<Book>(query).await?;
//!
//!     ops.update_multi::<Book>(
//!         Query::new(BookFields::title().eq("Dune")),
//!         Update::new().add_to_set(BookFields::tags(), "classic"),
//!     )
//!     .await?;
//!
//!     ops.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - in-process store for tests and prototyping
//! - [`mongodb`] - MongoDB through the official driver (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as doccrit;

pub mod prelude;

pub use doccrit_core::{
    aggregation, criteria, entity, error, extensions, find, geo, index, map_reduce, near,
    operations, page, property, query, update,
};
pub use doccrit_macros::{Entity, Fields};

// Re-export BSON types for convenience
pub use bson;

/// In-memory backend.
pub mod memory {
    pub use doccrit_memory::{InMemoryOperations, InMemoryOperationsBuilder};
}

/// MongoDB backend.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use doccrit_mongodb::{MongoTemplate, MongoTemplateBuilder};
}
