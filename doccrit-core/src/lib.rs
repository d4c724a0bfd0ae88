//! Typed criteria and operations for MongoDB-style document stores.
//!
//! This crate is the core of the doccrit project and provides:
//!
//! - **Property references** ([`property`]) - compile-time checked field handles and nested paths
//! - **Criteria** ([`criteria`]) - a typed filter builder with logical composition
//! - **Queries and updates** ([`query`], [`update`]) - sort, paging, projection and update operators
//! - **Aggregation** ([`aggregation`], [`near`], [`map_reduce`]) - pipelines, geo-near and map-reduce
//! - **Indexes** ([`index`]) - index definitions
//! - **Operations** ([`operations`]) - the untyped store interface backends implement
//! - **Typed façade** ([`extensions`], [`find`]) - entity-typed methods on every backend
//! - **Entities** ([`entity`]) - binding types to collections
//! - **Error handling** ([`error`]) - error types and result types
//! - **Pagination** ([`page`]) - page results
//!
//! # Example
//!
//! ```ignore
//! use doccrit::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize, Fields, Entity)]
//! #[entity(collection = "books")]
//! struct Book {
//!     title: String,
//!     price: f64,
//!     author: Author,
//! }
//!
//! #[derive(Debug, Serialize, Deserialize, Fields)]
//! struct Author {
//!     name: String,
//! }
//!
//! let books: Vec<Book> = ops
//!     .find::<Book>(Query::new(
//!         (BookFields::author() / AuthorFields::name())
//!             .eq("Frank Herbert")
//!             .and(BookFields::price().lt(20.0)),
//!     ))
//!     .await?;
//! ```

pub mod aggregation;
pub mod criteria;
pub mod entity;
pub mod error;
pub mod extensions;
pub mod find;
pub mod geo;
pub mod index;
pub mod map_reduce;
pub mod near;
pub mod operations;
pub mod page;
pub mod property;
pub mod query;
pub mod update;
