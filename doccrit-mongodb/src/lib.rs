//! MongoDB backend for doccrit.
//!
//! [`MongoTemplate`] implements [`MongoOperations`](doccrit_core::operations::MongoOperations)
//! on top of the official asynchronous driver. Rendered filters, updates and
//! pipelines are handed to the server unchanged, so every operator the typed
//! API can express is available.
//!
//! Enable it with the `mongodb` feature of the umbrella crate:
//!
//! ```toml
//! [dependencies]
//! doccrit = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use doccrit::{operations::OperationsBuilder, mongodb::MongoTemplate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let template = MongoTemplate::builder("mongodb://localhost:27017", "library")
//!         .app_name("catalog")
//!         .build()
//!         .await?;
//!
//!     template.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! Duplicate-key write errors (server code 11000) surface as
//! [`OperationsError::DuplicateKey`](doccrit_core::error::OperationsError::DuplicateKey);
//! every other driver failure is reported as `Backend`.

pub mod template;

pub use template::{MongoTemplate, MongoTemplateBuilder};
