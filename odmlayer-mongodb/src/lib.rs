//! MongoDB backend implementation for odmlayer.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filters go to the server as they are, and query pipelines are translated into native
//! aggregation pipelines.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! odmlayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Persistent storage** - Data is persisted to MongoDB Atlas or self-hosted MongoDB
//! - **Native aggregation** - Paging, grouping and lookups run on the server
//! - **Async/await** - Fully asynchronous API built on MongoDB's async driver
//! - **Named connections** - Builders can be created from an `OdmConfig` connection entry
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::{backend::StoreBackendBuilder, config::OdmConfig, mongodb::MongoDbStoreBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OdmConfig::from_file("odm.json")?;
//!     let store = MongoDbStoreBuilder::from_config(config.default_connection_config()?)
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_mongodb;

mod query;
pub mod store;

pub use store::{MongoDbStore, MongoDbStoreBuilder};
