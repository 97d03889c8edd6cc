//! In-memory document storage backend for odmlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is ideal for development,
//! testing, and small-scale deployments.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Filter evaluation** - Equality, comparison, membership, existence, regex and logical operators
//! - **Aggregation** - Match, sort, skip, limit, project, group, lookup, add fields, count and paging
//! - **Upserts** - Seeded from the equality conditions of the filter
//!
//! # Quick Start
//!
//! ```ignore
//! use odmlayer::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "alerts")]
//! pub struct Alert {
//!     #[field(key = "_id", object_id)]
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     pub id: Option<String>,
//!     pub title: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let odm = Odm::builder()
//!         .register::<Alert>()
//!         .connection("default", InMemoryStore::builder().build().await?)
//!         .build()?;
//!
//!     odm.model_repository::<Alert>()
//!         .insert_one(&Alert { id: None, title: "disk full".into() })
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_memory;

mod evaluator;
mod pipeline;
pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
