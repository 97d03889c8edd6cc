//! Main odmlayer crate providing a decorator-style object-document mapping layer.
//!
//! This crate is the primary entry point for users of the odmlayer framework.
//! It re-exports the core types and functionality from the sub-crates, the `Model`
//! derive, and convenient access to the different storage backends.
//!
//! # Features
//!
//! - **Declarative models** - Describe storage keys and coercions with `#[derive(Model)]`
//! - **Automatic transforms** - Documents and filters are converted between application and storage shape
//! - **Smart updates** - Partial updates merge nested documents and replace arrays
//! - **Change events** - Every mutation publishes a create, update or delete event
//! - **Multiple backends** - In-memory and MongoDB storage behind named connections
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
//!     #[field(number)]
//!     pub level: i32,
//!     pub tags: Vec<String>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> OdmResult<()> {
//!     let odm = Odm::builder()
//!         .register::<Alert>()
//!         .connection("default", InMemoryStore::builder().build().await?)
//!         .build()?;
//!
//!     let alerts = odm.model_repository::<Alert>();
//!
//!     // `id` is stored as an ObjectId under `_id`
//!     let saved = alerts
//!         .save(&Alert { id: None, level: 2, tags: vec!["disk".into()] })
//!         .await?;
//!
//!     // Partial update: `level` is coerced from text, `tags` is replaced whole
//!     alerts
//!         .update(
//!             bson::doc! { "id": saved.id.clone() },
//!             bson::doc! { "level": "3", "tags": ["disk", "full"] },
//!             UpdateOptions::default(),
//!         )
//!         .await?;
//!
//!     let page = alerts
//!         .page(Query::of::<Alert>().order("level", SortDirection::Desc).paging(1, 20))
//!         .await?;
//!     println!("{} alerts", page.total);
//!
//!     odm.shutdown().await
//! }
//! ```
//!
//! # Registries
//!
//! Models registered on an [`odm::OdmBuilder`] stay private to that context. A process
//! can instead install one global registry at startup with
//! [`registry::ModelRegistry::install`]; contexts built without registrations use it.
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - `mongodb` - Persistent MongoDB backend (requires the `mongodb` feature)

pub mod prelude;

pub use odmlayer_core::{
    backend, changes, coerce, config, connection, emitter, error, filter, merge, metadata,
    model, odm, page, query, registry, repository, transform,
};
pub use odmlayer_macros::Model;

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use odmlayer_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use odmlayer_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
