//! Storage backend abstraction.
//!
//! The ODM core never talks to a database directly. It delegates every persistence call
//! to a [`StoreBackend`]: a collection-level CRUD and aggregation client working on
//! storage-shape BSON documents. Backends receive filters that were already transformed
//! and coerced, and return documents exactly as stored.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`DynStoreBackend`]: An object-safe twin used behind named connections
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use odmlayer_core::backend::{StoreBackend, Update, FindOneAndUpdateOptions};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! backend.insert(vec![doc! { "name": "Alice" }], "users").await?;
//! let before = backend
//!     .find_one_and_update(
//!         doc! { "name": "Alice" },
//!         Update::Set(doc! { "age": 30 }),
//!         FindOneAndUpdateOptions { return_original: true, upsert: false },
//!         "users",
//!     )
//!     .await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::fmt::Debug;

use crate::{
    error::OdmResult,
    query::{Sort, Stage},
};

/// Name of the storage identifier key.
pub const ID_KEY: &str = "_id";

/// The write half of a `find_one_and_update` or `update_many` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Set the given fields, leaving the others untouched.
    Set(Document),
    /// Replace the whole document, keeping its identifier.
    Replace(Document),
}

impl Update {
    pub fn document(&self) -> &Document {
        match self {
            Update::Set(document) | Update::Replace(document) => document,
        }
    }
}

/// Options for [`StoreBackend::find`]. Sort fields are storage keys.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FindOptions {
    pub sort: Vec<Sort>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Options for [`StoreBackend::find_one_and_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FindOneAndUpdateOptions {
    /// Return the document as it was before the update rather than after.
    pub return_original: bool,
    /// Insert a new document when nothing matches.
    pub upsert: bool,
}

/// Outcome of an `update_many` call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    /// Identifier of the document created by an upsert, if any.
    pub upserted_id: Option<Bson>,
}

/// Outcome of a delete call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Error Handling
///
/// Errors are passed through the ODM core to the caller unmodified; the core adds no
/// retries.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Returns the first document matching `filter`.
    async fn find_one(&self, filter: Document, collection: &str) -> OdmResult<Option<Document>>;

    /// Returns every document matching `filter`.
    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
    ) -> OdmResult<Vec<Document>>;

    /// Atomically updates the first document matching `filter`.
    ///
    /// Returns the pre-image when `return_original` is set, otherwise the post-image.
    /// A pre-image of `None` means no document matched, even when `upsert` created one.
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Update,
        options: FindOneAndUpdateOptions,
        collection: &str,
    ) -> OdmResult<Option<Document>>;

    /// Inserts documents, generating an `ObjectId` for any document without `_id`.
    ///
    /// Returns the documents as stored, identifiers included.
    async fn insert(&self, documents: Vec<Document>, collection: &str) -> OdmResult<Vec<Document>>;

    async fn update_many(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> OdmResult<UpdateResult>;

    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult>;

    async fn delete_many(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult>;

    /// Runs an aggregation pipeline whose stages were prepared against the model.
    async fn aggregate(&self, stages: Vec<Stage>, collection: &str) -> OdmResult<Vec<Document>>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// Connections are shared between repositories, so shutdown works through a shared
    /// reference; the backend must not be used afterwards. The default implementation is
    /// a no-op.
    async fn shutdown(&self) -> OdmResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn find_one(&self, filter: Document, collection: &str) -> OdmResult<Option<Document>> {
        (*self).find_one(filter, collection).await
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
    ) -> OdmResult<Vec<Document>> {
        (*self).find(filter, options, collection).await
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Update,
        options: FindOneAndUpdateOptions,
        collection: &str,
    ) -> OdmResult<Option<Document>> {
        (*self)
            .find_one_and_update(filter, update, options, collection)
            .await
    }

    async fn insert(&self, documents: Vec<Document>, collection: &str) -> OdmResult<Vec<Document>> {
        (*self).insert(documents, collection).await
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> OdmResult<UpdateResult> {
        (*self)
            .update_many(filter, update, upsert, collection)
            .await
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult> {
        (*self).delete_one(filter, collection).await
    }

    async fn delete_many(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult> {
        (*self).delete_many(filter, collection).await
    }

    async fn aggregate(&self, stages: Vec<Stage>, collection: &str) -> OdmResult<Vec<Document>> {
        (*self).aggregate(stages, collection).await
    }

    async fn shutdown(&self) -> OdmResult<()> {
        (*self).shutdown().await
    }
}

/// Object-safe twin of [`StoreBackend`], implemented for every backend.
#[async_trait]
pub trait DynStoreBackend: Send + Sync + Debug {
    async fn find_one(&self, filter: Document, collection: &str) -> OdmResult<Option<Document>>;
    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
    ) -> OdmResult<Vec<Document>>;
    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Update,
        options: FindOneAndUpdateOptions,
        collection: &str,
    ) -> OdmResult<Option<Document>>;
    async fn insert(&self, documents: Vec<Document>, collection: &str) -> OdmResult<Vec<Document>>;
    async fn update_many(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> OdmResult<UpdateResult>;
    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult>;
    async fn delete_many(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult>;
    async fn aggregate(&self, stages: Vec<Stage>, collection: &str) -> OdmResult<Vec<Document>>;
    async fn shutdown(&self) -> OdmResult<()>;
}

#[async_trait]
impl<B: StoreBackend + 'static> DynStoreBackend for B {
    async fn find_one(&self, filter: Document, collection: &str) -> OdmResult<Option<Document>> {
        StoreBackend::find_one(self, filter, collection).await
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
    ) -> OdmResult<Vec<Document>> {
        StoreBackend::find(self, filter, options, collection).await
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Update,
        options: FindOneAndUpdateOptions,
        collection: &str,
    ) -> OdmResult<Option<Document>> {
        StoreBackend::find_one_and_update(self, filter, update, options, collection).await
    }

    async fn insert(&self, documents: Vec<Document>, collection: &str) -> OdmResult<Vec<Document>> {
        StoreBackend::insert(self, documents, collection).await
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> OdmResult<UpdateResult> {
        StoreBackend::update_many(self, filter, update, upsert, collection).await
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult> {
        StoreBackend::delete_one(self, filter, collection).await
    }

    async fn delete_many(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult> {
        StoreBackend::delete_many(self, filter, collection).await
    }

    async fn aggregate(&self, stages: Vec<Stage>, collection: &str) -> OdmResult<Vec<Document>> {
        StoreBackend::aggregate(self, stages, collection).await
    }

    async fn shutdown(&self) -> OdmResult<()> {
        StoreBackend::shutdown(self).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> OdmResult<Self::Backend>;
}
