//! In-memory storage implementation for document stores.
//!
//! Documents are kept per collection in insertion order, behind an async-aware
//! read-write lock. Filters, sorts and aggregation pipelines are evaluated by
//! scanning the collection.

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{collections::HashMap, sync::Arc};

use odmlayer_core::{
    backend::{
        DeleteResult, FindOneAndUpdateOptions, FindOptions, ID_KEY, StoreBackend,
        StoreBackendBuilder, Update, UpdateResult,
    },
    error::{OdmError, OdmResult},
    query::Stage,
};

use crate::{
    evaluator::{FilterEvaluator, values_equal},
    pipeline::{PipelineExecutor, sort_documents},
};

pub(crate) type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// This struct implements the [`StoreBackend`] trait to provide a fully functional
/// document store that operates entirely in memory using async-aware read-write locks.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing). For small to medium
/// datasets this is typically acceptable. For larger datasets, use the MongoDB backend.
///
/// # Example
///
/// ```ignore
/// use odmlayer_memory::InMemoryStore;
/// use odmlayer_core::backend::StoreBackend;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.insert(vec![doc! { "name": "Alice", "age": 30 }], "users").await?;
///     let found = store.find_one(doc! { "name": "Alice" }, "users").await?;
///     assert!(found.is_some());
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// ```ignore
    /// use odmlayer_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn find_one(&self, filter: Document, collection: &str) -> OdmResult<Option<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(None);
        };

        Ok(first_match(documents, &filter)?.map(|index| documents[index].clone()))
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
    ) -> OdmResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut matched = FilterEvaluator::filter_documents(documents, &filter)?;
        sort_documents(&mut matched, &options.sort);

        Ok(matched
            .into_iter()
            .skip(options.skip.unwrap_or(0))
            .take(options.limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Update,
        options: FindOneAndUpdateOptions,
        collection: &str,
    ) -> OdmResult<Option<Document>> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        match first_match(documents, &filter)? {
            Some(index) => {
                let original = documents[index].clone();
                apply_update(&mut documents[index], &update);

                Ok(Some(if options.return_original {
                    original
                } else {
                    documents[index].clone()
                }))
            }
            None if options.upsert => {
                let mut created = upsert_seed(&filter);
                apply_update(&mut created, &update);
                let created = with_identifier(created);

                log::debug!("upserted {} into {}", created.get(ID_KEY).unwrap_or(&Bson::Null), collection);
                documents.push(created.clone());

                Ok(if options.return_original { None } else { Some(created) })
            }
            None => Ok(None),
        }
    }

    async fn insert(&self, documents: Vec<Document>, collection: &str) -> OdmResult<Vec<Document>> {
        let mut store = self.store.write().await;
        let existing = store.entry(collection.to_string()).or_default();

        let stored = documents.into_iter().map(with_identifier).collect::<Vec<_>>();

        for (index, document) in stored.iter().enumerate() {
            let id = document.get(ID_KEY).unwrap_or(&Bson::Null);
            let duplicate = existing
                .iter()
                .chain(&stored[..index])
                .any(|other| other.get(ID_KEY).is_some_and(|other| values_equal(other, id)));

            if duplicate {
                return Err(OdmError::Backend(format!(
                    "duplicate key {} in collection {}",
                    id, collection
                )));
            }
        }

        existing.extend(stored.iter().cloned());

        Ok(stored)
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> OdmResult<UpdateResult> {
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();
        let mask = match_mask(documents, &filter)?;

        let mut result = UpdateResult::default();

        for (document, _) in documents.iter_mut().zip(&mask).filter(|(_, matched)| **matched) {
            let before = document.clone();
            apply_update(document, &update);

            result.matched_count += 1;
            if *document != before {
                result.modified_count += 1;
            }
        }

        if result.matched_count == 0 && upsert {
            let mut created = upsert_seed(&filter);
            apply_update(&mut created, &update);
            let created = with_identifier(created);

            result.upserted_id = created.get(ID_KEY).cloned();
            documents.push(created);
        }

        Ok(result)
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };

        Ok(match first_match(documents, &filter)? {
            Some(index) => {
                documents.remove(index);
                DeleteResult { deleted_count: 1 }
            }
            None => DeleteResult::default(),
        })
    }

    async fn delete_many(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult> {
        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(DeleteResult::default());
        };

        let mask = match_mask(documents, &filter)?;
        let mut flags = mask.iter();
        documents.retain(|_| !flags.next().copied().unwrap_or(false));

        Ok(DeleteResult {
            deleted_count: mask.iter().filter(|matched| **matched).count() as u64,
        })
    }

    async fn aggregate(&self, stages: Vec<Stage>, collection: &str) -> OdmResult<Vec<Document>> {
        let store = self.store.read().await;
        let documents = store.get(collection).cloned().unwrap_or_default();

        PipelineExecutor::new(&store, documents).run(&stages)
    }

    async fn shutdown(&self) -> OdmResult<()> {
        let mut store = self.store.write().await;
        log::debug!("discarding {} in-memory collections", store.len());
        store.clear();

        Ok(())
    }
}

fn first_match(documents: &[Document], filter: &Document) -> OdmResult<Option<usize>> {
    for (index, document) in documents.iter().enumerate() {
        if FilterEvaluator::matches(document, filter)? {
            return Ok(Some(index));
        }
    }

    Ok(None)
}

fn match_mask(documents: &[Document], filter: &Document) -> OdmResult<Vec<bool>> {
    documents
        .iter()
        .map(|document| FilterEvaluator::matches(document, filter))
        .collect()
}

/// Puts `_id` first, generating an `ObjectId` when it is missing.
fn with_identifier(document: Document) -> Document {
    let mut stored = Document::new();
    let mut rest = document;

    let id = rest
        .remove(ID_KEY)
        .unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
    stored.insert(ID_KEY, id);
    for (key, value) in rest {
        stored.insert(key, value);
    }

    stored
}

fn apply_update(document: &mut Document, update: &Update) {
    match update {
        Update::Set(fields) => {
            for (path, value) in fields {
                set_path(document, path, value.clone());
            }
        }
        Update::Replace(replacement) => {
            let id = document.remove(ID_KEY);
            let mut replaced = Document::new();

            if let Some(id) = id.or_else(|| replacement.get(ID_KEY).cloned()) {
                replaced.insert(ID_KEY, id);
            }
            for (key, value) in replacement {
                if key != ID_KEY {
                    replaced.insert(key.clone(), value.clone());
                }
            }

            *document = replaced;
        }
    }
}

/// Sets a dotted path, creating intermediate documents as needed.
fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, tail)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                set_path(inner, tail, value);
            }
        }
    }
}

/// Seeds an upserted document with the equality conditions of its filter.
fn upsert_seed(filter: &Document) -> Document {
    let mut seed = Document::new();

    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }

        let value = match condition {
            Bson::Document(operators) if operators.keys().any(|op| op.starts_with('$')) => {
                match operators.get("$eq") {
                    Some(value) => value.clone(),
                    None => continue,
                }
            }
            value => value.clone(),
        };

        set_path(&mut seed, key, value);
    }

    seed
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// ```ignore
/// use odmlayer_memory::InMemoryStore;
/// use odmlayer_core::backend::StoreBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let store = InMemoryStore::builder().build().await.unwrap();
/// }
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> OdmResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
