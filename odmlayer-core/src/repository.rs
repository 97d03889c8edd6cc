//! Repository operations.
//!
//! Repositories run every mutating operation through the same fixed pipeline:
//!
//! 1. resolve the model metadata owning the payload, failing fast when there is none,
//! 2. strip the `odm`/`modelType` bookkeeping keys,
//! 3. transform filters into storage shape and coerce their identifier and numeric values,
//! 4. for partial updates, merge the payload onto the current document,
//! 5. persist through the model's connection,
//! 6. transform the persisted result back into application shape,
//! 7. compute the change set and emit a change event.
//!
//! The transform steps only run for models declared with [`TransformMode::Automatic`].
//!
//! [`Repository`] works on raw documents; [`ModelRepository`] wraps it for a concrete
//! [`Model`] type.
//!
//! The read-modify-write of a partial update is not isolated: concurrent updates of the
//! same document race and the last write wins.
//!
//! [`TransformMode::Automatic`]: crate::metadata::TransformMode::Automatic

use bson::{Bson, Document, doc, oid::ObjectId};
use std::marker::PhantomData;

use crate::{
    backend::{DeleteResult, FindOneAndUpdateOptions, FindOptions, ID_KEY, Update, UpdateResult},
    changes::{ChangeEvent, ChangeKind, ChangeSet, diff},
    coerce::to_identifier,
    connection::Connection,
    error::{OdmError, OdmResult},
    filter::storage_filter,
    merge::smart_merge,
    metadata::ModelMetadata,
    model::{Model, ModelExt},
    odm::Odm,
    page::{Page, TOTAL_KEY},
    query::{Query, QueryOutput, ReturnType, Stage},
    registry::{MODEL_TYPE_KEY, ModelRef, ODM_KEY, Subject},
    transform::{Direction, RESULTS_KEY, transform_all, transform_document, transform_envelope},
};

/// Options for [`Repository::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOptions {
    /// Create the document when nothing matches the filter.
    pub upsert: bool,
    /// Replace the stored document instead of merging the payload onto it.
    pub replace: bool,
}

impl UpdateOptions {
    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }

    pub fn with_replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }
}

/// Untyped repository over raw documents.
///
/// The owning model of each payload is resolved from its `modelType` key, falling back
/// to the repository's model when one was given.
#[derive(Debug, Clone)]
pub struct Repository<'a> {
    odm: &'a Odm,
    model: Option<ModelRef>,
    declared: Option<ModelRef>,
}

impl<'a> Repository<'a> {
    pub(crate) fn new(odm: &'a Odm, model: Option<ModelRef>) -> Self {
        Self { odm, model, declared: None }
    }

    fn declared(odm: &'a Odm, model: ModelRef) -> Self {
        Self {
            odm,
            model: Some(model.clone()),
            declared: Some(model),
        }
    }

    pub fn model(&self) -> Option<&ModelRef> {
        self.model.as_ref()
    }

    /// Saves a whole document, creating it when it does not exist yet.
    ///
    /// A document without an identifier is given a fresh `ObjectId`. Returns the saved
    /// document in application shape.
    pub async fn save(&self, data: Document) -> OdmResult<Document> {
        let metadata = self.resolve(&probe(&data), None)?;
        let mut stored = to_storage(metadata, clean(data));

        let id = match stored.get(ID_KEY) {
            Some(id) if *id != Bson::Null => id.clone(),
            _ => {
                let id = Bson::ObjectId(ObjectId::new());
                stored.insert(ID_KEY, id.clone());
                id
            }
        };

        log::debug!("saving {} into {}", id, metadata.collection_name);

        let before = self
            .connection(metadata)
            .await?
            .find_one_and_update(
                doc! { ID_KEY: id },
                Update::Replace(stored.clone()),
                FindOneAndUpdateOptions { return_original: true, upsert: true },
                &metadata.collection_name,
            )
            .await?
            .map(|before| to_application(metadata, before));

        let after = to_application(metadata, stored);
        self.publish(ChangeKind::Update, metadata, Some(diff(before.as_ref(), &after)), &after);

        Ok(after)
    }

    /// Inserts documents, returning them as stored in application shape.
    ///
    /// # Errors
    ///
    /// An empty batch carries no model information and fails with
    /// [`OdmError::Configuration`].
    pub async fn insert(&self, documents: Vec<Document>) -> OdmResult<Vec<Document>> {
        let candidates = Bson::Array(documents.first().map(probe).into_iter().collect());
        let metadata = self.resolve(&candidates, None)?;

        let stored = documents
            .into_iter()
            .map(|document| to_storage(metadata, clean(document)))
            .collect::<Vec<_>>();

        log::debug!("inserting {} documents into {}", stored.len(), metadata.collection_name);

        let inserted = self
            .connection(metadata)
            .await?
            .insert(stored, &metadata.collection_name)
            .await?
            .into_iter()
            .map(|document| to_application(metadata, document))
            .collect::<Vec<_>>();

        for document in &inserted {
            self.publish(ChangeKind::Create, metadata, None, document);
        }

        Ok(inserted)
    }

    pub async fn insert_one(&self, document: Document) -> OdmResult<Document> {
        self.insert(vec![document])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OdmError::Backend("insert returned no document".into()))
    }

    /// Fetches a document by identifier. Hex strings are matched as `ObjectId`s.
    pub async fn get(&self, id: impl Into<Bson>) -> OdmResult<Option<Document>> {
        let metadata = self.resolve(&Bson::Null, None)?;
        let filter = doc! { ID_KEY: to_identifier(id.into()).into_inner() };

        Ok(self
            .connection(metadata)
            .await?
            .find_one(filter, &metadata.collection_name)
            .await?
            .map(|document| to_application(metadata, document)))
    }

    /// Updates the first document matching `filter`.
    ///
    /// Unless `replace` is set, `data` is a partial document merged onto the current one:
    /// nested documents merge key by key, arrays are replaced whole. Returns the updated
    /// document, or `None` when nothing matched and `upsert` is not set.
    pub async fn update(
        &self,
        filter: Document,
        data: Document,
        options: UpdateOptions,
    ) -> OdmResult<Option<Document>> {
        let metadata = self.resolve(&probe(&data), None)?;
        let data = clean(data);
        let filter = storage_filter(metadata, filter);
        let connection = self.connection(metadata).await?;
        let collection = &metadata.collection_name;

        let target = if options.replace {
            data
        } else {
            let current = connection
                .find_one(filter.clone(), collection)
                .await?
                .map(|current| to_application(metadata, current))
                .unwrap_or_default();

            smart_merge(&current, &data)
        };

        let mut stored = to_storage(metadata, target);
        stored.remove(ID_KEY);

        let update = if options.replace {
            Update::Replace(stored.clone())
        } else {
            Update::Set(stored.clone())
        };

        log::debug!("updating {} matching {}", collection, filter);

        let before = connection
            .find_one_and_update(
                filter.clone(),
                update,
                FindOneAndUpdateOptions { return_original: true, upsert: options.upsert },
                collection,
            )
            .await?;

        match before {
            Some(before) => {
                let after = to_application(metadata, post_image(&before, stored, options.replace));
                let before = to_application(metadata, before);

                self.publish(ChangeKind::Update, metadata, Some(diff(Some(&before), &after)), &after);
                Ok(Some(after))
            }
            None if options.upsert => {
                let created = connection
                    .find_one(filter, collection)
                    .await?
                    .map(|created| to_application(metadata, created));

                if let Some(created) = &created {
                    self.publish(ChangeKind::Create, metadata, Some(diff(None, created)), created);
                }

                Ok(created)
            }
            None => {
                log::debug!("update of {} matched nothing", collection);
                Ok(None)
            }
        }
    }

    /// Sets the fields of `data` on every document matching `filter`.
    pub async fn update_many(
        &self,
        filter: Document,
        data: Document,
        upsert: bool,
    ) -> OdmResult<UpdateResult> {
        let metadata = self.resolve(&probe(&data), None)?;
        let data = clean(data);
        let filter = storage_filter(metadata, filter);

        let mut stored = to_storage(metadata, data.clone());
        stored.remove(ID_KEY);

        let result = self
            .connection(metadata)
            .await?
            .update_many(filter, Update::Set(stored), upsert, &metadata.collection_name)
            .await?;

        if result.modified_count > 0 || result.upserted_id.is_some() {
            let changes = ChangeSet { changed: data.clone(), ..ChangeSet::default() };
            self.publish(ChangeKind::Update, metadata, Some(changes), &data);
        }

        Ok(result)
    }

    /// Deletes the first document matching `filter`, or all of them unless `just_one`.
    pub async fn delete(&self, filter: Document, just_one: bool) -> OdmResult<DeleteResult> {
        let metadata = self.resolve(&probe(&filter), None)?;
        let filter = storage_filter(metadata, filter);
        let connection = self.connection(metadata).await?;
        let collection = &metadata.collection_name;

        log::debug!("deleting from {} matching {}", collection, filter);

        let result = if just_one {
            connection.delete_one(filter.clone(), collection).await?
        } else {
            connection.delete_many(filter.clone(), collection).await?
        };

        if result.deleted_count > 0 {
            self.publish(ChangeKind::Delete, metadata, None, &filter);
        }

        Ok(result)
    }

    /// Finds the documents matching a single filter.
    ///
    /// [`ReturnType::Single`] fetches at most one document.
    pub async fn find(&self, filter: Document, return_type: ReturnType) -> OdmResult<QueryOutput> {
        let metadata = self.resolve(&probe(&filter), None)?;
        let filter = storage_filter(metadata, filter);
        let options = match return_type {
            ReturnType::Single => FindOptions::default().with_limit(1),
            ReturnType::Many => FindOptions::default(),
        };

        log::debug!("finding in {} matching {}", metadata.collection_name, filter);

        let results = self
            .connection(metadata)
            .await?
            .find(filter, options, &metadata.collection_name)
            .await?
            .into_iter()
            .map(|document| to_application(metadata, document))
            .collect::<Vec<_>>();

        Ok(match return_type {
            ReturnType::Single => QueryOutput::One(results.into_iter().next()),
            ReturnType::Many => QueryOutput::Many(results),
        })
    }

    /// Runs a query pipeline. The query's own model takes precedence over the
    /// repository's.
    pub async fn query(&self, query: Query, return_type: ReturnType) -> OdmResult<QueryOutput> {
        let metadata = self.resolve(&Bson::Null, query.model.as_ref())?;
        let paging = query.paging_params();
        let counted = match query.stages.last() {
            Some(Stage::Count(name)) => Some(name.clone()),
            _ => None,
        };

        let stages = query
            .stages
            .into_iter()
            .map(|stage| stage.prepare(metadata))
            .collect::<Vec<_>>();

        log::debug!("running {} stages against {}", stages.len(), metadata.collection_name);

        let mut results = self
            .connection(metadata)
            .await?
            .aggregate(stages, &metadata.collection_name)
            .await?;

        if let Some(name) = counted.filter(|_| results.is_empty()) {
            results.push(doc! { name: 0_i64 });
        }

        if let Some(params) = paging {
            let mut envelope = results
                .into_iter()
                .next()
                .unwrap_or_else(|| doc! { RESULTS_KEY: [], TOTAL_KEY: 0 });

            if metadata.is_automatic() {
                transform_envelope(metadata, &mut envelope, Direction::Out);
            }

            return Ok(QueryOutput::Page(Page::from_envelope(envelope, &params)?));
        }

        let results = if metadata.is_automatic() {
            transform_all(metadata, results, Direction::Out)
        } else {
            results
        };

        Ok(match return_type {
            ReturnType::Single => QueryOutput::One(results.into_iter().next()),
            ReturnType::Many => QueryOutput::Many(results),
        })
    }

    fn resolve(
        &self,
        candidates: &Bson,
        explicit: Option<&ModelRef>,
    ) -> OdmResult<&'static ModelMetadata> {
        let subject = match &self.declared {
            Some(declared) => Subject::with_declared(candidates, declared.clone()),
            None => Subject::untyped(candidates),
        };

        self.odm
            .registry()
            .require(&subject, explicit.or(self.model.as_ref()))
    }

    async fn connection(&self, metadata: &ModelMetadata) -> OdmResult<Connection> {
        self.odm.connection(&metadata.connection_name).await
    }

    fn publish(
        &self,
        kind: ChangeKind,
        metadata: &ModelMetadata,
        changes: Option<ChangeSet>,
        payload: &Document,
    ) {
        let event = ChangeEvent::new(kind, metadata.collection_name.clone(), changes, payload.clone());
        let name = event.event_name();

        log::debug!("publishing {}", name);

        match kind {
            ChangeKind::Update => self.odm.emitter().changes(&name, event),
            ChangeKind::Create | ChangeKind::Delete => self.odm.emitter().emit(&name, event),
        }
    }
}

/// Repository of values of the model `M`.
#[derive(Debug, Clone)]
pub struct ModelRepository<'a, M: Model> {
    inner: Repository<'a>,
    _model: PhantomData<M>,
}

impl<'a, M: Model> ModelRepository<'a, M> {
    pub(crate) fn new(odm: &'a Odm) -> Self {
        Self {
            inner: Repository::declared(odm, ModelRef::of::<M>()),
            _model: PhantomData,
        }
    }

    /// The untyped repository underneath, for aggregations whose results are not `M`.
    pub fn untyped(&self) -> &Repository<'a> {
        &self.inner
    }

    pub async fn save(&self, model: &M) -> OdmResult<M> {
        M::from_document(self.inner.save(model.to_document()?).await?)
    }

    pub async fn insert(&self, models: &[M]) -> OdmResult<Vec<M>> {
        let documents = models
            .iter()
            .map(ModelExt::to_document)
            .collect::<OdmResult<Vec<_>>>()?;

        self.inner
            .insert(documents)
            .await?
            .into_iter()
            .map(M::from_document)
            .collect()
    }

    pub async fn insert_one(&self, model: &M) -> OdmResult<M> {
        M::from_document(self.inner.insert_one(model.to_document()?).await?)
    }

    pub async fn get(&self, id: impl Into<Bson>) -> OdmResult<Option<M>> {
        self.inner.get(id).await?.map(M::from_document).transpose()
    }

    /// Updates the first model matching `filter` with the partial document `data`.
    pub async fn update(
        &self,
        filter: Document,
        data: Document,
        options: UpdateOptions,
    ) -> OdmResult<Option<M>> {
        self.inner
            .update(filter, data, options)
            .await?
            .map(M::from_document)
            .transpose()
    }

    /// Replaces the first model matching `filter` with `model`.
    pub async fn replace(&self, filter: Document, model: &M, upsert: bool) -> OdmResult<Option<M>> {
        let options = UpdateOptions::default().with_replace(true).with_upsert(upsert);

        self.update(filter, model.to_document()?, options).await
    }

    pub async fn update_many(
        &self,
        filter: Document,
        data: Document,
        upsert: bool,
    ) -> OdmResult<UpdateResult> {
        self.inner.update_many(filter, data, upsert).await
    }

    pub async fn delete(&self, filter: Document, just_one: bool) -> OdmResult<DeleteResult> {
        self.inner.delete(filter, just_one).await
    }

    pub async fn find(&self, filter: Document) -> OdmResult<Vec<M>> {
        self.inner
            .find(filter, ReturnType::Many)
            .await?
            .into_many()
            .into_iter()
            .map(M::from_document)
            .collect()
    }

    pub async fn find_one(&self, filter: Document) -> OdmResult<Option<M>> {
        self.inner
            .find(filter, ReturnType::Single)
            .await?
            .into_one()
            .map(M::from_document)
            .transpose()
    }

    pub async fn query(&self, query: Query) -> OdmResult<Vec<M>> {
        self.inner
            .query(query, ReturnType::Many)
            .await?
            .into_many()
            .into_iter()
            .map(M::from_document)
            .collect()
    }

    /// Runs a paged query.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::InvalidDocument`] if the query has no paging stage.
    pub async fn page(&self, query: Query) -> OdmResult<Page<M>> {
        self.inner
            .query(query, ReturnType::Many)
            .await?
            .into_page()?
            .try_map(M::from_document)
    }
}

/// The part of a payload identity resolution looks at.
fn probe(document: &Document) -> Bson {
    let mut probe = Document::new();

    if let Some(model_type) = document.get(MODEL_TYPE_KEY) {
        probe.insert(MODEL_TYPE_KEY, model_type.clone());
    }

    Bson::Document(probe)
}

/// Removes bookkeeping keys that must never reach storage.
fn clean(mut document: Document) -> Document {
    document.remove(ODM_KEY);
    document.remove(MODEL_TYPE_KEY);
    document
}

fn to_storage(metadata: &ModelMetadata, document: Document) -> Document {
    if metadata.is_automatic() {
        transform_document(metadata, document, Direction::In)
    } else {
        document
    }
}

fn to_application(metadata: &ModelMetadata, document: Document) -> Document {
    if metadata.is_automatic() {
        transform_document(metadata, document, Direction::Out)
    } else {
        document
    }
}

/// The storage-shape document an update leaves behind, given the pre-image and the
/// written fields.
fn post_image(before: &Document, written: Document, replace: bool) -> Document {
    if !replace {
        return smart_merge(before, &written);
    }

    let mut after = Document::new();
    if let Some(id) = before.get(ID_KEY) {
        after.insert(ID_KEY, id.clone());
    }
    for (key, value) in written {
        after.insert(key, value);
    }

    after
}
