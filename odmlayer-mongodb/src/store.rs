use async_trait::async_trait;
use bson::{Bson, Document, doc, oid::ObjectId};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection,
    options::{ClientOptions, ReturnDocument},
};

use odmlayer_core::{
    backend::{
        DeleteResult, FindOneAndUpdateOptions, FindOptions, ID_KEY, StoreBackend,
        StoreBackendBuilder, Update, UpdateResult,
    },
    config::ConnectionConfig,
    error::{OdmError, OdmResult},
    query::Stage,
};

use crate::query::{MongoStageTranslator, sort_order};

#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(collection_name)
    }
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn find_one(&self, filter: Document, collection: &str) -> OdmResult<Option<Document>> {
        self.get_collection(collection)
            .find_one(filter)
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
        collection: &str,
    ) -> OdmResult<Vec<Document>> {
        let collection = self.get_collection(collection);
        let mut action = collection.find(filter);

        if !options.sort.is_empty() {
            action = action.sort(
                options
                    .sort
                    .iter()
                    .map(|sort| (sort.field.clone(), Bson::Int32(sort_order(sort.direction))))
                    .collect::<Document>(),
            );
        }
        if let Some(skip) = options.skip {
            action = action.skip(skip as u64);
        }
        if let Some(limit) = options.limit {
            action = action.limit(limit as i64);
        }

        action
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Update,
        options: FindOneAndUpdateOptions,
        collection: &str,
    ) -> OdmResult<Option<Document>> {
        let return_document = if options.return_original {
            ReturnDocument::Before
        } else {
            ReturnDocument::After
        };
        let collection = self.get_collection(collection);

        let result = match update {
            Update::Set(fields) => {
                collection
                    .find_one_and_update(filter, doc! { "$set": fields })
                    .return_document(return_document)
                    .upsert(options.upsert)
                    .await
            }
            Update::Replace(replacement) => {
                collection
                    .find_one_and_replace(filter, replacement)
                    .return_document(return_document)
                    .upsert(options.upsert)
                    .await
            }
        };

        result.map_err(|e| OdmError::Backend(e.to_string()))
    }

    async fn insert(&self, documents: Vec<Document>, collection: &str) -> OdmResult<Vec<Document>> {
        let stored = documents
            .into_iter()
            .map(|document| {
                if document.contains_key(ID_KEY) {
                    return document;
                }

                let mut identified = Document::new();
                identified.insert(ID_KEY, ObjectId::new());
                for (key, value) in document {
                    identified.insert(key, value);
                }
                identified
            })
            .collect::<Vec<_>>();

        self.get_collection(collection)
            .insert_many(&stored)
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?;

        Ok(stored)
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Update,
        upsert: bool,
        collection: &str,
    ) -> OdmResult<UpdateResult> {
        let collection = self.get_collection(collection);

        let result = match update {
            Update::Set(fields) => {
                collection
                    .update_many(filter, doc! { "$set": fields })
                    .upsert(upsert)
                    .await
            }
            Update::Replace(replacement) => {
                collection
                    .replace_one(filter, replacement)
                    .upsert(upsert)
                    .await
            }
        }
        .map_err(|e| OdmError::Backend(e.to_string()))?;

        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_one(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult> {
        let result = self
            .get_collection(collection)
            .delete_one(filter)
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?;

        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn delete_many(&self, filter: Document, collection: &str) -> OdmResult<DeleteResult> {
        let result = self
            .get_collection(collection)
            .delete_many(filter)
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?;

        Ok(DeleteResult { deleted_count: result.deleted_count })
    }

    async fn aggregate(&self, stages: Vec<Stage>, collection: &str) -> OdmResult<Vec<Document>> {
        let pipeline = MongoStageTranslator.translate(&stages)?;

        log::debug!("aggregating {} with {:?}", collection, pipeline);

        self.get_collection(collection)
            .aggregate(pipeline)
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| OdmError::Backend(e.to_string()))
    }

    async fn shutdown(&self) -> OdmResult<()> {
        log::debug!("shutting down mongodb client for {}", self.database);
        self.client.clone().shutdown().await;

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }

    /// Creates a builder for a configured named connection.
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(&config.uri, &config.database)
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> OdmResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| OdmError::Initialization(e.to_string()))?,
            )
            .map_err(|e| OdmError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
