//! Core traits for declared models and their serialization.
//!
//! A model is a serde type with a statically attached [`ModelMetadata`] record. The
//! usual way to implement [`Model`] is `#[derive(Model)]` from `odmlayer-macros`, which
//! is the Rust counterpart of declaring a model class with field decorators.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Deserialize, Serialize};
use serde_json::{Value, from_value, to_value};

use crate::{
    error::{OdmError, OdmResult},
    metadata::ModelMetadata,
};

/// Core trait that every mapped model implements.
///
/// # Example
///
/// ```ignore
/// use odmlayer::prelude::*;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize, Model)]
/// #[model(collection = "alerts")]
/// pub struct Alert {
///     #[field(key = "_id", object_id)]
///     #[serde(skip_serializing_if = "Option::is_none")]
///     pub id: Option<String>,
///     pub severity: String,
/// }
/// ```
pub trait Model: Serialize + for<'de> Deserialize<'de> + Send + Sync + Clone + 'static {
    /// The unique name the model is registered under.
    fn model_name() -> &'static str;

    /// The model's metadata record, built once for the process lifetime.
    fn metadata() -> &'static ModelMetadata;
}

/// Extension trait providing conversions between models and BSON/JSON.
///
/// Automatically implemented for every [`Model`].
pub trait ModelExt: Model {
    /// Serializes this model into a BSON document in application shape.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the model does not serialize to a document.
    fn to_document(&self) -> OdmResult<Document>;

    /// Creates a model from a BSON document in application shape.
    fn from_document(document: Document) -> OdmResult<Self>;

    fn to_json(&self) -> OdmResult<Value>;

    fn from_json(value: Value) -> OdmResult<Self>;
}

impl<M: Model> ModelExt for M {
    fn to_document(&self) -> OdmResult<Document> {
        match serialize_to_bson(self)? {
            Bson::Document(document) => Ok(document),
            other => Err(OdmError::InvalidDocument(format!(
                "model {} serialized to {:?}, expected a document",
                M::model_name(),
                other.element_type(),
            ))),
        }
    }

    fn from_document(document: Document) -> OdmResult<Self> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }

    fn to_json(&self) -> OdmResult<Value> {
        Ok(to_value(self)?)
    }

    fn from_json(value: Value) -> OdmResult<Self> {
        Ok(from_value(value)?)
    }
}
