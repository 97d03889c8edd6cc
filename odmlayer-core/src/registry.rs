//! Model registry and identity resolution.
//!
//! Models are registered once, during startup, into an immutable [`ModelRegistry`].
//! Repository operations then locate the metadata owning a payload through
//! [`ModelRegistry::resolve`], which checks, in order:
//!
//! 1. the model the payload was declared as (a typed repository knows it statically),
//! 2. an instance-level `modelType` key naming a registered model,
//! 3. a model explicitly supplied by the caller.
//!
//! # Example
//!
//! ```ignore
//! use odmlayer_core::registry::{ModelRegistry, ModelRef, Subject};
//!
//! let registry = ModelRegistry::builder()
//!     .register::<Alert>()
//!     .register::<User>()
//!     .build()?;
//!
//! let payload = bson::Bson::Document(bson::doc! { "modelType": "Alert" });
//! let metadata = registry.require(&Subject::untyped(&payload), None)?;
//! assert_eq!(metadata.model_name, "Alert");
//! ```

use bson::Bson;
use std::{collections::HashMap, fmt, sync::OnceLock};

use crate::{
    error::{OdmError, OdmResult},
    metadata::ModelMetadata,
    model::Model,
};

/// Instance-level key naming the model a payload belongs to.
pub const MODEL_TYPE_KEY: &str = "modelType";
/// Instance-level key that may carry an attached metadata record.
pub const ODM_KEY: &str = "odm";

static GLOBAL_REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();

/// A reference to a model by its registered name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelRef(String);

impl ModelRef {
    /// References the given model type.
    pub fn of<M: Model>() -> Self {
        Self(M::model_name().to_string())
    }

    /// References a model by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The value whose owning model is being resolved, together with its declared model.
#[derive(Debug, Clone)]
pub struct Subject<'a> {
    value: &'a Bson,
    declared: Option<ModelRef>,
}

impl<'a> Subject<'a> {
    /// A payload with no statically known model.
    pub fn untyped(value: &'a Bson) -> Self {
        Self { value, declared: None }
    }

    /// A payload produced from the model type `M`.
    pub fn typed<M: Model>(value: &'a Bson) -> Self {
        Self { value, declared: Some(ModelRef::of::<M>()) }
    }

    pub fn with_declared(value: &'a Bson, declared: ModelRef) -> Self {
        Self { value, declared: Some(declared) }
    }
}

/// Immutable mapping from model name to model metadata.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, &'static ModelMetadata>,
}

impl ModelRegistry {
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Publishes this registry process-wide.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::Configuration`] if a registry was already installed.
    pub fn install(self) -> OdmResult<&'static ModelRegistry> {
        GLOBAL_REGISTRY
            .set(self)
            .map_err(|_| OdmError::Configuration("model registry is already installed".into()))?;

        GLOBAL_REGISTRY
            .get()
            .ok_or_else(|| OdmError::Unknown("model registry vanished after install".into()))
    }

    /// Returns the process-wide registry, if one was installed.
    pub fn global() -> Option<&'static ModelRegistry> {
        GLOBAL_REGISTRY.get()
    }

    pub fn get(&self, model: &ModelRef) -> Option<&'static ModelMetadata> {
        self.models.get(model.name()).copied()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&'static ModelMetadata> {
        self.models.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Locates the metadata owning `subject`.
    ///
    /// Arrays resolve against their first element only, so an empty array resolves to
    /// `None` even when an explicit model is given: there is no document to attribute.
    pub fn resolve(
        &self,
        subject: &Subject<'_>,
        explicit: Option<&ModelRef>,
    ) -> Option<&'static ModelMetadata> {
        let element = match subject.value {
            Bson::Array(items) => items.first()?,
            value => value,
        };

        subject
            .declared
            .as_ref()
            .and_then(|declared| self.get(declared))
            .or_else(|| {
                element
                    .as_document()
                    .and_then(|document| document.get_str(MODEL_TYPE_KEY).ok())
                    .and_then(|name| self.get_by_name(name))
            })
            .or_else(|| explicit.and_then(|model| self.get(model)))
    }

    /// Like [`resolve`](Self::resolve), but fails fast when no model can be found.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::Configuration`] naming every candidate that was tried.
    pub fn require(
        &self,
        subject: &Subject<'_>,
        explicit: Option<&ModelRef>,
    ) -> OdmResult<&'static ModelMetadata> {
        self.resolve(subject, explicit).ok_or_else(|| {
            let candidates = subject
                .declared
                .iter()
                .chain(explicit)
                .map(ModelRef::to_string)
                .collect::<Vec<_>>();

            log::error!("unable to resolve model metadata (candidates: {:?})", candidates);

            OdmError::Configuration(if candidates.is_empty() {
                "class model information is missing, no model was declared for the payload".into()
            } else {
                format!(
                    "class model information is missing, none of [{}] is a registered model",
                    candidates.join(", "),
                )
            })
        })
    }
}

/// Builder collecting model registrations during startup.
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    models: Vec<&'static ModelMetadata>,
}

impl ModelRegistryBuilder {
    pub fn register<M: Model>(self) -> Self {
        self.register_metadata(M::metadata())
    }

    pub fn register_metadata(mut self, metadata: &'static ModelMetadata) -> Self {
        self.models.push(metadata);
        self
    }

    /// # Errors
    ///
    /// Returns [`OdmError::Configuration`] when two registrations share a model name.
    pub fn build(self) -> OdmResult<ModelRegistry> {
        let mut models = HashMap::with_capacity(self.models.len());

        for metadata in self.models {
            if models
                .insert(metadata.model_name.clone(), metadata)
                .is_some_and(|previous| !std::ptr::eq(previous, metadata))
            {
                return Err(OdmError::Configuration(format!(
                    "model {} is registered twice",
                    metadata.model_name,
                )));
            }
        }

        Ok(ModelRegistry { models })
    }
}
