//! The ODM context.
//!
//! An [`Odm`] ties together the model registry, the storage connections and the event
//! emitter. Repositories borrow it for the duration of their use:
//!
//! ```ignore
//! use odmlayer::prelude::*;
//!
//! let odm = Odm::builder()
//!     .register::<Alert>()
//!     .connection("default", InMemoryStore::new())
//!     .emitter(ChannelEmitter::new())
//!     .build()?;
//!
//! let alerts = odm.model_repository::<Alert>();
//! let saved = alerts.save(&alert).await?;
//! ```

use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    connection::{Connection, ConnectionProvider, ConnectionRegistryBuilder},
    emitter::{EventEmitter, NoopEmitter},
    error::{OdmError, OdmResult},
    model::Model,
    registry::{ModelRef, ModelRegistry, ModelRegistryBuilder},
    repository::{ModelRepository, Repository},
};

#[derive(Debug)]
pub struct Odm {
    registry: ModelRegistry,
    connections: Arc<dyn ConnectionProvider>,
    emitter: Arc<dyn EventEmitter>,
}

impl Odm {
    pub fn builder() -> OdmBuilder {
        OdmBuilder::default()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn emitter(&self) -> &dyn EventEmitter {
        &*self.emitter
    }

    /// Returns the storage connection named `name`.
    pub async fn connection(&self, name: &str) -> OdmResult<Connection> {
        self.connections.get_connection(name).await
    }

    /// An untyped repository resolving models from each payload's `modelType`.
    pub fn repository(&self) -> Repository<'_> {
        Repository::new(self, None)
    }

    /// An untyped repository that falls back to `model` when a payload names none.
    pub fn repository_for(&self, model: ModelRef) -> Repository<'_> {
        Repository::new(self, Some(model))
    }

    /// A repository of `M` values.
    pub fn model_repository<M: Model>(&self) -> ModelRepository<'_, M> {
        ModelRepository::new(self)
    }

    /// Shuts down every storage connection.
    pub async fn shutdown(self) -> OdmResult<()> {
        self.connections.shutdown().await
    }
}

#[derive(Default)]
pub struct OdmBuilder {
    registry: Option<ModelRegistry>,
    models: ModelRegistryBuilder,
    connections: Option<Arc<dyn ConnectionProvider>>,
    named: ConnectionRegistryBuilder,
    emitter: Option<Arc<dyn EventEmitter>>,
}

impl OdmBuilder {
    /// Uses an already built registry instead of the global one.
    pub fn registry(mut self, registry: ModelRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Registers `M` into a registry private to this context.
    pub fn register<M: Model>(mut self) -> Self {
        self.models = self.models.register::<M>();
        self
    }

    /// Adds a named connection.
    pub fn connection<B: StoreBackend + 'static>(mut self, name: impl Into<String>, backend: B) -> Self {
        self.named = self.named.connection(name, backend);
        self
    }

    /// Uses a custom connection provider. Connections added with
    /// [`connection`](Self::connection) are ignored.
    pub fn connections(mut self, provider: impl ConnectionProvider + 'static) -> Self {
        self.connections = Some(Arc::new(provider));
        self
    }

    pub fn emitter(mut self, emitter: impl EventEmitter + 'static) -> Self {
        self.emitter = Some(Arc::new(emitter));
        self
    }

    pub fn shared_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Builds the context.
    ///
    /// The registry is, in order of preference: the one given to
    /// [`registry`](Self::registry), one built from [`register`](Self::register) calls,
    /// or the installed global registry.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::Initialization`] if no models are known at all, or a
    /// configuration error if two registrations collide.
    pub fn build(self) -> OdmResult<Odm> {
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let built = self.models.build()?;

                match ModelRegistry::global() {
                    Some(global) if built.is_empty() => global.clone(),
                    _ => built,
                }
            }
        };

        if registry.is_empty() {
            return Err(OdmError::Initialization(
                "no models are registered, register models or install a global registry".into(),
            ));
        }

        let connections = match self.connections {
            Some(provider) => provider,
            None => Arc::new(self.named.build()) as Arc<dyn ConnectionProvider>,
        };

        log::debug!("odm context ready with {} models", registry.len());

        Ok(Odm {
            registry,
            connections,
            emitter: self.emitter.unwrap_or_else(|| Arc::new(NoopEmitter)),
        })
    }
}
