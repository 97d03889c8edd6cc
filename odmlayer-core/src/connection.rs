//! Named storage connections.
//!
//! Every model declares the connection its collection lives on (`default` unless stated
//! otherwise). Repositories obtain the backend for that name through a
//! [`ConnectionProvider`].

use async_trait::async_trait;
use std::{collections::HashMap, fmt::Debug, sync::Arc};

use crate::{
    backend::{DynStoreBackend, StoreBackend},
    error::{OdmError, OdmResult},
    metadata::DEFAULT_CONNECTION,
};

/// Shared handle to a storage backend.
pub type Connection = Arc<dyn DynStoreBackend>;

/// Source of storage connections by name.
#[async_trait]
pub trait ConnectionProvider: Send + Sync + Debug {
    /// Returns the connection registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::ConnectionNotFound`] if no such connection is configured.
    async fn get_connection(&self, name: &str) -> OdmResult<Connection>;

    /// Releases every connection this provider handed out.
    async fn shutdown(&self) -> OdmResult<()> {
        Ok(())
    }
}

/// Fixed set of connections established at startup.
#[derive(Debug, Default, Clone)]
pub struct ConnectionRegistry {
    connections: HashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn builder() -> ConnectionRegistryBuilder {
        ConnectionRegistryBuilder::default()
    }

    /// Creates a registry holding a single backend under the default connection name.
    pub fn single<B: StoreBackend + 'static>(backend: B) -> Self {
        Self::builder().connection(DEFAULT_CONNECTION, backend).build()
    }

    pub fn get(&self, name: &str) -> Option<&Connection> {
        self.connections.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }

    async fn shutdown_all(&self) -> OdmResult<()> {
        let mut first_error = None;

        for (name, connection) in &self.connections {
            log::debug!("shutting down connection {}", name);

            if let Err(e) = connection.shutdown().await {
                log::error!("failed to shut down connection {}: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ConnectionProvider for ConnectionRegistry {
    async fn get_connection(&self, name: &str) -> OdmResult<Connection> {
        self.connections
            .get(name)
            .cloned()
            .ok_or_else(|| OdmError::ConnectionNotFound(name.to_string()))
    }

    /// Shuts down every connection, returning the first error encountered.
    async fn shutdown(&self) -> OdmResult<()> {
        self.shutdown_all().await
    }
}

#[derive(Debug, Default)]
pub struct ConnectionRegistryBuilder {
    connections: HashMap<String, Connection>,
}

impl ConnectionRegistryBuilder {
    /// Registers `backend` under `name`, replacing any previous connection of that name.
    pub fn connection<B: StoreBackend + 'static>(mut self, name: impl Into<String>, backend: B) -> Self {
        self.connections.insert(name.into(), Arc::new(backend));
        self
    }

    /// Registers an already shared connection under `name`.
    pub fn shared(mut self, name: impl Into<String>, connection: Connection) -> Self {
        self.connections.insert(name.into(), connection);
        self
    }

    pub fn build(self) -> ConnectionRegistry {
        ConnectionRegistry { connections: self.connections }
    }
}
