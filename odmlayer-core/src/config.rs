//! Connection configuration.
//!
//! Configuration is plain serde data, usually loaded from a JSON file:
//!
//! ```json
//! {
//!     "default_connection": "default",
//!     "connections": {
//!         "default": { "uri": "mongodb://localhost:27017", "database": "odm" },
//!         "audit": { "uri": "mongodb://audit:27017", "database": "audit" }
//!     }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};

use crate::{
    error::{OdmError, OdmResult},
    metadata::DEFAULT_CONNECTION,
};

/// Settings of one named storage connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub uri: String,
    pub database: String,
}

impl ConnectionConfig {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self { uri: uri.into(), database: database.into() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OdmConfig {
    /// Connection used by models that do not name one.
    #[serde(default = "default_connection_name")]
    pub default_connection: String,
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

fn default_connection_name() -> String {
    DEFAULT_CONNECTION.to_string()
}

impl Default for OdmConfig {
    fn default() -> Self {
        Self {
            default_connection: default_connection_name(),
            connections: HashMap::new(),
        }
    }
}

impl OdmConfig {
    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::Configuration`] if the text is not a valid configuration.
    pub fn from_json(text: &str) -> OdmResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| OdmError::Configuration(format!("invalid configuration: {e}")))
    }

    /// Reads a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> OdmResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            OdmError::Configuration(format!("unable to read {}: {e}", path.display()))
        })?;

        Self::from_json(&text)
    }

    pub fn with_connection(mut self, name: impl Into<String>, connection: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), connection);
        self
    }

    /// Returns the settings of the connection `name`.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::ConnectionNotFound`] if `name` is not configured.
    pub fn connection(&self, name: &str) -> OdmResult<&ConnectionConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| OdmError::ConnectionNotFound(name.to_string()))
    }

    /// Returns the settings of the default connection.
    pub fn default_connection_config(&self) -> OdmResult<&ConnectionConfig> {
        self.connection(&self.default_connection)
    }
}
