//! Convenient re-exports of commonly used types from odmlayer.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use odmlayer::prelude::*;
//! ```

pub use odmlayer_core::{
    backend::{DynStoreBackend, StoreBackend, StoreBackendBuilder},
    changes::{ChangeEvent, ChangeKind, ChangeSet},
    config::OdmConfig,
    emitter::{ChannelEmitter, EventEmitter, NoopEmitter},
    error::{OdmError, OdmResult},
    metadata::{FieldDescriptor, ModelMetadata, TransformMode},
    model::{Model, ModelExt},
    odm::Odm,
    page::{Page, PaginationParams},
    query::{Query, QueryOutput, ReturnType, SortDirection},
    registry::{ModelRef, ModelRegistry},
    repository::{ModelRepository, Repository, UpdateOptions},
};
pub use odmlayer_macros::Model;
