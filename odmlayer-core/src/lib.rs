//! A decorator-style object-document mapping layer over document stores.
//!
//! This crate is the core of the odmlayer project and provides:
//!
//! - **Model metadata** ([`metadata`], [`model`]) - Field descriptors mapping application names to storage keys
//! - **Model registry** ([`registry`]) - Write-once registry and identity resolution of payloads
//! - **Transform engine** ([`transform`], [`coerce`]) - Conversion between application and storage shape
//! - **Filter coercion** ([`filter`]) - Identifier and numeric coercion of filter values
//! - **Merge and change detection** ([`merge`], [`changes`], [`emitter`]) - Partial updates and change events
//! - **Storage abstraction** ([`backend`], [`connection`], [`config`]) - Backend traits and named connections
//! - **Queries and repositories** ([`query`], [`repository`], [`odm`]) - Aggregation pipelines and CRUD orchestration
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "alerts")]
//! pub struct Alert {
//!     #[field(key = "_id", object_id)]
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     pub id: Option<String>,
//!     #[field(number)]
//!     pub level: i32,
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_core;

pub mod backend;
pub mod changes;
pub mod coerce;
pub mod config;
pub mod connection;
pub mod emitter;
pub mod error;
pub mod filter;
pub mod merge;
pub mod metadata;
pub mod model;
pub mod odm;
pub mod page;
pub mod query;
pub mod registry;
pub mod repository;
pub mod transform;
