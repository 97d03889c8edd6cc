//! Procedural macros for the odmlayer project.
//!
//! # `Model`
//!
//! Derives the `Model` trait for a serde struct with named fields, attaching its ODM
//! metadata: backing collection, connection, transform mode and field descriptors.
//!
//! Container attribute, all keys optional:
//!
//! - `#[model(collection = "alerts")]` - backing collection, defaults to the struct name
//! - `#[model(connection = "audit")]` - named connection, defaults to `default`
//! - `#[model(transform = "manual")]` - `automatic` (default) or `manual`
//! - `#[model(name = "Alert")]` - registered model name, defaults to the struct name
//! - `#[model(crate = "odmlayer_core")]` - path of the crate exposing `model` and `metadata`
//!
//! Field attribute:
//!
//! - `#[field(key = "_id")]` - storage-side property key, defaults to the field name
//! - `#[field(object_id)]` - identifier coerced to `ObjectId` when stored
//! - `#[field(number)]` - number coerced from numeric strings when stored
//! - `#[field(value = 10)]` - literal recorded alongside the field
//!
//! The display name of a field is its serialized name, so `#[serde(rename = "...")]` and
//! the container's `#[serde(rename_all = "...")]` are honored and `#[serde(skip)]` fields
//! are left out.
//!
//! ```rust,ignore
//! use odmlayer::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Model)]
//! #[model(collection = "alerts")]
//! pub struct Alert {
//!     #[field(key = "_id", object_id)]
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     pub id: Option<String>,
//!     #[field(number)]
//!     pub severity: i32,
//!     pub title: String,
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as odmlayer_macros;

mod model;

use proc_macro::TokenStream;
use syn::{Data, DeriveInput, parse_macro_input};

#[proc_macro_derive(Model, attributes(model, field))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);

    let result = match ast.data {
        Data::Struct(ref data) => model::generate_model_for_struct(&ast, data),
        Data::Enum(_) | Data::Union(_) => Err(syn::Error::new_spanned(
            &ast.ident,
            "Model can only be derived for structs with named fields",
        )),
    };

    match result {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}
