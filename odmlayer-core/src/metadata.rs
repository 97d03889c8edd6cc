//! Field and model metadata.
//!
//! Every model carries one [`ModelMetadata`] record describing its backing collection and
//! the mapping between application-side names (display names) and storage-side names
//! (property keys) of its fields. The record is built once, when the model is declared,
//! and only read afterwards.
//!
//! # Example
//!
//! ```ignore
//! use odmlayer_core::metadata::{FieldDescriptor, ModelMetadata, TransformMode};
//!
//! let metadata = ModelMetadata::builder("Alert")
//!     .collection("alerts")
//!     .transform(TransformMode::Automatic)
//!     .field(FieldDescriptor::object_id("id", "_id"))
//!     .field(FieldDescriptor::number("severity"))
//!     .build();
//!
//! assert_eq!(metadata.storage_key("id"), "_id");
//! ```

use bson::Bson;

/// Connection used by models that do not name one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Declared storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// A storage-native identifier (`ObjectId`).
    Identifier,
    Number,
    String,
    Boolean,
    Date,
    /// No declared type; values are never coerced in filters.
    Any,
}

/// Coercion applied to a field's value when a document is transformed into storage shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coercion {
    /// Convert to a storage-native identifier.
    ObjectId,
    /// Convert to a number.
    Number,
    #[default]
    None,
}

/// Type information attached to a field descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDetails {
    pub field_type: FieldType,
    pub coercion: Coercion,
    /// An optional literal declared alongside the field.
    pub value: Option<Bson>,
}

impl FieldDetails {
    pub fn new(field_type: FieldType, coercion: Coercion) -> Self {
        Self { field_type, coercion, value: None }
    }

    pub fn with_value(mut self, value: impl Into<Bson>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl Default for FieldDetails {
    fn default() -> Self {
        Self::new(FieldType::Any, Coercion::None)
    }
}

/// Describes one declared model property.
///
/// `display_name` is the name used at the application boundary (e.g. `id`) and
/// `property_key` the name used at the storage boundary (e.g. `_id`). When both are
/// equal the field passes through transforms under the same key.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub display_name: String,
    pub property_key: String,
    pub details: FieldDetails,
}

impl FieldDescriptor {
    /// Creates a descriptor whose display name differs from its property key.
    pub fn new(
        display_name: impl Into<String>,
        property_key: impl Into<String>,
        details: FieldDetails,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            property_key: property_key.into(),
            details,
        }
    }

    /// Creates an untyped descriptor stored under its own name.
    pub fn plain(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name, FieldDetails::default())
    }

    /// Creates an identifier descriptor coerced to `ObjectId` on the way into storage.
    pub fn object_id(display_name: impl Into<String>, property_key: impl Into<String>) -> Self {
        Self::new(
            display_name,
            property_key,
            FieldDetails::new(FieldType::Identifier, Coercion::ObjectId),
        )
    }

    /// Creates a numeric descriptor stored under its own name.
    pub fn number(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(
            name.clone(),
            name,
            FieldDetails::new(FieldType::Number, Coercion::Number),
        )
    }

    /// Returns `true` when transforms rename this field.
    pub fn is_renamed(&self) -> bool {
        self.display_name != self.property_key
    }
}

/// Controls whether repository operations run the transform engine implicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransformMode {
    #[default]
    Automatic,
    /// Payloads are persisted and returned in exactly the shape the caller provides.
    Manual,
}

/// The ODM record of a model: backing collection, connection and field mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    pub model_name: String,
    pub collection_name: String,
    pub connection_name: String,
    pub transform: TransformMode,
    /// Field descriptors in declaration order, at most one per property key.
    pub fields: Vec<FieldDescriptor>,
}

impl ModelMetadata {
    /// Starts building metadata for the named model.
    ///
    /// The collection defaults to the model name and the connection to
    /// [`DEFAULT_CONNECTION`].
    pub fn builder(model_name: impl Into<String>) -> ModelMetadataBuilder {
        ModelMetadataBuilder::new(model_name.into())
    }

    /// Looks up a descriptor by its storage-side property key.
    pub fn field(&self, property_key: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|descriptor| descriptor.property_key == property_key)
    }

    /// Looks up a descriptor by its application-side display name.
    ///
    /// When several descriptors share a display name, the last declared one wins.
    pub fn field_by_display_name(&self, display_name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .rev()
            .find(|descriptor| descriptor.display_name == display_name)
    }

    /// Maps an application-side field name to the name used in storage.
    ///
    /// Undeclared names map to themselves.
    pub fn storage_key<'a>(&'a self, name: &'a str) -> &'a str {
        self.field_by_display_name(name)
            .map(|descriptor| descriptor.property_key.as_str())
            .unwrap_or(name)
    }

    /// Maps a storage-side field name to the name used by the application.
    pub fn display_key<'a>(&'a self, name: &'a str) -> &'a str {
        self.field(name)
            .map(|descriptor| descriptor.display_name.as_str())
            .unwrap_or(name)
    }

    pub fn is_automatic(&self) -> bool {
        self.transform == TransformMode::Automatic
    }
}

/// Builder for [`ModelMetadata`].
#[derive(Debug)]
pub struct ModelMetadataBuilder {
    model_name: String,
    collection_name: Option<String>,
    connection_name: Option<String>,
    transform: TransformMode,
    fields: Vec<FieldDescriptor>,
}

impl ModelMetadataBuilder {
    pub fn new(model_name: String) -> Self {
        Self {
            model_name,
            collection_name: None,
            connection_name: None,
            transform: TransformMode::default(),
            fields: Vec::new(),
        }
    }

    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection_name = Some(name.into());
        self
    }

    pub fn connection(mut self, name: impl Into<String>) -> Self {
        self.connection_name = Some(name.into());
        self
    }

    pub fn transform(mut self, transform: TransformMode) -> Self {
        self.transform = transform;
        self
    }

    /// Adds a field descriptor. A later descriptor with the same property key replaces
    /// the earlier one.
    pub fn field(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields
            .retain(|existing| existing.property_key != descriptor.property_key);
        self.fields.push(descriptor);
        self
    }

    pub fn build(self) -> ModelMetadata {
        ModelMetadata {
            collection_name: self.collection_name.unwrap_or_else(|| self.model_name.clone()),
            connection_name: self
                .connection_name
                .unwrap_or_else(|| DEFAULT_CONNECTION.to_string()),
            model_name: self.model_name,
            transform: self.transform,
            fields: self.fields,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> ModelMetadata {
        ModelMetadata::builder("Alert")
            .field(FieldDescriptor::object_id("id", "_id"))
            .field(FieldDescriptor::plain("severity"))
            .field(FieldDescriptor::number("order"))
            .build()
    }

    #[test]
    fn builder_applies_defaults() {
        let metadata = alert();

        assert_eq!(metadata.collection_name, "Alert");
        assert_eq!(metadata.connection_name, DEFAULT_CONNECTION);
        assert!(metadata.is_automatic());
        assert_eq!(metadata.fields.len(), 3);
    }

    #[test]
    fn name_lookups_go_both_ways() {
        let metadata = alert();

        assert_eq!(metadata.storage_key("id"), "_id");
        assert_eq!(metadata.display_key("_id"), "id");
        assert_eq!(metadata.storage_key("severity"), "severity");
        assert_eq!(metadata.storage_key("unknown"), "unknown");
        assert!(metadata.field("_id").unwrap().is_renamed());
        assert!(!metadata.field("order").unwrap().is_renamed());
    }

    #[test]
    fn last_declared_descriptor_wins() {
        let metadata = ModelMetadata::builder("Alert")
            .field(FieldDescriptor::object_id("ref", "alert_id"))
            .field(FieldDescriptor::object_id("ref", "_id"))
            .field(FieldDescriptor::plain("order"))
            .field(FieldDescriptor::number("order"))
            .build();

        assert_eq!(metadata.storage_key("ref"), "_id");
        assert_eq!(metadata.fields.len(), 3);
        assert_eq!(metadata.fields[2].details.coercion, Coercion::Number);
    }
}
