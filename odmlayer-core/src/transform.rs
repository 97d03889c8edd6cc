//! Bidirectional transform between application shape and storage shape.
//!
//! Documents at the application boundary use display names (`id`), documents at rest
//! use property keys (`_id`). [`transform`] converts in either [`Direction`]:
//!
//! - [`Direction::In`] renames display names to property keys and coerces values of
//!   fields tagged [`Coercion::ObjectId`] or [`Coercion::Number`].
//! - [`Direction::Out`] renames property keys to display names and renders identifier
//!   fields as text.
//!
//! Keys without a descriptor pass through unchanged. When a pass-through key collides
//! with a key produced by a rename, the pass-through value is moved to the other name of
//! the descriptor owning the colliding key, so no value is lost and the transform stays
//! reversible: `{id: "a", _id: "b"}` goes in as `{_id: "a", id: "b"}` and comes back out
//! as `{id: "a", _id: "b"}`.

use bson::{Bson, Document};

use crate::{
    coerce::{to_identifier, to_number, to_text},
    metadata::{Coercion, FieldDescriptor, ModelMetadata},
};

/// Key of the nested result list inside a paginated envelope.
pub const RESULTS_KEY: &str = "results";

/// Direction of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Application shape to storage shape.
    In,
    /// Storage shape to application shape.
    Out,
}

/// Transforms a document, an array of documents, or an array holding a paginated
/// envelope (`[{results: [...], ...}]`).
///
/// Returns `None` for `null`/undefined input. Non-document array elements are returned
/// unchanged.
pub fn transform(metadata: &ModelMetadata, value: Bson, direction: Direction) -> Option<Bson> {
    match value {
        Bson::Null | Bson::Undefined => None,
        Bson::Array(mut items) => {
            let envelope = items
                .first_mut()
                .and_then(Bson::as_document_mut)
                .filter(|first| matches!(first.get(RESULTS_KEY), Some(Bson::Array(_))));

            match envelope {
                Some(first) => {
                    transform_envelope(metadata, first, direction);
                    Some(Bson::Array(items))
                }
                None => Some(Bson::Array(
                    items
                        .into_iter()
                        .map(|item| transform_value(metadata, item, direction))
                        .collect(),
                )),
            }
        }
        value => Some(transform_value(metadata, value, direction)),
    }
}

/// Transforms the nested `results` list of a paginated envelope in place.
pub fn transform_envelope(metadata: &ModelMetadata, envelope: &mut Document, direction: Direction) {
    if let Ok(results) = envelope.get_array_mut(RESULTS_KEY) {
        for item in results.iter_mut() {
            let taken = std::mem::replace(item, Bson::Null);
            *item = transform_value(metadata, taken, direction);
        }
    }
}

/// Transforms a batch of documents.
pub fn transform_all(
    metadata: &ModelMetadata,
    documents: Vec<Document>,
    direction: Direction,
) -> Vec<Document> {
    documents
        .into_iter()
        .map(|document| transform_document(metadata, document, direction))
        .collect()
}

fn transform_value(metadata: &ModelMetadata, value: Bson, direction: Direction) -> Bson {
    match value {
        Bson::Document(document) => Bson::Document(transform_document(metadata, document, direction)),
        other => other,
    }
}

/// Transforms a single document.
pub fn transform_document(
    metadata: &ModelMetadata,
    document: Document,
    direction: Direction,
) -> Document {
    let mut renamed = Document::new();
    let mut passthrough = Vec::new();

    for (key, value) in document {
        let descriptor = match direction {
            Direction::In => metadata.field_by_display_name(&key),
            Direction::Out => metadata.field(&key),
        };

        match descriptor {
            Some(descriptor) => {
                let value = coerce(descriptor, value, direction);
                let target = match direction {
                    Direction::In => &descriptor.property_key,
                    Direction::Out => &descriptor.display_name,
                };
                renamed.insert(target.clone(), value);
            }
            None => passthrough.push((key, value)),
        }
    }

    for (key, value) in passthrough {
        if !renamed.contains_key(&key) {
            renamed.insert(key, value);
            continue;
        }

        let parked = parking_key(metadata, &key, direction)
            .filter(|parked| !renamed.contains_key(parked.as_str()));

        match parked {
            Some(parked) => {
                renamed.insert(parked, value);
            }
            None => log::warn!(
                "dropping {:?} value for key {} of model {}: the key is taken by a renamed field",
                direction,
                key,
                metadata.model_name,
            ),
        }
    }

    renamed
}

/// For a pass-through key that collides with a renamed key, returns the other name of the
/// descriptor that produced the collision.
fn parking_key(metadata: &ModelMetadata, key: &str, direction: Direction) -> Option<String> {
    match direction {
        Direction::In => metadata.field(key).map(|descriptor| descriptor.display_name.clone()),
        Direction::Out => metadata
            .field_by_display_name(key)
            .map(|descriptor| descriptor.property_key.clone()),
    }
}

fn coerce(descriptor: &FieldDescriptor, value: Bson, direction: Direction) -> Bson {
    match (direction, descriptor.details.coercion) {
        (Direction::In, Coercion::ObjectId) => to_identifier(value).into_inner(),
        (Direction::In, Coercion::Number) => to_number(value).into_inner(),
        (Direction::Out, Coercion::ObjectId) => to_text(value),
        _ => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{FieldDescriptor, FieldDetails, FieldType};
    use bson::{doc, oid::ObjectId};

    fn alert() -> ModelMetadata {
        ModelMetadata::builder("Alert")
            .field(FieldDescriptor::object_id("id", "_id"))
            .field(FieldDescriptor::new(
                "title",
                "alert_title",
                FieldDetails::new(FieldType::String, Coercion::None),
            ))
            .field(FieldDescriptor::number("order"))
            .field(FieldDescriptor::plain("severity"))
            .build()
    }

    #[test]
    fn in_renames_and_coerces() {
        let oid = ObjectId::new();
        let input = doc! { "id": oid.to_hex(), "title": "disk full", "order": "3", "extra": true };

        let output = transform_document(&alert(), input, Direction::In);

        assert_eq!(
            output,
            doc! { "_id": oid, "alert_title": "disk full", "order": 3, "extra": true },
        );
    }

    #[test]
    fn out_renames_and_stringifies_identifiers() {
        let oid = ObjectId::new();
        let input = doc! { "_id": oid, "alert_title": "disk full", "severity": "low" };

        let output = transform_document(&alert(), input, Direction::Out);

        assert_eq!(
            output,
            doc! { "id": oid.to_hex(), "title": "disk full", "severity": "low" },
        );
    }

    #[test]
    fn colliding_passthrough_key_is_parked_under_the_display_name() {
        let input = doc! { "id": "abc123", "_id": "danny" };

        let output = transform_document(&alert(), input, Direction::In);

        assert_eq!(output.get_str("_id").unwrap(), "abc123");
        assert_eq!(output.get_str("id").unwrap(), "danny");
    }

    #[test]
    fn collision_handling_ignores_key_order() {
        let oid = ObjectId::new();
        let input = doc! { "_id": "danny", "id": oid.to_hex() };

        let output = transform_document(&alert(), input, Direction::In);

        assert_eq!(output.get_object_id("_id").unwrap(), oid);
        assert_eq!(output.get_str("id").unwrap(), "danny");
    }

    #[test]
    fn round_trip_restores_declared_fields() {
        let oid = ObjectId::new();
        let original = doc! { "id": oid.to_hex(), "title": "t", "order": 4, "x": "y" };
        let metadata = alert();

        let stored = transform_document(&metadata, original.clone(), Direction::In);
        let restored = transform_document(&metadata, stored, Direction::Out);

        assert_eq!(restored, original);
    }

    #[test]
    fn round_trip_survives_collisions() {
        let metadata = alert();
        let original = doc! { "id": "abc123", "_id": "danny" };

        let stored = transform_document(&metadata, original.clone(), Direction::In);
        let restored = transform_document(&metadata, stored, Direction::Out);

        assert_eq!(restored.get_str("id").unwrap(), "abc123");
        assert_eq!(restored.get_str("_id").unwrap(), "danny");
    }

    #[test]
    fn null_input_is_a_no_op() {
        assert_eq!(transform(&alert(), Bson::Null, Direction::In), None);
    }

    #[test]
    fn arrays_are_mapped_element_wise() {
        let oid = ObjectId::new();
        let input = Bson::Array(vec![
            Bson::Document(doc! { "_id": oid }),
            Bson::Document(doc! { "alert_title": "x" }),
        ]);

        let output = transform(&alert(), input, Direction::Out).unwrap();

        assert_eq!(
            output,
            Bson::Array(vec![
                Bson::Document(doc! { "id": oid.to_hex() }),
                Bson::Document(doc! { "title": "x" }),
            ]),
        );
    }

    #[test]
    fn paginated_envelopes_transform_their_results() {
        let oid = ObjectId::new();
        let input = Bson::Array(vec![Bson::Document(doc! {
            "results": [{ "_id": oid, "alert_title": "a" }],
            "total": 1,
        })]);

        let output = transform(&alert(), input, Direction::Out).unwrap();

        assert_eq!(
            output,
            Bson::Array(vec![Bson::Document(doc! {
                "results": [{ "id": oid.to_hex(), "title": "a" }],
                "total": 1,
            })]),
        );
    }
}
