//! Filter coercion.
//!
//! Filters arrive with application values: identifiers as hex strings, numbers as
//! numeric strings. Before a filter reaches storage, every key matching a declared field
//! has its value coerced according to the field's declared [`FieldType`]. Single values,
//! arrays of values and operator documents (`{"$in": [...]}`) are all handled; logical
//! operators (`$and`, `$or`, `$nor`) are descended into.

use bson::{Bson, Document};

use crate::{
    coerce::{Coerced, to_identifier, to_number},
    metadata::{FieldType, ModelMetadata},
    registry::{MODEL_TYPE_KEY, ODM_KEY},
    transform::{Direction, transform_document},
};

/// Key naming the primary filter field explicitly.
pub const FILTER_BY_KEY: &str = "filter_by";

const LOGICAL_OPERATORS: [&str; 3] = ["$and", "$or", "$nor"];

/// Coerces the values of declared fields in `filter`, in place, and returns it.
///
/// Keys are matched against property keys, so the filter is expected in storage shape.
/// Undeclared keys are left untouched and failed coercions leave the value unchanged.
pub fn coerce_filter<'a>(metadata: &ModelMetadata, filter: &'a mut Document) -> &'a mut Document {
    if let Some(primary) = primary_key(filter) {
        log::debug!("coercing filter of {} keyed by {}", metadata.model_name, primary);
    }

    for (key, value) in filter.iter_mut() {
        if LOGICAL_OPERATORS.contains(&key.as_str()) {
            if let Bson::Array(clauses) = value {
                for clause in clauses.iter_mut() {
                    if let Bson::Document(clause) = clause {
                        coerce_filter(metadata, clause);
                    }
                }
            }
            continue;
        }

        let Some(descriptor) = metadata.field(key) else {
            continue;
        };

        let coercer: fn(Bson) -> Coerced = match descriptor.details.field_type {
            FieldType::Identifier => to_identifier,
            FieldType::Number => to_number,
            _ => continue,
        };

        let taken = std::mem::replace(value, Bson::Null);
        *value = coerce_operand(taken, coercer);
    }

    filter
}

/// Runs the IN transform over a filter and then coerces it.
///
/// Logical operator clauses are transformed recursively so nested display names reach
/// storage as property keys.
pub fn prepare_filter(metadata: &ModelMetadata, filter: Document) -> Document {
    let mut prepared = transform_clauses(metadata, filter);
    coerce_filter(metadata, &mut prepared);
    prepared
}

/// Strips the bookkeeping keys from a filter and prepares it for storage.
///
/// Manual-transform models keep their keys and only get value coercion.
pub fn storage_filter(metadata: &ModelMetadata, mut filter: Document) -> Document {
    filter.remove(ODM_KEY);
    filter.remove(MODEL_TYPE_KEY);

    let mut prepared = if metadata.is_automatic() {
        prepare_filter(metadata, filter)
    } else {
        coerce_filter(metadata, &mut filter);
        filter
    };

    prepared.remove(FILTER_BY_KEY);
    prepared
}

fn transform_clauses(metadata: &ModelMetadata, filter: Document) -> Document {
    let mut transformed = transform_document(metadata, filter, Direction::In);

    for operator in LOGICAL_OPERATORS {
        if let Ok(clauses) = transformed.get_array_mut(operator) {
            for clause in clauses.iter_mut() {
                if let Bson::Document(inner) = clause {
                    let taken = std::mem::take(inner);
                    *inner = transform_clauses(metadata, taken);
                }
            }
        }
    }

    transformed
}

/// Returns the primary key of a filter: the `filter_by` entry when present, otherwise the
/// first key.
///
/// An empty filter has no primary key; that is logged and reported as `None`.
pub fn primary_key(filter: &Document) -> Option<String> {
    if let Ok(explicit) = filter.get_str(FILTER_BY_KEY) {
        return Some(explicit.to_string());
    }

    match filter.keys().next() {
        Some(first) => Some(first.clone()),
        None => {
            log::warn!("unable to determine the primary key of an empty filter");
            None
        }
    }
}

fn coerce_operand(value: Bson, coercer: fn(Bson) -> Coerced) -> Bson {
    match value {
        Bson::Array(items) => Bson::Array(items.into_iter().map(|item| coercer(item).into_inner()).collect()),
        Bson::Document(operators) if is_operator_document(&operators) => Bson::Document(
            operators
                .into_iter()
                .map(|(operator, operand)| match operator.as_str() {
                    "$exists" | "$regex" | "$options" | "$size" | "$type" => (operator, operand),
                    _ => (operator, coerce_operand(operand, coercer)),
                })
                .collect(),
        ),
        other => coercer(other).into_inner(),
    }
}

fn is_operator_document(document: &Document) -> bool {
    !document.is_empty() && document.keys().all(|key| key.starts_with('$'))
}
