//! Best-effort value coercion.
//!
//! Coercion converts application values (identifier strings, numeric strings) into
//! storage-native types. It never fails: a value that cannot be converted comes back as
//! [`Coerced::Unchanged`] so the surrounding transform or query still goes ahead.

use bson::{Bson, oid::ObjectId};

/// The outcome of a coercion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// The value now has the requested storage-native type.
    Converted(Bson),
    /// The value could not be converted and is returned as given.
    Unchanged(Bson),
}

impl Coerced {
    pub fn into_inner(self) -> Bson {
        match self {
            Coerced::Converted(value) | Coerced::Unchanged(value) => value,
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, Coerced::Converted(_))
    }
}

/// Converts a value into an `ObjectId`.
///
/// Existing identifiers are returned as converted; strings must be 24 hex characters.
pub fn to_identifier(value: Bson) -> Coerced {
    match value {
        Bson::ObjectId(_) => Coerced::Converted(value),
        Bson::String(ref text) => match ObjectId::parse_str(text) {
            Ok(oid) => Coerced::Converted(Bson::ObjectId(oid)),
            Err(_) => Coerced::Unchanged(value),
        },
        _ => Coerced::Unchanged(value),
    }
}

/// Converts a value into a finite number.
///
/// Numeric strings are trimmed and parsed; integral results use the narrowest of
/// `Int32`/`Int64`, everything else becomes a `Double`.
pub fn to_number(value: Bson) -> Coerced {
    match value {
        Bson::Int32(_) | Bson::Int64(_) => Coerced::Converted(value),
        Bson::Double(number) if number.is_finite() => Coerced::Converted(value),
        Bson::String(ref text) => match parse_number(text.trim()) {
            Some(number) => Coerced::Converted(number),
            None => Coerced::Unchanged(value),
        },
        _ => Coerced::Unchanged(value),
    }
}

fn parse_number(text: &str) -> Option<Bson> {
    if text.is_empty() {
        return None;
    }

    if let Ok(integer) = text.parse::<i64>() {
        return Some(match i32::try_from(integer) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(integer),
        });
    }

    text.parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .map(Bson::Double)
}

/// Renders a stored identifier in its textual form.
///
/// Identifiers become hex strings and numbers their decimal text; strings, null,
/// documents and arrays are returned unchanged.
pub fn to_text(value: Bson) -> Bson {
    match value {
        Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
        Bson::Int32(number) => Bson::String(number.to_string()),
        Bson::Int64(number) => Bson::String(number.to_string()),
        Bson::Double(number) => Bson::String(number.to_string()),
        other => other,
    }
}
