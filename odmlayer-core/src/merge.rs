//! Smart merge of partial updates.
//!
//! [`smart_merge`] deep-merges a partial update onto a previously loaded document:
//! nested documents merge key by key, while arrays and scalars from the update replace
//! whatever was there. Partial array updates are all-or-nothing.

use bson::{Bson, Document};

/// Merges `new_value` onto a copy of `old_value`. `old_value` is never modified.
pub fn smart_merge(old_value: &Document, new_value: &Document) -> Document {
    let mut merged = old_value.clone();

    for (key, value) in new_value {
        let combined = match (merged.get(key), value) {
            (Some(Bson::Document(old)), Bson::Document(new)) => Bson::Document(smart_merge(old, new)),
            _ => value.clone(),
        };

        merged.insert(key.clone(), combined);
    }

    merged
}
