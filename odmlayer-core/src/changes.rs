//! Change detection and change events.
//!
//! Every mutating repository operation produces a [`ChangeEvent`] carrying the post-image
//! of the written document and, for updates, the [`ChangeSet`] between the pre-image and
//! the post-image.

use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Kind of mutation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    /// Returns the event name for this kind of change on `collection`, e.g. `update::Alert`.
    pub fn event_name(&self, collection: &str) -> String {
        let prefix = match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        };

        format!("{prefix}::{collection}")
    }
}

/// Delta between two versions of a document, by top-level key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeSet {
    /// Keys present only in the new version, with their new values.
    pub added: Document,
    /// Keys present in both versions with different values, with their new values.
    pub changed: Document,
    /// Keys present only in the old version, with their old values.
    pub removed: Document,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Computes the delta between `before` and `after`.
///
/// Without a prior state every key of `after` is reported as added.
pub fn diff(before: Option<&Document>, after: &Document) -> ChangeSet {
    let Some(before) = before else {
        return ChangeSet { added: after.clone(), ..ChangeSet::default() };
    };

    let mut changes = ChangeSet::default();

    for (key, value) in after {
        match before.get(key) {
            None => {
                changes.added.insert(key.clone(), value.clone());
            }
            Some(previous) if previous != value => {
                changes.changed.insert(key.clone(), value.clone());
            }
            Some(_) => {}
        }
    }

    for (key, value) in before {
        if !after.contains_key(key) {
            changes.removed.insert(key.clone(), value.clone());
        }
    }

    changes
}

/// Event published after a mutating operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub id: Uuid,
    pub kind: ChangeKind,
    pub collection_name: String,
    pub changes: Option<ChangeSet>,
    /// The post-image of the operation, in application shape.
    pub payload: Bson,
    pub timestamp: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        kind: ChangeKind,
        collection_name: impl Into<String>,
        changes: Option<ChangeSet>,
        payload: impl Into<Bson>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            collection_name: collection_name.into(),
            changes,
            payload: payload.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn event_name(&self) -> String {
        self.kind.event_name(&self.collection_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn missing_prior_state_reports_everything_as_added() {
        let after = doc! { "name": "x", "tags": ["a"] };

        let changes = diff(None, &after);

        assert_eq!(changes.added, after);
        assert!(changes.changed.is_empty());
        assert!(changes.removed.is_empty());
    }

    #[test]
    fn reports_added_changed_and_removed_keys() {
        let before = doc! { "name": "x", "level": 1, "gone": true };
        let after = doc! { "name": "x", "level": 2, "fresh": "y" };

        let changes = diff(Some(&before), &after);

        assert_eq!(changes.added, doc! { "fresh": "y" });
        assert_eq!(changes.changed, doc! { "level": 2 });
        assert_eq!(changes.removed, doc! { "gone": true });
    }

    #[test]
    fn identical_documents_have_no_changes() {
        let document = doc! { "a": [1, 2], "b": { "c": 1 } };

        assert!(diff(Some(&document), &document).is_empty());
    }

    #[test]
    fn event_names_carry_kind_and_collection() {
        let event = ChangeEvent::new(ChangeKind::Update, "Alert", None, doc! {});

        assert_eq!(event.event_name(), "update::Alert");
        assert_eq!(ChangeKind::Create.event_name("User"), "create::User");
    }
}
