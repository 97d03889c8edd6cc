//! Filter evaluation for in-memory document matching.
//!
//! Filters use the MongoDB query document syntax: plain values match by equality
//! (array fields match when any element is equal), operator documents such as
//! `{ "$gte": 3 }` apply comparisons, and `$and`/`$or`/`$nor` combine clauses. Dotted
//! paths descend into embedded documents and through arrays.

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};
use regex::RegexBuilder;
use std::{cmp::Ordering, collections::HashMap};

use odmlayer_core::error::{OdmError, OdmResult};

/// Type-erased, comparable representation of BSON values.
///
/// Numeric types are normalized to `f64` so that `3`, `3i64` and `3.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Values without a natural ordering; compared by exact equality only.
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> Comparable<'a> {
    /// Position of the value's type in the cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
            Comparable::Other(_) => 8,
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

/// Orders two optional values the way a sort stage does: missing and null values
/// first, then by type, then by value.
pub(crate) fn compare_values(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    left.rank()
        .cmp(&right.rank())
        .then_with(|| left.partial_cmp(&right).unwrap_or(Ordering::Equal))
}

pub(crate) fn values_equal(left: &Bson, right: &Bson) -> bool {
    Comparable::from(left) == Comparable::from(right)
}

/// Collects every value reachable through a dotted `path`.
///
/// Arrays met along the way are traversed element by element, unless the next segment
/// is a numeric index.
pub(crate) fn lookup_path<'a>(document: &'a Document, path: &str) -> Vec<&'a Bson> {
    let segments = path.split('.').collect::<Vec<_>>();
    let mut found = Vec::new();

    collect_path(document, &segments, &mut found);
    found
}

/// Returns the first value at `path`, if any.
pub(crate) fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    lookup_path(document, path).into_iter().next()
}

fn collect_path<'a>(document: &'a Document, segments: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };

    if let Some(value) = document.get(*head) {
        collect_value(value, rest, found);
    }
}

fn collect_value<'a>(value: &'a Bson, rest: &[&str], found: &mut Vec<&'a Bson>) {
    let Some((head, tail)) = rest.split_first() else {
        found.push(value);
        return;
    };

    match value {
        Bson::Document(inner) => collect_path(inner, rest, found),
        Bson::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(item) = items.get(index) {
                    collect_value(item, tail, found);
                }
            }
            Err(_) => {
                for item in items {
                    if let Bson::Document(inner) = item {
                        collect_path(inner, rest, found);
                    }
                }
            }
        },
        _ => {}
    }
}

/// Evaluates filter documents against stored documents.
pub(crate) struct FilterEvaluator;

impl FilterEvaluator {
    /// Returns `true` when `document` satisfies every clause of `filter`.
    pub fn matches(document: &Document, filter: &Document) -> OdmResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for clause in clauses(key, condition)? {
                        if !Self::matches(document, clause)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                "$or" => {
                    let mut any = false;
                    for clause in clauses(key, condition)? {
                        if Self::matches(document, clause)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                "$nor" => {
                    let mut none = true;
                    for clause in clauses(key, condition)? {
                        if Self::matches(document, clause)? {
                            none = false;
                            break;
                        }
                    }
                    none
                }
                operator if operator.starts_with('$') => {
                    return Err(OdmError::Backend(format!("unsupported filter operator {operator}")));
                }
                path => Self::matches_values(&lookup_path(document, path), condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Keeps the documents matching `filter`.
    pub fn filter_documents<'a>(
        documents: impl IntoIterator<Item = &'a Document>,
        filter: &Document,
    ) -> OdmResult<Vec<Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if Self::matches(document, filter)? {
                matched.push(document.clone());
            }
        }

        Ok(matched)
    }

    fn matches_values(values: &[&Bson], condition: &Bson) -> OdmResult<bool> {
        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                for (operator, operand) in operators {
                    if !Self::apply_operator(values, operator, operand, operators)? {
                        return Ok(false);
                    }
                }

                Ok(true)
            }
            _ => Ok(equals_any(values, condition)),
        }
    }

    fn apply_operator(
        values: &[&Bson],
        operator: &str,
        operand: &Bson,
        operators: &Document,
    ) -> OdmResult<bool> {
        Ok(match operator {
            "$eq" => equals_any(values, operand),
            "$ne" => !equals_any(values, operand),
            "$gt" | "$gte" | "$lt" | "$lte" => {
                let target = Comparable::from(operand);

                candidates(values).into_iter().any(|value| {
                    match Comparable::from(value).partial_cmp(&target) {
                        Some(ordering) => match operator {
                            "$gt" => ordering == Ordering::Greater,
                            "$gte" => ordering != Ordering::Less,
                            "$lt" => ordering == Ordering::Less,
                            _ => ordering != Ordering::Greater,
                        },
                        None => false,
                    }
                })
            }
            "$in" => operand_list(operator, operand)?
                .iter()
                .any(|item| equals_any(values, item)),
            "$nin" => !operand_list(operator, operand)?
                .iter()
                .any(|item| equals_any(values, item)),
            "$exists" => {
                let should_exist = match operand {
                    Bson::Boolean(flag) => *flag,
                    Bson::Int32(flag) => *flag != 0,
                    Bson::Int64(flag) => *flag != 0,
                    _ => true,
                };

                !values.is_empty() == should_exist
            }
            "$size" => {
                let expected = match operand {
                    Bson::Int32(size) => *size as usize,
                    Bson::Int64(size) => *size as usize,
                    _ => return Err(OdmError::Backend("$size expects an integer".into())),
                };

                values
                    .iter()
                    .any(|value| matches!(value, Bson::Array(items) if items.len() == expected))
            }
            "$not" => !Self::matches_values(values, operand)?,
            "$regex" => {
                let options = operators.get_str("$options").unwrap_or_default();
                regex_matches(values, operand, options)?
            }
            "$options" => true,
            other => return Err(OdmError::Backend(format!("unsupported filter operator {other}"))),
        })
    }
}

fn clauses<'a>(operator: &str, condition: &'a Bson) -> OdmResult<Vec<&'a Document>> {
    match condition {
        Bson::Array(items) => items
            .iter()
            .map(|item| {
                item.as_document().ok_or_else(|| {
                    OdmError::Backend(format!("{operator} clauses must be documents"))
                })
            })
            .collect(),
        _ => Err(OdmError::Backend(format!("{operator} expects an array of clauses"))),
    }
}

fn operand_list<'a>(operator: &str, operand: &'a Bson) -> OdmResult<&'a Vec<Bson>> {
    match operand {
        Bson::Array(items) => Ok(items),
        _ => Err(OdmError::Backend(format!("{operator} expects an array"))),
    }
}

fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

/// The values themselves plus the elements of any array value.
fn candidates<'a>(values: &[&'a Bson]) -> Vec<&'a Bson> {
    let mut all = Vec::with_capacity(values.len());

    for value in values {
        all.push(*value);
        if let Bson::Array(items) = value {
            all.extend(items.iter());
        }
    }

    all
}

/// Equality the way a filter sees it: a missing field equals `null` and an array field
/// equals any of its elements.
fn equals_any(values: &[&Bson], target: &Bson) -> bool {
    if values.is_empty() {
        return matches!(target, Bson::Null);
    }

    candidates(values)
        .into_iter()
        .any(|value| values_equal(value, target))
}

fn regex_matches(values: &[&Bson], pattern: &Bson, options: &str) -> OdmResult<bool> {
    let (pattern, options) = match pattern {
        Bson::String(pattern) => (pattern.as_str(), options),
        Bson::RegularExpression(regex) => (regex.pattern.as_str(), regex.options.as_str()),
        _ => return Err(OdmError::Backend("$regex expects a string pattern".into())),
    };

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| OdmError::Backend(format!("invalid $regex pattern: {e}")))?;

    Ok(candidates(values)
        .into_iter()
        .any(|value| matches!(value, Bson::String(text) if regex.is_match(text))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn alert() -> Document {
        doc! {
            "_id": 1,
            "title": "Disk full",
            "level": 3,
            "tags": ["ops", "disk"],
            "source": { "host": "db-1", "checks": [{ "name": "df" }, { "name": "iostat" }] },
        }
    }

    fn matches(filter: Document) -> bool {
        FilterEvaluator::matches(&alert(), &filter).unwrap()
    }

    #[test]
    fn equality_matches_scalars_and_array_elements() {
        assert!(matches(doc! { "title": "Disk full" }));
        assert!(matches(doc! { "tags": "disk" }));
        assert!(matches(doc! { "level": 3.0 }));
        assert!(!matches(doc! { "tags": "network" }));
    }

    #[test]
    fn dotted_paths_descend_through_arrays() {
        assert!(matches(doc! { "source.host": "db-1" }));
        assert!(matches(doc! { "source.checks.name": "iostat" }));
        assert!(matches(doc! { "tags.0": "ops" }));
    }

    #[test]
    fn comparison_and_membership_operators() {
        assert!(matches(doc! { "level": { "$gte": 3, "$lt": 5 } }));
        assert!(!matches(doc! { "level": { "$gt": 3 } }));
        assert!(matches(doc! { "tags": { "$in": ["network", "ops"] } }));
        assert!(matches(doc! { "title": { "$nin": ["Disk ok"] } }));
        assert!(matches(doc! { "level": { "$ne": 4 } }));
        assert!(matches(doc! { "tags": { "$size": 2 } }));
    }

    #[test]
    fn existence_checks_and_missing_fields() {
        assert!(matches(doc! { "case_id": { "$exists": false } }));
        assert!(matches(doc! { "title": { "$exists": true } }));
        assert!(matches(doc! { "case_id": null }));
    }

    #[test]
    fn logical_operators_combine_clauses() {
        assert!(matches(doc! { "$or": [{ "level": 9 }, { "tags": "disk" }] }));
        assert!(!matches(doc! { "$and": [{ "level": 3 }, { "title": "Other" }] }));
        assert!(matches(doc! { "$nor": [{ "level": 9 }] }));
        assert!(matches(doc! { "level": { "$not": { "$gt": 5 } } }));
    }

    #[test]
    fn regex_honors_options() {
        assert!(matches(doc! { "title": { "$regex": "^disk", "$options": "i" } }));
        assert!(!matches(doc! { "title": { "$regex": "^disk" } }));
    }

    #[test]
    fn unknown_operators_are_rejected() {
        assert!(FilterEvaluator::matches(&alert(), &doc! { "level": { "$near": 1 } }).is_err());
    }

    #[test]
    fn sort_order_puts_missing_values_first() {
        let number = Bson::Int32(1);
        let text = Bson::String("a".into());

        assert_eq!(compare_values(None, Some(&number)), Ordering::Less);
        assert_eq!(compare_values(Some(&number), Some(&text)), Ordering::Less);
        assert_eq!(compare_values(Some(&Bson::Int64(2)), Some(&Bson::Double(2.0))), Ordering::Equal);
    }
}
