//! Aggregation pipeline execution over in-memory collections.

use bson::{Bson, Document, doc};
use std::cmp::Ordering;

use odmlayer_core::{
    error::{OdmError, OdmResult},
    page::{PaginationParams, TOTAL_KEY},
    query::{Lookup, Projection, Sort, SortDirection, Stage, StageVisitor},
    transform::RESULTS_KEY,
};

use crate::{
    evaluator::{FilterEvaluator, compare_values, get_path, lookup_path, values_equal},
    store::StoreMap,
};

/// Runs pipeline stages over a working set of documents.
///
/// Lookups read the other collections of the same store.
pub(crate) struct PipelineExecutor<'a> {
    collections: &'a StoreMap,
    documents: Vec<Document>,
}

impl<'a> PipelineExecutor<'a> {
    pub fn new(collections: &'a StoreMap, documents: Vec<Document>) -> Self {
        Self { collections, documents }
    }

    /// Runs every stage in order and returns the resulting documents.
    ///
    /// Consecutive sort stages form one compound sort, the first being the primary key.
    pub fn run(mut self, stages: &[Stage]) -> OdmResult<Vec<Document>> {
        let mut index = 0;

        while index < stages.len() {
            let sorts = stages[index..]
                .iter()
                .map_while(|stage| match stage {
                    Stage::Sort(sort) => Some(sort.clone()),
                    _ => None,
                })
                .collect::<Vec<_>>();

            if sorts.is_empty() {
                self.visit_stage(&stages[index])?;
                index += 1;
            } else {
                index += sorts.len();
                sort_documents(&mut self.documents, &sorts);
            }
        }

        Ok(self.documents)
    }
}

/// Sorts documents by several keys, the first being the most significant.
pub(crate) fn sort_documents(documents: &mut [Document], sorts: &[Sort]) {
    documents.sort_by(|left, right| {
        sorts
            .iter()
            .map(|sort| {
                let ordering = compare_values(get_path(left, &sort.field), get_path(right, &sort.field));

                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            })
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

impl StageVisitor for PipelineExecutor<'_> {
    type Output = ();
    type Error = OdmError;

    fn visit_match(&mut self, filter: &Document) -> OdmResult<()> {
        self.documents = FilterEvaluator::filter_documents(&self.documents, filter)?;
        Ok(())
    }

    fn visit_sort(&mut self, sort: &Sort) -> OdmResult<()> {
        sort_documents(&mut self.documents, std::slice::from_ref(sort));
        Ok(())
    }

    fn visit_skip(&mut self, count: usize) -> OdmResult<()> {
        self.documents.drain(..count.min(self.documents.len()));
        Ok(())
    }

    fn visit_limit(&mut self, count: usize) -> OdmResult<()> {
        self.documents.truncate(count);
        Ok(())
    }

    fn visit_project(&mut self, projection: &Projection) -> OdmResult<()> {
        for document in self.documents.iter_mut() {
            match projection {
                Projection::Include(fields) => {
                    let mut projected = Document::new();

                    if let Some(id) = document.get("_id") {
                        projected.insert("_id", id.clone());
                    }
                    for field in fields {
                        if let Some(value) = document.get(field) {
                            projected.insert(field.clone(), value.clone());
                        }
                    }

                    *document = projected;
                }
                Projection::Exclude(fields) => {
                    for field in fields {
                        document.remove(field);
                    }
                }
            }
        }

        Ok(())
    }

    fn visit_group(&mut self, specification: &Document) -> OdmResult<()> {
        let key_expression = specification.get("_id").cloned().unwrap_or(Bson::Null);
        let mut groups: Vec<(Bson, Vec<&Document>)> = Vec::new();

        for document in &self.documents {
            let key = evaluate(document, &key_expression);

            match groups.iter_mut().find(|(existing, _)| values_equal(existing, &key)) {
                Some((_, members)) => members.push(document),
                None => groups.push((key, vec![document])),
            }
        }

        let mut grouped = Vec::with_capacity(groups.len());

        for (key, members) in groups {
            let mut result = doc! { "_id": key };

            for (name, accumulator) in specification {
                if name == "_id" {
                    continue;
                }

                let Some((operator, argument)) = accumulator.as_document().and_then(|d| d.iter().next()) else {
                    return Err(OdmError::Backend(format!("group field {name} must be an accumulator")));
                };

                result.insert(name.clone(), accumulate(operator, argument, &members)?);
            }

            grouped.push(result);
        }

        self.documents = grouped;
        Ok(())
    }

    fn visit_lookup(&mut self, lookup: &Lookup) -> OdmResult<()> {
        let foreign = self
            .collections
            .get(&lookup.from)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for document in self.documents.iter_mut() {
            let joined = {
                let local = flatten(lookup_path(document, &lookup.local_field));

                foreign
                    .iter()
                    .filter(|candidate| {
                        let remote = flatten(lookup_path(candidate, &lookup.foreign_field));

                        if local.is_empty() {
                            return remote.is_empty();
                        }

                        local
                            .iter()
                            .any(|value| remote.iter().any(|other| values_equal(value, other)))
                    })
                    .cloned()
                    .map(Bson::Document)
                    .collect::<Vec<_>>()
            };

            document.insert(lookup.as_field.clone(), joined);
        }

        Ok(())
    }

    fn visit_add_fields(&mut self, fields: &Document) -> OdmResult<()> {
        for document in self.documents.iter_mut() {
            let added = fields
                .iter()
                .map(|(name, expression)| (name.clone(), evaluate(document, expression)))
                .collect::<Vec<_>>();

            for (name, value) in added {
                document.insert(name, value);
            }
        }

        Ok(())
    }

    fn visit_count(&mut self, name: &str) -> OdmResult<()> {
        let count = self.documents.len() as i64;
        self.documents = vec![doc! { name: count }];
        Ok(())
    }

    fn visit_page(&mut self, params: &PaginationParams) -> OdmResult<()> {
        let total = self.documents.len() as i64;
        let results = std::mem::take(&mut self.documents)
            .into_iter()
            .skip(params.offset())
            .take(params.per_page)
            .map(Bson::Document)
            .collect::<Vec<_>>();

        self.documents = vec![doc! { RESULTS_KEY: results, TOTAL_KEY: total }];
        Ok(())
    }
}

/// Evaluates an expression: `"$path"` strings read the document, documents are
/// evaluated entry by entry, anything else is a literal.
fn evaluate(document: &Document, expression: &Bson) -> Bson {
    match expression {
        Bson::String(reference) if reference.starts_with('$') => {
            let values = lookup_path(document, &reference[1..]);

            match values.as_slice() {
                [] => Bson::Null,
                [single] => (*single).clone(),
                many => Bson::Array(many.iter().map(|value| (*value).clone()).collect()),
            }
        }
        Bson::Document(entries) => Bson::Document(
            entries
                .iter()
                .map(|(key, value)| (key.clone(), evaluate(document, value)))
                .collect(),
        ),
        literal => literal.clone(),
    }
}

fn flatten(values: Vec<&Bson>) -> Vec<&Bson> {
    let mut flat = Vec::with_capacity(values.len());

    for value in values {
        match value {
            Bson::Array(items) => flat.extend(items.iter()),
            other => flat.push(other),
        }
    }

    flat
}

fn accumulate(operator: &str, argument: &Bson, members: &[&Document]) -> OdmResult<Bson> {
    let values = members
        .iter()
        .map(|member| evaluate(member, argument))
        .collect::<Vec<_>>();

    Ok(match operator {
        "$sum" => sum(&values),
        "$avg" => {
            let numbers = values.iter().filter_map(as_number).collect::<Vec<_>>();

            if numbers.is_empty() {
                Bson::Null
            } else {
                Bson::Double(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "$min" => values
            .into_iter()
            .filter(|value| !matches!(value, Bson::Null))
            .min_by(|left, right| compare_values(Some(left), Some(right)))
            .unwrap_or(Bson::Null),
        "$max" => values
            .into_iter()
            .max_by(|left, right| compare_values(Some(left), Some(right)))
            .unwrap_or(Bson::Null),
        "$first" => values.into_iter().next().unwrap_or(Bson::Null),
        "$last" => values.into_iter().last().unwrap_or(Bson::Null),
        "$push" => Bson::Array(values),
        "$addToSet" => {
            let mut set: Vec<Bson> = Vec::new();

            for value in values {
                if !set.iter().any(|existing| values_equal(existing, &value)) {
                    set.push(value);
                }
            }

            Bson::Array(set)
        }
        "$count" => Bson::Int64(members.len() as i64),
        other => return Err(OdmError::Backend(format!("unsupported accumulator {other}"))),
    })
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(number) => Some(*number as f64),
        Bson::Int64(number) => Some(*number as f64),
        Bson::Double(number) => Some(*number),
        _ => None,
    }
}

/// Sums numeric values, staying integral unless a double is involved.
fn sum(values: &[Bson]) -> Bson {
    let mut integral: i64 = 0;
    let mut fractional: f64 = 0.0;
    let mut is_fractional = false;

    for value in values {
        match value {
            Bson::Int32(number) => integral += *number as i64,
            Bson::Int64(number) => integral += number,
            Bson::Double(number) => {
                fractional += number;
                is_fractional = true;
            }
            _ => {}
        }
    }

    if is_fractional {
        Bson::Double(integral as f64 + fractional)
    } else if let Ok(small) = i32::try_from(integral) {
        Bson::Int32(small)
    } else {
        Bson::Int64(integral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odmlayer_core::query::Query;
    use std::collections::HashMap;

    fn alerts() -> Vec<Document> {
        vec![
            doc! { "_id": 1, "level": 3, "host": "db-1", "tags": ["disk"] },
            doc! { "_id": 2, "level": 1, "host": "web-1", "tags": ["http", "tls"] },
            doc! { "_id": 3, "level": 3, "host": "db-1", "tags": [] },
        ]
    }

    fn run(stages: Vec<Stage>, collections: &StoreMap) -> Vec<Document> {
        PipelineExecutor::new(collections, alerts()).run(&stages).unwrap()
    }

    #[test]
    fn compound_sort_uses_the_first_key_first() {
        let stages = Query::new()
            .order("level", SortDirection::Desc)
            .order("_id", SortDirection::Desc)
            .stages;

        let ids = run(stages, &HashMap::new())
            .iter()
            .map(|document| document.get_i32("_id").unwrap())
            .collect::<Vec<_>>();

        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn group_accumulates_per_key() {
        let stages = Query::new()
            .group(doc! { "_id": "$host", "count": { "$sum": 1 }, "levels": { "$push": "$level" } })
            .order("_id", SortDirection::Asc)
            .stages;

        let grouped = run(stages, &HashMap::new());

        assert_eq!(
            grouped,
            vec![
                doc! { "_id": "db-1", "count": 2, "levels": [3, 3] },
                doc! { "_id": "web-1", "count": 1, "levels": [1] },
            ],
        );
    }

    #[test]
    fn lookup_joins_other_collections() {
        let mut collections = StoreMap::new();
        collections.insert(
            "hosts".to_string(),
            vec![doc! { "_id": "db-1", "rack": "a" }, doc! { "_id": "web-1", "rack": "b" }],
        );

        let stages = Query::new()
            .filter(doc! { "_id": 2 })
            .merge("hosts", "host", "_id", "machine")
            .stages;

        let joined = run(stages, &collections);

        assert_eq!(joined[0].get_array("machine").unwrap(), &vec![Bson::Document(doc! { "_id": "web-1", "rack": "b" })]);
    }

    #[test]
    fn page_wraps_results_with_total() {
        let stages = Query::new().order("_id", SortDirection::Asc).paging(2, 2).stages;

        let envelope = run(stages, &HashMap::new());

        assert_eq!(envelope, vec![doc! { "results": [{ "_id": 3, "level": 3, "host": "db-1", "tags": [] }], "total": 3_i64 }]);
    }

    #[test]
    fn count_and_add_fields() {
        let counted = run(Query::new().filter(doc! { "level": 3 }).count("critical").stages, &HashMap::new());
        assert_eq!(counted, vec![doc! { "critical": 2_i64 }]);

        let added = run(
            Query::new().filter(doc! { "_id": 1 }).add_fields(doc! { "origin": "$host", "seen": true }).stages,
            &HashMap::new(),
        );
        assert_eq!(added[0].get_str("origin").unwrap(), "db-1");
        assert!(added[0].get_bool("seen").unwrap());
    }
}
