//! Pipeline translation from odmlayer stages to MongoDB aggregation syntax.
//!
//! This module translates odmlayer's storage-agnostic pipeline stages into
//! MongoDB aggregation stage documents for execution by the MongoDB server.

use bson::{Bson, Document, doc};

use odmlayer_core::{
    error::OdmError,
    page::{PaginationParams, TOTAL_KEY},
    query::{Lookup, Projection, Sort, SortDirection, Stage, StageVisitor},
    transform::RESULTS_KEY,
};

/// Translates pipeline stages into MongoDB aggregation stages.
///
/// Each stage becomes exactly one aggregation stage, except paging which expands into a
/// `$facet` followed by an `$addFields` unwrapping the total.
pub(crate) struct MongoStageTranslator;

impl MongoStageTranslator {
    /// Translates a whole pipeline. Consecutive sort stages are folded into one `$sort`
    /// so the first of them stays the primary key.
    pub fn translate(&mut self, stages: &[Stage]) -> Result<Vec<Document>, OdmError> {
        let mut pipeline: Vec<Document> = Vec::with_capacity(stages.len());
        let mut previous_was_sort = false;

        for stage in stages {
            if let (Stage::Sort(sort), true) = (stage, previous_was_sort) {
                if let Some(Ok(keys)) = pipeline.last_mut().map(|last| last.get_document_mut("$sort")) {
                    if !keys.contains_key(&sort.field) {
                        keys.insert(sort.field.clone(), sort_order(sort.direction));
                    }
                    continue;
                }
            }

            pipeline.extend(self.visit_stage(stage)?);
            previous_was_sort = matches!(stage, Stage::Sort(_));
        }

        Ok(pipeline)
    }
}

pub(crate) fn sort_order(direction: SortDirection) -> i32 {
    match direction {
        SortDirection::Asc => 1,
        SortDirection::Desc => -1,
    }
}

impl StageVisitor for MongoStageTranslator {
    type Output = Vec<Document>;
    type Error = OdmError;

    fn visit_match(&mut self, filter: &Document) -> Result<Self::Output, Self::Error> {
        Ok(vec![doc! { "$match": filter.clone() }])
    }

    fn visit_sort(&mut self, sort: &Sort) -> Result<Self::Output, Self::Error> {
        Ok(vec![doc! { "$sort": { sort.field.clone(): sort_order(sort.direction) } }])
    }

    fn visit_skip(&mut self, count: usize) -> Result<Self::Output, Self::Error> {
        Ok(vec![doc! { "$skip": count as i64 }])
    }

    fn visit_limit(&mut self, count: usize) -> Result<Self::Output, Self::Error> {
        Ok(vec![doc! { "$limit": count as i64 }])
    }

    fn visit_project(&mut self, projection: &Projection) -> Result<Self::Output, Self::Error> {
        let (fields, flag) = match projection {
            Projection::Include(fields) => (fields, 1),
            Projection::Exclude(fields) => (fields, 0),
        };

        Ok(vec![doc! {
            "$project": fields
                .iter()
                .map(|field| (field.clone(), Bson::Int32(flag)))
                .collect::<Document>(),
        }])
    }

    fn visit_group(&mut self, specification: &Document) -> Result<Self::Output, Self::Error> {
        if !specification.contains_key("_id") {
            return Err(OdmError::Backend("group stage requires an _id expression".to_string()));
        }

        Ok(vec![doc! { "$group": specification.clone() }])
    }

    fn visit_lookup(&mut self, lookup: &Lookup) -> Result<Self::Output, Self::Error> {
        Ok(vec![doc! {
            "$lookup": {
                "from": lookup.from.clone(),
                "localField": lookup.local_field.clone(),
                "foreignField": lookup.foreign_field.clone(),
                "as": lookup.as_field.clone(),
            }
        }])
    }

    fn visit_add_fields(&mut self, fields: &Document) -> Result<Self::Output, Self::Error> {
        Ok(vec![doc! { "$addFields": fields.clone() }])
    }

    fn visit_count(&mut self, name: &str) -> Result<Self::Output, Self::Error> {
        Ok(vec![doc! { "$count": name }])
    }

    fn visit_page(&mut self, params: &PaginationParams) -> Result<Self::Output, Self::Error> {
        Ok(vec![
            doc! {
                "$facet": {
                    RESULTS_KEY: [
                        { "$skip": params.offset() as i64 },
                        { "$limit": params.per_page.max(1) as i64 },
                    ],
                    TOTAL_KEY: [{ "$count": TOTAL_KEY }],
                }
            },
            doc! {
                "$addFields": {
                    TOTAL_KEY: {
                        "$ifNull": [{ "$arrayElemAt": [format!("${TOTAL_KEY}.{TOTAL_KEY}"), 0] }, 0]
                    }
                }
            },
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odmlayer_core::query::Query;

    fn translate(query: Query) -> Vec<Document> {
        MongoStageTranslator.translate(&query.stages).unwrap()
    }

    #[test]
    fn filters_and_windows_map_one_to_one() {
        let pipeline = translate(Query::new().filter(doc! { "level": 3 }).skip(5).limit(10));

        assert_eq!(
            pipeline,
            vec![doc! { "$match": { "level": 3 } }, doc! { "$skip": 5_i64 }, doc! { "$limit": 10_i64 }],
        );
    }

    #[test]
    fn consecutive_sorts_are_folded() {
        let pipeline = translate(
            Query::new()
                .order("level", SortDirection::Desc)
                .order("_id", SortDirection::Asc)
                .limit(1)
                .order("title", SortDirection::Asc),
        );

        assert_eq!(
            pipeline,
            vec![
                doc! { "$sort": { "level": -1, "_id": 1 } },
                doc! { "$limit": 1_i64 },
                doc! { "$sort": { "title": 1 } },
            ],
        );
        assert_eq!(pipeline[0].get_document("$sort").unwrap().keys().next().unwrap(), "level");
    }

    #[test]
    fn paging_expands_into_a_facet() {
        let pipeline = translate(Query::new().paging(3, 20));

        assert_eq!(
            pipeline,
            vec![
                doc! { "$facet": {
                    "results": [{ "$skip": 40_i64 }, { "$limit": 20_i64 }],
                    "total": [{ "$count": "total" }],
                } },
                doc! { "$addFields": {
                    "total": { "$ifNull": [{ "$arrayElemAt": ["$total.total", 0] }, 0] },
                } },
            ],
        );
    }

    #[test]
    fn empty_pages_still_limit_to_one() {
        let pipeline = translate(Query::new().paging(1, 0));

        assert_eq!(
            pipeline[0].get_document("$facet").unwrap().get_array("results").unwrap()[1],
            Bson::Document(doc! { "$limit": 1_i64 }),
        );
    }

    #[test]
    fn projections_lookups_and_counts() {
        let pipeline = translate(
            Query::new()
                .merge("hosts", "source.host", "_id", "host")
                .pluck(["title"])
                .count("n"),
        );

        assert_eq!(
            pipeline,
            vec![
                doc! { "$lookup": { "from": "hosts", "localField": "source.host", "foreignField": "_id", "as": "host" } },
                doc! { "$project": { "title": 1 } },
                doc! { "$count": "n" },
            ],
        );
    }

    #[test]
    fn group_requires_an_identifier_expression() {
        let result = MongoStageTranslator.translate(&Query::new().group(doc! { "n": { "$sum": 1 } }).stages);

        assert!(matches!(result, Err(OdmError::Backend(_))));
    }
}
