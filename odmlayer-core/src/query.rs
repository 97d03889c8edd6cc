//! Query pipelines.
//!
//! A [`Query`] is an ordered list of aggregation [`Stage`]s bound to a model. Filters and
//! field names are written in application shape; the repository prepares each stage
//! against the model metadata (IN transform, filter coercion, key renaming) before the
//! pipeline reaches storage, and transforms the results back out.
//!
//! # Example
//!
//! ```ignore
//! use odmlayer::prelude::*;
//! use bson::doc;
//!
//! let query = Query::of::<Alert>()
//!     .filter(doc! { "severity": "critical" })
//!     .exists("case_id")
//!     .order("created_at", SortDirection::Asc)
//!     .paging(1, 5);
//!
//! let page = repository.query(query, ReturnType::Many).await?.into_page()?;
//! ```
//!
//! Backends translate or execute stages through the [`StageVisitor`] trait.

use bson::{Document, doc};

use crate::{
    error::{OdmError, OdmResult},
    filter::storage_filter,
    metadata::ModelMetadata,
    model::Model,
    page::{Page, PaginationParams},
    registry::ModelRef,
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Field selection applied to each result.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Keep only these fields (plus the identifier).
    Include(Vec<String>),
    /// Drop these fields.
    Exclude(Vec<String>),
}

/// Join of another collection into each result.
#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    /// Collection to join from.
    pub from: String,
    /// Field of the current result to match on.
    pub local_field: String,
    /// Field of the joined collection to match on; may be a dotted path into arrays.
    pub foreign_field: String,
    /// Field receiving the array of joined documents.
    pub as_field: String,
}

/// One step of a query pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Sort(Sort),
    Skip(usize),
    Limit(usize),
    Project(Projection),
    /// Grouping specification: an `_id` expression plus accumulators.
    Group(Document),
    Lookup(Lookup),
    /// Fields to add; string values starting with `$` reference existing fields.
    AddFields(Document),
    /// Replaces the results with a single `{ <name>: count }` document.
    Count(String),
    /// Replaces the results with a `{ results, total }` envelope for one page.
    Page(PaginationParams),
}

impl Stage {
    /// Prepares this stage for storage against `metadata`.
    ///
    /// Filters lose their bookkeeping keys and are transformed and coerced (only coerced
    /// for manual-transform models), and field names are mapped to storage keys.
    pub fn prepare(self, metadata: &ModelMetadata) -> Stage {
        let automatic = metadata.is_automatic();
        let rename = |field: String| -> String {
            if automatic {
                metadata.storage_key(&field).to_string()
            } else {
                field
            }
        };

        match self {
            Stage::Match(filter) => Stage::Match(storage_filter(metadata, filter)),
            Stage::Sort(sort) => Stage::Sort(Sort { field: rename(sort.field), direction: sort.direction }),
            Stage::Project(Projection::Include(fields)) => {
                Stage::Project(Projection::Include(fields.into_iter().map(rename).collect()))
            }
            Stage::Project(Projection::Exclude(fields)) => {
                Stage::Project(Projection::Exclude(fields.into_iter().map(rename).collect()))
            }
            Stage::Lookup(lookup) => Stage::Lookup(Lookup {
                local_field: rename(lookup.local_field),
                ..lookup
            }),
            other => other,
        }
    }
}

/// How query results are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    /// The first result only.
    Single,
    #[default]
    Many,
}

/// The results of running a query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    One(Option<Document>),
    Many(Vec<Document>),
    Page(Page<Document>),
}

impl QueryOutput {
    /// Returns the single result, or the first of many.
    pub fn into_one(self) -> Option<Document> {
        match self {
            QueryOutput::One(document) => document,
            QueryOutput::Many(documents) => documents.into_iter().next(),
            QueryOutput::Page(page) => page.results.into_iter().next(),
        }
    }

    /// Returns all results; a page yields its own results.
    pub fn into_many(self) -> Vec<Document> {
        match self {
            QueryOutput::One(document) => document.into_iter().collect(),
            QueryOutput::Many(documents) => documents,
            QueryOutput::Page(page) => page.results,
        }
    }

    /// # Errors
    ///
    /// Returns [`OdmError::InvalidDocument`] if the query was not paged.
    pub fn into_page(self) -> OdmResult<Page<Document>> {
        match self {
            QueryOutput::Page(page) => Ok(page),
            _ => Err(OdmError::InvalidDocument("query result is not paged".into())),
        }
    }
}

/// A query pipeline bound to a model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub model: Option<ModelRef>,
    pub stages: Vec<Stage>,
}

impl Query {
    /// Creates an empty query resolved against the payload alone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty query over the model `M`.
    pub fn of<M: Model>() -> Self {
        Self::named(ModelRef::of::<M>())
    }

    /// Creates an empty query over a model referenced by name.
    pub fn named(model: ModelRef) -> Self {
        Self { model: Some(model), stages: Vec::new() }
    }

    fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Matches results against a filter in application shape.
    pub fn filter(self, filter: Document) -> Self {
        self.stage(Stage::Match(filter))
    }

    /// Matches results where `field` is present.
    pub fn exists(self, field: impl Into<String>) -> Self {
        let field: String = field.into();
        self.stage(Stage::Match(doc! { field: { "$exists": true } }))
    }

    /// Matches results where `field` is absent.
    pub fn not_exists(self, field: impl Into<String>) -> Self {
        let field: String = field.into();
        self.stage(Stage::Match(doc! { field: { "$exists": false } }))
    }

    pub fn order(self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.stage(Stage::Sort(Sort { field: field.into(), direction }))
    }

    pub fn skip(self, count: usize) -> Self {
        self.stage(Stage::Skip(count))
    }

    pub fn limit(self, count: usize) -> Self {
        self.stage(Stage::Limit(count))
    }

    /// Returns one page of results as a `{ results, total }` envelope. Pages are 1-indexed.
    pub fn paging(self, page: usize, per_page: usize) -> Self {
        self.stage(Stage::Page(PaginationParams::new(page, per_page)))
    }

    /// Keeps only the given fields.
    pub fn pluck<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage(Stage::Project(Projection::Include(fields.into_iter().map(Into::into).collect())))
    }

    /// Drops the given fields.
    pub fn without<I, S>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stage(Stage::Project(Projection::Exclude(fields.into_iter().map(Into::into).collect())))
    }

    pub fn group(self, specification: Document) -> Self {
        self.stage(Stage::Group(specification))
    }

    /// Joins `from` into each result under `as_field`, where the result's `local_field`
    /// equals the joined document's `foreign_field`.
    pub fn merge(
        self,
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        self.stage(Stage::Lookup(Lookup {
            from: from.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            as_field: as_field.into(),
        }))
    }

    pub fn add_fields(self, fields: Document) -> Self {
        self.stage(Stage::AddFields(fields))
    }

    /// Counts the results into a single `{ <name>: count }` document.
    pub fn count(self, name: impl Into<String>) -> Self {
        self.stage(Stage::Count(name.into()))
    }

    /// Returns the pagination parameters of the last paging stage, if any.
    pub fn paging_params(&self) -> Option<PaginationParams> {
        self.stages.iter().rev().find_map(|stage| match stage {
            Stage::Page(params) => Some(*params),
            _ => None,
        })
    }
}

/// Visitor over pipeline stages, implemented by storage backends.
pub trait StageVisitor {
    type Output;
    type Error: Into<OdmError>;

    fn visit_match(&mut self, filter: &Document) -> Result<Self::Output, Self::Error>;
    fn visit_sort(&mut self, sort: &Sort) -> Result<Self::Output, Self::Error>;
    fn visit_skip(&mut self, count: usize) -> Result<Self::Output, Self::Error>;
    fn visit_limit(&mut self, count: usize) -> Result<Self::Output, Self::Error>;
    fn visit_project(&mut self, projection: &Projection) -> Result<Self::Output, Self::Error>;
    fn visit_group(&mut self, specification: &Document) -> Result<Self::Output, Self::Error>;
    fn visit_lookup(&mut self, lookup: &Lookup) -> Result<Self::Output, Self::Error>;
    fn visit_add_fields(&mut self, fields: &Document) -> Result<Self::Output, Self::Error>;
    fn visit_count(&mut self, name: &str) -> Result<Self::Output, Self::Error>;
    fn visit_page(&mut self, params: &PaginationParams) -> Result<Self::Output, Self::Error>;

    fn visit_stage(&mut self, stage: &Stage) -> Result<Self::Output, Self::Error> {
        match stage {
            Stage::Match(filter) => self.visit_match(filter),
            Stage::Sort(sort) => self.visit_sort(sort),
            Stage::Skip(count) => self.visit_skip(*count),
            Stage::Limit(count) => self.visit_limit(*count),
            Stage::Project(projection) => self.visit_project(projection),
            Stage::Group(specification) => self.visit_group(specification),
            Stage::Lookup(lookup) => self.visit_lookup(lookup),
            Stage::AddFields(fields) => self.visit_add_fields(fields),
            Stage::Count(name) => self.visit_count(name),
            Stage::Page(params) => self.visit_page(params),
        }
    }
}
