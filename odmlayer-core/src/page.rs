//! Pagination types for paged queries.
//!
//! A paged query yields a single envelope document from storage,
//! `{ results: [...], total: n }`, which is converted into a [`Page`].

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    error::{OdmError, OdmResult},
    transform::RESULTS_KEY,
};

/// Key of the total match count inside a paginated envelope.
pub const TOTAL_KEY: &str = "total";

/// A single page of results.
///
/// # Example
///
/// ```ignore
/// use odmlayer_core::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_total(100)
///     .with_next_page(Some(2))
///     .build();
///
/// assert_eq!(page.results.len(), 1);
/// assert_eq!(page.total, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The results contained in this page.
    pub results: Vec<T>,
    /// Total number of matches across all pages.
    pub total: usize,
    /// The next page number (if more pages exist).
    pub next_page: Option<usize>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    pub fn builder(results: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(results)
    }

    /// Converts the results of this page, keeping the navigation metadata.
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            results: self.results.into_iter().map(f).collect::<Result<Vec<U>, E>>()?,
            total: self.total,
            next_page: self.next_page,
            previous_page: self.previous_page,
        })
    }
}

impl Page<Document> {
    /// Builds a page from a storage envelope.
    ///
    /// # Errors
    ///
    /// Returns [`OdmError::InvalidDocument`] if the envelope has no `results` array.
    pub fn from_envelope(mut envelope: Document, params: &PaginationParams) -> OdmResult<Self> {
        let results = match envelope.remove(RESULTS_KEY) {
            Some(Bson::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Bson::Document(document) => Ok(document),
                    other => Err(OdmError::InvalidDocument(format!(
                        "page result is {:?}, expected a document",
                        other.element_type(),
                    ))),
                })
                .collect::<OdmResult<Vec<_>>>()?,
            _ => {
                return Err(OdmError::InvalidDocument(
                    "paged query result has no results array".into(),
                ));
            }
        };

        let total = match envelope.get(TOTAL_KEY) {
            Some(Bson::Int32(total)) => *total as usize,
            Some(Bson::Int64(total)) => *total as usize,
            Some(Bson::Double(total)) => *total as usize,
            _ => results.len(),
        };

        Ok(params.page_of(results, total))
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            total: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for constructing [`Page`] instances.
pub struct PageBuilder<T> {
    results: Vec<T>,
    total: usize,
    next_page: Option<usize>,
    previous_page: Option<usize>,
}

impl<T> PageBuilder<T> {
    pub fn new(results: Vec<T>) -> Self {
        Self {
            results,
            total: 0,
            next_page: None,
            previous_page: None,
        }
    }

    pub fn with_total(mut self, total: usize) -> Self {
        self.total = total;
        self
    }

    pub fn with_next_page(mut self, next_page: Option<usize>) -> Self {
        self.next_page = next_page;
        self
    }

    pub fn with_previous_page(mut self, previous_page: Option<usize>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            results: self.results,
            total: self.total,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Which page to retrieve and how many results per page. Pages are 1-indexed.
///
/// # Example
///
/// ```ignore
/// use odmlayer_core::page::PaginationParams;
///
/// let params = PaginationParams::new(2, 50);
/// assert_eq!(params.offset(), 50);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PaginationParams {
    pub page: usize,
    pub per_page: usize,
}

impl PaginationParams {
    /// Creates pagination parameters. A page number of zero is treated as the first page
    /// and a page size of zero as one result per page.
    pub fn new(page: usize, per_page: usize) -> Self {
        Self { page: page.max(1), per_page: per_page.max(1) }
    }

    /// Number of results to skip for this page.
    pub fn offset(&self) -> usize {
        (self.page.max(1) - 1) * self.per_page
    }

    /// Wraps the results of this page with navigation metadata derived from `total`.
    pub fn page_of<T>(&self, results: Vec<T>, total: usize) -> Page<T> {
        let end = self.offset() + results.len();

        Page::builder(results)
            .with_total(total)
            .with_next_page(if end < total { Some(self.page + 1) } else { None })
            .with_previous_page(if self.page > 1 { Some(self.page - 1) } else { None })
            .build()
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, per_page: 10 }
    }
}
