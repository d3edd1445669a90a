use serde::{Deserialize, Serialize};

use crate::{
    constants::{MAX_COUNT_PER_PAGE, RECIPE_COUNT_PER_PAGE},
    error::Error,
};

/// Rows of one page plus the number of rows across all pages.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub rows: Vec<T>,
    pub total_rows: i64,
}

impl<T> Listing<T> {
    pub fn new(rows: Vec<T>, total_rows: i64) -> Self {
        Self { rows, total_rows }
    }
}

/// 1-based page number with a page size (`limit` in query strings).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: RECIPE_COUNT_PER_PAGE,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<i64>, limit: Option<i64>) -> Result<Self, Error> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(RECIPE_COUNT_PER_PAGE);

        if !(1..=MAX_COUNT_PER_PAGE).contains(&limit) {
            return Err(Error::validation(format!(
                "Page size must be between 1 and {MAX_COUNT_PER_PAGE}"
            )));
        }
        // The offset has to fit in a BIGINT.
        if page < 1 || (page - 1).checked_mul(limit).is_none() {
            return Err(Error::validation("Invalid page"));
        }

        Ok(Self { page, limit })
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0).saturating_mul(self.limit)
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PageContext<T> {
    pub rows: Vec<T>,
    pub total_rows: i64,
    pub page: i64,
    pub page_count: i64,
    pub next_page: Option<i64>,
    pub prev_page: Option<i64>,
}

impl<T> PageContext<T> {
    pub fn from_rows(rows: Vec<T>, total_rows: i64, request: PageRequest) -> Self {
        if total_rows <= 0 {
            return Self::no_rows();
        }
        let page_count = (total_rows + request.limit - 1) / request.limit;

        let next_page = (request.page < page_count).then_some(request.page + 1);
        let prev_page = (request.page > 1).then(|| (request.page - 1).min(page_count));

        Self {
            rows,
            total_rows,
            page: request.page,
            page_count,
            next_page,
            prev_page,
        }
    }

    pub fn no_rows() -> Self {
        Self {
            rows: vec![],
            total_rows: 0,
            page: 1,
            page_count: 1,
            next_page: None,
            prev_page: None,
        }
    }
}
