//! Pagination boundary
//!
//! Pages are 1-based; the engine only ever sees a zero-based `skip` and a
//! [`Limit`]. `page_size == 0` is the "show everything" convention and is
//! translated here into [`Limit::Unbounded`] so the engine never has to treat
//! zero specially.

use crate::error::{CatalogError, Result};
use serde::Serialize;

/// Hard ceiling for a single page
pub const MAX_PAGE_SIZE: i64 = 1000;

/// Page size when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: i64 = 50;

/// Upper bound on rows returned by a list query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Limit {
    Bounded(u32),
    Unbounded,
}

impl Limit {
    /// Value for SQLite's `LIMIT ?` (negative means no limit)
    pub fn as_sql(&self) -> i64 {
        match self {
            Limit::Bounded(n) => *n as i64,
            Limit::Unbounded => -1,
        }
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self, Limit::Unbounded)
    }
}

/// Validated slice of a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub page: i64,
    pub page_size: i64,
    pub skip: u64,
    pub limit: Limit,
}

/// Validate raw `page`/`page_size` values from a request
///
/// `page >= 1`, `0 <= page_size <= 1000`; `page_size == 0` means unbounded.
pub fn window(page: Option<i64>, page_size: Option<i64>) -> Result<Window> {
    let page = page.unwrap_or(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);

    if page < 1 {
        return Err(CatalogError::validation("page must be greater than or equal to 1"));
    }

    if !(0..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(CatalogError::validation(format!(
            "page_size must be between 0 and {} (0 returns all rows)",
            MAX_PAGE_SIZE
        )));
    }

    if page_size == 0 {
        // Everything from the start; page numbers are meaningless here
        return Ok(Window {
            page,
            page_size,
            skip: 0,
            limit: Limit::Unbounded,
        });
    }

    let skip = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| CatalogError::validation("page is too large"))?;

    Ok(Window {
        page,
        page_size,
        skip: skip as u64,
        limit: Limit::Bounded(page_size as u32),
    })
}

/// Page of results with the total count for the same filters
#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub items: Vec<T>,
}

impl<T> Paginated<T> {
    pub fn new(window: &Window, total: i64, items: Vec<T>) -> Self {
        Self {
            total,
            page: window.page,
            page_size: window.page_size,
            items,
        }
    }

    /// Total number of pages (1 when unbounded)
    pub fn total_pages(&self) -> i64 {
        if self.page_size == 0 {
            return 1;
        }
        (self.total + self.page_size - 1) / self.page_size
    }
}
