use serde::Serialize;

use crate::validation::{self, FieldErrors};

pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;
pub const MAX_SEARCH_LEN: usize = 100;

/// A validated page window. `per_page` above the maximum is clamped, `page < 1` is rejected,
/// and so is a page whose row offset does not fit in an `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>, per_page: Option<i64>) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let page = page.unwrap_or(1);
        if page < 1 {
            errors.add("page", "Must be greater than or equal to 1.");
        }
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE);
        if per_page < 1 {
            errors.add("per_page", "Must be greater than or equal to 1.");
        }
        let per_page = per_page.min(MAX_PER_PAGE);
        if page >= 1 && per_page >= 1 && (page - 1).checked_mul(per_page).is_none() {
            errors.add("page", "Page number is too large.");
        }
        errors.into_result(PageRequest { page, per_page })
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// Normalized free-text search term: trimmed, `None` when blank, bounded length.
pub fn search_term(search: Option<&str>) -> Result<Option<String>, FieldErrors> {
    let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let mut errors = FieldErrors::new();
    validation::max_length(&mut errors, "search", term, MAX_SEARCH_LEN);
    errors.into_result(Some(term.to_string()))
}

/// `%term%` with LIKE wildcards in the term escaped.
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageMeta {
    pub page: i64,
    pub pages: i64,
    pub per_page: i64,
    pub total: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageMeta {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let pages = if total == 0 {
            0
        } else {
            (total + request.per_page - 1) / request.per_page
        };
        PageMeta {
            page: request.page,
            pages,
            per_page: request.per_page,
            total,
            has_next: request.page < pages,
            has_prev: request.page > 1,
        }
    }
}
