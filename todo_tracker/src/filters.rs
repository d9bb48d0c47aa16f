//! Listing filters, sorting and pagination metadata.

use serde::{Deserialize, Serialize};

use crate::validator::{Validator, permitted_value};

/// Sort keys accepted for todo listings.
pub const TODO_SORT_SAFELIST: &[&str] = &["id", "text", "-id", "-text"];

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Query options for listing todos.
#[derive(Debug, Clone, PartialEq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    pub sort: String,
    pub sort_safelist: &'static [&'static str],
    pub include_archived: bool,
    pub only_archived: bool,
    pub done: bool,
    pub undone: bool,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: "id".to_string(),
            sort_safelist: TODO_SORT_SAFELIST,
            include_archived: false,
            only_archived: false,
            done: false,
            undone: false,
        }
    }
}

/// Which archived state a listing should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchivedFilter {
    Unarchived,
    Any,
    Archived,
}

/// Which completion state a listing should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedFilter {
    Any,
    Done,
    Undone,
}

/// Column to sort on. Only constructed from safelisted keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Text,
}

impl SortColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortColumn::Id => "id",
            SortColumn::Text => "text",
        }
    }
}

impl Filters {
    /// Column named by the sort key.
    ///
    /// # Panics
    ///
    /// Panics if the sort key is not in the safelist. Handlers validate the key
    /// first, so reaching this with an unsafe key is a programming error.
    pub fn sort_column(&self) -> SortColumn {
        if !self.sort_safelist.contains(&self.sort.as_str()) {
            panic!("unsafe sort parameter: {}", self.sort);
        }
        match self.sort.trim_start_matches('-') {
            "id" => SortColumn::Id,
            "text" => SortColumn::Text,
            other => panic!("unsafe sort parameter: {other}"),
        }
    }

    pub fn sort_descending(&self) -> bool {
        self.sort.starts_with('-')
    }

    pub fn sort_direction(&self) -> &'static str {
        if self.sort_descending() { "DESC" } else { "ASC" }
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    pub fn archived(&self) -> ArchivedFilter {
        if self.only_archived {
            ArchivedFilter::Archived
        } else if self.include_archived {
            ArchivedFilter::Any
        } else {
            ArchivedFilter::Unarchived
        }
    }

    pub fn completed(&self) -> CompletedFilter {
        match (self.done, self.undone) {
            (true, false) => CompletedFilter::Done,
            (false, true) => CompletedFilter::Undone,
            _ => CompletedFilter::Any,
        }
    }
}

pub fn validate_filters(v: &mut Validator, f: &Filters) {
    v.check(f.page >= 1, "page", "must be at least 1");
    v.check(f.page <= MAX_PAGE, "page", "must be no more than 10,000,000");
    v.check(f.page_size >= 1, "page_size", "must be at least 1");
    v.check(
        f.page_size <= MAX_PAGE_SIZE,
        "page_size",
        "must be no more than 100",
    );
    v.check(
        permitted_value(&f.sort.as_str(), f.sort_safelist),
        "sort",
        "invalid sorting key",
    );

    if f.include_archived && f.only_archived {
        v.add_error(
            "filters",
            "include-archived and only-archived are mutually exclusive",
        );
    }
    if f.done && f.undone {
        v.add_error("filters", "done and undone are mutually exclusive");
    }
}

/// Pagination metadata. Serializes to `{}` when no records matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginationData {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub current_page: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub page_size: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub first_page: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_page: i64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_records: i64,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl PaginationData {
    pub fn calculate(total_records: i64, page: i64, page_size: i64) -> Self {
        if total_records == 0 {
            return Self::default();
        }

        Self {
            current_page: page,
            page_size,
            first_page: 1,
            last_page: (total_records + page_size - 1) / page_size,
            total_records,
        }
    }
}
