//! Page-number pagination with index-assisted row fetches
//!
//! A [`Page`] is built per request from the caller's `pageNum`/`pageSize`,
//! bound to a row source with [`Page::query`], and read back afterwards for
//! the normalized `num`, `size` and `total`.
//!
//! Two fetch strategies are used. Without a primary key the filtered query
//! gets `LIMIT/OFFSET` directly. With one, a sub-query pages over the key
//! column alone and the full rows are joined onto that key set, so the
//! store only skips over index entries for deep offsets.
//!
//! # Example
//!
//! ```rust
//! use pagewise::page::Page;
//!
//! let mut page = Page::new(3, 10);
//! page.total = 25;
//! assert_eq!(page.limit(), (10, 20));
//!
//! // Past the last page: an empty window just beyond the data
//! let mut page = Page::new(5, 10);
//! page.total = 25;
//! assert_eq!(page.limit(), (10, 30));
//! assert_eq!(page.num, 4);
//! ```

mod filter;
mod query;
mod select;

pub use filter::{FilterCondition, FilterOperator, FilterValue, OrderDirection};
pub use query::{FetchPlan, PageSource, Query, Strategy, Window};
pub use select::{quote_ident, PgFind, PgScan, Select, SelectFrom, OFFSET_KEY, OFFSET_TABLE};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DatabaseError;

/// Smallest page number
pub const MIN_NUM: u64 = 1;
/// Smallest page size
pub const MIN_SIZE: u64 = 1;
/// Page size used when the requested one is out of range
pub const DEFAULT_SIZE: u64 = 10;
/// Largest accepted page size
pub const MAX_SIZE: u64 = 5000;

/// Paging state for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Requested page, normalized to the served page by [`Page::limit`]
    pub num: u64,
    /// Rows per page
    pub size: u64,
    /// Rows matching the filter
    pub total: i64,
    /// Fetch every row and report them as a single page
    pub disable: bool,
    /// Trust the caller-provided `total` and skip the `COUNT` query
    #[serde(rename = "count")]
    pub count_skip: bool,
    /// Indexed column used for join-assisted fetches; empty selects `LIMIT/OFFSET`
    #[serde(rename = "primary")]
    pub primary_key: String,
}

impl Page {
    pub fn new(num: u64, size: u64) -> Self {
        Self {
            num,
            size,
            ..Self::default()
        }
    }

    /// Enables join-assisted fetching over `key`
    #[must_use]
    pub fn with_primary_key(mut self, key: impl Into<String>) -> Self {
        self.primary_key = key.into();
        self
    }

    /// Returns every row instead of a window
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.disable = true;
        self
    }

    /// Uses a total the caller already knows instead of counting
    #[must_use]
    pub fn with_known_total(mut self, total: i64) -> Self {
        self.total = total;
        self.count_skip = true;
        self
    }

    /// Computes `(limit, offset)` for the current total and normalizes
    /// `num`/`size` in place.
    ///
    /// Page numbers below 1 serve the first page. Page numbers past the last
    /// page yield an offset just beyond the data, and `num` becomes
    /// `max_page + 1`. Out-of-range sizes fall back to [`DEFAULT_SIZE`].
    pub fn limit(&mut self) -> (u64, u64) {
        let requested = self.num;
        let total = u64::try_from(self.total).unwrap_or(0);

        let mut num = requested.max(MIN_NUM);
        let size = if (MIN_SIZE..=MAX_SIZE).contains(&self.size) {
            self.size
        } else {
            DEFAULT_SIZE
        };

        let max_page = total.div_ceil(size).max(MIN_NUM);
        if total > 0 && num > total {
            num = max_page;
        }

        let mut offset = if requested < MIN_NUM {
            0
        } else {
            size.saturating_mul(num - 1)
        };

        if total > 0 && requested > max_page {
            num = max_page + 1;
            offset = size.saturating_mul(max_page);
        }

        self.num = num;
        self.size = if self.disable { total } else { size };
        (size, offset)
    }

    /// Binds this page to a row source for one paged fetch
    pub fn query<S: PageSource>(&mut self, source: S) -> Query<'_, S> {
        Query::new(self, source)
    }
}

/// Caller-facing paging parameters, as found in a query string.
///
/// Absent values are left to [`Page::limit`] to normalize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, validator::Validate)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    #[validate(range(min = 1))]
    pub page_num: Option<u64>,
    #[validate(range(min = 1))]
    pub page_size: Option<u64>,
}

impl PageParams {
    pub fn into_page(self) -> Page {
        Page::new(
            self.page_num.unwrap_or(MIN_NUM),
            self.page_size.unwrap_or(DEFAULT_SIZE),
        )
    }
}

/// Failure of a paged fetch
#[derive(Debug, Clone, Error)]
pub enum PageError {
    /// The select has no single table to join the key set back onto
    #[error("parse model failed")]
    ParseModel,

    #[error("invalid identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("invalid filter on `{field}`: {reason}")]
    InvalidFilter { field: String, reason: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for PageError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(DatabaseError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(num: u64, size: u64, total: i64) -> Page {
        Page {
            total,
            ..Page::new(num, size)
        }
    }

    #[test]
    fn test_limit_middle_page() {
        let mut p = page(3, 10, 25);
        assert_eq!(p.limit(), (10, 20));
        assert_eq!((p.num, p.size), (3, 10));
    }

    #[test]
    fn test_limit_past_last_page() {
        let mut p = page(5, 10, 25);
        assert_eq!(p.limit(), (10, 30));
        assert_eq!(p.num, 4);
    }

    #[test]
    fn test_limit_num_beyond_total() {
        let mut p = page(5, 10, 3);
        assert_eq!(p.limit(), (10, 10));
        assert_eq!(p.num, 2);
    }

    #[test]
    fn test_limit_zero_num_is_first_page() {
        let mut p = page(0, 10, 25);
        assert_eq!(p.limit(), (10, 0));
        assert_eq!(p.num, 1);
    }

    #[test]
    fn test_limit_size_out_of_range() {
        for size in [0, MAX_SIZE + 1, u64::MAX] {
            let mut p = page(1, size, 100);
            assert_eq!(p.limit(), (DEFAULT_SIZE, 0));
            assert_eq!(p.size, DEFAULT_SIZE);
        }

        let mut p = page(1, MAX_SIZE, 100);
        assert_eq!(p.limit(), (MAX_SIZE, 0));
    }

    #[test]
    fn test_limit_empty_total_is_unclamped() {
        // With no rows there is no last page, so the window is left as asked
        let mut p = page(7, 10, 0);
        assert_eq!(p.limit(), (10, 60));
        assert_eq!(p.num, 7);
    }

    #[test]
    fn test_limit_exact_multiple() {
        let mut p = page(3, 10, 30);
        assert_eq!(p.limit(), (10, 20));
        let mut p = page(4, 10, 30);
        assert_eq!(p.limit(), (10, 30));
        assert_eq!(p.num, 4);
    }

    #[test]
    fn test_limit_disabled_forces_size_to_total() {
        let mut p = Page {
            total: 42,
            ..Page::new(1, 10).disabled()
        };
        p.limit();
        assert_eq!(p.size, 42);
    }

    #[test]
    fn test_limit_bounds_hold() {
        for total in [0_i64, 1, 9, 10, 11, 99, 5001] {
            for num in [0_u64, 1, 2, 5, 1000] {
                for size in [0_u64, 1, 3, 10, 5000, 6000] {
                    let mut p = page(num, size, total);
                    let (limit, offset) = p.limit();
                    assert!((MIN_SIZE..=MAX_SIZE).contains(&limit));
                    assert_eq!(offset % limit, 0);
                    if num == 0 {
                        assert_eq!(offset, 0);
                    }
                    if total > 0 {
                        let max_page = (total as u64).div_ceil(limit).max(1);
                        assert!(offset <= limit * max_page);
                    } else {
                        // Nothing to clamp against; find() skips the fetch at total 0
                        assert_eq!(offset, limit * num.saturating_sub(1));
                    }
                }
            }
        }
    }

    #[test]
    fn test_params_into_page() {
        let page = PageParams {
            page_num: Some(2),
            page_size: None,
        }
        .into_page();
        assert_eq!((page.num, page.size), (2, DEFAULT_SIZE));
        assert!(page.primary_key.is_empty());
    }

    #[test]
    fn test_params_validation() {
        use validator::Validate;

        let bad = PageParams {
            page_num: Some(0),
            page_size: Some(10),
        };
        assert!(bad.validate().is_err());
        assert!(PageParams::default().validate().is_ok());
    }

    #[test]
    fn test_parse_model_message() {
        assert_eq!(PageError::ParseModel.to_string(), "parse model failed");
    }
}
