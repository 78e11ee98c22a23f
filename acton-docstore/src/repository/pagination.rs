//! Paging parameters and paged results
//!
//! Page indexes are zero-based: page 0 holds the first `page_size` matches.
//!
//! ```rust
//! use acton_docstore::repository::{Page, Pagination};
//!
//! let pagination = Pagination::new(1, 10);
//! assert_eq!(pagination.offset(), Some(10));
//!
//! let page = Page::new(vec!["k", "l"], 25, pagination);
//! assert_eq!(page.total_pages(), 3);
//! assert!(page.has_next());
//! assert!(page.has_previous());
//! ```

use serde::{Deserialize, Serialize};

/// Zero-based page index and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    /// Zero-based page index
    pub page: u64,
    /// Maximum number of items per page
    pub page_size: u64,
}

impl Pagination {
    /// Create paging parameters
    #[must_use]
    pub const fn new(page: u64, page_size: u64) -> Self {
        Self { page, page_size }
    }

    /// The first page with the given size
    #[must_use]
    pub const fn first_page(page_size: u64) -> Self {
        Self { page: 0, page_size }
    }

    /// Number of matches skipped before this page, `None` on overflow
    #[must_use]
    pub const fn offset(&self) -> Option<u64> {
        self.page.checked_mul(self.page_size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            page_size: 20,
        }
    }
}

/// One page of results plus the total number of matches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Matches across all pages
    pub total: u64,
    /// Zero-based index of this page
    pub page: u64,
    /// Requested page size
    pub page_size: u64,
}

impl<T> Page<T> {
    /// Assemble a page
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }

    /// Number of pages needed for `total` matches
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size)
    }

    /// Whether a later page holds more matches
    pub fn has_next(&self) -> bool {
        self.page.saturating_add(1) < self.total_pages()
    }

    /// Whether an earlier page exists
    pub fn has_previous(&self) -> bool {
        self.page > 0
    }

    /// Whether this page holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transform the items, keeping the paging metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }

    /// Split into items and total
    pub fn into_parts(self) -> (Vec<T>, u64) {
        (self.items, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_offset() {
        assert_eq!(Pagination::new(0, 10).offset(), Some(0));
        assert_eq!(Pagination::new(3, 20).offset(), Some(60));
        assert_eq!(Pagination::new(u64::MAX, 2).offset(), None);
    }

    #[test]
    fn test_pagination_default() {
        let pagination = Pagination::default();
        assert_eq!(pagination.page, 0);
        assert_eq!(pagination.page_size, 20);
        assert_eq!(Pagination::first_page(5), Pagination::new(0, 5));
    }

    #[test]
    fn test_page_navigation() {
        let first = Page::new(vec![1, 2, 3], 7, Pagination::new(0, 3));
        assert_eq!(first.total_pages(), 3);
        assert!(first.has_next());
        assert!(!first.has_previous());

        let last = Page::new(vec![7], 7, Pagination::new(2, 3));
        assert!(!last.has_next());
        assert!(last.has_previous());
    }

    #[test]
    fn test_page_past_the_end() {
        let page: Page<i32> = Page::new(Vec::new(), 4, Pagination::new(9, 2));
        assert!(page.is_empty());
        assert!(!page.has_next());
        assert_eq!(page.total_pages(), 2);
    }

    #[test]
    fn test_page_map_and_parts() {
        let page = Page::new(vec![1, 2], 2, Pagination::first_page(10)).map(|n| n * 10);
        assert_eq!(page.page_size, 10);
        assert_eq!(page.into_parts(), (vec![10, 20], 2));
    }
}
