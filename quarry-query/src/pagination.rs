//! Page-based pagination.
//!
//! A [`Paginator`] knows which page the caller is on; builders ask it for the
//! current page, fetch that window plus a total count and hand both back to
//! [`Paginator::make`]:
//!
//! ```rust
//! use quarry_query::{FixedPaginator, Paginator};
//!
//! let paginator = FixedPaginator::new(3);
//! let page = (&paginator as &dyn Paginator).make(vec!["a", "b"], 42, 20);
//!
//! assert_eq!(page.current_page, 3);
//! assert_eq!(page.last_page(), 3);
//! assert_eq!(page.from(), Some(41));
//! assert!(!page.has_more_pages());
//! ```

use serde::Serialize;

/// Source of the current page number.
pub trait Paginator: Send + Sync {
    /// The 1-based page being requested.
    fn current_page(&self) -> u64;
}

impl dyn Paginator {
    /// Build a page from the items fetched for the current page.
    pub fn make<T>(&self, items: Vec<T>, total: u64, per_page: u64) -> Page<T> {
        Page::new(items, total, per_page, self.current_page())
    }
}

/// A paginator that always reports the same page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPaginator {
    page: u64,
}

impl FixedPaginator {
    /// Create a paginator for the given page; page 0 is treated as page 1.
    pub fn new(page: u64) -> Self {
        Self { page: page.max(1) }
    }
}

impl Default for FixedPaginator {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Paginator for FixedPaginator {
    fn current_page(&self) -> u64 {
        self.page
    }
}

/// One page of results with its position in the full result set.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    /// The records on this page.
    pub items: Vec<T>,
    /// Total number of matching records.
    pub total: u64,
    /// Requested page size.
    pub per_page: u64,
    /// The 1-based page number.
    pub current_page: u64,
}

impl<T> Page<T> {
    /// Create a new page.
    pub fn new(items: Vec<T>, total: u64, per_page: u64, current_page: u64) -> Self {
        Self {
            items,
            total,
            per_page,
            current_page: current_page.max(1),
        }
    }

    /// The last page number; at least 1.
    pub fn last_page(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(self.per_page).max(1)
    }

    /// 1-based position of the first item, `None` for an empty page.
    pub fn from(&self) -> Option<u64> {
        (!self.items.is_empty()).then(|| (self.current_page - 1) * self.per_page + 1)
    }

    /// 1-based position of the last item, `None` for an empty page.
    pub fn to(&self) -> Option<u64> {
        self.from().map(|from| from + self.items.len() as u64 - 1)
    }

    /// Whether pages follow this one.
    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }

    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transform the items, keeping the page metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            per_page: self.per_page,
            current_page: self.current_page,
        }
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
