//! Paginated response types

use crate::request::PageQuery;
use serde::{Deserialize, Serialize};

/// One page of a list operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// List of items
    pub items: Vec<T>,
    /// Current page number (1-based)
    pub page: u32,
    /// Items per page
    pub per_page: u32,
    /// Total number of items across all pages
    pub total: u64,
}

impl<T> Page<T> {
    /// Whether another page follows this one
    ///
    /// An empty page always ends iteration, even if `total` claims more
    /// (a store whose total drifted between requests must not loop forever).
    pub fn has_more(&self) -> bool {
        !self.items.is_empty() && (self.page as u64) * (self.per_page as u64) < self.total
    }
}

impl<T: Clone> Page<T> {
    /// Cut one page out of a full result set
    pub fn slice(all: &[T], query: PageQuery) -> Self {
        let offset = query.offset().min(all.len());
        let end = (offset + query.limit() as usize).min(all.len());
        Self {
            items: all[offset..end].to_vec(),
            page: query.page.max(1),
            per_page: query.limit(),
            total: all.len() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_pages() {
        let all: Vec<u32> = (1..=5).collect();
        let first = Page::slice(&all, PageQuery::new(1, 2));
        assert_eq!(first.items, vec![1, 2]);
        assert!(first.has_more());

        let last = Page::slice(&all, PageQuery::new(3, 2));
        assert_eq!(last.items, vec![5]);
        assert!(!last.has_more());

        let beyond = Page::slice(&all, PageQuery::new(9, 2));
        assert!(beyond.items.is_empty());
        assert!(!beyond.has_more());
    }

    #[test]
    fn test_empty_page_stops_even_with_stale_total() {
        let page: Page<u32> = Page {
            items: vec![],
            page: 1,
            per_page: 10,
            total: 100,
        };
        assert!(!page.has_more());
    }
}
