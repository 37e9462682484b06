//! Offset-based paging math

use serde::{Serialize, Deserialize};

/// A page window expressed as an item offset and a page size.
///
/// The offset is always a multiple of the page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    offset: usize,
    page_size: usize,
}

impl Pager {
    /// First page. A zero page size is bumped to one.
    pub fn new(page_size: usize) -> Self {
        Self {
            offset: 0,
            page_size: page_size.max(1),
        }
    }

    /// Window starting at `offset`, snapped down to a page boundary
    pub fn at_offset(page_size: usize, offset: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            offset: offset - offset % page_size,
            page_size,
        }
    }

    /// Window for a zero-based page number
    pub fn at_page(page_size: usize, page: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            offset: page.saturating_mul(page_size),
            page_size,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Zero-based page number
    pub fn page(&self) -> usize {
        self.offset / self.page_size
    }

    /// Number of pages needed for `total` items
    pub fn page_count(&self, total: u64) -> u64 {
        total.div_ceil(self.page_size as u64)
    }

    /// Rows expected on this page given `total` items
    pub fn rows_on_page(&self, total: u64) -> u64 {
        total.saturating_sub(self.offset as u64).min(self.page_size as u64)
    }

    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + self.page_size,
            page_size: self.page_size,
        }
    }

    pub fn previous(&self) -> Self {
        Self {
            offset: self.offset.saturating_sub(self.page_size),
            page_size: self.page_size,
        }
    }

    /// Whether a following page exists for `total` items
    pub fn has_next(&self, total: u64) -> bool {
        ((self.offset + self.page_size) as u64) < total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_number_round_trips_offset() {
        for page_size in [1usize, 7, 20, 25] {
            for page in 0..6 {
                let pager = Pager::at_page(page_size, page);
                assert_eq!(pager.offset() % page_size, 0);
                assert_eq!(pager.page(), page);
            }
        }
    }

    #[test]
    fn test_page_count_and_last_page() {
        let total = 47u64;
        let pager = Pager::new(20);
        assert_eq!(pager.page_count(total), 3);
        assert_eq!(pager.rows_on_page(total), 20);

        let last = Pager::at_page(20, 2);
        assert_eq!(last.rows_on_page(total), total - last.offset() as u64);
        assert!(!last.has_next(total));

        let beyond = Pager::at_page(20, 5);
        assert_eq!(beyond.rows_on_page(total), 0);
    }

    #[test]
    fn test_offsets_snap_to_page_boundary() {
        let pager = Pager::at_offset(20, 45);
        assert_eq!(pager.offset(), 40);
        assert_eq!(pager.previous().offset(), 20);
        assert_eq!(Pager::new(0).page_size(), 1);
    }
}
