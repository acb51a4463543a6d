//! Pagination envelope, derived once from `(total, page, page_size)` per
//! spec §4.2.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, page_size: i64) -> Self {
        let page_size = page_size.max(1);
        let page = page.max(1);
        let total_pages = ((total as f64) / (page_size as f64)).ceil() as i64;
        let total_pages = total_pages.max(1);
        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    /// `(limit, offset)` pair for a `LIMIT .. OFFSET ..` query.
    pub fn limit_offset(page: i64, page_size: i64) -> (i64, i64) {
        let page = page.max(1);
        let page_size = page_size.max(1);
        (page_size, (page - 1) * page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_total_pages_and_flags() {
        let p: Page<i32> = Page::new(vec![1, 2], 25, 1, 10);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(!p.has_prev);

        let p2: Page<i32> = Page::new(vec![], 25, 3, 10);
        assert_eq!(p2.total_pages, 3);
        assert!(!p2.has_next);
        assert!(p2.has_prev);
    }

    #[test]
    fn zero_total_still_has_one_page() {
        let p: Page<i32> = Page::new(vec![], 0, 1, 10);
        assert_eq!(p.total_pages, 1);
        assert!(!p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn limit_offset_math() {
        assert_eq!(Page::<i32>::limit_offset(1, 20), (20, 0));
        assert_eq!(Page::<i32>::limit_offset(3, 20), (20, 40));
        assert_eq!(Page::<i32>::limit_offset(0, 20), (20, 0));
    }
}
