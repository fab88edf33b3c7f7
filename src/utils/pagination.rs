use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One page cut out of a fully fetched result set.
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub pages: usize,
    pub total: usize,
    /// 1-based index of the first row shown, 0 when empty
    pub showing_from: usize,
    pub showing_to: usize,
}

impl<T: Clone> Page<T> {
    /// Out-of-range pages are clamped to the nearest valid one.
    pub fn slice(items: &[T], page: Option<usize>, per_page: Option<usize>) -> Self {
        let per_page = per_page.filter(|n| *n > 0).unwrap_or(DEFAULT_PAGE_SIZE);
        let total = items.len();
        let pages = total.div_ceil(per_page).max(1);
        let page = page.unwrap_or(1).clamp(1, pages);

        let start = (page - 1) * per_page;
        let end = total.min(start + per_page);
        let data = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();

        Self {
            data,
            page,
            per_page,
            pages,
            total,
            showing_from: if total == 0 { 0 } else { start + 1 },
            showing_to: end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_past_the_last_page() {
        let items: Vec<u32> = (1..=25).collect();
        let page = Page::slice(&items, Some(9), Some(10));

        assert_eq!(page.page, 3);
        assert_eq!(page.pages, 3);
        assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
        assert_eq!((page.showing_from, page.showing_to, page.total), (21, 25, 25));
    }

    #[test]
    fn empty_set_has_one_empty_page() {
        let page = Page::<u32>::slice(&[], Some(0), None);

        assert_eq!(page.page, 1);
        assert_eq!(page.pages, 1);
        assert_eq!(page.per_page, DEFAULT_PAGE_SIZE);
        assert!(page.data.is_empty());
        assert_eq!((page.showing_from, page.showing_to), (0, 0));
    }
}
