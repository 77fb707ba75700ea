use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub pools: Vec<T>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_pools: usize,
    pub has_next_page: bool,
    pub has_previous_page: bool,
    /// 1-based, 0 when there is nothing to show.
    pub start_index: usize,
    pub end_index: usize,
}

/// Slice one page out of `items`. Out-of-range pages are clamped to the
/// nearest valid page.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let total_pools = items.len();
    let total_pages = total_pools.div_ceil(page_size);
    let current_page = page.clamp(1, total_pages.max(1));

    let offset = (current_page - 1) * page_size;
    let end = (offset + page_size).min(total_pools);
    let pools = if offset < end {
        items[offset..end].to_vec()
    } else {
        Vec::new()
    };

    Page {
        start_index: if pools.is_empty() { 0 } else { offset + 1 },
        end_index: end,
        pools,
        current_page,
        total_pages,
        total_pools,
        has_next_page: current_page < total_pages,
        has_previous_page: current_page > 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<u32> {
        (1..=25).collect()
    }

    #[test]
    fn test_first_page() {
        let page = paginate(&items(), 1, 9);
        assert_eq!(page.pools, (1..=9).collect::<Vec<_>>());
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next_page);
        assert!(!page.has_previous_page);
        assert_eq!((page.start_index, page.end_index), (1, 9));
    }

    #[test]
    fn test_page_past_end_is_clamped_to_last() {
        let page = paginate(&items(), 10, 9);
        assert_eq!(page.current_page, 3);
        assert_eq!(page.pools, (19..=25).collect::<Vec<_>>());
        assert!(!page.has_next_page);
        assert!(page.has_previous_page);
        assert_eq!((page.start_index, page.end_index), (19, 25));
    }

    #[test]
    fn test_page_zero_is_clamped_to_first() {
        assert_eq!(paginate(&items(), 0, 9).current_page, 1);
    }

    #[test]
    fn test_page_length_matches_remaining_items() {
        let items = items();
        for page_size in 1..=30 {
            let total_pages = items.len().div_ceil(page_size);
            for page in 1..=total_pages {
                let expected = page_size.min(items.len() - (page - 1) * page_size);
                assert_eq!(paginate(&items, page, page_size).pools.len(), expected);
            }
        }
    }

    #[test]
    fn test_empty_listing() {
        let page = paginate::<u32>(&[], 3, 9);
        assert_eq!(page.current_page, 1);
        assert_eq!(page.total_pages, 0);
        assert!(page.pools.is_empty());
        assert_eq!(page.start_index, 0);
        assert!(!page.has_next_page && !page.has_previous_page);
    }
}
