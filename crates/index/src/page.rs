//! Pagination for listings.

/// A 1-based page request, already clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    /// Clamp a requested page: missing or zero values fall back to page 1 and
    /// `default_size`, and the size never exceeds `max_size`.
    ///
    /// ```
    /// use gitshelf_index::Page;
    /// assert_eq!(Page::clamped(None, None, 10, 100), Page { number: 1, size: 10 });
    /// assert_eq!(Page::clamped(Some(3), Some(500), 10, 100), Page { number: 3, size: 100 });
    /// assert_eq!(Page::clamped(Some(0), Some(0), 10, 100), Page { number: 1, size: 10 });
    /// ```
    pub fn clamped(number: Option<u32>, size: Option<u32>, default_size: u32, max_size: u32) -> Self {
        let max_size = max_size.max(1);
        let size = size.filter(|s| *s > 0).unwrap_or(default_size).clamp(1, max_size);
        Self {
            number: number.filter(|n| *n > 0).unwrap_or(1),
            size,
        }
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.number - 1) * i64::from(self.size)
    }
}

/// One page of results plus the totals needed to render navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Paginated<T> {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.page_size.max(1)))
    }

    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Paginated<U> {
        Paginated {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}
