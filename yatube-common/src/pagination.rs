//! Splitting ordered listings into fixed-size pages.
//!
//! The page lookup is forgiving: a missing or malformed page number shows the
//! first page and a number outside the valid range shows the last one.

use serde::Serialize;
use std::num::NonZeroU64;

pub const DEFAULT_PER_PAGE: NonZeroU64 = NonZeroU64::new(10).unwrap();

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct Paginator {
    per_page: NonZeroU64,
}

/// Where a requested page lies within a listing of `count` items.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct PageLocation {
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    per_page: u64,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Paginator {
    #[must_use]
    pub fn new(per_page: NonZeroU64) -> Self {
        Self { per_page }
    }

    #[must_use]
    pub fn per_page(self) -> NonZeroU64 {
        self.per_page
    }

    /// An empty listing still has one (empty) page.
    #[must_use]
    pub fn num_pages(self, count: u64) -> u64 {
        count.div_ceil(self.per_page.get()).max(1)
    }

    #[must_use]
    pub fn locate(self, count: u64, requested: Option<&str>) -> PageLocation {
        let num_pages = self.num_pages(count);

        let number = match requested.map(parse_page_number) {
            None | Some(PageNumber::Invalid) => 1,
            Some(PageNumber::Valid(number)) if (1..=num_pages).contains(&number) => number,
            Some(PageNumber::Valid(_) | PageNumber::OutOfRange) => num_pages,
        };

        PageLocation {
            number,
            num_pages,
            count,
            per_page: self.per_page.get(),
        }
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PER_PAGE)
    }
}

impl PageLocation {
    #[must_use]
    pub fn offset(self) -> u64 {
        (self.number - 1) * self.per_page
    }

    #[must_use]
    pub fn limit(self) -> u64 {
        self.per_page
    }

    #[must_use]
    pub fn into_page<T>(self, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number: self.number,
            num_pages: self.num_pages,
            count: self.count,
            has_next: self.number < self.num_pages,
            has_previous: self.number > 1,
        }
    }
}

enum PageNumber {
    Valid(u64),
    /// An integer that does not fit, including zero and negatives.
    OutOfRange,
    Invalid,
}

fn parse_page_number(raw: &str) -> PageNumber {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return PageNumber::Invalid;
    }
    if negative {
        return PageNumber::OutOfRange;
    }

    digits
        .parse()
        .map_or(PageNumber::OutOfRange, PageNumber::Valid)
}

#[cfg(test)]
mod tests {
    use crate::pagination::{PageLocation, Paginator};
    use std::num::NonZeroU64;

    fn paginator(per_page: u64) -> Paginator {
        Paginator::new(NonZeroU64::new(per_page).unwrap())
    }

    fn number(location: PageLocation) -> u64 {
        location.number
    }

    #[test]
    fn page_count() {
        let paginator = paginator(10);

        assert_eq!(paginator.num_pages(0), 1);
        assert_eq!(paginator.num_pages(1), 1);
        assert_eq!(paginator.num_pages(10), 1);
        assert_eq!(paginator.num_pages(11), 2);
        assert_eq!(paginator.num_pages(13), 2);
    }

    #[test]
    fn requested_page_is_resolved() {
        let paginator = paginator(10);

        assert_eq!(number(paginator.locate(13, None)), 1);
        assert_eq!(number(paginator.locate(13, Some("1"))), 1);
        assert_eq!(number(paginator.locate(13, Some("2"))), 2);
        assert_eq!(number(paginator.locate(13, Some(" 2 "))), 2);
        assert_eq!(number(paginator.locate(13, Some("+2"))), 2);
    }

    #[test]
    fn malformed_page_falls_back_to_first() {
        let paginator = paginator(10);

        for raw in ["", "abc", "2.5", "last", "1e3", "-"] {
            assert_eq!(number(paginator.locate(13, Some(raw))), 1, "{raw}");
        }
    }

    #[test]
    fn out_of_range_page_falls_back_to_last() {
        let paginator = paginator(10);

        for raw in ["3", "0", "-1", "99999999999999999999999"] {
            assert_eq!(number(paginator.locate(13, Some(raw))), 2, "{raw}");
        }
        assert_eq!(number(paginator.locate(0, Some("5"))), 1);
    }

    #[test]
    fn window_and_page_flags() {
        let paginator = paginator(10);

        let first = paginator.locate(13, Some("1"));
        assert_eq!((first.offset(), first.limit()), (0, 10));
        let page = first.into_page(vec![(); 10]);
        assert!(page.has_next);
        assert!(!page.has_previous);

        let second = paginator.locate(13, Some("2"));
        assert_eq!((second.offset(), second.limit()), (10, 10));
        let page = second.into_page(vec![(); 3]);
        assert!(!page.has_next);
        assert!(page.has_previous);
        assert_eq!(page.count, 13);
        assert_eq!(page.num_pages, 2);
    }
}
