use super::sort::{SortKey, sort_records};
use crate::core::DenormalizedRecord;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Pagination and ordering requested by the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewOptions {
    /// 1-indexed
    pub page: usize,
    pub page_size: usize,
    #[serde(default)]
    pub sort: Vec<SortKey>,
}

impl ViewOptions {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            sort: Vec::new(),
        }
    }

    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Immutable snapshot handed to the renderer.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ViewState {
    pub items: Vec<DenormalizedRecord>,
    /// Page actually shown, after clamping.
    pub page: usize,
    pub page_size: usize,
    /// Filtered count before pagination.
    pub total_count: usize,
    /// `0` when nothing matched.
    pub total_pages: usize,
}

impl ViewState {
    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }
}

/// Sorts then slices one page out of `records`.
///
/// Out of range pages clamp to the nearest valid page; a page size of 0 is
/// treated as 1.
pub fn project(mut records: Vec<DenormalizedRecord>, options: &ViewOptions) -> ViewState {
    let page_size = options.page_size.max(1);
    let total_count = records.len();
    let total_pages = total_count.div_ceil(page_size);
    let page = options.page.clamp(1, total_pages.max(1));

    sort_records(&mut records, &options.sort);

    let start = (page - 1) * page_size;
    let items: Vec<_> = records.into_iter().skip(start).take(page_size).collect();

    ViewState {
        items,
        page,
        page_size,
        total_count,
        total_pages,
    }
}
