use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{AlertDto, IncidentDto};

pub const DEFAULT_PAGE_LIMIT: u32 = 25;
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// One page of results; `count` is the total number of matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub limit: u32,
    pub offset: u64,
    pub count: u64,
    pub items: Vec<T>,
}

pub type PaginatedIncidentsDto = Paginated<IncidentDto>;
pub type PaginatedIncidentAlertsDto = Paginated<AlertDto>;

impl<T> Paginated<T> {
    pub fn new(page: &PageParams, count: u64, items: Vec<T>) -> Self {
        Self {
            limit: page.limit,
            offset: page.offset,
            count,
            items,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PageParams {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000, message = "Limit must be between 1 and 1000"))]
    pub limit: u32,
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_LIMIT
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

impl PageParams {
    pub fn new(limit: u32, offset: u64) -> Self {
        Self { limit, offset }
    }

    /// Slice one page out of an already ordered collection
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        items
            .into_iter()
            .skip(offset)
            .take(self.limit as usize)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page: PageParams = serde_json::from_str("{}").unwrap();
        assert_eq!(page, PageParams::default());
        assert_eq!(page.limit, 25);
    }

    #[test]
    fn test_apply_slices_items() {
        let items: Vec<u32> = (0..10).collect();
        assert_eq!(PageParams::new(3, 2).apply(items.clone()), vec![2, 3, 4]);
        assert!(PageParams::new(3, 20).apply(items).is_empty());
    }

    #[test]
    fn test_limit_bounds() {
        assert!(PageParams::new(0, 0).validate().is_err());
        assert!(PageParams::new(MAX_PAGE_LIMIT + 1, 0).validate().is_err());
        assert!(PageParams::new(MAX_PAGE_LIMIT, 0).validate().is_ok());
    }
}
