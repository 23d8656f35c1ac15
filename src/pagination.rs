//! Offset pagination shared by every list endpoint.
//!
//! Out-of-range query input is clamped rather than rejected, so a
//! `?page=0&limit=9999` request still returns a sane first page.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// 1-indexed page number.
    #[param(minimum = 1, default = 1)]
    #[serde(default = "default_page")]
    pub page: i64,

    /// Items per page, capped at 100.
    #[param(minimum = 1, maximum = 100, default = 20)]
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PaginationParams {
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    /// The `(limit, offset)` pair in the order diesel queries want it.
    pub fn limit_offset(&self) -> (i64, i64) {
        (self.limit(), self.offset())
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl PaginationMeta {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            total,
            page,
            limit,
            total_pages: if total == 0 { 0 } else { (total + limit - 1) / limit },
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub data: Vec<T>,
    pub meta: PaginationMeta,
}

pub trait IntoPaginated<T: Serialize> {
    fn into_paginated(self, params: &PaginationParams, total: i64) -> PaginatedResponse<T>;
}

impl<T: Serialize> IntoPaginated<T> for Vec<T> {
    fn into_paginated(self, params: &PaginationParams, total: i64) -> PaginatedResponse<T> {
        PaginatedResponse {
            meta: PaginationMeta::new(params.page(), params.limit(), total),
            data: self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: i64, limit: i64) -> PaginationParams {
        PaginationParams { page, limit }
    }

    #[test]
    fn test_defaults_give_first_page_of_twenty() {
        let p = PaginationParams::default();
        assert_eq!(p.limit_offset(), (DEFAULT_LIMIT, 0));
    }

    #[test]
    fn test_out_of_range_input_is_clamped() {
        assert_eq!(params(0, 20).page(), 1);
        assert_eq!(params(-5, 20).page(), 1);
        assert_eq!(params(1, 500).limit(), MAX_LIMIT);
        assert_eq!(params(1, 0).limit(), 1);
        assert_eq!(params(-1, -1).offset(), 0);
    }

    #[test]
    fn test_offset_follows_page_and_limit() {
        assert_eq!(params(2, 20).offset(), 20);
        assert_eq!(params(3, 10).limit_offset(), (10, 20));
    }

    #[test]
    fn test_total_pages_rounds_up() {
        assert_eq!(PaginationMeta::new(1, 20, 100).total_pages, 5);
        assert_eq!(PaginationMeta::new(1, 20, 95).total_pages, 5);
        assert_eq!(PaginationMeta::new(1, 20, 1).total_pages, 1);
        assert_eq!(PaginationMeta::new(1, 20, 0).total_pages, 0);
    }

    #[test]
    fn test_into_paginated_carries_data_and_meta() {
        let page = vec!["a", "b", "c"].into_paginated(&params(1, 10), 25);
        assert_eq!(page.data.len(), 3);
        assert_eq!(page.meta.total, 25);
        assert_eq!(page.meta.total_pages, 3);
    }
}
