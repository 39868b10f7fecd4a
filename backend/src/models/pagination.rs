use serde::{Deserialize, Serialize};

const MAX_LIMIT: i64 = 100;
// Largest page whose offset still fits in an i64 at the maximum limit.
const MAX_PAGE: i64 = i64::MAX / MAX_LIMIT;

/// Raw `page`/`limit` query values. Kept as strings so garbage falls back to
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(page: Option<&str>, limit: Option<&str>, default_limit: i64) -> Self {
        let page = parse_int(page).unwrap_or(1).clamp(1, MAX_PAGE);
        let limit = parse_int(limit)
            .filter(|l| *l > 0)
            .unwrap_or(default_limit)
            .clamp(1, MAX_LIMIT);
        Self { page, limit }
    }

    pub fn from_params(params: &PageParams, default_limit: i64) -> Self {
        Self::new(params.page.as_deref(), params.limit.as_deref(), default_limit)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(total: i64, request: PageRequest) -> Self {
        Self {
            total,
            page: request.page,
            limit: request.limit,
            pages: (total + request.limit - 1) / request.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl HistoryParams {
    /// `(limit, offset)` with limit in 1..=100 (default 30) and offset >= 0.
    pub fn resolve(&self) -> (i64, i64) {
        let limit = parse_int(self.limit.as_deref())
            .filter(|l| *l > 0)
            .unwrap_or(30)
            .clamp(1, MAX_LIMIT);
        let offset = parse_int(self.offset.as_deref()).unwrap_or(0).max(0);
        (limit, offset)
    }
}

fn parse_int(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_defaults_and_clamps() {
        assert_eq!(PageRequest::new(None, None, 20), PageRequest { page: 1, limit: 20 });
        assert_eq!(PageRequest::new(Some("0"), Some("500"), 20), PageRequest { page: 1, limit: 100 });
        assert_eq!(PageRequest::new(Some("x"), Some("-3"), 20), PageRequest { page: 1, limit: 20 });
        assert_eq!(PageRequest::new(Some("3"), Some("10"), 20).offset(), 20);
    }

    #[test]
    fn test_huge_page_keeps_offset_in_range() {
        let request = PageRequest::new(Some("9223372036854775807"), Some("100"), 20);
        assert_eq!(request.page, MAX_PAGE);
        assert!(request.offset() > 0);
    }

    #[test]
    fn test_pagination_rounds_pages_up() {
        let request = PageRequest { page: 1, limit: 20 };
        assert_eq!(Pagination::new(0, request).pages, 0);
        assert_eq!(Pagination::new(20, request).pages, 1);
        assert_eq!(Pagination::new(21, request).pages, 2);
    }

    #[test]
    fn test_history_params_resolve() {
        assert_eq!(HistoryParams::default().resolve(), (30, 0));
        let params = HistoryParams { limit: Some("1000".into()), offset: Some("-5".into()) };
        assert_eq!(params.resolve(), (100, 0));
    }
}
