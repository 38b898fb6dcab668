//! Pagination, search and whitelisted sorting shared by list endpoints

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;
/// Deeper pages are clamped; no listing comes close
pub const MAX_PAGE: i64 = 1_000_000;

/// Common list query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl ListParams {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.limit, MAX_LIMIT)
    }

    /// Trimmed search term, `None` when blank
    pub fn search_term(&self) -> Option<String> {
        search_term(self.search.as_deref())
    }

    pub fn sort_by(&self, whitelist: &SortWhitelist) -> SortSpec {
        whitelist.resolve(self.sort.as_deref(), self.order.as_deref())
    }
}

pub fn search_term(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// ILIKE pattern for a substring search
pub fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    /// Clamp page to 1..=MAX_PAGE and limit to 1..=max
    pub fn new(page: Option<i64>, limit: Option<i64>, max_limit: i64) -> Self {
        Self {
            page: page.unwrap_or(1).clamp(1, MAX_PAGE),
            limit: limit.unwrap_or(DEFAULT_LIMIT).clamp(1, max_limit),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: i64) -> i64 {
        (total + self.limit - 1) / self.limit
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(raw: Option<&str>, default: SortDirection) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()) {
            Some(r) if r == "asc" => SortDirection::Asc,
            Some(r) if r == "desc" => SortDirection::Desc,
            _ => default,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Public sort keys mapped to SQL expressions; nothing outside the map reaches a query
#[derive(Debug, Clone, Copy)]
pub struct SortWhitelist {
    pub columns: &'static [(&'static str, &'static str)],
    pub default_column: &'static str,
    pub default_direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: &'static str,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn order_by(&self) -> String {
        format!(" ORDER BY {} {}", self.column, self.direction.as_sql())
    }
}

impl SortWhitelist {
    pub fn resolve(&self, sort: Option<&str>, order: Option<&str>) -> SortSpec {
        let column = sort
            .map(str::trim)
            .and_then(|key| self.columns.iter().find(|(k, _)| *k == key))
            .map(|(_, column)| *column)
            .unwrap_or(self.default_column);

        SortSpec {
            column,
            direction: SortDirection::parse(order, self.default_direction),
        }
    }
}

/// Paginated list envelope
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub success: bool,
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            success: true,
            data,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages: pagination.total_pages(total),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRODUCT_SORT: SortWhitelist = SortWhitelist {
        columns: &[("name", "p.name"), ("price", "p.price"), ("created_at", "p.created_at")],
        default_column: "p.created_at",
        default_direction: SortDirection::Desc,
    };

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination::new(Some(0), Some(1000), MAX_LIMIT);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, 100);
        assert_eq!(p.offset(), 0);

        let p = Pagination::new(Some(3), Some(-5), MAX_LIMIT);
        assert_eq!(p.limit, 1);
        assert_eq!(p.offset(), 2);

        let p = Pagination::new(None, None, MAX_LIMIT);
        assert_eq!((p.page, p.limit), (1, DEFAULT_LIMIT));
    }

    #[test]
    fn test_huge_page_is_clamped() {
        let p = Pagination::new(Some(i64::MAX), Some(100), MAX_LIMIT);
        assert_eq!(p.page, MAX_PAGE);
        assert_eq!(p.offset(), (MAX_PAGE - 1) * 100);
        assert!(p.offset() > 0);
    }

    #[test]
    fn test_total_pages() {
        let p = Pagination::new(Some(1), Some(10), MAX_LIMIT);
        assert_eq!(p.total_pages(0), 0);
        assert_eq!(p.total_pages(10), 1);
        assert_eq!(p.total_pages(11), 2);
    }

    #[test]
    fn test_sort_whitelist_rejects_unknown_columns() {
        let spec = PRODUCT_SORT.resolve(Some("price; DROP TABLE products"), Some("asc"));
        assert_eq!(spec.column, "p.created_at");
        assert_eq!(spec.direction, SortDirection::Asc);

        let spec = PRODUCT_SORT.resolve(Some("price"), Some("sideways"));
        assert_eq!(spec.column, "p.price");
        assert_eq!(spec.direction, SortDirection::Desc);
        assert_eq!(spec.order_by(), " ORDER BY p.price DESC");
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(search_term(Some("   ")), None);
        assert_eq!(search_term(Some(" latte ")), Some("latte".to_string()));
    }
}
