//! Pagination, sorting, and bounds checks for account listings.
//!
//! Raw query values are kept as strings so that non-numeric input is
//! reported as a query error instead of a deserialization failure.

use serde::Deserialize;
use thiserror::Error;

/// Page size used when none is given.
pub const DEFAULT_PER_PAGE: u32 = 30;
/// Largest accepted page size.
pub const MAX_PER_PAGE: u32 = 60;

/// Invalid listing parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// Page is not a positive integer.
    #[error("The requested page is invalid")]
    InvalidPage,

    /// Page size is outside `1..=MAX_PER_PAGE`.
    #[error("Cannot list that many users at once")]
    InvalidPerPage,

    /// Sort field is not sortable.
    #[error("'{0}' is not a sortable attribute")]
    UnsortableField(String),

    /// Direction is neither ascending nor descending.
    #[error("Order can only be ascending or descending")]
    InvalidDirection,

    /// Page lies beyond the last page.
    #[error("Page {0} is out of bounds")]
    PageOutOfRange(u32),
}

/// Raw listing query (`?page=&perPage=&orderBy=&order=`).
///
/// Unknown query keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    /// Requested page, 1-based.
    #[serde(default)]
    pub page: Option<String>,
    /// Entries per page.
    #[serde(default)]
    pub per_page: Option<String>,
    /// Sort field.
    #[serde(default)]
    pub order_by: Option<String>,
    /// Sort direction.
    #[serde(default)]
    pub order: Option<String>,
}

/// Sortable account attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortField {
    /// Display name.
    #[default]
    Name,
    /// Login email.
    Email,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// Validated listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Page, 1-based.
    pub page: u32,
    /// Entries per page.
    pub per_page: u32,
    /// Sort field.
    pub order_by: SortField,
    /// Sort direction.
    pub direction: SortDirection,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            order_by: SortField::default(),
            direction: SortDirection::default(),
        }
    }
}

/// Treat empty strings like absent values.
fn present(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl PageParams {
    /// Validate the raw parameters.
    ///
    /// # Errors
    ///
    /// Returns the first `QueryError` encountered, checking page, sort
    /// field, direction, then page size.
    pub fn parse(&self) -> Result<PageRequest, QueryError> {
        let page = match present(self.page.as_ref()) {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or(QueryError::InvalidPage)?,
            None => 1,
        };

        let order_by = match present(self.order_by.as_ref()) {
            Some("name") | None => SortField::Name,
            Some("email") => SortField::Email,
            Some(other) => return Err(QueryError::UnsortableField(other.to_string())),
        };

        let direction = match present(self.order.as_ref()) {
            None => SortDirection::Asc,
            Some(raw) if raw.eq_ignore_ascii_case("asc") => SortDirection::Asc,
            Some(raw) if raw.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            Some(_) => return Err(QueryError::InvalidDirection),
        };

        let per_page = match present(self.per_page.as_ref()) {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| (1..=MAX_PER_PAGE).contains(n))
                .ok_or(QueryError::InvalidPerPage)?,
            None => DEFAULT_PER_PAGE,
        };

        Ok(PageRequest {
            page,
            per_page,
            order_by,
            direction,
        })
    }
}

impl PageRequest {
    /// Number of entries skipped before this page.
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.per_page as usize
    }

    /// Last valid page for `count` entries. An empty listing has one page.
    #[must_use]
    pub fn last_page(&self, count: usize) -> u32 {
        let pages = count.div_ceil(self.per_page as usize).max(1);
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    /// Reject pages past the last one.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::PageOutOfRange` if the page lies beyond `count`.
    pub fn check_bounds(&self, count: usize) -> Result<(), QueryError> {
        if self.page > self.last_page(count) {
            return Err(QueryError::PageOutOfRange(self.page));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(
        page: Option<&str>,
        per_page: Option<&str>,
        order_by: Option<&str>,
        order: Option<&str>,
    ) -> PageParams {
        PageParams {
            page: page.map(String::from),
            per_page: per_page.map(String::from),
            order_by: order_by.map(String::from),
            order: order.map(String::from),
        }
    }

    #[test]
    fn test_defaults() {
        let request = PageParams::default().parse().unwrap();
        assert_eq!(request, PageRequest::default());
        assert_eq!(request.offset(), 0);
    }

    #[test]
    fn test_valid_request() {
        let request = params(Some("3"), Some("10"), Some("email"), Some("DESC"))
            .parse()
            .unwrap();
        assert_eq!(request.page, 3);
        assert_eq!(request.per_page, 10);
        assert_eq!(request.order_by, SortField::Email);
        assert_eq!(request.direction, SortDirection::Desc);
        assert_eq!(request.offset(), 20);
    }

    #[test]
    fn test_invalid_parameters() {
        let cases = [
            (params(Some("0"), None, None, None), QueryError::InvalidPage),
            (params(Some("abc"), None, None, None), QueryError::InvalidPage),
            (params(Some("-1"), None, None, None), QueryError::InvalidPage),
            (params(None, Some("61"), None, None), QueryError::InvalidPerPage),
            (params(None, Some("0"), None, None), QueryError::InvalidPerPage),
            (params(None, Some("ten"), None, None), QueryError::InvalidPerPage),
            (
                params(None, None, Some("password"), None),
                QueryError::UnsortableField("password".to_string()),
            ),
            (params(None, None, None, Some("up")), QueryError::InvalidDirection),
        ];

        for (params, expected) in cases {
            assert_eq!(params.parse(), Err(expected));
        }
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let request = params(Some(""), Some(" "), Some(""), Some("")).parse().unwrap();
        assert_eq!(request, PageRequest::default());
    }

    #[test]
    fn test_bounds() {
        let request = params(Some("2"), Some("30"), None, None).parse().unwrap();
        assert_eq!(request.last_page(45), 2);
        assert!(request.check_bounds(45).is_ok());
        assert_eq!(
            request.check_bounds(30),
            Err(QueryError::PageOutOfRange(2))
        );

        let first = PageRequest::default();
        assert!(first.check_bounds(0).is_ok());
    }
}
