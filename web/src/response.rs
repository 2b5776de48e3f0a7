//! Success response envelopes.
//!
//! Every endpoint answers with the same shape: a `success` flag, a short
//! message and the payload under `data`. List endpoints add a `pagination`
//! block.

use serde::Serialize;

/// Standard success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Always `true` for this envelope; failures use `ApiError`.
    pub success: bool,
    /// Short human-readable outcome.
    pub message: String,
    /// The payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap a payload with a message.
    #[must_use]
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// A success with no payload (deletes, acks).
    #[must_use]
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Pagination metadata for list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    /// 1-indexed page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Total matching rows.
    pub total: i64,
    /// Number of pages at this limit.
    pub total_pages: u32,
}

impl Pagination {
    /// Compute pagination metadata from a page request and a total count.
    #[must_use]
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            ((total.max(0) as u64).div_ceil(u64::from(limit))) as u32
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

/// Success envelope for paginated lists.
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T: Serialize> {
    /// Always `true` for this envelope.
    pub success: bool,
    /// Short human-readable outcome.
    pub message: String,
    /// The page of results.
    pub data: Vec<T>,
    /// Page metadata.
    pub pagination: Pagination,
}

impl<T: Serialize> PaginatedResponse<T> {
    /// Wrap a page of results.
    #[must_use]
    pub fn ok(message: impl Into<String>, data: Vec<T>, pagination: Pagination) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_rounds_pages_up() {
        let p = Pagination::new(1, 20, 45);
        assert_eq!(p.total_pages, 3);
    }

    #[test]
    fn pagination_handles_empty_result() {
        let p = Pagination::new(1, 20, 0);
        assert_eq!(p.total_pages, 0);
    }

    #[test]
    fn envelope_omits_missing_data() {
        let body = serde_json::to_string(&ApiResponse::<()>::message_only("done")).unwrap();
        assert!(!body.contains("data"));
    }
}
