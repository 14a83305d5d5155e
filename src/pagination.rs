//! Position-based pagination metadata
//!
//! JMAP `*/query` calls page by `position` and `limit`. This module derives
//! the metadata every listing tool reports alongside its page of results.

use serde::Serialize;

use crate::jmap::QueryResponse;

/// Pagination metadata reported with a query page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Total matching records (0 when the server did not report a total)
    pub total: u64,
    /// Zero-based index of the first returned record
    pub position: u64,
    /// Opaque query state token for `*/queryChanges`
    pub query_state: Option<String>,
    /// Whether the server can calculate changes for this query
    pub can_calculate_changes: bool,
    /// Whether records remain after this page
    pub has_more: bool,
}

impl PageInfo {
    /// Build page metadata from a query response
    pub fn from_query(response: &QueryResponse) -> Self {
        Self {
            total: response.total.unwrap_or(0),
            position: response.position,
            query_state: response.query_state.clone(),
            can_calculate_changes: response.can_calculate_changes,
            has_more: has_more(response.position, response.ids.len(), response.total),
        }
    }
}

/// Whether records remain after a page
///
/// True iff `position + returned < total`; a missing total counts as 0.
pub fn has_more(position: u64, returned: usize, total: Option<u64>) -> bool {
    let consumed = position.saturating_add(returned as u64);
    consumed < total.unwrap_or(0)
}
