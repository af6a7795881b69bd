//! Pagination strategy implementations
//!
//! Each strategy handles a specific pagination pattern.

use super::types::{
    check_stop_condition, NextPage, PageParams, PageResponse, PaginationState, Paginator,
    StopCondition, StopResult,
};
use crate::extract::path::select_string;

// ============================================================================
// Cursor Pagination
// ============================================================================

/// Where the cursor token of the next page comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorSource {
    /// A path into the response body (e.g. `meta.next_cursor`)
    ResponsePath(String),
    /// A field of the last record of the page (e.g. `id` for Stripe)
    LastRecordField(String),
}

/// Cursor-based pagination (e.g., Stripe, Slack)
///
/// Common patterns:
/// - `?starting_after=obj_123`
/// - `?cursor=abc123`
#[derive(Debug, Clone)]
pub struct CursorPaginator {
    /// Query parameter name for cursor
    pub cursor_param: String,
    pub source: CursorSource,
    pub stop_condition: StopCondition,
}

impl CursorPaginator {
    /// Cursor read from a path into the response body
    pub fn new(
        cursor_param: impl Into<String>,
        cursor_path: impl Into<String>,
        stop_condition: StopCondition,
    ) -> Self {
        Self {
            cursor_param: cursor_param.into(),
            source: CursorSource::ResponsePath(cursor_path.into()),
            stop_condition,
        }
    }

    /// Cursor read from a field of the last record
    pub fn from_last_record(
        cursor_param: impl Into<String>,
        field: impl Into<String>,
        stop_condition: StopCondition,
    ) -> Self {
        Self {
            cursor_param: cursor_param.into(),
            source: CursorSource::LastRecordField(field.into()),
            stop_condition,
        }
    }

    fn cursor(&self, response: &PageResponse<'_>) -> Option<String> {
        match &self.source {
            CursorSource::ResponsePath(path) => select_string(response.body, path),
            CursorSource::LastRecordField(field) => {
                response.last_record.and_then(|r| select_string(r, field))
            }
        }
    }
}

impl Paginator for CursorPaginator {
    fn initial_params(&self, state: &PaginationState) -> PageParams {
        let mut params = PageParams::new();
        if let Some(cursor) = &state.cursor {
            params.insert(self.cursor_param.clone(), cursor.clone());
        }
        params
    }

    fn next_page(&self, response: &PageResponse<'_>, state: &mut PaginationState) -> NextPage {
        state.add_fetched(response.records_count as u64);

        if check_stop_condition(
            &self.stop_condition,
            response.body,
            response.records_count,
            state,
        ) == StopResult::Stop
        {
            state.mark_done();
            return NextPage::Done;
        }

        match self.cursor(response) {
            Some(cursor) if !cursor.is_empty() => {
                state.set_cursor(cursor.clone());
                NextPage::with_param(&self.cursor_param, cursor)
            }
            _ => {
                state.mark_done();
                NextPage::Done
            }
        }
    }
}

// ============================================================================
// Offset Pagination
// ============================================================================

/// Offset-based pagination (e.g., SQL-style pagination)
///
/// Common patterns:
/// - `?offset=100&limit=50`
/// - `?skip=100&take=50`
#[derive(Debug, Clone)]
pub struct OffsetPaginator {
    pub offset_param: String,
    pub limit_param: String,
    /// Number of records per page
    pub limit_value: u32,
    pub stop_condition: StopCondition,
}

impl OffsetPaginator {
    pub fn new(
        offset_param: impl Into<String>,
        limit_param: impl Into<String>,
        limit_value: u32,
        stop_condition: StopCondition,
    ) -> Self {
        Self {
            offset_param: offset_param.into(),
            limit_param: limit_param.into(),
            limit_value,
            stop_condition,
        }
    }

    fn params(&self, offset: u32) -> PageParams {
        PageParams::from([
            (self.offset_param.clone(), offset.to_string()),
            (self.limit_param.clone(), self.limit_value.to_string()),
        ])
    }
}

impl Paginator for OffsetPaginator {
    fn initial_params(&self, state: &PaginationState) -> PageParams {
        self.params(state.offset)
    }

    fn next_page(&self, response: &PageResponse<'_>, state: &mut PaginationState) -> NextPage {
        state.add_fetched(response.records_count as u64);

        if check_stop_condition(
            &self.stop_condition,
            response.body,
            response.records_count,
            state,
        ) == StopResult::Stop
        {
            state.mark_done();
            return NextPage::Done;
        }

        // A short page is the last one
        if response.records_count < self.limit_value as usize {
            state.mark_done();
            return NextPage::Done;
        }

        state.add_offset(self.limit_value);
        NextPage::with_params(self.params(state.offset))
    }
}

// ============================================================================
// Page Number Pagination
// ============================================================================

/// Page number pagination
///
/// Common patterns:
/// - `?page=2`
/// - `?page=2&per_page=50`
#[derive(Debug, Clone)]
pub struct PageNumberPaginator {
    pub page_param: String,
    /// First page number (usually 0 or 1)
    pub start_page: u32,
    pub page_size_param: Option<String>,
    pub page_size: Option<u32>,
    pub stop_condition: StopCondition,
}

impl PageNumberPaginator {
    pub fn new(page_param: impl Into<String>, start_page: u32) -> Self {
        Self {
            page_param: page_param.into(),
            start_page,
            page_size_param: None,
            page_size: None,
            stop_condition: StopCondition::EmptyPage,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, param: impl Into<String>, size: u32) -> Self {
        self.page_size_param = Some(param.into());
        self.page_size = Some(size);
        self
    }

    #[must_use]
    pub fn with_stop_condition(mut self, condition: StopCondition) -> Self {
        self.stop_condition = condition;
        self
    }

    fn params(&self, page: u32) -> PageParams {
        let mut params = PageParams::from([(self.page_param.clone(), page.to_string())]);
        if let (Some(param), Some(size)) = (&self.page_size_param, self.page_size) {
            params.insert(param.clone(), size.to_string());
        }
        params
    }
}

impl Paginator for PageNumberPaginator {
    fn initial_params(&self, state: &PaginationState) -> PageParams {
        self.params(state.page.max(self.start_page))
    }

    fn next_page(&self, response: &PageResponse<'_>, state: &mut PaginationState) -> NextPage {
        state.add_fetched(response.records_count as u64);
        if state.page < self.start_page {
            state.page = self.start_page;
        }

        if check_stop_condition(
            &self.stop_condition,
            response.body,
            response.records_count,
            state,
        ) == StopResult::Stop
        {
            state.mark_done();
            return NextPage::Done;
        }

        if let Some(size) = self.page_size {
            if response.records_count < size as usize {
                state.mark_done();
                return NextPage::Done;
            }
        }

        state.next_page();
        NextPage::with_params(self.params(state.page))
    }
}

// ============================================================================
// Link Header Pagination
// ============================================================================

/// Link header pagination (RFC 5988)
///
/// Common in GitHub, GitLab APIs.
/// Format: `Link: <https://api.github.com/...?page=2>; rel="next", ...`
#[derive(Debug, Clone)]
pub struct LinkHeaderPaginator {
    /// Rel value to follow (default: "next")
    pub rel: String,
}

impl Default for LinkHeaderPaginator {
    fn default() -> Self {
        Self::new("next")
    }
}

impl LinkHeaderPaginator {
    pub fn new(rel: impl Into<String>) -> Self {
        Self { rel: rel.into() }
    }
}

impl Paginator for LinkHeaderPaginator {
    fn initial_params(&self, _state: &PaginationState) -> PageParams {
        PageParams::new()
    }

    fn next_page(&self, response: &PageResponse<'_>, state: &mut PaginationState) -> NextPage {
        state.add_fetched(response.records_count as u64);

        let next_url = response
            .headers
            .get(reqwest::header::LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(|link| parse_link_header(link, &self.rel));

        match next_url {
            Some(url) => {
                state.next_page();
                NextPage::with_url(url)
            }
            None => {
                state.mark_done();
                NextPage::Done
            }
        }
    }
}

/// The URL of the link with the given rel
fn parse_link_header(header: &str, target_rel: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut segments = link.split(';').map(str::trim);
        let url = segments
            .next()?
            .strip_prefix('<')?
            .strip_suffix('>')?;
        segments
            .filter_map(|s| s.strip_prefix("rel="))
            .map(|rel| rel.trim_matches(|c| c == '"' || c == '\''))
            .any(|rel| rel.split_whitespace().any(|r| r == target_rel))
            .then(|| url.to_string())
    })
}

// ============================================================================
// Next URL Pagination
// ============================================================================

/// Next URL in a field of the response body
///
/// Common patterns:
/// - `{ "next": "https://api.example.com/items?page=2" }`
/// - `{ "pagination": { "next_url": "..." } }`
#[derive(Debug, Clone)]
pub struct NextUrlPaginator {
    pub path: String,
}

impl NextUrlPaginator {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Paginator for NextUrlPaginator {
    fn initial_params(&self, _state: &PaginationState) -> PageParams {
        PageParams::new()
    }

    fn next_page(&self, response: &PageResponse<'_>, state: &mut PaginationState) -> NextPage {
        state.add_fetched(response.records_count as u64);

        match select_string(response.body, &self.path) {
            Some(next_url) if !next_url.is_empty() => {
                state.next_page();
                NextPage::with_url(next_url)
            }
            _ => {
                state.mark_done();
                NextPage::Done
            }
        }
    }
}

// ============================================================================
// No Pagination
// ============================================================================

/// Single request per slice
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPaginator;

impl Paginator for NoPaginator {
    fn initial_params(&self, _state: &PaginationState) -> PageParams {
        PageParams::new()
    }

    fn next_page(&self, response: &PageResponse<'_>, state: &mut PaginationState) -> NextPage {
        state.add_fetched(response.records_count as u64);
        state.mark_done();
        NextPage::Done
    }
}
