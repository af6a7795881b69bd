//! Pagination types and traits
//!
//! Defines the core pagination abstractions used by all strategies.

use super::strategies::{
    CursorPaginator, LinkHeaderPaginator, NextUrlPaginator, NoPaginator, OffsetPaginator,
    PageNumberPaginator,
};
use crate::error::{Error, Result};
use crate::extract::path::{select, select_string};
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Request parameters produced by a paginator
pub type PageParams = BTreeMap<String, String>;

/// Result of the next page computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextPage {
    /// More pages available with these parameters
    Continue {
        /// Query parameters to add/replace
        query_params: PageParams,
        /// Optional new URL (for next_url pagination)
        url: Option<String>,
    },
    /// No more pages
    Done,
}

impl NextPage {
    pub fn with_params(params: PageParams) -> Self {
        Self::Continue {
            query_params: params,
            url: None,
        }
    }

    pub fn with_param(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_params(PageParams::from([(key.into(), value.into())]))
    }

    pub fn with_url(url: impl Into<String>) -> Self {
        Self::Continue {
            query_params: PageParams::new(),
            url: Some(url.into()),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue { .. })
    }
}

/// What a paginator sees of a fetched page
#[derive(Debug, Clone, Copy)]
pub struct PageResponse<'a> {
    /// Parsed body (`Null` when the body is not JSON)
    pub body: &'a Value,
    pub headers: &'a HeaderMap,
    /// Number of records extracted from the page
    pub records_count: usize,
    /// Last record of the page, if any
    pub last_record: Option<&'a Value>,
}

impl<'a> PageResponse<'a> {
    pub fn new(body: &'a Value, headers: &'a HeaderMap, records: &'a [Value]) -> Self {
        Self {
            body,
            headers,
            records_count: records.len(),
            last_record: records.last(),
        }
    }
}

/// Paginator configuration as written in a stream definition
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaginatorConfig {
    /// No pagination
    #[default]
    None,

    /// Cursor-based pagination (e.g., Stripe)
    ///
    /// The token is read from `cursor_path` in the body, or from
    /// `last_record_field` of the last record of the page.
    Cursor {
        cursor_param: String,
        #[serde(default)]
        cursor_path: Option<String>,
        #[serde(default)]
        last_record_field: Option<String>,
        #[serde(default)]
        stop_condition: StopCondition,
    },

    /// Offset-based pagination
    Offset {
        #[serde(default = "default_offset_param")]
        offset_param: String,
        #[serde(default = "default_limit_param")]
        limit_param: String,
        limit_value: u32,
        #[serde(default)]
        stop_condition: StopCondition,
    },

    /// Page number pagination
    PageNumber {
        #[serde(default = "default_page_param")]
        page_param: String,
        #[serde(default = "default_start_page")]
        start_page: u32,
        #[serde(default)]
        page_size_param: Option<String>,
        #[serde(default)]
        page_size: Option<u32>,
        #[serde(default)]
        stop_condition: StopCondition,
    },

    /// Link header pagination (RFC 5988)
    LinkHeader {
        #[serde(default = "default_rel")]
        rel: String,
    },

    /// Next URL in response body
    NextUrl { path: String },
}

fn default_offset_param() -> String {
    "offset".to_string()
}

fn default_limit_param() -> String {
    "limit".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}

fn default_start_page() -> u32 {
    1
}

fn default_rel() -> String {
    "next".to_string()
}

impl PaginatorConfig {
    /// Build the configured paginator
    pub fn build(&self) -> Result<Box<dyn Paginator>> {
        Ok(match self {
            Self::None => Box::new(NoPaginator),
            Self::Cursor {
                cursor_param,
                cursor_path,
                last_record_field,
                stop_condition,
            } => match (cursor_path, last_record_field) {
                (Some(path), None) => Box::new(CursorPaginator::new(
                    cursor_param.as_str(),
                    path.as_str(),
                    stop_condition.clone(),
                )),
                (None, Some(field)) => Box::new(CursorPaginator::from_last_record(
                    cursor_param.as_str(),
                    field.as_str(),
                    stop_condition.clone(),
                )),
                _ => {
                    return Err(Error::invalid_value(
                        "paginator",
                        "cursor pagination needs exactly one of cursor_path or last_record_field",
                    ))
                }
            },
            Self::Offset {
                offset_param,
                limit_param,
                limit_value,
                stop_condition,
            } => {
                if *limit_value == 0 {
                    return Err(Error::invalid_value(
                        "paginator.limit_value",
                        "must be greater than 0",
                    ));
                }
                Box::new(OffsetPaginator::new(
                    offset_param.as_str(),
                    limit_param.as_str(),
                    *limit_value,
                    stop_condition.clone(),
                ))
            }
            Self::PageNumber {
                page_param,
                start_page,
                page_size_param,
                page_size,
                stop_condition,
            } => {
                let mut paginator = PageNumberPaginator::new(page_param.as_str(), *start_page)
                    .with_stop_condition(stop_condition.clone());
                if let (Some(param), Some(size)) = (page_size_param, page_size) {
                    paginator = paginator.with_page_size(param.as_str(), *size);
                }
                Box::new(paginator)
            }
            Self::LinkHeader { rel } => Box::new(LinkHeaderPaginator::new(rel.as_str())),
            Self::NextUrl { path } => Box::new(NextUrlPaginator::new(path.as_str())),
        })
    }
}

/// Stop conditions for pagination
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StopCondition {
    /// Stop when page is empty (no records)
    #[default]
    EmptyPage,

    /// Stop when a field has a specific value
    Field { path: String, value: Value },

    /// Stop when offset reaches total count
    TotalCount { path: String },

    /// Stop when page number reaches total pages
    TotalPages { path: String },
}

impl StopCondition {
    pub fn field(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Field {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn total_count(path: impl Into<String>) -> Self {
        Self::TotalCount { path: path.into() }
    }

    pub fn total_pages(path: impl Into<String>) -> Self {
        Self::TotalPages { path: path.into() }
    }
}

/// Result of checking a stop condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopResult {
    Continue,
    Stop,
}

impl StopResult {
    pub fn should_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    pub fn should_stop(&self) -> bool {
        matches!(self, Self::Stop)
    }
}

/// Tracks pagination state during iteration over one slice
#[derive(Debug, Clone, Default)]
pub struct PaginationState {
    /// Current page number (for page-based pagination)
    pub page: u32,
    /// Current offset (for offset-based pagination)
    pub offset: u32,
    /// Current cursor value
    pub cursor: Option<String>,
    /// Total records fetched so far
    pub total_fetched: u64,
    pub done: bool,
}

impl PaginationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(page: u32) -> Self {
        Self {
            page,
            ..Default::default()
        }
    }

    pub fn mark_done(&mut self) {
        self.done = true;
    }

    pub fn next_page(&mut self) {
        self.page += 1;
    }

    pub fn add_offset(&mut self, amount: u32) {
        self.offset += amount;
    }

    pub fn set_cursor(&mut self, cursor: String) {
        self.cursor = Some(cursor);
    }

    pub fn add_fetched(&mut self, count: u64) {
        self.total_fetched += count;
    }
}

/// Core trait for pagination strategies
pub trait Paginator: Send + Sync {
    /// Query parameters for the first request of a slice
    fn initial_params(&self, state: &PaginationState) -> PageParams;

    /// Inspect a page and decide whether (and how) to fetch the next one
    fn next_page(&self, response: &PageResponse<'_>, state: &mut PaginationState) -> NextPage;
}

/// Check a stop condition against a response
pub fn check_stop_condition(
    condition: &StopCondition,
    body: &Value,
    records_count: usize,
    state: &PaginationState,
) -> StopResult {
    let stop = match condition {
        StopCondition::EmptyPage => records_count == 0,
        StopCondition::Field { path, value } => select(body, path) == Some(value),
        StopCondition::TotalCount { path } => select_string(body, path)
            .and_then(|s| s.parse::<u64>().ok())
            .is_some_and(|total| state.total_fetched >= total),
        StopCondition::TotalPages { path } => select_string(body, path)
            .and_then(|s| s.parse::<u32>().ok())
            .is_some_and(|total_pages| state.page >= total_pages),
    };

    if stop {
        StopResult::Stop
    } else {
        StopResult::Continue
    }
}
