//! Pagination module
//!
//! Supports: Cursor, Offset, Page Number, Link Header, Next URL
//!
//! # Overview
//!
//! Each strategy inspects a fetched page (body, headers, record count and last
//! record) and produces the parameters or URL of the next page, or `Done`.
//! Pagination state is per slice; the retriever starts a fresh state for
//! every slice.

mod strategies;
mod types;

pub use strategies::{
    CursorPaginator, CursorSource, LinkHeaderPaginator, NextUrlPaginator, NoPaginator,
    OffsetPaginator, PageNumberPaginator,
};
pub use types::{
    check_stop_condition, NextPage, PageParams, PageResponse, PaginationState, Paginator,
    PaginatorConfig, StopCondition, StopResult,
};

#[cfg(test)]
mod tests;
