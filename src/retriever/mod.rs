//! Record retrieval module
//!
//! # Overview
//!
//! - [`SimpleRetriever`] - the synchronous-style read loop: request, extract,
//!   paginate, one slice after the other
//! - [`AsyncRetriever`] - records produced by remote bulk jobs, driven by the
//!   job orchestrator
//! - [`Requester`] / [`HttpRequester`] - templated HTTP requests
//! - [`RequestOptionsProvider`] - slice-derived parameters, headers and bodies
//! - [`Cursor`] / [`FieldCursor`] - incremental state from retrieved records

mod async_retriever;
mod cursor;
mod request_options;
mod requester;
mod simple;

pub use async_retriever::AsyncRetriever;
pub use cursor::{Cursor, FieldCursor};
pub use request_options::{
    combine_mappings, merge_json_bodies, NoRequestOptions, OptionType, RequestOptionInjection,
    RequestOptions, RequestOptionsProvider, SliceRequestOptionsProvider,
};
pub use requester::{HttpRequester, Requester, RequesterConfig};
pub use simple::SimpleRetriever;
