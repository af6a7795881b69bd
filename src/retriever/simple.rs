//! Paginated record retrieval

use super::cursor::Cursor;
use super::request_options::{NoRequestOptions, RequestOptions, RequestOptionsProvider};
use super::requester::Requester;
use crate::error::{Error, Result};
use crate::extract::RecordExtractor;
use crate::pagination::{NextPage, NoPaginator, PageResponse, PaginationState, Paginator};
use crate::slicer::StreamSlicer;
use crate::template::TemplateContext;
use crate::types::{JsonValue, RecordStream, StreamSlice};
use futures::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::debug;

/// Position within the pages of one slice
enum PageToken {
    First,
    Next(RequestOptions),
    Done,
}

/// Reads records page by page
///
/// For every page the request options of the paginator and of the options
/// provider are combined (duplicate parameters or headers are an error), the
/// request is sent, records are extracted and fed to the cursor, and the
/// paginator decides about the next page.
pub struct SimpleRetriever {
    requester: Arc<dyn Requester>,
    extractor: Arc<dyn RecordExtractor>,
    paginator: Arc<dyn Paginator>,
    request_options_provider: Arc<dyn RequestOptionsProvider>,
    cursor: Option<Arc<dyn Cursor>>,
    config: JsonValue,
    ignore_stream_slicer_parameters_on_paginated_requests: bool,
}

impl SimpleRetriever {
    pub fn new(
        requester: Arc<dyn Requester>,
        extractor: Arc<dyn RecordExtractor>,
        config: JsonValue,
    ) -> Self {
        Self {
            requester,
            extractor,
            paginator: Arc::new(NoPaginator),
            request_options_provider: Arc::new(NoRequestOptions),
            cursor: None,
            config,
            ignore_stream_slicer_parameters_on_paginated_requests: false,
        }
    }

    #[must_use]
    pub fn with_paginator(mut self, paginator: Arc<dyn Paginator>) -> Self {
        self.paginator = paginator;
        self
    }

    #[must_use]
    pub fn with_request_options_provider(mut self, provider: Arc<dyn RequestOptionsProvider>) -> Self {
        self.request_options_provider = provider;
        self
    }

    #[must_use]
    pub fn with_cursor(mut self, cursor: Arc<dyn Cursor>) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Only send slice-derived options on the first page of each slice
    #[must_use]
    pub fn ignore_stream_slicer_parameters_on_paginated_requests(mut self, ignore: bool) -> Self {
        self.ignore_stream_slicer_parameters_on_paginated_requests = ignore;
        self
    }

    /// Records of one slice, fetched one page at a time
    pub fn read_records(&self, stream_slice: StreamSlice) -> RecordStream<'_> {
        let initial = (stream_slice, PaginationState::new(), PageToken::First, 0usize);
        stream::try_unfold(initial, move |(slice, mut state, token, page)| async move {
            if matches!(token, PageToken::Done) {
                return Ok(None);
            }
            let (records, next) = self.fetch_page(&slice, token, &mut state, page).await?;
            Ok::<_, Error>(Some((records, (slice, state, next, page + 1))))
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
        .boxed()
    }

    /// Records of every slice of `slicer`, slice after slice
    pub fn read_all(&self, slicer: &dyn StreamSlicer) -> Result<RecordStream<'_>> {
        let slices = slicer.stream_slices()?;
        Ok(stream::iter(slices)
            .flat_map(move |slice| self.read_records(slice))
            .boxed())
    }

    pub fn cursor(&self) -> Option<&Arc<dyn Cursor>> {
        self.cursor.as_ref()
    }

    async fn fetch_page(
        &self,
        slice: &StreamSlice,
        token: PageToken,
        state: &mut PaginationState,
        page: usize,
    ) -> Result<(Vec<JsonValue>, PageToken)> {
        let first_page = matches!(token, PageToken::First);
        let pagination_options = match token {
            PageToken::Next(options) => options,
            _ => RequestOptions {
                params: self.paginator.initial_params(state),
                ..Default::default()
            },
        };
        let slice_options = if first_page || !self.ignore_stream_slicer_parameters_on_paginated_requests {
            self.request_options_provider.request_options(slice)?
        } else {
            RequestOptions::default()
        };
        let options = RequestOptions::combine([&pagination_options, &slice_options])?;

        let response = self
            .requester
            .send_request(&self.template_context(slice), &options)
            .await?;
        let records = self.extractor.extract_records(&response.body)?;
        debug!(slice = %slice, page, records = records.len(), "Fetched page");

        if let Some(cursor) = &self.cursor {
            for record in &records {
                cursor.observe(slice, record);
            }
        }

        // Non-JSON bodies (CSV, JSON Lines) paginate on headers and records only
        let body: JsonValue = serde_json::from_str(&response.body).unwrap_or_default();
        let next = match self
            .paginator
            .next_page(&PageResponse::new(&body, &response.headers, &records), state)
        {
            NextPage::Continue { query_params, url } => PageToken::Next(RequestOptions {
                params: query_params,
                url,
                ..Default::default()
            }),
            NextPage::Done => {
                if let Some(cursor) = &self.cursor {
                    cursor.close_slice(slice);
                }
                PageToken::Done
            }
        };

        Ok((records, next))
    }

    /// `config` and `stream_slice`, plus every extra field of the slice as a
    /// top-level variable (`download_target`, `creation_response`, ...)
    fn template_context(&self, slice: &StreamSlice) -> TemplateContext {
        slice.extra_fields.iter().fold(
            TemplateContext::new(&self.config).with_slice(slice),
            |ctx, (name, value)| ctx.with_var(name.as_str(), value.clone()),
        )
    }
}

impl std::fmt::Debug for SimpleRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleRetriever")
            .field("has_cursor", &self.cursor.is_some())
            .field(
                "ignore_stream_slicer_parameters_on_paginated_requests",
                &self.ignore_stream_slicer_parameters_on_paginated_requests,
            )
            .finish_non_exhaustive()
    }
}
