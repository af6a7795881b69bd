//! Templated HTTP requests

use super::request_options::RequestOptions;
use crate::error::Result;
use crate::http::{HttpClient, HttpRequest, HttpResponse};
use crate::template::{render, render_value, TemplateContext};
use crate::types::{JsonValue, Method};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Sends one request per call
#[async_trait]
pub trait Requester: Send + Sync {
    /// Render the request against `ctx`, add `options` and send it
    async fn send_request(
        &self,
        ctx: &TemplateContext,
        options: &RequestOptions,
    ) -> Result<HttpResponse>;
}

/// Requester definition as written in a stream definition
///
/// Every string (path, header and parameter values, body strings) may contain
/// `{{ ... }}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RequesterConfig {
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<JsonValue>,
}

impl RequesterConfig {
    pub fn build(&self, client: HttpClient) -> HttpRequester {
        HttpRequester {
            client,
            config: self.clone(),
        }
    }
}

/// [`Requester`] over the crate's HTTP client
#[derive(Debug, Clone)]
pub struct HttpRequester {
    client: HttpClient,
    config: RequesterConfig,
}

impl HttpRequester {
    pub fn new(client: HttpClient, path: impl Into<String>, method: Method) -> Self {
        Self {
            client,
            config: RequesterConfig {
                path: path.into(),
                method,
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: JsonValue) -> Self {
        self.config.body = Some(body);
        self
    }

    /// The requester's own options, rendered
    fn own_options(&self, ctx: &TemplateContext) -> Result<RequestOptions> {
        let render_all = |mapping: &BTreeMap<String, String>| -> Result<BTreeMap<String, String>> {
            let mut rendered = BTreeMap::new();
            for (key, value) in mapping {
                let value = render(value, ctx)?;
                // Empty values (e.g. an unset optional config field) are left out
                if !value.is_empty() {
                    rendered.insert(key.clone(), value);
                }
            }
            Ok(rendered)
        };

        Ok(RequestOptions {
            params: render_all(&self.config.params)?,
            headers: render_all(&self.config.headers)?,
            body: self
                .config
                .body
                .as_ref()
                .map(|body| render_value(body, ctx))
                .transpose()?,
            url: None,
        })
    }
}

#[async_trait]
impl Requester for HttpRequester {
    async fn send_request(
        &self,
        ctx: &TemplateContext,
        options: &RequestOptions,
    ) -> Result<HttpResponse> {
        let options = RequestOptions::combine([&self.own_options(ctx)?, options])?;
        let url = match options.url {
            Some(url) => url,
            None => render(&self.config.path, ctx)?,
        };

        let request = HttpRequest {
            method: self.config.method,
            url,
            headers: options.headers,
            query: options.params,
            body: options.body,
        };
        debug!(method = ?request.method, url = %request.url, "Sending request");
        self.client.send(&request).await
    }
}
