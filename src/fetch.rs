//! Paginated resource extraction.

use std::pin::Pin;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::REQUEST_TIMEOUT;
use crate::model::EndpointSpec;
use crate::store::Secret;

/// Base URL of the Fortnox REST API.
pub const FORTNOX_API_BASE_URL: &str = "https://api.fortnox.se";

/// Error type for paginated fetching.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A page request was rejected. Fatal for this endpoint only; other
    /// endpoints' fetches are unaffected.
    #[error("endpoint {endpoint} returned {status}: {body}")]
    Http {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// The response body has no record list at the configured selector.
    #[error("endpoint {endpoint}: no record list at `{selector}`")]
    MissingSelector { endpoint: String, selector: String },

    /// Connection or timeout failure.
    #[error("network error while fetching: {0}")]
    Network(#[from] reqwest::Error),

    /// Base URL and endpoint path do not combine into a valid URL.
    #[error("invalid request URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Streams records from offset-paginated collections.
///
/// Each [`EndpointSpec`] is walked independently. The fetcher is cheap to
/// clone, and distinct endpoints may be drained concurrently; they share
/// nothing but the read-only access token.
#[derive(Clone)]
pub struct ResourceFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl ResourceFetcher {
    /// Fetcher against the production API, [`FORTNOX_API_BASE_URL`].
    pub fn new() -> Self {
        Self::with_base_url(FORTNOX_API_BASE_URL)
    }

    /// Fetcher against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn page_url(&self, endpoint: &EndpointSpec) -> Result<Url, FetchError> {
        let joined = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint.path);
        Ok(Url::parse(&joined)?)
    }

    /// Lazily stream every record of `endpoint`.
    ///
    /// Issues GET requests starting at offset 0 and advancing by the page
    /// size, until a page comes back with fewer records than the page size
    /// (an empty page included). The stream is finite and forward-only;
    /// dropping it early stops paging, and exhausted streams cannot be
    /// restarted. The bearer token is fixed for the whole walk.
    pub fn fetch<'a>(
        &'a self,
        endpoint: &'a EndpointSpec,
        access_token: &'a Secret,
    ) -> Pin<Box<dyn Stream<Item = Result<Value, FetchError>> + Send + 'a>> {
        Box::pin(stream! {
            let url = match self.page_url(endpoint) {
                Ok(url) => url,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            let page_size = endpoint.pagination.page_size as usize;
            let mut offset: u64 = 0;
            let mut total: u64 = 0;

            tracing::info!(endpoint = %endpoint.name, "starting paginated fetch");

            loop {
                let response = match self
                    .client
                    .get(url.clone())
                    .query(&[
                        (
                            endpoint.pagination.limit_param.as_str(),
                            endpoint.pagination.page_size.to_string(),
                        ),
                        (
                            endpoint.pagination.offset_param.as_str(),
                            offset.to_string(),
                        ),
                    ])
                    .bearer_auth(access_token.expose())
                    .header(reqwest::header::ACCEPT, "application/json")
                    .timeout(REQUEST_TIMEOUT)
                    .send()
                    .await
                {
                    Ok(response) => response,
                    Err(e) => {
                        yield Err(FetchError::Network(e));
                        return;
                    }
                };

                let status = response.status();
                if !status.is_success() {
                    let body = response.text().await.unwrap_or_default();
                    tracing::error!(
                        endpoint = %endpoint.name,
                        status = status.as_u16(),
                        "page request rejected"
                    );
                    yield Err(FetchError::Http {
                        endpoint: endpoint.name.clone(),
                        status: status.as_u16(),
                        body,
                    });
                    return;
                }

                let body: Value = match response.json().await {
                    Ok(body) => body,
                    Err(e) => {
                        yield Err(FetchError::Network(e));
                        return;
                    }
                };

                let records = match select_records(body, &endpoint.data_selector) {
                    Some(records) => records,
                    None => {
                        yield Err(FetchError::MissingSelector {
                            endpoint: endpoint.name.clone(),
                            selector: endpoint.data_selector.clone(),
                        });
                        return;
                    }
                };

                let count = records.len();
                total += count as u64;
                tracing::debug!(endpoint = %endpoint.name, offset, count, "page received");

                for record in records {
                    yield Ok(record);
                }

                if count < page_size {
                    break;
                }
                offset += page_size as u64;
            }

            tracing::info!(endpoint = %endpoint.name, total, "fetch complete");
        })
    }

    /// Drain `endpoint` into memory. Convenience for small collections and
    /// tests; large collections should consume [`fetch`](Self::fetch)
    /// directly.
    pub async fn fetch_all(
        &self,
        endpoint: &EndpointSpec,
        access_token: &Secret,
    ) -> Result<Vec<Value>, FetchError> {
        let mut stream = self.fetch(endpoint, access_token);
        let mut records = Vec::new();
        while let Some(item) = stream.next().await {
            records.push(item?);
        }
        Ok(records)
    }
}

impl Default for ResourceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Descend a `.`-separated selector path and take the record array.
fn select_records(body: Value, selector: &str) -> Option<Vec<Value>> {
    let mut node = body;
    for segment in selector.split('.') {
        node = match node {
            Value::Object(mut map) => map.remove(segment)?,
            _ => return None,
        };
    }
    match node {
        Value::Array(records) => Some(records),
        _ => None,
    }
}
