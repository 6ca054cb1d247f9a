//! Domain types for the Fortnox extraction core.
//!
//! This module defines:
//! - [`Credentials`] - OAuth2 client credentials plus the current refresh token
//! - [`TokenPair`] - The outcome of one successful token exchange
//! - [`EndpointSpec`] / [`Pagination`] - Static declaration of a paginated resource

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Secret;

/// OAuth2 client credentials plus the caller's current refresh token.
///
/// `client_id` and `client_secret` are fixed for the process lifetime; the
/// refresh token is replaced whenever the server rotates it.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: Secret,
    pub refresh_token: Secret,
}

impl Credentials {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret),
            refresh_token: Secret::new(refresh_token),
        }
    }

    /// Copy of these credentials carrying a different refresh token.
    pub fn with_refresh_token(mut self, refresh_token: Secret) -> Self {
        self.refresh_token = refresh_token;
        self
    }
}

/// The outcome of one successful token exchange.
///
/// Ephemeral: lives for one run, and only the refresh token ever reaches
/// storage.
#[derive(Debug, Clone)]
pub struct TokenPair {
    /// Short-lived bearer credential for API requests.
    pub access_token: Secret,

    /// The refresh token to use next time: the server's new value when it
    /// rotated, otherwise the one that was sent.
    pub refresh_token: Secret,

    /// Access-token lifetime in seconds, when the server reports it.
    pub expires_in: Option<u64>,

    /// Absolute expiry instant derived from `expires_in` at exchange time.
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    /// Whether the server rotated the refresh token relative to `previous`.
    ///
    /// Plain string inequality; no other heuristic.
    pub fn rotated_from(&self, previous: &Secret) -> bool {
        self.refresh_token.expose() != previous.expose()
    }
}

/// Offset pagination parameters for one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    /// Records requested per page; a shorter page signals end-of-data.
    pub page_size: u32,

    /// Query parameter carrying the current offset.
    pub offset_param: String,

    /// Query parameter carrying the page size.
    pub limit_param: String,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_size: 100,
            offset_param: "offset".to_string(),
            limit_param: "limit".to_string(),
        }
    }
}

/// Static declaration of one paginated Fortnox resource.
///
/// Immutable per resource; tells [`ResourceFetcher`] how to walk the
/// collection to completion.
///
/// [`ResourceFetcher`]: crate::fetch::ResourceFetcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Resource name, used for logging and downstream table naming.
    pub name: String,

    /// Field the downstream merge write keys on.
    pub primary_key: String,

    /// Path under the API base URL, e.g. `/3/invoices`.
    pub path: String,

    pub pagination: Pagination,

    /// `.`-separated path to the record list inside the response body.
    pub data_selector: String,
}

impl EndpointSpec {
    /// Declare an endpoint with default pagination (100 records per page,
    /// `limit`/`offset` parameters).
    pub fn new(
        name: impl Into<String>,
        primary_key: impl Into<String>,
        path: impl Into<String>,
        data_selector: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            primary_key: primary_key.into(),
            path: path.into(),
            pagination: Pagination::default(),
            data_selector: data_selector.into(),
        }
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    /// The Fortnox invoice collection.
    pub fn invoices() -> Self {
        Self::new("invoices", "DocumentNumber", "/3/invoices", "Invoices")
    }

    /// The Fortnox customer collection.
    pub fn customers() -> Self {
        Self::new("customers", "CustomerNumber", "/3/customers", "Customers")
    }
}
