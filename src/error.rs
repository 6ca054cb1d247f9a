//! Top-level error type.

use thiserror::Error;

use crate::coordinator::CoordinatorError;
use crate::fetch::FetchError;
use crate::refresh::RefreshError;
use crate::store::StoreError;

/// Top-level error encompassing every failure the crate surfaces.
#[derive(Debug, Error)]
pub enum Error {
    /// Error from refresh-token storage.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from the token exchange.
    #[error("token refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// Error from coordinated token acquisition.
    #[error("token coordination error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Error from paginated fetching.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
}
