//! # Fortnox Extract
//!
//! Core library for Fortnox OAuth2 token lifecycle management and paginated
//! resource extraction.
//!
//! This crate provides:
//! - Refresh-token exchange with rotation detection ([`TokenRefresher`])
//! - Race-free persistence of rotated refresh tokens
//!   ([`RotationCoordinator`] over a [`TomlFileStore`])
//! - Lazy record streams over offset-paginated collections
//!   ([`ResourceFetcher`])
//!
//! Refresh tokens are typically consumed server-side on first use, so the
//! coordinator persists a rotated token *before* handing the access token
//! to the caller, holding an exclusive lock so overlapping runs cannot
//! consume each other's tokens.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use fortnox_extract::{
//!     Credentials, EndpointSpec, ResourceFetcher, RotationCoordinator,
//!     TokenRefresher, TomlFileStore,
//! };
//! use futures::StreamExt;
//!
//! async fn run() -> Result<(), fortnox_extract::Error> {
//!     let store = TomlFileStore::new(".dlt/secrets.toml");
//!     let coordinator = RotationCoordinator::new(TokenRefresher::new(), store);
//!
//!     let refresh_token = coordinator.store().load().await?;
//!     let creds = Credentials::new("client-id", "client-secret", refresh_token.expose());
//!     let grant = coordinator.get_access_token(&creds).await?;
//!
//!     let fetcher = ResourceFetcher::new();
//!     let invoices = EndpointSpec::invoices();
//!     let mut records = fetcher.fetch(&invoices, &grant.token_pair.access_token);
//!     while let Some(record) = records.next().await {
//!         let record = record?;
//!         // hand off to the downstream pipeline
//!     }
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod model;
pub mod refresh;
pub mod store;

/// Timeout applied to every external request.
pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

// Re-export commonly used types at crate root
pub use coordinator::{AccessGrant, CoordinatorError, PersistencePolicy, RotationCoordinator};
pub use error::Error;
pub use fetch::{FORTNOX_API_BASE_URL, FetchError, ResourceFetcher};
pub use model::{Credentials, EndpointSpec, Pagination, TokenPair};
pub use refresh::{FORTNOX_TOKEN_URL, RefreshError, TokenRefresher};
pub use store::{
    MemoryStore, REFRESH_TOKEN_KEY, RefreshTokenStore, Secret, StoreError, StoreLock,
    TomlFileStore,
};
