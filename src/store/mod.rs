//! Refresh-token storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`RefreshTokenStore`] - Trait for refresh-token storage backends
//! - [`StoreLock`] - RAII guard for the exchange-and-persist critical section
//! - [`TomlFileStore`] - Storage inside a shared TOML secrets document
//! - [`MemoryStore`] - In-memory implementation for testing and embedding
//!
//! # Example
//!
//! ```rust,ignore
//! use fortnox_extract::store::{RefreshTokenStore, Secret, TomlFileStore};
//!
//! let store = TomlFileStore::new(".dlt/secrets.toml");
//! let current = store.load().await?;
//! store.save(&Secret::new("rotated-token")).await?;
//! ```

use async_trait::async_trait;
use nix::fcntl::Flock;
use serde::{Deserialize, Serialize};
use std::fs::File;
use thiserror::Error;

mod memory;
mod toml_file;

pub use memory::MemoryStore;
pub use toml_file::{REFRESH_TOKEN_KEY, TomlFileStore};

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value.
#[derive(Clone, Serialize, Deserialize)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Consume the secret and return the inner value.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Error type for refresh-token store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing secrets document is missing or unreadable.
    ///
    /// Fatal: an operator has to put the document in place.
    #[error("secrets document unavailable at {path}: {message}")]
    Unavailable { path: String, message: String },

    /// The document exists but does not contain the expected key.
    ///
    /// Fatal: the document has to be fixed by hand. No write is performed.
    #[error("key `{key}` not found in secrets document")]
    KeyNotFound { key: String },

    /// The document could not be parsed, or the key holds a non-string value.
    #[error("secrets document malformed: {message}")]
    Document { message: String },

    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    Backend { message: String },
}

/// RAII guard serializing token exchange and persistence.
///
/// Two runners sharing one persisted refresh token must not exchange
/// concurrently: the first exchange consumes the token server-side, leaving
/// the second runner's copy dead. [`RotationCoordinator`] holds this guard
/// for the whole of `get_access_token`. Dropping the guard releases it.
///
/// [`RotationCoordinator`]: crate::coordinator::RotationCoordinator
pub struct StoreLock {
    _flock: Option<Flock<File>>,
}

impl StoreLock {
    /// Guard backed by an exclusive flock on a sidecar lock file.
    pub(crate) fn file(flock: Flock<File>) -> Self {
        Self {
            _flock: Some(flock),
        }
    }

    /// Guard for stores without cross-process state.
    pub fn noop() -> Self {
        Self { _flock: None }
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock")
            .field("file_backed", &self._flock.is_some())
            .finish()
    }
}

/// Abstraction over refresh-token storage backends.
///
/// Implementations include:
/// - [`TomlFileStore`] - One key inside a shared TOML secrets document
/// - [`MemoryStore`] - In-memory storage for testing
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Read the currently persisted refresh token.
    async fn load(&self) -> Result<Secret, StoreError>;

    /// Replace the persisted refresh token with `token`.
    ///
    /// Must be all-or-nothing: on any failure the previously persisted
    /// state is left untouched.
    async fn save(&self, token: &Secret) -> Result<(), StoreError>;

    /// Acquire the exclusive lock guarding exchange plus persistence.
    ///
    /// Blocks until any sibling holder releases it.
    async fn lock_exclusive(&self) -> Result<StoreLock, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_debug_redacted() {
        let secret = Secret::new("super-secret");
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_secret_display_redacted() {
        let secret = Secret::new("super-secret");
        let display = format!("{}", secret);
        assert!(!display.contains("super-secret"));
        assert!(display.contains("REDACTED"));
    }

    #[test]
    fn test_secret_roundtrip() {
        let secret = Secret::new("value");
        assert_eq!(secret.expose(), "value");
        assert_eq!(secret.into_inner(), "value");
    }
}
