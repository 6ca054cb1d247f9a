//! Orchestration of token exchange and rotation persistence.

use thiserror::Error;

use crate::model::{Credentials, TokenPair};
use crate::refresh::{RefreshError, TokenRefresher};
use crate::store::{RefreshTokenStore, Secret, StoreError};

/// What to do when a rotated refresh token cannot be persisted.
///
/// The freshly obtained access token is valid for the current run either
/// way, and the stored refresh token is stale either way: the server has
/// already consumed the old one, so the next run needs manual intervention
/// regardless of the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistencePolicy {
    /// Return the grant with a warning attached.
    #[default]
    Warn,
    /// Fail the operation; the error still carries the access token.
    Fail,
}

/// A usable access token plus what happened to the refresh token.
#[derive(Debug)]
pub struct AccessGrant {
    /// Access and refresh tokens from the exchange.
    pub token_pair: TokenPair,

    /// Whether the server rotated the refresh token.
    pub rotated: bool,

    /// Set when rotation succeeded but persisting the new refresh token did
    /// not (under [`PersistencePolicy::Warn`]). The stored token is stale;
    /// alert on this.
    pub persist_warning: Option<StoreError>,
}

/// Error type for coordinated token acquisition.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The exchange against the token endpoint failed.
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// The store failed before the exchange (lock acquisition or read).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Rotation succeeded but the new refresh token could not be saved
    /// (under [`PersistencePolicy::Fail`]). `access_token` is still valid
    /// for the current run.
    #[error("refresh token rotated but could not be persisted: {source}")]
    Persistence {
        source: StoreError,
        access_token: Secret,
    },
}

/// Coordinates [`TokenRefresher`] and a [`RefreshTokenStore`].
///
/// `get_access_token` holds the store's exclusive lock across the whole
/// exchange-and-persist sequence: two runners sharing one secrets document
/// would otherwise race, one of them consuming (and rotating) the refresh
/// token the other is about to send.
pub struct RotationCoordinator<S> {
    refresher: TokenRefresher,
    store: S,
    policy: PersistencePolicy,
}

impl<S: RefreshTokenStore> RotationCoordinator<S> {
    pub fn new(refresher: TokenRefresher, store: S) -> Self {
        Self {
            refresher,
            store,
            policy: PersistencePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PersistencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The underlying store, e.g. to read the persisted refresh token.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Exchange `creds.refresh_token` for an access token, persisting a
    /// rotated refresh token before the grant is returned.
    ///
    /// When the server rotates, the new refresh token is written to the
    /// store first; a crash between exchange and persistence is the only
    /// window in which the stored token is stale. Nothing is written when
    /// the server did not rotate. No step is retried: a refresh token is
    /// consumed server-side on first use, so a blind second exchange would
    /// send a dead token.
    pub async fn get_access_token(
        &self,
        creds: &Credentials,
    ) -> Result<AccessGrant, CoordinatorError> {
        let _lock = self.store.lock_exclusive().await?;

        let pair = self.refresher.exchange(creds).await?;

        if !pair.rotated_from(&creds.refresh_token) {
            return Ok(AccessGrant {
                token_pair: pair,
                rotated: false,
                persist_warning: None,
            });
        }

        tracing::info!("refresh token rotated, persisting new token");

        match self.store.save(&pair.refresh_token).await {
            Ok(()) => {
                tracing::info!("new refresh token persisted");
                Ok(AccessGrant {
                    token_pair: pair,
                    rotated: true,
                    persist_warning: None,
                })
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    "rotated refresh token could not be persisted; the stored token is now stale and the next run will fail without manual intervention"
                );
                match self.policy {
                    PersistencePolicy::Warn => Ok(AccessGrant {
                        token_pair: pair,
                        rotated: true,
                        persist_warning: Some(err),
                    }),
                    PersistencePolicy::Fail => Err(CoordinatorError::Persistence {
                        source: err,
                        access_token: pair.access_token.clone(),
                    }),
                }
            }
        }
    }
}
