//! In-memory refresh-token storage implementation.

use async_trait::async_trait;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{RefreshTokenStore, Secret, StoreError, StoreLock};

/// In-memory refresh-token store for testing and embedding.
///
/// Not persistent; the token is lost when the process exits. The store
/// records every value passed to `save` so callers can assert how often and
/// with what persistence happened, and it can be switched to reject saves
/// to exercise persistence-failure handling.
///
/// # Thread Safety
///
/// Uses interior mutability via `RwLock` and is safe to share across threads.
pub struct MemoryStore {
    token: RwLock<Option<Secret>>,
    saves: RwLock<Vec<String>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            token: RwLock::new(None),
            saves: RwLock::new(Vec::new()),
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Create a store holding an initial refresh token.
    pub fn with_token(token: Secret) -> Self {
        let store = Self::new();
        if let Ok(mut slot) = store.token.write() {
            *slot = Some(token);
        }
        store
    }

    /// Make subsequent `save` calls fail with a backend error.
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Values passed to `save` so far, oldest first.
    pub fn saved(&self) -> Vec<String> {
        self.saves.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let held = self.token.read().map(|t| t.is_some()).unwrap_or(false);
        f.debug_struct("MemoryStore")
            .field("has_token", &held)
            .finish()
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn load(&self) -> Result<Secret, StoreError> {
        let token = self.token.read().map_err(|e| StoreError::Backend {
            message: format!("lock poisoned: {}", e),
        })?;
        token.clone().ok_or_else(|| StoreError::Unavailable {
            path: "<memory>".to_string(),
            message: "no refresh token stored".to_string(),
        })
    }

    async fn save(&self, token: &Secret) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend {
                message: "save rejected (failure injection)".to_string(),
            });
        }
        let mut slot = self.token.write().map_err(|e| StoreError::Backend {
            message: format!("lock poisoned: {}", e),
        })?;
        let mut saves = self.saves.write().map_err(|e| StoreError::Backend {
            message: format!("lock poisoned: {}", e),
        })?;
        saves.push(token.expose().to_string());
        *slot = Some(token.clone());
        Ok(())
    }

    async fn lock_exclusive(&self) -> Result<StoreLock, StoreError> {
        Ok(StoreLock::noop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_save_load() {
        let store = MemoryStore::new();
        store.save(&Secret::new("token-1")).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.expose(), "token-1");
    }

    #[tokio::test]
    async fn test_memory_store_empty_load_unavailable() {
        let store = MemoryStore::new();
        let result = store.load().await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }

    #[tokio::test]
    async fn test_memory_store_records_saves() {
        let store = MemoryStore::with_token(Secret::new("initial"));
        assert!(store.saved().is_empty());

        store.save(&Secret::new("first")).await.unwrap();
        store.save(&Secret::new("second")).await.unwrap();

        assert_eq!(store.saved(), vec!["first", "second"]);
        assert_eq!(store.load().await.unwrap().expose(), "second");
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryStore::with_token(Secret::new("initial"));
        store.fail_saves(true);

        let result = store.save(&Secret::new("rotated")).await;
        assert!(matches!(result, Err(StoreError::Backend { .. })));

        // Nothing recorded, nothing replaced.
        assert!(store.saved().is_empty());
        assert_eq!(store.load().await.unwrap().expose(), "initial");
    }

    #[tokio::test]
    async fn test_memory_store_lock_is_noop() {
        let store = MemoryStore::new();
        let guard = store.lock_exclusive().await.unwrap();
        drop(guard);
        store.lock_exclusive().await.unwrap();
    }
}
