//! Refresh-token storage inside a shared TOML secrets document.

use async_trait::async_trait;
use nix::fcntl::{Flock, FlockArg};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use toml_edit::{DocumentMut, Item, Value};

use super::{RefreshTokenStore, Secret, StoreError, StoreLock};

/// Key under which the Fortnox refresh token is persisted.
pub const REFRESH_TOKEN_KEY: &str = "fortnox_refresh_token";

/// Refresh-token store over a TOML secrets document shared with other tools.
///
/// The document typically holds unrelated secrets (destination credentials
/// and the like) owned by collaborators. [`save`](RefreshTokenStore::save)
/// edits exactly one value node and leaves every other byte of the document
/// as it was: the document is parsed with `toml_edit`, which keeps comments,
/// ordering, and whitespace intact, and the replacement value inherits the
/// old value's surrounding decor. Pattern substitution on the raw text would
/// corrupt documents with escaped quotes or multi-line values; parsing the
/// document sidesteps that whole class of edits.
///
/// Writes go through a temporary file in the same directory which is then
/// renamed over the original, so a reader never observes a half-written
/// document.
pub struct TomlFileStore {
    path: PathBuf,
    /// Dotted key path, split into segments.
    key: Vec<String>,
}

impl TomlFileStore {
    /// Store over `path` addressing the default key, [`REFRESH_TOKEN_KEY`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_key(path, REFRESH_TOKEN_KEY)
    }

    /// Store addressing `key`, a `.`-separated path for keys nested inside
    /// tables (e.g. `sources.fortnox.fortnox_refresh_token`).
    pub fn with_key(path: impl Into<PathBuf>, key: &str) -> Self {
        Self {
            path: path.into(),
            key: key.split('.').map(str::to_string).collect(),
        }
    }

    /// Path of the secrets document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sidecar lock file next to the document, e.g. `secrets.toml.lock`.
    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn dotted_key(&self) -> String {
        self.key.join(".")
    }

    fn key_not_found(&self) -> StoreError {
        StoreError::KeyNotFound {
            key: self.dotted_key(),
        }
    }

    fn read_document(&self) -> Result<DocumentMut, StoreError> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| StoreError::Unavailable {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        content
            .parse::<DocumentMut>()
            .map_err(|e| StoreError::Document {
                message: e.to_string(),
            })
    }

    /// Walk the dotted key path down to the addressed item.
    fn find<'a>(&self, doc: &'a DocumentMut) -> Option<&'a Item> {
        let mut item = doc.as_item();
        for segment in &self.key {
            item = item.as_table_like()?.get(segment)?;
        }
        Some(item)
    }

    fn find_mut<'a>(&self, doc: &'a mut DocumentMut) -> Option<&'a mut Item> {
        let mut item = doc.as_item_mut();
        for segment in &self.key {
            item = item.as_table_like_mut()?.get_mut(segment)?;
        }
        Some(item)
    }

    /// Replace the document on disk in one rename.
    fn replace_file(&self, content: &str) -> Result<(), StoreError> {
        let backend = |e: std::io::Error| StoreError::Backend {
            message: e.to_string(),
        };
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).map_err(backend)?;
        tmp.write_all(content.as_bytes()).map_err(backend)?;
        tmp.as_file().sync_all().map_err(backend)?;
        tmp.persist(&self.path).map_err(|e| StoreError::Backend {
            message: e.to_string(),
        })?;
        Ok(())
    }
}

#[async_trait]
impl RefreshTokenStore for TomlFileStore {
    async fn load(&self) -> Result<Secret, StoreError> {
        let doc = self.read_document()?;
        let item = self.find(&doc).ok_or_else(|| self.key_not_found())?;
        let value = item.as_str().ok_or_else(|| StoreError::Document {
            message: format!("key `{}` is not a string", self.dotted_key()),
        })?;
        Ok(Secret::new(value))
    }

    async fn save(&self, token: &Secret) -> Result<(), StoreError> {
        let mut doc = self.read_document()?;
        let item = self.find_mut(&mut doc).ok_or_else(|| self.key_not_found())?;
        let value = item.as_value_mut().ok_or_else(|| self.key_not_found())?;
        if !value.is_str() {
            return Err(StoreError::Document {
                message: format!("key `{}` is not a string", self.dotted_key()),
            });
        }

        // Carry the old value's decor over so comments and spacing on the
        // key's own line survive the edit.
        let mut replacement = Value::from(token.expose());
        *replacement.decor_mut() = value.decor().clone();
        *value = replacement;

        self.replace_file(&doc.to_string())?;
        tracing::info!(path = %self.path.display(), "refresh token persisted");
        Ok(())
    }

    async fn lock_exclusive(&self) -> Result<StoreLock, StoreError> {
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| StoreError::Backend {
                message: format!("cannot open lock file {}: {}", lock_path.display(), e),
            })?;

        // A contended lock waits for a sibling's full exchange, so keep the
        // blocking acquire off the async runtime.
        let flock =
            tokio::task::spawn_blocking(move || Flock::lock(file, FlockArg::LockExclusive))
                .await
                .map_err(|e| StoreError::Backend {
                    message: format!("lock task failed: {e}"),
                })?
                .map_err(|(_file, errno)| StoreError::Backend {
                    message: format!("flock failed: {errno}"),
                })?;

        tracing::debug!(path = %lock_path.display(), "exclusive store lock acquired");
        Ok(StoreLock::file(flock))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_next_to_document() {
        let store = TomlFileStore::new("/data/.dlt/secrets.toml");
        assert_eq!(
            store.lock_path(),
            PathBuf::from("/data/.dlt/secrets.toml.lock")
        );
    }

    #[test]
    fn test_dotted_key_segments() {
        let store = TomlFileStore::with_key("secrets.toml", "sources.fortnox.fortnox_refresh_token");
        assert_eq!(store.dotted_key(), "sources.fortnox.fortnox_refresh_token");
        assert_eq!(store.key.len(), 3);
    }
}
