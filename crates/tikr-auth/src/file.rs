//! File-backed token store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tikr_core::{Credential, Result, TikrError, TokenStore};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

/// Single-slot token store backed by a plain text file.
///
/// The file holds the raw token text and nothing else. A missing, empty or
/// non-UTF-8 file loads as no credential. Saves go to a sibling temporary
/// file which is then renamed over the target, so readers never see a
/// partial token. Every operation holds an internal lock, which serialises
/// access from all workers sharing this store.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Create a store for the given file path.
    ///
    /// Nothing is touched on disk until the first operation.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Returns the artifact path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token".into());
        name.push(".partial");
        self.path.with_file_name(name)
    }

    async fn read_token(&self) -> Result<Option<Credential>> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No token file");
                return Ok(None);
            }
            Err(e) => return Err(store_error("read", &self.path, &e)),
        };

        let Ok(text) = String::from_utf8(bytes) else {
            warn!(path = %self.path.display(), "Token file is not UTF-8, ignoring");
            return Ok(None);
        };
        let token = text.trim();
        if token.is_empty() {
            debug!("Token file is empty");
            return Ok(None);
        }

        let acquired_at = match fs::metadata(&self.path).await.and_then(|m| m.modified()) {
            Ok(modified) => DateTime::<Utc>::from(modified),
            Err(_) => Utc::now(),
        };
        Ok(Some(Credential::acquired_at(token, acquired_at)))
    }

    async fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(store_error("remove", &self.path, &e)),
        }
    }
}

fn store_error(action: &str, path: &Path, err: &std::io::Error) -> TikrError {
    TikrError::Store(format!("failed to {action} {}: {err}", path.display()))
}

#[async_trait]
impl TokenStore for FileTokenStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Option<Credential>> {
        let _guard = self.lock.lock().await;
        self.read_token().await
    }

    #[instrument(skip(self, credential), fields(path = %self.path.display()))]
    async fn save(&self, credential: &Credential) -> Result<()> {
        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| store_error("create", parent, &e))?;
        }

        let staging = self.staging_path();
        fs::write(&staging, credential.token())
            .await
            .map_err(|e| store_error("write", &staging, &e))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|e| store_error("replace", &self.path, &e))?;

        debug!("Saved token");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn invalidate(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.remove().await?;
        debug!("Invalidated token file");
        Ok(())
    }

    #[instrument(skip(self, token), fields(path = %self.path.display()))]
    async fn invalidate_matching(&self, token: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        match self.read_token().await? {
            Some(stored) if stored.token() == token => {
                self.remove().await?;
                debug!("Invalidated matching token file");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
