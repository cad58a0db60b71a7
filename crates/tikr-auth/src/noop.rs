//! No-op token store implementation.

use async_trait::async_trait;
use tikr_core::{Credential, Result, TokenStore};
use tracing::trace;

/// A token store that never persists anything.
///
/// `load` always returns `Ok(None)` and every write succeeds. Used in
/// deployment mode, where the credential is injected per process.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTokenStore;

impl NoopTokenStore {
    /// Create a new no-op store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TokenStore for NoopTokenStore {
    async fn load(&self) -> Result<Option<Credential>> {
        trace!("NoopTokenStore: load called, returning None");
        Ok(None)
    }

    async fn save(&self, _credential: &Credential) -> Result<()> {
        trace!("NoopTokenStore: save called, doing nothing");
        Ok(())
    }

    async fn invalidate(&self) -> Result<()> {
        trace!("NoopTokenStore: invalidate called, doing nothing");
        Ok(())
    }

    async fn invalidate_matching(&self, _token: &str) -> Result<bool> {
        trace!("NoopTokenStore: invalidate_matching called, returning false");
        Ok(false)
    }
}
