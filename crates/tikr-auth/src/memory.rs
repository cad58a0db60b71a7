//! In-memory token store.

use async_trait::async_trait;
use tikr_core::{Credential, Result, TokenStore};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

/// Token store that keeps the credential in memory.
///
/// The credential is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    slot: Mutex<Option<Credential>>,
}

impl InMemoryTokenStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a credential.
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    #[instrument(skip(self))]
    async fn load(&self) -> Result<Option<Credential>> {
        let slot = self.slot.lock().await;
        debug!(present = slot.is_some(), "Loaded token");
        Ok(slot.clone())
    }

    #[instrument(skip(self, credential))]
    async fn save(&self, credential: &Credential) -> Result<()> {
        *self.slot.lock().await = Some(credential.clone());
        debug!("Saved token");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn invalidate(&self) -> Result<()> {
        *self.slot.lock().await = None;
        debug!("Invalidated token");
        Ok(())
    }

    #[instrument(skip(self, token))]
    async fn invalidate_matching(&self, token: &str) -> Result<bool> {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|c| c.token() == token) {
            *slot = None;
            debug!("Invalidated matching token");
            return Ok(true);
        }
        Ok(false)
    }
}
