//! Credential store abstraction.
//!
//! This module defines the [`TokenStore`] trait: a single-slot persistent home
//! for the current [`Credential`]. Implementations live in `tikr-auth`.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{error::Result, types::Credential};

/// Trait for persisting one credential across runs.
///
/// Implementations must serialise their own operations so concurrent workers
/// sharing a store never observe a torn write.
#[async_trait]
pub trait TokenStore: Send + Sync + Debug {
    /// Loads the stored credential.
    ///
    /// Returns `Ok(None)` if nothing usable is stored; a missing or corrupt
    /// artifact is not an error.
    async fn load(&self) -> Result<Option<Credential>>;

    /// Replaces the stored credential.
    async fn save(&self, credential: &Credential) -> Result<()>;

    /// Discards the stored credential.
    async fn invalidate(&self) -> Result<()>;

    /// Discards the stored credential only if its token equals `token`.
    ///
    /// Returns true if something was discarded. The default implementation
    /// is not atomic; stores with internal locking should override it.
    async fn invalidate_matching(&self, token: &str) -> Result<bool> {
        match self.load().await? {
            Some(stored) if stored.token() == token => {
                self.invalidate().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
