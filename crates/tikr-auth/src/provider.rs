//! Credential acquisition and refresh.
//!
//! [`TokenProvider`] owns the current credential for a process. It resolves a
//! credential from, in order, an injected token, the [`TokenStore`], and the
//! [`LoginCollaborator`]. Acquisition is single-flight: concurrent callers
//! wait on one internal lock and reuse whatever the first caller produced.

use std::fmt;
use std::sync::Arc;
use tikr_core::{Credential, LoginCollaborator, Result, TikrConfig, TikrError, TokenStore};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, warn};

/// Lifecycle of the process-wide credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing acquired yet.
    NoCredential,
    /// An acquisition is in progress.
    Acquiring,
    /// A credential is available.
    Valid,
    /// The last credential was rejected by the provider.
    Invalidated,
}

#[derive(Debug, Default)]
struct Slot {
    current: Option<Credential>,
    injected_rejected: bool,
}

/// Hands out credentials and refreshes them when the provider rejects one.
pub struct TokenProvider {
    store: Arc<dyn TokenStore>,
    login: Option<Arc<dyn LoginCollaborator>>,
    email: Option<String>,
    password: Option<String>,
    injected_token: Option<String>,
    deployment: bool,
    slot: Mutex<Slot>,
    state: watch::Sender<CredentialState>,
}

impl TokenProvider {
    /// Create a provider backed by a store, with no login path.
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            login: None,
            email: None,
            password: None,
            injected_token: None,
            deployment: false,
            slot: Mutex::new(Slot::default()),
            state: watch::Sender::new(CredentialState::NoCredential),
        }
    }

    /// Create a provider from configuration.
    #[must_use]
    pub fn from_config(
        config: &TikrConfig,
        store: Arc<dyn TokenStore>,
        login: Option<Arc<dyn LoginCollaborator>>,
    ) -> Self {
        let mut provider = Self::new(store)
            .with_account(config.email.clone(), config.password.clone())
            .with_injected_token(config.injected_token.clone())
            .with_deployment(config.deployment);
        provider.login = login;
        provider
    }

    /// Sets the login collaborator.
    #[must_use]
    pub fn with_login(mut self, login: Arc<dyn LoginCollaborator>) -> Self {
        self.login = Some(login);
        self
    }

    /// Sets the account used by the login collaborator.
    #[must_use]
    pub fn with_account(mut self, email: Option<String>, password: Option<String>) -> Self {
        self.email = email;
        self.password = password;
        self
    }

    /// Sets an externally supplied token, tried before anything else.
    #[must_use]
    pub fn with_injected_token(mut self, token: Option<String>) -> Self {
        self.injected_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    /// Marks the process as running without interactive login.
    #[must_use]
    pub const fn with_deployment(mut self, deployment: bool) -> Self {
        self.deployment = deployment;
        self
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CredentialState {
        *self.state.borrow()
    }

    /// Subscribes to lifecycle state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<CredentialState> {
        self.state.subscribe()
    }

    /// Returns a usable credential.
    ///
    /// With `force_refresh` the cached credential and the store are skipped
    /// and an injected token counts as rejected.
    ///
    /// # Errors
    /// - [`TikrError::ManualTokenRequired`] when no login path exists
    /// - [`TikrError::Authentication`] when login is impossible or failed
    #[instrument(skip(self))]
    pub async fn acquire(&self, force_refresh: bool) -> Result<Credential> {
        let mut slot = self.slot.lock().await;
        self.acquire_locked(&mut slot, force_refresh).await
    }

    /// Marks a credential as rejected by the provider.
    ///
    /// The store is only cleared if it still holds the same token, so a
    /// newer credential saved by another worker survives.
    #[instrument(skip(self, failed))]
    pub async fn invalidate(&self, failed: &Credential) -> Result<()> {
        let mut slot = self.slot.lock().await;
        self.invalidate_locked(&mut slot, failed).await
    }

    /// Replaces a credential that the provider rejected.
    ///
    /// If another caller already replaced it, that newer credential is
    /// returned without a new login.
    #[instrument(skip(self, failed))]
    pub async fn refresh(&self, failed: &Credential) -> Result<Credential> {
        let mut slot = self.slot.lock().await;
        if let Some(current) = slot
            .current
            .as_ref()
            .filter(|c| c.is_valid() && c.token() != failed.token())
        {
            debug!("Credential already refreshed by another caller");
            return Ok(current.clone());
        }
        self.invalidate_locked(&mut slot, failed).await?;
        self.acquire_locked(&mut slot, true).await
    }

    async fn invalidate_locked(&self, slot: &mut Slot, failed: &Credential) -> Result<()> {
        if slot
            .current
            .as_ref()
            .is_none_or(|c| c.token() == failed.token())
        {
            slot.current = Some(failed.invalidated());
        }
        self.state.send_replace(CredentialState::Invalidated);
        if self.store.invalidate_matching(failed.token()).await? {
            debug!("Removed rejected credential from store");
        }
        Ok(())
    }

    async fn acquire_locked(&self, slot: &mut Slot, force_refresh: bool) -> Result<Credential> {
        if !force_refresh {
            if let Some(current) = slot.current.as_ref().filter(|c| c.is_valid()) {
                return Ok(current.clone());
            }
        }

        let previous = self.state.send_replace(CredentialState::Acquiring);
        match self.resolve(slot, force_refresh).await {
            Ok(credential) => {
                slot.current = Some(credential.clone());
                self.state.send_replace(CredentialState::Valid);
                Ok(credential)
            }
            Err(e) => {
                let fallback = match previous {
                    CredentialState::Invalidated => CredentialState::Invalidated,
                    _ => CredentialState::NoCredential,
                };
                self.state.send_replace(fallback);
                Err(e)
            }
        }
    }

    async fn resolve(&self, slot: &mut Slot, force_refresh: bool) -> Result<Credential> {
        if let Some(token) = &self.injected_token {
            if force_refresh {
                slot.injected_rejected = true;
            }
            if !slot.injected_rejected {
                debug!("Using injected token");
                return Ok(Credential::new(token.as_str()));
            }
            if self.deployment {
                return Err(TikrError::Authentication(
                    "injected credential rejected by the provider".to_string(),
                ));
            }
            warn!("Injected token rejected, falling back to login");
        } else if self.deployment {
            return Err(TikrError::ManualTokenRequired(
                "deployment mode needs TIKR_ACCESS_TOKEN".to_string(),
            ));
        }

        if !force_refresh {
            match self.store.load().await {
                Ok(Some(stored)) if stored.is_valid() => {
                    debug!("Using stored token");
                    return Ok(stored);
                }
                Ok(_) => debug!("No stored token"),
                Err(e) => warn!(error = %e, "Failed to load stored token"),
            }
        }

        let Some(login) = &self.login else {
            return Err(TikrError::ManualTokenRequired(
                "no interactive login available; set TIKR_ACCESS_TOKEN".to_string(),
            ));
        };
        let (Some(email), Some(password)) = (&self.email, &self.password) else {
            return Err(TikrError::Authentication(
                "TIKR_EMAIL and TIKR_PASSWORD must be set to log in".to_string(),
            ));
        };

        info!("Logging in for a new access token");
        let credential = login.login(email, password).await?;
        if let Err(e) = self.store.save(&credential).await {
            warn!(error = %e, "Failed to persist new token");
        }
        Ok(credential)
    }
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("store", &self.store)
            .field("login", &self.login)
            .field("email", &self.email)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field(
                "injected_token",
                &self.injected_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("deployment", &self.deployment)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{InMemoryTokenStore, NoopTokenStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tikr_core::ErrorKind;

    #[derive(Debug, Default)]
    struct CountingLogin {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LoginCollaborator for CountingLogin {
        async fn login(&self, email: &str, _password: &str) -> Result<Credential> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Credential::new(format!("{email}-{n}")))
        }
    }

    fn provider_with_login(store: Arc<dyn TokenStore>) -> (TokenProvider, Arc<CountingLogin>) {
        let login = Arc::new(CountingLogin::default());
        let provider = TokenProvider::new(store)
            .with_login(login.clone())
            .with_account(Some("me".to_string()), Some("pw".to_string()));
        (provider, login)
    }

    #[tokio::test]
    async fn test_injected_token_wins() {
        let store = Arc::new(InMemoryTokenStore::with_credential(Credential::new("stored")));
        let provider = TokenProvider::new(store).with_injected_token(Some("injected".to_string()));
        assert_eq!(provider.acquire(false).await.unwrap().token(), "injected");
        assert_eq!(provider.state(), CredentialState::Valid);
    }

    #[tokio::test]
    async fn test_store_before_login_and_login_saves() {
        let store = Arc::new(InMemoryTokenStore::with_credential(Credential::new("stored")));
        let (provider, login) = provider_with_login(store.clone());

        assert_eq!(provider.acquire(false).await.unwrap().token(), "stored");
        assert_eq!(login.calls.load(Ordering::SeqCst), 0);

        let fresh = provider.acquire(true).await.unwrap();
        assert_eq!(fresh.token(), "me-1");
        assert_eq!(store.load().await.unwrap().unwrap().token(), "me-1");
    }

    #[tokio::test]
    async fn test_deployment_without_token_requires_manual_token() {
        let provider = TokenProvider::new(Arc::new(NoopTokenStore::new())).with_deployment(true);
        let err = provider.acquire(false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManualTokenRequired);
        assert_eq!(provider.state(), CredentialState::NoCredential);
    }

    #[tokio::test]
    async fn test_rejected_injected_token_in_deployment() {
        let provider = TokenProvider::new(Arc::new(NoopTokenStore::new()))
            .with_deployment(true)
            .with_injected_token(Some("tok".to_string()));
        let credential = provider.acquire(false).await.unwrap();
        let err = provider.refresh(&credential).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(provider.state(), CredentialState::Invalidated);
    }

    #[tokio::test]
    async fn test_no_login_collaborator_fails_fast() {
        let provider = TokenProvider::new(Arc::new(InMemoryTokenStore::new()));
        let err = provider.acquire(false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ManualTokenRequired);
    }

    #[tokio::test]
    async fn test_login_without_account_is_authentication_error() {
        let provider = TokenProvider::new(Arc::new(InMemoryTokenStore::new()))
            .with_login(Arc::new(CountingLogin::default()));
        let err = provider.acquire(false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_refresh_replaces_stale_credential() {
        let store = Arc::new(InMemoryTokenStore::with_credential(Credential::new("stale")));
        let (provider, login) = provider_with_login(store.clone());

        let stale = provider.acquire(false).await.unwrap();
        let fresh = provider.refresh(&stale).await.unwrap();
        assert_eq!(fresh.token(), "me-1");
        assert_eq!(provider.state(), CredentialState::Valid);
        assert_eq!(login.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().await.unwrap().unwrap().token(), "me-1");
    }

    #[tokio::test]
    async fn test_concurrent_refresh_logs_in_once() {
        let store = Arc::new(InMemoryTokenStore::with_credential(Credential::new("stale")));
        let (provider, login) = provider_with_login(store);
        let provider = Arc::new(provider);
        let stale = provider.acquire(false).await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let provider = Arc::clone(&provider);
                let stale = stale.clone();
                tokio::spawn(async move { provider.refresh(&stale).await.unwrap() })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().token(), "me-1");
        }
        assert_eq!(login.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_keeps_newer_stored_token() {
        let store = Arc::new(InMemoryTokenStore::with_credential(Credential::new("newer")));
        let provider = TokenProvider::new(store.clone());

        provider.invalidate(&Credential::new("older")).await.unwrap();
        assert_eq!(provider.state(), CredentialState::Invalidated);
        assert_eq!(store.load().await.unwrap().unwrap().token(), "newer");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let provider = TokenProvider::new(Arc::new(NoopTokenStore::new()))
            .with_account(Some("me".to_string()), Some("hunter2".to_string()))
            .with_injected_token(Some("secret".to_string()));
        let debug = format!("{provider:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("secret"));
    }
}
