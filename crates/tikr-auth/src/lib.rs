#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tikr/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Credential storage and acquisition.
//!
//! This crate provides implementations of the [`TokenStore`] trait from `tikr-core`:
//!
//! - [`FileTokenStore`] - Persistent single-file store (default outside deployment)
//! - [`InMemoryTokenStore`] - Simple in-memory store for testing
//! - [`NoopTokenStore`] - Store that never persists anything
//!
//! and the [`TokenProvider`] that hands credentials to the HTTP client.

/// File-backed token store.
pub mod file;
/// In-memory token store.
pub mod memory;
/// No-op token store.
pub mod noop;
/// Credential acquisition and refresh.
pub mod provider;

use std::sync::Arc;

use tikr_core::TikrConfig;

// Re-export the trait for convenience
pub use tikr_core::TokenStore;

// Re-export implementations
pub use file::FileTokenStore;
pub use memory::InMemoryTokenStore;
pub use noop::NoopTokenStore;
pub use provider::{CredentialState, TokenProvider};

/// Returns the store matching the configuration.
///
/// Deployment mode never persists credentials; otherwise the token lives at
/// `config.token_path`.
#[must_use]
pub fn store_for(config: &TikrConfig) -> Arc<dyn TokenStore> {
    if config.deployment {
        Arc::new(NoopTokenStore::new())
    } else {
        Arc::new(FileTokenStore::new(&config.token_path))
    }
}
