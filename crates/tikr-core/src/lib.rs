#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tikr/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the TIKR statements pipeline.
//!
//! This crate provides the foundational abstractions shared by every stage:
//!
//! - [`TikrError`](error::TikrError) - Error taxonomy, one variant per failure kind
//! - [`Statement`](types::Statement) / [`StatementSet`](types::StatementSet) - Canonical statements
//! - [`TokenStore`](store::TokenStore) - Single-slot credential persistence
//! - [`LoginCollaborator`](provider::LoginCollaborator) / [`QuoteSource`](provider::QuoteSource) - External capabilities
//! - [`RetryPolicy`](retry::RetryPolicy) - Refresh and backoff decisions
//! - [`TikrConfig`](config::TikrConfig) - Environment-driven configuration

/// Environment-driven configuration.
pub mod config;
/// Error types for pipeline operations.
pub mod error;
/// Collaborator traits (login, secondary quotes).
pub mod provider;
/// Retry policy and failure classification.
pub mod retry;
/// Credential store trait.
pub mod store;
/// Core data types (Ticker, Credential, Statement, etc.).
pub mod types;

// Re-export commonly used items at crate root
pub use config::{Endpoints, TikrConfig};
pub use error::{ErrorKind, Result, TikrError};
pub use provider::{LoginCollaborator, QuoteSource};
pub use retry::{Backoff, FailureClass, RetryDecision, RetryPolicy, RetryState};
pub use store::TokenStore;
pub use types::{
    CASH_KEYS, CompanyRef, Credential, DEBT_KEYS, EQUITY_KEYS, LineItem, MarketSnapshot, Period,
    PeriodLabel, PricePoint, PriceSource, Quote, Statement, StatementSet, StatementType, Ticker,
};
