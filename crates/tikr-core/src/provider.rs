//! Collaborator traits at the edges of the pipeline.
//!
//! - [`LoginCollaborator`] - Mints a fresh credential from account credentials
//! - [`QuoteSource`] - Secondary source of current share prices

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{Credential, Quote, Ticker},
};

/// Opaque capability that produces a credential from an email and password.
///
/// The provider only issues tokens through an interactive browser login, so
/// this is supplied by the embedding application. Implementations must fail
/// rather than block when no interactive session is possible.
#[async_trait]
pub trait LoginCollaborator: Send + Sync + Debug {
    /// Logs in and returns a freshly minted credential.
    async fn login(&self, email: &str, password: &str) -> Result<Credential>;
}

/// Secondary source of live quotes.
#[async_trait]
pub trait QuoteSource: Send + Sync + Debug {
    /// Returns the name of this source (e.g., "Yahoo Finance").
    fn name(&self) -> &str;

    /// Fetches the latest quote for a ticker.
    async fn get_quote(&self, ticker: &Ticker) -> Result<Quote>;
}
