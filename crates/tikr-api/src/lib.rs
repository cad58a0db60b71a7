#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tikr/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! TIKR provider client.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tikr_api::{TikrClient, normalize};
//! use tikr_auth::{TokenProvider, store_for};
//! use tikr_core::{StatementType, TikrConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TikrConfig::from_env()?;
//!     let tokens = Arc::new(TokenProvider::from_config(&config, store_for(&config), None));
//!     let client = TikrClient::new(&config, tokens)?;
//!
//!     let company = client.resolver().resolve("AAPL").await?;
//!     let payload = client.fetcher().fetch(&company, StatementType::Income).await?;
//!     let income = normalize::normalize(&payload)?.statement;
//!
//!     Ok(())
//! }
//! ```

/// Raw statement retrieval.
pub mod fetch;
/// Static provider field tables.
pub mod keys;
/// Payload normalization.
pub mod normalize;
/// Raw provider payload types.
pub mod payload;
/// Ticker resolution.
pub mod resolver;

use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tikr_auth::TokenProvider;
use tikr_core::{Endpoints, FailureClass, Result, RetryPolicy, TikrConfig, TikrError};

pub use fetch::StatementFetcher;
pub use normalize::{
    Normalized, align_statements, canonical_label, denormalize, normalize, normalize_quote,
};
pub use payload::{RawPayload, RawQuote, RawStatement};
pub use resolver::CompanyResolver;

/// Origin the provider's web app sends requests from.
const APP_ORIGIN: &str = "https://app.tikr.com";

/// Browser user agent expected by the endpoints.
const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:108.0) Gecko/20100101 Firefox/108.0";

/// Shared HTTP plumbing for the provider endpoints.
///
/// Cheap to clone; clones share the connection pool and the
/// [`TokenProvider`].
#[derive(Clone)]
pub struct TikrClient {
    http: Client,
    endpoints: Endpoints,
    tokens: Arc<TokenProvider>,
    retry: RetryPolicy,
}

impl fmt::Debug for TikrClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TikrClient")
            .field("endpoints", &self.endpoints)
            .field("tokens", &self.tokens)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl TikrClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns [`TikrError::Config`] if the HTTP client cannot be built.
    pub fn new(config: &TikrConfig, tokens: Arc<TokenProvider>) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .default_headers(default_headers())
            .build()
            .map_err(|e| TikrError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(http, config.endpoints.clone(), tokens))
    }

    /// Create a client with a custom HTTP client.
    #[must_use]
    pub fn with_client(http: Client, endpoints: Endpoints, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http,
            endpoints,
            tokens,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the endpoints in use.
    #[must_use]
    pub const fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Returns the shared token provider.
    #[must_use]
    pub const fn tokens(&self) -> &Arc<TokenProvider> {
        &self.tokens
    }

    /// Returns a resolver using this client.
    #[must_use]
    pub fn resolver(&self) -> CompanyResolver {
        CompanyResolver::new(self.clone())
    }

    /// Returns a statement fetcher using this client.
    #[must_use]
    pub fn fetcher(&self) -> StatementFetcher {
        StatementFetcher::new(self.clone())
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json, text/plain, */*"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ORIGIN, HeaderValue::from_static(APP_ORIGIN));
    headers.insert(REFERER, HeaderValue::from_static("https://app.tikr.com/"));
    headers
}

/// Why a single request attempt did not produce a value.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// Handled by the retry policy.
    Failed(FailureClass),
    /// Successful response without usable content; never retried.
    Incomplete(String),
}

/// Classifies a transport-level failure.
pub(crate) fn classify_transport(err: &reqwest::Error) -> FailureClass {
    if err.is_timeout() {
        FailureClass::Transient {
            cause: "request timed out".to_string(),
        }
    } else if err.is_connect() || err.is_request() || err.is_body() {
        FailureClass::Transient {
            cause: format!("connection error: {err}"),
        }
    } else {
        FailureClass::Fatal {
            cause: err.to_string(),
        }
    }
}

/// True if a 200 body reports an expired or unauthorised session.
pub(crate) fn body_signals_expired_session(body: &Value) -> bool {
    ["error", "message", "errorMessage"]
        .iter()
        .filter_map(|key| body.get(*key).and_then(Value::as_str))
        .any(|text| {
            let text = text.to_ascii_lowercase();
            ["expired", "unauthorized", "unauthorised"]
                .iter()
                .any(|marker| text.contains(marker))
        })
}
