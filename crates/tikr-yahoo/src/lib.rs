#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tikr/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance quote source.
//!
//! This crate implements the [`QuoteSource`] trait from `tikr-core` on top of
//! Yahoo Finance's chart API.
//!
//! # Features
//!
//! - Latest regular-market price with quote time and currency
//! - Built-in rate limiting (1 request per second by default)
//!
//! # Example
//!
//! ```no_run
//! use tikr_yahoo::YahooQuoteSource;
//! use tikr_core::{QuoteSource, Ticker};
//!
//! # async fn example() -> tikr_core::Result<()> {
//! let source = YahooQuoteSource::new();
//! let quote = source.get_quote(&Ticker::parse("AAPL")?).await?;
//! println!("AAPL last traded at {}", quote.price);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tikr_core::{Quote, QuoteSource, Result, Ticker, TikrError};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Yahoo Finance chart API base URL.
const CHART_API_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Yahoo Finance quote source.
#[derive(Debug)]
pub struct YahooQuoteSource {
    client: reqwest::Client,
    base_url: String,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl YahooQuoteSource {
    /// Create a new quote source with default settings.
    ///
    /// Uses built-in rate limiting of 1 request per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Create a new quote source with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: CHART_API_URL.to_string(),
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Create a new quote source with custom rate limiting.
    #[must_use]
    pub fn with_rate_limit(rate_limit: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            rate_limit_ms: u64::try_from(rate_limit.as_millis()).unwrap_or(u64::MAX),
            ..Self::with_client(client)
        }
    }

    /// Points the source at another chart API (used with mock servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Apply rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        let now = now_millis();
        let last = self.last_request_time.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last);

        if elapsed < self.rate_limit_ms {
            let wait_time = self.rate_limit_ms - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }

        self.last_request_time.store(now_millis(), Ordering::Relaxed);
    }

    /// Build the chart API URL for a ticker.
    fn build_chart_url(&self, ticker: &Ticker) -> String {
        format!("{}/{}?range=1d&interval=1d", self.base_url, ticker.as_str())
    }

    /// Extract the latest quote from a chart response.
    fn parse_chart_response(ticker: &Ticker, response: ChartResponse) -> Result<Quote> {
        if let Some(error) = response.chart.error {
            return Err(TikrError::DataIncomplete(format!(
                "Yahoo Finance error for {ticker}: {} ({})",
                error.description, error.code
            )));
        }

        let meta = response
            .chart
            .result
            .unwrap_or_default()
            .into_iter()
            .next()
            .map(|data| data.meta)
            .ok_or_else(|| TikrError::DataIncomplete(format!("no chart data for {ticker}")))?;

        let price = meta
            .regular_market_price
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| TikrError::DataIncomplete(format!("no market price for {ticker}")))?;
        let as_of = meta
            .regular_market_time
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(Utc::now);

        Ok(Quote {
            price,
            as_of,
            currency: meta.currency,
        })
    }
}

impl Default for YahooQuoteSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteSource for YahooQuoteSource {
    fn name(&self) -> &str {
        "Yahoo Finance"
    }

    async fn get_quote(&self, ticker: &Ticker) -> Result<Quote> {
        self.apply_rate_limit().await;

        let url = self.build_chart_url(ticker);
        debug!("Fetching quote: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TikrError::UpstreamUnavailable {
                attempts: 1,
                cause: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(TikrError::UpstreamUnavailable {
                attempts: 1,
                cause: format!("HTTP {} for {ticker}", response.status()),
            });
        }

        let chart = response
            .json::<ChartResponse>()
            .await
            .map_err(|e| TikrError::DataIncomplete(e.to_string()))?;
        Self::parse_chart_response(ticker, chart)
    }
}

fn now_millis() -> u64 {
    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    u64::try_from(millis).unwrap_or(u64::MAX)
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: ChartMeta,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ChartMeta {
    currency: Option<String>,
    regular_market_price: Option<f64>,
    regular_market_time: Option<i64>,
}
