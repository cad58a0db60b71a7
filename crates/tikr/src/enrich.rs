//! Market snapshot assembly.

use std::sync::Arc;

use tikr_core::{CompanyRef, MarketSnapshot, Period, PricePoint, PriceSource, QuoteSource};
use tracing::{debug, warn};

/// Builds a [`MarketSnapshot`] from the provider's latest-period market
/// fields and an optional secondary quote.
///
/// The derived price is `pe_ratio x eps`. The quote, when it can be fetched,
/// is kept alongside it rather than replacing it. The snapshot is flagged
/// partial only when the secondary source fails or none is configured; a
/// provider period without P/E or EPS just has no derived price.
#[derive(Debug, Clone, Default)]
pub struct MarketDataEnricher {
    quotes: Option<Arc<dyn QuoteSource>>,
}

impl MarketDataEnricher {
    /// Create an enricher with no secondary quote source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the secondary quote source.
    #[must_use]
    pub fn with_quote_source(mut self, quotes: Arc<dyn QuoteSource>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    /// Assembles the snapshot for a company from its latest market period.
    pub async fn enrich(&self, company: &CompanyRef, latest: &Period) -> MarketSnapshot {
        let pe_ratio = latest.get("pe_ratio");
        let eps = latest.get("eps");
        let shares_outstanding = latest.get("shares_outstanding");

        let mut prices = Vec::with_capacity(2);
        let mut partial = false;

        match pe_ratio.zip(eps).map(|(pe, eps)| pe * eps).filter(|p| p.is_finite()) {
            Some(value) => prices.push(PricePoint {
                value,
                source: PriceSource::Derived,
                as_of: None,
            }),
            None => warn!(ticker = %company.ticker, "P/E or EPS missing, no derived price"),
        }

        match &self.quotes {
            Some(source) => match source.get_quote(&company.ticker).await {
                Ok(quote) => {
                    debug!(
                        ticker = %company.ticker,
                        source = source.name(),
                        price = quote.price,
                        "Quote received"
                    );
                    prices.push(PricePoint {
                        value: quote.price,
                        source: PriceSource::Quote,
                        as_of: Some(quote.as_of),
                    });
                }
                Err(e) => {
                    warn!(
                        ticker = %company.ticker,
                        source = source.name(),
                        error = %e,
                        "Quote source unavailable, snapshot is partial"
                    );
                    partial = true;
                }
            },
            None => partial = true,
        }

        let mut snapshot = MarketSnapshot {
            ticker: company.ticker.clone(),
            pe_ratio,
            eps,
            shares_outstanding,
            market_cap: None,
            prices,
            partial,
        };
        snapshot.market_cap = snapshot
            .preferred_price()
            .zip(shares_outstanding)
            .map(|(price, shares)| price.value * shares);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use tikr_core::{PeriodLabel, Quote, Result, Ticker, TikrError};

    #[derive(Debug)]
    struct FixedQuote(Option<f64>);

    #[async_trait]
    impl QuoteSource for FixedQuote {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn get_quote(&self, _ticker: &Ticker) -> Result<Quote> {
            match self.0 {
                Some(price) => Ok(Quote {
                    price,
                    as_of: Utc::now(),
                    currency: Some("USD".to_string()),
                }),
                None => Err(TikrError::UpstreamUnavailable {
                    attempts: 1,
                    cause: "connection refused".to_string(),
                }),
            }
        }
    }

    fn company() -> CompanyRef {
        CompanyRef::new(Ticker::parse("AAPL").unwrap(), 1, 2)
    }

    fn with_quote(price: Option<f64>) -> MarketDataEnricher {
        MarketDataEnricher::new().with_quote_source(Arc::new(FixedQuote(price)))
    }

    fn latest() -> Period {
        Period::new(PeriodLabel::Ltm)
            .with("pe_ratio", 30.0)
            .with("eps", 6.0)
            .with("shares_outstanding", 15_000.0)
    }

    #[tokio::test]
    async fn test_both_prices_retained() {
        let enricher = with_quote(Some(182.5));
        let snapshot = enricher.enrich(&company(), &latest()).await;

        assert!(!snapshot.partial);
        assert_eq!(snapshot.price(PriceSource::Derived).unwrap().value, 180.0);
        assert_eq!(snapshot.price(PriceSource::Quote).unwrap().value, 182.5);
        assert_eq!(snapshot.preferred_price().unwrap().source, PriceSource::Quote);
        assert_eq!(snapshot.market_cap, Some(182.5 * 15_000.0));
    }

    #[tokio::test]
    async fn test_quote_outage_falls_back_to_derived() {
        let enricher = with_quote(None);
        let snapshot = enricher.enrich(&company(), &latest()).await;

        assert!(snapshot.partial);
        assert_eq!(snapshot.prices.len(), 1);
        assert_eq!(snapshot.preferred_price().unwrap().source, PriceSource::Derived);
        assert_eq!(snapshot.market_cap, Some(180.0 * 15_000.0));
    }

    #[tokio::test]
    async fn test_missing_eps_leaves_no_derived_price() {
        let period = Period::new(PeriodLabel::Ltm).with("pe_ratio", 30.0);
        let snapshot = with_quote(Some(10.0)).enrich(&company(), &period).await;

        // Both sources answered, so the snapshot is complete
        assert!(!snapshot.partial);
        assert!(snapshot.price(PriceSource::Derived).is_none());
        assert_eq!(snapshot.preferred_price().unwrap().value, 10.0);
        assert_eq!(snapshot.market_cap, None);

        let snapshot = with_quote(None).enrich(&company(), &period).await;
        assert!(snapshot.partial);
        assert!(snapshot.prices.is_empty());
    }

    #[tokio::test]
    async fn test_no_quote_source_is_partial() {
        let snapshot = MarketDataEnricher::new().enrich(&company(), &latest()).await;
        assert!(snapshot.partial);
        assert_eq!(snapshot.preferred_price().unwrap().source, PriceSource::Derived);
    }
}
