//! Ticker resolution through the provider's search index.

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tikr_core::{
    CompanyRef, FailureClass, Result, RetryDecision, RetryState, Ticker, TikrError,
};
use tracing::{debug, info, instrument, warn};

use crate::payload::{SearchHit, SearchResponse};
use crate::{AttemptError, TikrClient, classify_transport};

/// Resolves tickers to provider identifiers.
#[derive(Debug, Clone)]
pub struct CompanyResolver {
    client: TikrClient,
}

impl CompanyResolver {
    /// Create a resolver on top of a client.
    #[must_use]
    pub const fn new(client: TikrClient) -> Self {
        Self { client }
    }

    /// Resolves a ticker to a [`CompanyRef`].
    ///
    /// The ticker is validated before any network I/O. Among the hits whose
    /// symbol equals the ticker, a hit flagged as the primary listing wins;
    /// otherwise the provider's ranking order decides.
    ///
    /// # Errors
    /// - [`TikrError::InvalidTicker`] if the ticker fails validation
    /// - [`TikrError::CompanyNotFound`] if no hit has the exact symbol
    /// - credential errors from the token provider
    /// - [`TikrError::UpstreamUnavailable`] if the search index keeps failing
    #[instrument(skip(self))]
    pub async fn resolve(&self, ticker: &str) -> Result<CompanyRef> {
        let ticker = Ticker::parse(ticker)?;
        self.client.tokens().acquire(false).await?;

        let response = self.search(&ticker).await?;
        let hit = select_hit(&ticker, &response.hits)
            .ok_or_else(|| TikrError::CompanyNotFound(ticker.to_string()))?;

        let (Some(trading_id), Some(company_id)) = (hit.trading_id(), hit.company_id()) else {
            return Err(TikrError::CompanyNotFound(ticker.to_string()));
        };
        info!(
            ticker = %ticker,
            trading_id,
            company_id,
            "Resolved company"
        );

        let company = CompanyRef::new(ticker, trading_id, company_id);
        Ok(match &hit.companyname {
            Some(name) => company.with_name(name),
            None => company,
        })
    }

    async fn search(&self, ticker: &Ticker) -> Result<SearchResponse> {
        let mut state = RetryState::new();
        loop {
            state.record_attempt();
            let failure = match self.try_search(ticker).await {
                Ok(response) => return Ok(response),
                Err(AttemptError::Incomplete(cause)) => {
                    return Err(TikrError::UpstreamUnavailable {
                        attempts: state.attempts(),
                        cause,
                    });
                }
                // The search index is not token-gated; nothing to refresh
                Err(AttemptError::Failed(FailureClass::SessionExpired { status: 502 })) => {
                    FailureClass::Transient {
                        cause: "HTTP 502".to_string(),
                    }
                }
                Err(AttemptError::Failed(FailureClass::SessionExpired { status })) => {
                    FailureClass::Fatal {
                        cause: format!("HTTP {status}"),
                    }
                }
                Err(AttemptError::Failed(failure)) => failure,
            };

            match self.client.retry.decide(&mut state, failure) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(ticker = %ticker, ?delay, "Search failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::RefreshCredential => {}
                RetryDecision::Fail(e) => return Err(e),
            }
        }
    }

    async fn try_search(
        &self,
        ticker: &Ticker,
    ) -> std::result::Result<SearchResponse, AttemptError> {
        let body = format!(r#"{{"params":"query={ticker}&distinct=2"}}"#);
        debug!(ticker = %ticker, "Search request");

        let response = self
            .client
            .http
            .post(&self.client.endpoints.search_url)
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| AttemptError::Failed(classify_transport(&e)))?;

        if let Some(failure) = FailureClass::from_status(response.status().as_u16()) {
            return Err(AttemptError::Failed(failure));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AttemptError::Failed(classify_transport(&e)))?;
        serde_json::from_str(&text)
            .map_err(|e| AttemptError::Incomplete(format!("unparsable search response: {e}")))
    }
}

/// Picks the hit for a ticker: exact symbol match, then primary listing,
/// then provider order. Hits without both ids are skipped.
pub(crate) fn select_hit<'a>(ticker: &Ticker, hits: &'a [SearchHit]) -> Option<&'a SearchHit> {
    let mut exact = hits.iter().filter(|hit| {
        hit.trading_id().is_some()
            && hit.company_id().is_some()
            && hit
                .ticker
                .as_deref()
                .is_some_and(|symbol| symbol.trim().eq_ignore_ascii_case(ticker.as_str()))
    });
    let first = exact.next()?;
    if first.is_primary() {
        return Some(first);
    }
    Some(exact.find(|hit| hit.is_primary()).unwrap_or(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tikr_auth::{NoopTokenStore, TokenProvider};
    use tikr_core::{Endpoints, ErrorKind};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hits(value: serde_json::Value) -> Vec<SearchHit> {
        serde_json::from_value(value).unwrap()
    }

    fn resolver(server: &MockServer) -> CompanyResolver {
        let tokens = Arc::new(
            TokenProvider::new(Arc::new(NoopTokenStore::new()))
                .with_injected_token(Some("tok".to_string())),
        );
        TikrClient::with_client(
            reqwest::Client::new(),
            Endpoints::with_base_url(&server.uri()),
            tokens,
        )
        .resolver()
    }

    #[test]
    fn test_tie_break_prefers_primary_exact_match() {
        let ticker = Ticker::parse("ABC").unwrap();
        let hits = hits(json!([
            {"ticker": "ABCD", "tradingitemid": 1, "companyid": 10, "primaryflag": 1},
            {"ticker": "abc", "tradingitemid": 2, "companyid": 20, "primaryflag": 0},
            {"ticker": "ABC", "tradingitemid": 3, "companyid": 30, "primaryflag": true},
        ]));
        assert_eq!(select_hit(&ticker, &hits).unwrap().trading_id(), Some(3));
    }

    #[test]
    fn test_tie_break_falls_back_to_provider_order() {
        let ticker = Ticker::parse("ABC").unwrap();
        let hits = hits(json!([
            {"ticker": "ABC", "companyid": 5},
            {"ticker": "ABC", "tradingitemid": 2, "companyid": 20},
            {"ticker": "ABC", "tradingitemid": 3, "companyid": 30},
        ]));
        assert_eq!(select_hit(&ticker, &hits).unwrap().trading_id(), Some(2));

        let other = hits_for_other_symbol();
        assert!(select_hit(&ticker, &other).is_none());
    }

    fn hits_for_other_symbol() -> Vec<SearchHit> {
        hits(json!([{"ticker": "ABCX", "tradingitemid": 1, "companyid": 1}]))
    }

    #[tokio::test]
    async fn test_resolve_against_search_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(body_string_contains("query=AAPL&distinct=2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [
                    {"ticker": "AAPL", "tradingitemid": 2590360, "companyid": 24937,
                     "companyname": "Apple Inc.", "primaryflag": 1}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let company = resolver(&server).resolve("aapl").await.unwrap();
        assert_eq!(company.ticker.as_str(), "AAPL");
        assert_eq!(company.trading_id, 2_590_360);
        assert_eq!(company.company_id, 24937);
        assert_eq!(company.name.as_deref(), Some("Apple Inc."));
    }

    #[tokio::test]
    async fn test_repeated_resolution_is_identical() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [
                    {"ticker": "AAPL", "tradingitemid": 2590360, "companyid": 24937,
                     "companyname": "Apple Inc.", "primaryflag": 1}
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let resolver = resolver(&server);
        let first = resolver.resolve("AAPL").await.unwrap();
        let second = resolver.resolve("AAPL").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_invalid_ticker_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = resolver(&server).resolve("ZZZZZZ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTicker);
    }

    #[tokio::test]
    async fn test_empty_hits_is_company_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"hits": []})))
            .mount(&server)
            .await;

        let err = resolver(&server).resolve("QQQQ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CompanyNotFound);
    }
}
