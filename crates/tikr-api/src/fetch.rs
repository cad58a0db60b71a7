//! Raw statement retrieval from the financials endpoint.

use serde_json::Value;
use tikr_core::{
    CompanyRef, Credential, FailureClass, Result, RetryDecision, RetryState, StatementType,
    TikrError,
};
use tracing::{debug, instrument, warn};

use crate::payload::{FinancialsRequest, RawPayload, RawQuote, RawStatement};
use crate::{AttemptError, TikrClient, body_signals_expired_session, classify_transport};

/// Period selector for annual history.
const ANNUAL_PERIODS: &str = "1";

/// API version sent with every request.
const API_VERSION: &str = "v1";

/// Provider report id for a statement.
#[must_use]
pub const fn report_id(statement_type: StatementType) -> u8 {
    match statement_type {
        StatementType::Income => 1,
        StatementType::BalanceSheet => 2,
        StatementType::CashFlow => 3,
    }
}

/// Report id used for the latest-period market fields.
const QUOTE_REPORT_ID: u8 = 1;

/// Fetches raw statement payloads.
///
/// A session-expired response triggers one credential refresh and one
/// immediate retry. Transient failures back off per the client's
/// [`RetryPolicy`](tikr_core::RetryPolicy).
#[derive(Debug, Clone)]
pub struct StatementFetcher {
    client: TikrClient,
}

impl StatementFetcher {
    /// Create a fetcher on top of a client.
    #[must_use]
    pub const fn new(client: TikrClient) -> Self {
        Self { client }
    }

    /// Fetches one statement.
    ///
    /// # Errors
    /// - [`TikrError::Authentication`] if the session is rejected after a refresh
    /// - [`TikrError::UpstreamUnavailable`] when the retry budget is spent
    /// - [`TikrError::DataIncomplete`] for an empty or malformed response
    #[instrument(
        skip(self, company),
        fields(ticker = %company.ticker, statement = %statement_type)
    )]
    pub async fn fetch(
        &self,
        company: &CompanyRef,
        statement_type: StatementType,
    ) -> Result<RawPayload> {
        let raw = self.request(company, report_id(statement_type)).await?;
        Ok(RawPayload::new(statement_type, raw))
    }

    /// Fetches the latest-period payload carrying P/E, EPS and share count.
    ///
    /// # Errors
    /// Same as [`StatementFetcher::fetch`].
    #[instrument(skip(self, company), fields(ticker = %company.ticker))]
    pub async fn fetch_quote(&self, company: &CompanyRef) -> Result<RawQuote> {
        self.request(company, QUOTE_REPORT_ID).await.map(RawQuote)
    }

    async fn request(&self, company: &CompanyRef, repid: u8) -> Result<RawStatement> {
        let tokens = self.client.tokens();
        let mut credential = tokens.acquire(false).await?;
        let mut state = RetryState::new();

        loop {
            state.record_attempt();
            let failure = match self.try_request(&credential, company, repid).await {
                Ok(raw) => return Ok(raw),
                Err(AttemptError::Incomplete(cause)) => {
                    return Err(TikrError::DataIncomplete(cause));
                }
                Err(AttemptError::Failed(failure)) => failure,
            };

            match self.client.retry.decide(&mut state, failure.clone()) {
                RetryDecision::RefreshCredential => {
                    warn!(?failure, "Session rejected, refreshing credential");
                    credential = tokens.refresh(&credential).await?;
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(?failure, ?delay, attempt = state.attempts(), "Retrying request");
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Fail(e) => {
                    if matches!(e, TikrError::Authentication(_)) {
                        tokens.invalidate(&credential).await?;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn try_request(
        &self,
        credential: &Credential,
        company: &CompanyRef,
        repid: u8,
    ) -> std::result::Result<RawStatement, AttemptError> {
        let body = FinancialsRequest {
            auth: credential.token(),
            tid: company.trading_id,
            cid: company.company_id,
            p: ANNUAL_PERIODS,
            repid,
            v: API_VERSION,
        };
        debug!(repid, tid = company.trading_id, cid = company.company_id, "Financials request");

        let response = self
            .client
            .http
            .post(&self.client.endpoints.financials_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttemptError::Failed(classify_transport(&e)))?;

        let status = response.status().as_u16();
        if let Some(failure) = FailureClass::from_status(status) {
            return Err(AttemptError::Failed(failure));
        }

        let text = response
            .text()
            .await
            .map_err(|e| AttemptError::Failed(classify_transport(&e)))?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| AttemptError::Incomplete(format!("unparsable response: {e}")))?;
        if body_signals_expired_session(&value) {
            return Err(AttemptError::Failed(FailureClass::SessionExpired { status }));
        }

        let raw: RawStatement = serde_json::from_value(value)
            .map_err(|e| AttemptError::Incomplete(format!("malformed response: {e}")))?;
        if raw.is_empty() {
            return Err(AttemptError::Incomplete(
                "response has no dates or data".to_string(),
            ));
        }
        Ok(raw)
    }
}
