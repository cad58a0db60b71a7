//! End-to-end pipeline: resolve, fetch, normalize, enrich, export.

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tikr_api::{TikrClient, align_statements, normalize, normalize_quote};
use tikr_auth::{TokenProvider, store_for};
use tikr_core::{
    CompanyRef, LoginCollaborator, MarketSnapshot, Result, StatementSet, StatementType,
    TikrConfig, TikrError,
};
use tikr_report::{MarketData, Report, ReportExporter};
use tracing::{info, instrument, warn};

use crate::enrich::MarketDataEnricher;

/// Result of one successful run.
///
/// A run succeeds when at least one statement was retrieved; statements that
/// failed are listed in `failures` and appear as missing sheets in the report.
#[derive(Debug)]
pub struct RunOutcome {
    /// Resolved company.
    pub company: CompanyRef,
    /// The report that was written.
    pub report: Report,
    /// Path of the written workbook.
    pub path: PathBuf,
    /// Market snapshot, when live data was requested and available.
    pub snapshot: Option<MarketSnapshot>,
    /// Per-statement failures.
    pub failures: Vec<(StatementType, TikrError)>,
}

impl RunOutcome {
    /// True if every statement was retrieved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// The failure recorded for a statement, if any.
    #[must_use]
    pub fn failure(&self, statement_type: StatementType) -> Option<&TikrError> {
        self.failures
            .iter()
            .find(|(t, _)| *t == statement_type)
            .map(|(_, e)| e)
    }
}

/// Runs tickers through every stage.
///
/// Stages run in sequence for a ticker. Batches share one client, and with it
/// one [`TokenProvider`] and credential store.
#[derive(Debug, Clone)]
pub struct Pipeline {
    client: TikrClient,
    enricher: MarketDataEnricher,
    exporter: ReportExporter,
    include_live_data: bool,
}

impl Pipeline {
    /// Create a pipeline from its parts.
    #[must_use]
    pub const fn new(
        client: TikrClient,
        enricher: MarketDataEnricher,
        exporter: ReportExporter,
    ) -> Self {
        Self {
            client,
            enricher,
            exporter,
            include_live_data: true,
        }
    }

    /// Create a pipeline from configuration.
    ///
    /// The credential store follows the deployment flag, and the secondary
    /// quote source is Yahoo Finance when the `yahoo` feature is enabled.
    ///
    /// # Errors
    /// Returns [`TikrError::Config`] if the HTTP client cannot be built.
    pub fn from_config(
        config: &TikrConfig,
        login: Option<Arc<dyn LoginCollaborator>>,
    ) -> Result<Self> {
        let tokens = Arc::new(TokenProvider::from_config(config, store_for(config), login));
        let client = TikrClient::new(config, tokens)?;

        #[cfg(feature = "yahoo")]
        let enricher = MarketDataEnricher::new()
            .with_quote_source(Arc::new(tikr_yahoo::YahooQuoteSource::new()));
        #[cfg(not(feature = "yahoo"))]
        let enricher = MarketDataEnricher::new();

        Ok(Self::new(client, enricher, ReportExporter::new(&config.output_dir))
            .with_live_data(config.include_live_data))
    }

    /// Enables or disables the market snapshot stage.
    #[must_use]
    pub const fn with_live_data(mut self, include_live_data: bool) -> Self {
        self.include_live_data = include_live_data;
        self
    }

    /// The provider client.
    #[must_use]
    pub const fn client(&self) -> &TikrClient {
        &self.client
    }

    /// Runs one ticker and writes its workbook.
    ///
    /// # Errors
    /// - [`TikrError::InvalidTicker`] before any network call
    /// - credential and resolution errors, which abort the run
    /// - the first statement error when no statement could be retrieved
    /// - [`TikrError::Export`] if the workbook cannot be written
    #[instrument(skip(self))]
    pub async fn run(&self, ticker: &str) -> Result<RunOutcome> {
        let company = self.client.resolver().resolve(ticker).await?;

        let (statements, failures) = self.fetch_statements(&company).await?;
        if statements.is_empty() {
            if let Some((_, first)) = failures.into_iter().next() {
                return Err(first);
            }
            return Err(TikrError::DataIncomplete(format!(
                "no statements retrieved for {}",
                company.ticker
            )));
        }

        let market = if self.include_live_data {
            Some(self.market_snapshot(&company).await?)
        } else {
            None
        };
        let market_data = match &market {
            Some(Ok(snapshot)) => MarketData::Snapshot(snapshot),
            Some(Err(e)) => MarketData::Unavailable(e),
            None => MarketData::Disabled,
        };

        let report = self
            .exporter
            .build(&company, &statements, &failures, market_data)?;
        let exporter = self.exporter.clone();
        let (report, path) = tokio::task::spawn_blocking(move || {
            exporter.write(&report).map(|path| (report, path))
        })
        .await
        .map_err(|e| TikrError::Export(format!("export task failed: {e}")))??;

        info!(
            ticker = %company.ticker,
            path = %path.display(),
            missing = failures.len(),
            "Run complete"
        );
        Ok(RunOutcome {
            company,
            report,
            path,
            snapshot: market.and_then(std::result::Result::ok),
            failures,
        })
    }

    /// Runs several tickers with at most `workers` in flight.
    ///
    /// Results are returned in completion order, each paired with its input.
    pub async fn run_batch<I, S>(
        &self,
        tickers: I,
        workers: usize,
    ) -> Vec<(String, Result<RunOutcome>)>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        stream::iter(tickers.into_iter().map(Into::into))
            .map(|ticker: String| async move {
                let result = self.run(&ticker).await;
                if let Err(e) = &result {
                    warn!(ticker = %ticker, error = %e, "Run failed");
                }
                (ticker, result)
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await
    }

    /// Fetches and normalizes every statement, then aligns their period
    /// labels. Statement-local failures are collected; anything else aborts.
    async fn fetch_statements(
        &self,
        company: &CompanyRef,
    ) -> Result<(StatementSet, Vec<(StatementType, TikrError)>)> {
        let fetcher = self.client.fetcher();
        let mut statements = StatementSet::new();
        let mut failures = Vec::new();

        for statement_type in StatementType::ALL {
            let result = match fetcher.fetch(company, statement_type).await {
                Ok(payload) => normalize(&payload).map(|n| n.statement),
                Err(e) => Err(e),
            };
            match result {
                Ok(statement) => {
                    info!(
                        ticker = %company.ticker,
                        statement = %statement_type,
                        periods = statement.periods.len(),
                        "Statement retrieved"
                    );
                    statements.insert(statement);
                }
                Err(e) if e.is_statement_local() => {
                    warn!(
                        ticker = %company.ticker,
                        statement = %statement_type,
                        error = %e,
                        "Statement unavailable, continuing"
                    );
                    failures.push((statement_type, e));
                }
                Err(e) => return Err(e),
            }
        }
        align_statements(&mut statements);
        Ok((statements, failures))
    }

    /// Builds the market snapshot. The inner result is the snapshot or the
    /// statement-local error that prevented it; other errors abort.
    async fn market_snapshot(
        &self,
        company: &CompanyRef,
    ) -> Result<std::result::Result<MarketSnapshot, TikrError>> {
        let latest = match self.client.fetcher().fetch_quote(company).await {
            Ok(quote) => normalize_quote(&quote),
            Err(e) => Err(e),
        };
        match latest {
            Ok(period) => Ok(Ok(self.enricher.enrich(company, &period).await)),
            Err(e) if e.is_statement_local() => {
                warn!(ticker = %company.ticker, error = %e, "Live quote payload unavailable");
                Ok(Err(e))
            }
            Err(e) => Err(e),
        }
    }
}
