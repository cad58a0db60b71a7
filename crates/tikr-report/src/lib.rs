#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tikr/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Workbook export for the TIKR statements pipeline.
//!
//! - [`Report`] - In-memory workbook model backed by polars DataFrames
//! - [`TemplateBinder`] - Formula or literal binding of the valuation template
//! - [`SalesToCapital`] - Incremental sales-to-capital analysis
//! - [`ReportExporter`] - Builds a report and writes it as xlsx

/// Sales-to-capital analysis.
pub mod analysis;
/// Report model.
pub mod report;
/// Valuation template binding.
pub mod template;
/// xlsx writer.
pub mod xlsx;

use chrono::{Local, NaiveDate};
use std::path::{Path, PathBuf};
use tikr_core::{
    CompanyRef, MarketSnapshot, PriceSource, Result, StatementSet, StatementType, TikrError,
};
use tracing::{info, instrument};

pub use analysis::SalesToCapital;
pub use report::{
    CellValue, Failure, KeyValueRow, MARKET_SHEET, Report, SALES_TO_CAPITAL_SHEET, Sheet,
    SheetContent, TemplateCell, VALUATION_SHEET, statement_frame,
};
pub use template::{
    Binding, BindingMode, BindingSource, LINKED_BINDINGS, MARGIN_WINDOW, TEMPLATE_FORMULAS,
    TemplateBinder, VALUATION_BINDINGS,
};

/// Market data available to the report.
#[derive(Clone, Copy, Debug)]
pub enum MarketData<'a> {
    /// A snapshot was produced.
    Snapshot(&'a MarketSnapshot),
    /// The live-quote payload could not be retrieved.
    Unavailable(&'a TikrError),
    /// Live data was switched off.
    Disabled,
}

/// Builds reports and writes them to an output directory.
#[derive(Clone, Debug)]
pub struct ReportExporter {
    output_dir: PathBuf,
    binder: TemplateBinder,
    date: Option<NaiveDate>,
}

impl ReportExporter {
    /// Creates an exporter writing to `output_dir` with formula binding.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            binder: TemplateBinder::default(),
            date: None,
        }
    }

    /// Sets the valuation binding mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: BindingMode) -> Self {
        self.binder = TemplateBinder::new(mode);
        self
    }

    /// Pins the report date instead of using today's local date.
    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    /// Directory reports are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Assembles the report for one company.
    ///
    /// Statements absent from `statements` become `Missing` sheets carrying
    /// the matching entry of `failures`.
    ///
    /// # Errors
    /// Returns [`TikrError::Export`] if a statement table cannot be built.
    pub fn build(
        &self,
        company: &CompanyRef,
        statements: &StatementSet,
        failures: &[(StatementType, TikrError)],
        market: MarketData<'_>,
    ) -> Result<Report> {
        let mut sheets = Vec::with_capacity(StatementType::ALL.len() + 3);

        for statement_type in StatementType::ALL {
            let content = match statements.get(statement_type) {
                Some(statement) => SheetContent::Table(statement_frame(statement)?),
                None => SheetContent::Missing(
                    failures
                        .iter()
                        .find(|(t, _)| *t == statement_type)
                        .map_or_else(
                            || Failure::skipped("statement not retrieved"),
                            |(_, err)| Failure::from(err),
                        ),
                ),
            };
            sheets.push(Sheet::new(statement_type.sheet_name(), content));
        }

        let market_content = match market {
            MarketData::Snapshot(snapshot) => SheetContent::KeyValue(market_rows(snapshot)),
            MarketData::Unavailable(err) => SheetContent::Missing(Failure::from(err)),
            MarketData::Disabled => {
                SheetContent::Missing(Failure::skipped("live market data disabled"))
            }
        };
        sheets.push(Sheet::new(MARKET_SHEET, market_content));

        if let Some(stc) = SalesToCapital::compute(statements) {
            sheets.push(Sheet::new(
                SALES_TO_CAPITAL_SHEET,
                SheetContent::KeyValue(stc.rows()),
            ));
        }

        let cells = self.binder.bind(&sheets);
        sheets.push(Sheet::new(VALUATION_SHEET, SheetContent::Template(cells)));

        Ok(Report {
            company: company.clone(),
            generated_on: self.date.unwrap_or_else(|| Local::now().date_naive()),
            sheets,
        })
    }

    /// Writes a built report to `<output_dir>/<TICKER>_<YYYY-MM-DD>.xlsx`.
    ///
    /// # Errors
    /// Returns [`TikrError::Export`] if the directory or file cannot be written.
    #[instrument(skip(self, report), fields(ticker = %report.company.ticker))]
    pub fn write(&self, report: &Report) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            TikrError::Export(format!("{}: {e}", self.output_dir.display()))
        })?;
        let path = self.output_dir.join(report.file_name());
        xlsx::write_report(report, &path)?;
        info!(path = %path.display(), sheets = report.sheets.len(), "Report written");
        Ok(path)
    }

    /// Builds and writes the report in one step.
    ///
    /// # Errors
    /// See [`ReportExporter::build`] and [`ReportExporter::write`].
    pub fn export(
        &self,
        company: &CompanyRef,
        statements: &StatementSet,
        failures: &[(StatementType, TikrError)],
        market: MarketData<'_>,
    ) -> Result<PathBuf> {
        let report = self.build(company, statements, failures, market)?;
        self.write(&report)
    }
}

/// Rows of the `market_data` sheet. The preferred price is always the first
/// row, so it lands in `B2`.
fn market_rows(snapshot: &MarketSnapshot) -> Vec<KeyValueRow> {
    let provider = || Some("TIKR".to_string());
    let price_row = |metric: &str, source: PriceSource| {
        let point = snapshot.price(source);
        KeyValueRow::new(
            metric,
            CellValue::number(point.map(|p| p.value)),
            point.map(|p| p.source.to_string()),
        )
    };
    let preferred = snapshot.preferred_price();

    vec![
        KeyValueRow::new(
            "current_price",
            CellValue::number(preferred.map(|p| p.value)),
            preferred.map(|p| p.source.to_string()),
        ),
        price_row("derived_price", PriceSource::Derived),
        price_row("quote_price", PriceSource::Quote),
        KeyValueRow::new("pe_ratio", CellValue::number(snapshot.pe_ratio), provider()),
        KeyValueRow::new("eps", CellValue::number(snapshot.eps), provider()),
        KeyValueRow::new(
            "shares_outstanding",
            CellValue::number(snapshot.shares_outstanding),
            provider(),
        ),
        KeyValueRow::new(
            "market_cap",
            CellValue::number(snapshot.market_cap),
            preferred.map(|p| format!("{} x shares_outstanding", p.source)),
        ),
        KeyValueRow::new(
            "as_of",
            snapshot
                .price(PriceSource::Quote)
                .and_then(|p| p.as_of)
                .map_or(CellValue::Empty, |t| CellValue::Text(t.to_rfc3339())),
            None,
        ),
        KeyValueRow::new("partial", CellValue::Text(snapshot.partial.to_string()), None),
    ]
}
