//! Report model.
//!
//! A [`Report`] is built in memory first and written afterwards, so the
//! workbook layout can be inspected in tests without touching the disk.

use chrono::NaiveDate;
use polars::prelude::*;
use std::fmt;
use tikr_core::{CompanyRef, ErrorKind, Result, Statement, TikrError};

/// Sheet holding the market snapshot.
pub const MARKET_SHEET: &str = "market_data";

/// Sheet holding the sales-to-capital analysis.
pub const SALES_TO_CAPITAL_SHEET: &str = "sales_to_capital";

/// Sheet holding the valuation template.
pub const VALUATION_SHEET: &str = "valuation_base";

/// Name of the row-label column of statement tables.
pub const FIELD_COLUMN: &str = "field";

/// A value destined for one cell.
#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    /// A number.
    Number(f64),
    /// Text.
    Text(String),
    /// A formula and, if known, the value it evaluates to.
    Formula {
        /// Formula text including the leading `=`.
        formula: String,
        /// Value cached in the workbook for readers that do not recalculate.
        cached: Option<f64>,
    },
    /// Nothing.
    Empty,
}

impl CellValue {
    /// Wraps an optional number.
    #[must_use]
    pub fn number(value: Option<f64>) -> Self {
        value.map_or(Self::Empty, Self::Number)
    }

    /// The numeric value of the cell, if any.
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Formula { cached, .. } => *cached,
            Self::Text(_) | Self::Empty => None,
        }
    }

    /// True if the cell is a formula.
    #[must_use]
    pub const fn is_formula(&self) -> bool {
        matches!(self, Self::Formula { .. })
    }
}

/// One row of a metric sheet: `Metric | Value | Source`.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyValueRow {
    /// Metric key.
    pub metric: String,
    /// Metric value.
    pub value: CellValue,
    /// Where the value came from.
    pub source: Option<String>,
}

impl KeyValueRow {
    /// Creates a row.
    #[must_use]
    pub fn new(metric: impl Into<String>, value: CellValue, source: Option<String>) -> Self {
        Self {
            metric: metric.into(),
            value,
            source,
        }
    }
}

/// One bound cell of the valuation template.
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateCell {
    /// A1-style address, e.g. `O12`.
    pub cell: &'static str,
    /// What the cell holds.
    pub label: &'static str,
    /// Bound content; [`CellValue::Empty`] when unbound.
    pub value: CellValue,
    /// Provenance or the reason the cell is unbound.
    pub note: Option<String>,
}

impl TemplateCell {
    /// True if the cell received a value or formula.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        !matches!(self.value, CellValue::Empty)
    }
}

/// Why a sheet has no data.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
    /// Error kind, if the sheet is missing because of an error.
    pub kind: Option<ErrorKind>,
    /// Human-readable cause.
    pub reason: String,
}

impl Failure {
    /// A missing sheet not caused by an error.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            kind: None,
            reason: reason.into(),
        }
    }
}

impl From<&TikrError> for Failure {
    fn from(err: &TikrError) -> Self {
        Self {
            kind: Some(err.kind()),
            reason: err.to_string(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind}: {}", self.reason),
            None => f.write_str(&self.reason),
        }
    }
}

/// Content of one sheet.
#[derive(Clone, Debug)]
pub enum SheetContent {
    /// A statement table: `field` column then one column per period label.
    Table(DataFrame),
    /// Metric rows.
    KeyValue(Vec<KeyValueRow>),
    /// Fixed-cell template.
    Template(Vec<TemplateCell>),
    /// Placeholder for data that could not be produced.
    Missing(Failure),
}

/// A named sheet.
#[derive(Clone, Debug)]
pub struct Sheet {
    /// Worksheet name.
    pub name: String,
    /// Worksheet content.
    pub content: SheetContent,
}

impl Sheet {
    /// Creates a sheet.
    #[must_use]
    pub fn new(name: impl Into<String>, content: SheetContent) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    /// Returns the table if this is a table sheet.
    #[must_use]
    pub const fn table(&self) -> Option<&DataFrame> {
        match &self.content {
            SheetContent::Table(df) => Some(df),
            _ => None,
        }
    }

    /// Returns the rows if this is a metric sheet.
    #[must_use]
    pub fn rows(&self) -> Option<&[KeyValueRow]> {
        match &self.content {
            SheetContent::KeyValue(rows) => Some(rows),
            _ => None,
        }
    }

    /// True if this sheet is a placeholder.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self.content, SheetContent::Missing(_))
    }
}

/// The complete workbook for one company.
#[derive(Clone, Debug)]
pub struct Report {
    /// Company the report describes.
    pub company: CompanyRef,
    /// Date used in the file name.
    pub generated_on: NaiveDate,
    /// Sheets in workbook order.
    pub sheets: Vec<Sheet>,
}

impl Report {
    /// Looks up a sheet by name.
    #[must_use]
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    /// Sheet names in workbook order.
    #[must_use]
    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    /// Workbook file name: `<TICKER>_<YYYY-MM-DD>.xlsx`.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.xlsx",
            self.company.ticker,
            self.generated_on.format("%Y-%m-%d")
        )
    }

    /// Bound and unbound valuation cells.
    #[must_use]
    pub fn template(&self) -> Option<&[TemplateCell]> {
        match &self.sheet(VALUATION_SHEET)?.content {
            SheetContent::Template(cells) => Some(cells),
            _ => None,
        }
    }
}

/// Converts a statement into a table: one row per field, one column per period.
///
/// # Errors
/// Returns [`TikrError::Export`] if the frame cannot be assembled.
pub fn statement_frame(statement: &Statement) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(statement.periods.len() + 1);
    columns.push(Column::new(
        FIELD_COLUMN.into(),
        statement.fields.iter().map(String::as_str).collect::<Vec<_>>(),
    ));
    for period in &statement.periods {
        let values: Vec<Option<f64>> = statement.fields.iter().map(|f| period.get(f)).collect();
        columns.push(Column::new(period.label.to_string().into(), values));
    }
    DataFrame::new(columns).map_err(|e| TikrError::Export(e.to_string()))
}

/// Position of a field row in a statement table.
pub(crate) fn field_row(df: &DataFrame, field: &str) -> Option<usize> {
    let fields = df.column(FIELD_COLUMN).ok()?.str().ok()?;
    (0..df.height()).find(|&i| fields.get(i) == Some(field))
}

/// Value of a cell in a statement table.
pub(crate) fn table_value(df: &DataFrame, row: usize, column: &str) -> Option<f64> {
    df.column(column).ok()?.f64().ok()?.get(row)
}

/// Zero-based index of a column.
pub(crate) fn column_index(df: &DataFrame, column: &str) -> Option<usize> {
    df.get_column_names()
        .iter()
        .position(|name| name.as_str() == column)
}
