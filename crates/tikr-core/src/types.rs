//! Core data types for the statements pipeline.
//!
//! This module defines the canonical model shared by every crate:
//!
//! - [`Ticker`] - Validated trading symbol
//! - [`Credential`] - Bearer token with acquisition metadata
//! - [`CompanyRef`] - Provider identifiers for a resolved company
//! - [`StatementType`], [`PeriodLabel`], [`Period`], [`Statement`] - Canonical statements
//! - [`StatementSet`] - All statements of one company, aligned by label
//! - [`MarketSnapshot`], [`PricePoint`], [`Quote`] - Live market data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TikrError};

/// Maximum ticker length accepted by [`Ticker::parse`].
pub const MAX_TICKER_LEN: usize = 5;

/// A validated trading symbol: 1 to 5 ASCII letters, stored upper-case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    /// Validates and upper-cases a ticker.
    ///
    /// # Errors
    /// Returns [`TikrError::InvalidTicker`] if the input is empty, longer than
    /// [`MAX_TICKER_LEN`], or contains anything other than ASCII letters,
    /// surrounding whitespace included.
    pub fn parse(input: &str) -> Result<Self> {
        if input.is_empty() {
            return Err(TikrError::invalid_ticker(input, "empty"));
        }
        if input.chars().count() > MAX_TICKER_LEN {
            return Err(TikrError::invalid_ticker(
                input,
                format!("longer than {MAX_TICKER_LEN} characters"),
            ));
        }
        if !input.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(TikrError::invalid_ticker(input, "letters only"));
        }
        Ok(Self(input.to_ascii_uppercase()))
    }

    /// Returns the ticker as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Ticker {
    type Err = TikrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// An opaque bearer credential.
///
/// Credentials are never mutated in place; [`Credential::invalidated`] returns
/// a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    acquired_at: DateTime<Utc>,
    valid: bool,
}

impl Credential {
    /// Creates a valid credential acquired now.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self::acquired_at(token, Utc::now())
    }

    /// Creates a valid credential with an explicit acquisition time.
    #[must_use]
    pub fn acquired_at(token: impl Into<String>, acquired_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            acquired_at,
            valid: true,
        }
    }

    /// Returns the raw token text.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns when the token was acquired.
    #[must_use]
    pub const fn acquired(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Returns false once a dependent request reported an auth failure.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Returns a copy of this credential marked invalid.
    #[must_use]
    pub fn invalidated(&self) -> Self {
        Self {
            valid: false,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("acquired_at", &self.acquired_at)
            .field("valid", &self.valid)
            .finish()
    }
}

/// Provider identifiers for a resolved company.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyRef {
    /// The ticker that was resolved.
    pub ticker: Ticker,
    /// Provider trading item id.
    pub trading_id: i64,
    /// Provider company id.
    pub company_id: i64,
    /// Company name as reported by the search index.
    pub name: Option<String>,
}

impl CompanyRef {
    /// Creates a company reference.
    #[must_use]
    pub const fn new(ticker: Ticker, trading_id: i64, company_id: i64) -> Self {
        Self {
            ticker,
            trading_id,
            company_id,
            name: None,
        }
    }

    /// Sets the company name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// The three financial statements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatementType {
    /// Income statement.
    Income,
    /// Cash flow statement.
    CashFlow,
    /// Balance sheet.
    BalanceSheet,
}

impl StatementType {
    /// All statement types in report order.
    pub const ALL: [Self; 3] = [Self::Income, Self::CashFlow, Self::BalanceSheet];

    /// Fixed worksheet name for this statement.
    #[must_use]
    pub const fn sheet_name(&self) -> &'static str {
        match self {
            Self::Income => "income_statement",
            Self::CashFlow => "cashflow_statement",
            Self::BalanceSheet => "balancesheet_statement",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sheet_name())
    }
}

/// Canonical period label, the join key across statements.
///
/// Orders chronologically; the trailing-twelve-months column sorts last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PeriodLabel {
    /// A fiscal year.
    FiscalYear(i32),
    /// Last twelve months.
    Ltm,
}

impl PeriodLabel {
    /// Returns the fiscal year, or `None` for the LTM column.
    #[must_use]
    pub const fn fiscal_year(&self) -> Option<i32> {
        match self {
            Self::FiscalYear(year) => Some(*year),
            Self::Ltm => None,
        }
    }
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FiscalYear(year) => write!(f, "FY{year}"),
            Self::Ltm => f.write_str("LTM"),
        }
    }
}

/// A line item value; `None` means absent, which is not zero.
pub type LineItem = Option<f64>;

/// Balance sheet keys tried in order for the debt component of invested capital.
pub const DEBT_KEYS: &[&str] = &["total_debt", "long_term_debt", "total_liabilities"];

/// Balance sheet keys tried in order for the equity component.
pub const EQUITY_KEYS: &[&str] = &["total_equity", "total_common_equity"];

/// Balance sheet keys tried in order for the cash component.
pub const CASH_KEYS: &[&str] = &[
    "cash_and_equivalents",
    "total_cash_and_short_term_investments",
];

/// One reporting period of a statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Period {
    /// Canonical label.
    pub label: PeriodLabel,
    /// Canonical field key to value.
    pub items: BTreeMap<String, LineItem>,
}

impl Period {
    /// Creates an empty period.
    #[must_use]
    pub const fn new(label: PeriodLabel) -> Self {
        Self {
            label,
            items: BTreeMap::new(),
        }
    }

    /// Returns the value of a field, `None` if absent or unknown.
    #[must_use]
    pub fn get(&self, key: &str) -> LineItem {
        self.items.get(key).copied().flatten()
    }

    /// Sets a field.
    pub fn set(&mut self, key: impl Into<String>, value: LineItem) {
        self.items.insert(key.into(), value);
    }

    /// Returns the first of `keys` that has a value.
    #[must_use]
    pub fn first_of(&self, keys: &[&str]) -> LineItem {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Debt + equity - cash, each taken from the first key of its fallback
    /// list ([`DEBT_KEYS`], [`EQUITY_KEYS`], [`CASH_KEYS`]) that has a value.
    #[must_use]
    pub fn invested_capital(&self) -> LineItem {
        let debt = self.first_of(DEBT_KEYS)?;
        let equity = self.first_of(EQUITY_KEYS)?;
        let cash = self.first_of(CASH_KEYS)?;
        Some(debt + equity - cash)
    }

    /// Sets a field and returns self.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.set(key, Some(value));
        self
    }
}

/// A canonical statement: periods in chronological order, most recent last.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Which statement this is.
    pub statement_type: StatementType,
    /// Canonical row order (mapped fields, then derived metrics).
    pub fields: Vec<String>,
    /// Periods, oldest first.
    pub periods: Vec<Period>,
}

impl Statement {
    /// Creates an empty statement.
    #[must_use]
    pub const fn new(statement_type: StatementType) -> Self {
        Self {
            statement_type,
            fields: Vec::new(),
            periods: Vec::new(),
        }
    }

    /// Looks up a period by label.
    #[must_use]
    pub fn period(&self, label: PeriodLabel) -> Option<&Period> {
        self.periods.iter().find(|p| p.label == label)
    }

    /// Returns the most recent period (the LTM column when present).
    #[must_use]
    pub fn latest(&self) -> Option<&Period> {
        self.periods.last()
    }

    /// Returns the most recent fiscal-year period, skipping LTM.
    #[must_use]
    pub fn latest_fiscal_year(&self) -> Option<&Period> {
        self.periods
            .iter()
            .rev()
            .find(|p| p.label.fiscal_year().is_some())
    }

    /// Returns up to `n` most recent fiscal-year periods, oldest first.
    #[must_use]
    pub fn recent_fiscal_years(&self, n: usize) -> Vec<&Period> {
        let fiscal: Vec<&Period> = self
            .periods
            .iter()
            .filter(|p| p.label.fiscal_year().is_some())
            .collect();
        let skip = fiscal.len().saturating_sub(n);
        fiscal.into_iter().skip(skip).collect()
    }

    /// Returns the period labels in order.
    #[must_use]
    pub fn labels(&self) -> Vec<PeriodLabel> {
        self.periods.iter().map(|p| p.label).collect()
    }
}

/// The statements retrieved for one company.
///
/// Statements keep their own period history; [`StatementSet::aligned_labels`]
/// is the union of labels, not the intersection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StatementSet {
    statements: BTreeMap<StatementType, Statement>,
}

impl StatementSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a statement.
    pub fn insert(&mut self, statement: Statement) {
        self.statements.insert(statement.statement_type, statement);
    }

    /// Returns a statement by type.
    #[must_use]
    pub fn get(&self, statement_type: StatementType) -> Option<&Statement> {
        self.statements.get(&statement_type)
    }

    /// Returns a statement by type, mutably.
    pub fn get_mut(&mut self, statement_type: StatementType) -> Option<&mut Statement> {
        self.statements.get_mut(&statement_type)
    }

    /// Returns the number of statements present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns true if no statement is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Iterates over the statements in [`StatementType`] order.
    pub fn iter(&self) -> impl Iterator<Item = &Statement> {
        self.statements.values()
    }

    /// Union of all period labels, chronological.
    #[must_use]
    pub fn aligned_labels(&self) -> Vec<PeriodLabel> {
        let mut labels: Vec<PeriodLabel> = self
            .statements
            .values()
            .flat_map(|s| s.periods.iter().map(|p| p.label))
            .collect();
        labels.sort();
        labels.dedup();
        labels
    }

    /// Relabels the trailing fiscal year of the whole set as LTM.
    ///
    /// The reference is the latest fiscal year across every statement, so a
    /// given raw year gets the same label in each statement whatever the
    /// length of its history. Nothing changes when a statement already
    /// carries an explicit LTM period or the set spans fewer than two fiscal
    /// years. Returns the relabelled year.
    pub fn mark_ltm(&mut self) -> Option<i32> {
        if self
            .statements
            .values()
            .any(|s| s.period(PeriodLabel::Ltm).is_some())
        {
            return None;
        }
        let mut years: Vec<i32> = self
            .statements
            .values()
            .flat_map(|s| s.periods.iter().filter_map(|p| p.label.fiscal_year()))
            .collect();
        years.sort_unstable();
        years.dedup();
        let [.., _, latest] = years.as_slice() else {
            return None;
        };
        let latest = *latest;
        for statement in self.statements.values_mut() {
            for period in &mut statement.periods {
                if period.label == PeriodLabel::FiscalYear(latest) {
                    period.label = PeriodLabel::Ltm;
                }
            }
        }
        Some(latest)
    }

    /// Labels present in both statements, chronological.
    #[must_use]
    pub fn common_labels(&self, a: StatementType, b: StatementType) -> Vec<PeriodLabel> {
        let (Some(left), Some(right)) = (self.get(a), self.get(b)) else {
            return Vec::new();
        };
        let mut labels: Vec<PeriodLabel> = left
            .labels()
            .into_iter()
            .filter(|l| right.period(*l).is_some())
            .collect();
        labels.sort();
        labels
    }
}

/// Where a price came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceSource {
    /// Provider P/E ratio multiplied by EPS.
    Derived,
    /// Direct quote from the secondary source.
    Quote,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Derived => "provider P/E x EPS",
            Self::Quote => "secondary quote",
        })
    }
}

/// A price tagged with its source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Price per share.
    pub value: f64,
    /// Origin of the value.
    pub source: PriceSource,
    /// Quote time, when the source reports one.
    pub as_of: Option<DateTime<Utc>>,
}

/// A direct quote from the secondary source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Last traded price.
    pub price: f64,
    /// Time of the quote.
    pub as_of: DateTime<Utc>,
    /// Quote currency, if reported.
    pub currency: Option<String>,
}

/// Current market data for a company.
///
/// Both price sources are kept side by side; nothing is overwritten.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Company ticker.
    pub ticker: Ticker,
    /// Latest P/E ratio.
    pub pe_ratio: Option<f64>,
    /// Latest EPS.
    pub eps: Option<f64>,
    /// Shares outstanding, millions.
    pub shares_outstanding: Option<f64>,
    /// Market capitalisation, millions.
    pub market_cap: Option<f64>,
    /// All available prices with their source.
    pub prices: Vec<PricePoint>,
    /// True when a source was unavailable.
    pub partial: bool,
}

impl MarketSnapshot {
    /// Returns the price from a given source.
    #[must_use]
    pub fn price(&self, source: PriceSource) -> Option<&PricePoint> {
        self.prices.iter().find(|p| p.source == source)
    }

    /// The direct quote if available, otherwise the derived price.
    #[must_use]
    pub fn preferred_price(&self) -> Option<&PricePoint> {
        self.price(PriceSource::Quote)
            .or_else(|| self.price(PriceSource::Derived))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_ticker_parse() {
        assert_eq!(Ticker::parse("aapl").unwrap().as_str(), "AAPL");
        assert_eq!(Ticker::parse("msft").unwrap().as_str(), "MSFT");
        assert_eq!(
            Ticker::parse(" msft ").unwrap_err().kind(),
            ErrorKind::InvalidTicker
        );
        assert!(Ticker::parse("MS FT").is_err());
        assert_eq!(
            Ticker::parse("ZZZZZZ").unwrap_err().kind(),
            ErrorKind::InvalidTicker
        );
        assert!(Ticker::parse("").is_err());
        assert!(Ticker::parse("BRK.B").is_err());
        assert!(Ticker::parse("A1").is_err());
    }

    #[test]
    fn test_credential_invalidation_is_a_new_value() {
        let credential = Credential::new("abc");
        let invalid = credential.invalidated();
        assert!(credential.is_valid());
        assert!(!invalid.is_valid());
        assert_eq!(invalid.token(), "abc");
        assert!(!format!("{credential:?}").contains("abc"));
    }

    #[test]
    fn test_period_label_order_and_display() {
        let mut labels = vec![
            PeriodLabel::Ltm,
            PeriodLabel::FiscalYear(2023),
            PeriodLabel::FiscalYear(2021),
        ];
        labels.sort();
        assert_eq!(
            labels,
            vec![
                PeriodLabel::FiscalYear(2021),
                PeriodLabel::FiscalYear(2023),
                PeriodLabel::Ltm
            ]
        );
        assert_eq!(PeriodLabel::FiscalYear(2023).to_string(), "FY2023");
        assert_eq!(PeriodLabel::Ltm.to_string(), "LTM");
    }

    #[test]
    fn test_recent_fiscal_years_skips_ltm() {
        let mut statement = Statement::new(StatementType::Income);
        for year in 2018..=2023 {
            statement
                .periods
                .push(Period::new(PeriodLabel::FiscalYear(year)));
        }
        statement.periods.push(Period::new(PeriodLabel::Ltm));

        let recent: Vec<PeriodLabel> = statement
            .recent_fiscal_years(4)
            .iter()
            .map(|p| p.label)
            .collect();
        assert_eq!(
            recent,
            (2020..=2023).map(PeriodLabel::FiscalYear).collect::<Vec<_>>()
        );
        assert_eq!(
            statement.latest_fiscal_year().map(|p| p.label),
            Some(PeriodLabel::FiscalYear(2023))
        );
        assert_eq!(statement.latest().map(|p| p.label), Some(PeriodLabel::Ltm));
    }

    #[test]
    fn test_aligned_labels_keep_union() {
        let mut income = Statement::new(StatementType::Income);
        income.periods = vec![
            Period::new(PeriodLabel::FiscalYear(2021)),
            Period::new(PeriodLabel::FiscalYear(2022)),
        ];
        let mut balance = Statement::new(StatementType::BalanceSheet);
        balance.periods = vec![
            Period::new(PeriodLabel::FiscalYear(2022)),
            Period::new(PeriodLabel::Ltm),
        ];

        let mut set = StatementSet::new();
        set.insert(income);
        set.insert(balance);

        assert_eq!(
            set.aligned_labels(),
            vec![
                PeriodLabel::FiscalYear(2021),
                PeriodLabel::FiscalYear(2022),
                PeriodLabel::Ltm
            ]
        );
        assert_eq!(
            set.common_labels(StatementType::Income, StatementType::BalanceSheet),
            vec![PeriodLabel::FiscalYear(2022)]
        );
        assert_eq!(set.get(StatementType::Income).unwrap().periods.len(), 2);
    }

    fn yearly(statement_type: StatementType, years: std::ops::RangeInclusive<i32>) -> Statement {
        let mut statement = Statement::new(statement_type);
        statement.periods = years.map(|y| Period::new(PeriodLabel::FiscalYear(y))).collect();
        statement
    }

    #[test]
    fn test_mark_ltm_uses_one_reference_year() {
        let mut set = StatementSet::new();
        set.insert(yearly(StatementType::Income, 2022..=2024));
        set.insert(yearly(StatementType::CashFlow, 2022..=2023));

        assert_eq!(set.mark_ltm(), Some(2024));
        assert_eq!(
            set.get(StatementType::Income).unwrap().labels(),
            vec![
                PeriodLabel::FiscalYear(2022),
                PeriodLabel::FiscalYear(2023),
                PeriodLabel::Ltm
            ]
        );
        assert_eq!(
            set.get(StatementType::CashFlow).unwrap().labels(),
            vec![PeriodLabel::FiscalYear(2022), PeriodLabel::FiscalYear(2023)]
        );
        assert_eq!(
            set.common_labels(StatementType::Income, StatementType::CashFlow),
            vec![PeriodLabel::FiscalYear(2022), PeriodLabel::FiscalYear(2023)]
        );
    }

    #[test]
    fn test_mark_ltm_keeps_explicit_ltm_and_single_years() {
        let mut set = StatementSet::new();
        let mut income = yearly(StatementType::Income, 2022..=2023);
        income.periods.push(Period::new(PeriodLabel::Ltm));
        set.insert(income);
        set.insert(yearly(StatementType::BalanceSheet, 2022..=2023));
        assert_eq!(set.mark_ltm(), None);
        let balance = set.get(StatementType::BalanceSheet).unwrap();
        assert!(balance.period(PeriodLabel::Ltm).is_none());

        let mut single = StatementSet::new();
        single.insert(yearly(StatementType::Income, 2023..=2023));
        assert_eq!(single.mark_ltm(), None);
    }

    #[test]
    fn test_invested_capital_falls_back() {
        let period = Period::new(PeriodLabel::FiscalYear(2023))
            .with("long_term_debt", 300.0)
            .with("total_liabilities", 900.0)
            .with("total_common_equity", 500.0)
            .with("total_cash_and_short_term_investments", 100.0);
        assert_eq!(period.invested_capital(), Some(700.0));

        let period = period.with("total_debt", 400.0).with("cash_and_equivalents", 50.0);
        assert_eq!(period.invested_capital(), Some(850.0));

        let no_equity = Period::new(PeriodLabel::Ltm)
            .with("total_debt", 1.0)
            .with("cash_and_equivalents", 1.0);
        assert_eq!(no_equity.invested_capital(), None);
    }

    #[test]
    fn test_absent_is_not_zero() {
        let period = Period::new(PeriodLabel::Ltm).with("total_revenues", 0.0);
        assert_eq!(period.get("total_revenues"), Some(0.0));
        assert_eq!(period.get("net_income"), None);
    }

    #[test]
    fn test_preferred_price() {
        let mut snapshot = MarketSnapshot {
            ticker: Ticker::parse("AAPL").unwrap(),
            pe_ratio: Some(30.0),
            eps: Some(6.0),
            shares_outstanding: None,
            market_cap: None,
            prices: vec![PricePoint {
                value: 180.0,
                source: PriceSource::Derived,
                as_of: None,
            }],
            partial: true,
        };
        assert_eq!(snapshot.preferred_price().unwrap().value, 180.0);

        snapshot.prices.push(PricePoint {
            value: 182.5,
            source: PriceSource::Quote,
            as_of: None,
        });
        assert_eq!(snapshot.preferred_price().unwrap().value, 182.5);
        assert_eq!(snapshot.price(PriceSource::Derived).unwrap().value, 180.0);
    }
}
