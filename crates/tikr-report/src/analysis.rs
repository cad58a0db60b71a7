//! Sales-to-capital analysis.

use crate::report::{CellValue, KeyValueRow};
use tikr_core::{Period, PeriodLabel, StatementSet, StatementType};
use tracing::{debug, warn};

/// Incremental sales generated per unit of incremental invested capital
/// between the two most recent periods shared by the income statement and
/// the balance sheet.
///
/// Invested capital is the balance sheet's `invested_capital` row, or, where
/// that is empty, debt + equity - cash through the fallback keys of
/// [`Period::invested_capital`].
#[derive(Clone, Debug, PartialEq)]
pub struct SalesToCapital {
    /// Later period.
    pub latest: PeriodLabel,
    /// Earlier period.
    pub previous: PeriodLabel,
    /// Revenue in the later period.
    pub latest_revenue: f64,
    /// Revenue in the earlier period.
    pub previous_revenue: f64,
    /// Invested capital in the later period.
    pub latest_invested_capital: f64,
    /// Invested capital in the earlier period.
    pub previous_invested_capital: f64,
}

impl SalesToCapital {
    /// Computes the ratio inputs, or `None` when they are absent or the
    /// change in invested capital is zero.
    #[must_use]
    pub fn compute(statements: &StatementSet) -> Option<Self> {
        let labels = statements.common_labels(StatementType::Income, StatementType::BalanceSheet);
        let [.., previous, latest] = labels.as_slice() else {
            warn!("Sales to capital needs two periods shared by income and balance sheet");
            return None;
        };
        let income = statements.get(StatementType::Income)?;
        let balance = statements.get(StatementType::BalanceSheet)?;

        let revenue = |label: PeriodLabel| income.period(label)?.get("total_revenues");
        let capital = |label: PeriodLabel| {
            let period: &Period = balance.period(label)?;
            period
                .get("invested_capital")
                .or_else(|| period.invested_capital())
        };

        let (Some(latest_revenue), Some(previous_revenue)) = (revenue(*latest), revenue(*previous))
        else {
            warn!("Sales to capital skipped: revenue missing");
            return None;
        };
        let (Some(latest_invested_capital), Some(previous_invested_capital)) =
            (capital(*latest), capital(*previous))
        else {
            warn!("Sales to capital skipped: invested capital missing");
            return None;
        };

        let result = Self {
            latest: *latest,
            previous: *previous,
            latest_revenue,
            previous_revenue,
            latest_invested_capital,
            previous_invested_capital,
        };
        if result.net_invested_capital() == 0.0 {
            warn!("Sales to capital skipped: invested capital unchanged");
            return None;
        }
        debug!(ratio = result.ratio(), "Sales to capital computed");
        Some(result)
    }

    /// Revenue change between the two periods.
    #[must_use]
    pub fn net_revenue(&self) -> f64 {
        self.latest_revenue - self.previous_revenue
    }

    /// Invested capital change between the two periods.
    #[must_use]
    pub fn net_invested_capital(&self) -> f64 {
        self.latest_invested_capital - self.previous_invested_capital
    }

    /// Δrevenue ÷ Δinvested capital.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.net_revenue() / self.net_invested_capital()
    }

    /// Rows of the `sales_to_capital` sheet.
    #[must_use]
    pub fn rows(&self) -> Vec<KeyValueRow> {
        let number = |metric: &str, value: f64| {
            KeyValueRow::new(metric, CellValue::Number(value), None)
        };
        vec![
            number("sales_to_capital_ratio", self.ratio()),
            number("net_revenue", self.net_revenue()),
            number("net_invested_capital", self.net_invested_capital()),
            KeyValueRow::new("latest_period", CellValue::Text(self.latest.to_string()), None),
            KeyValueRow::new(
                "previous_period",
                CellValue::Text(self.previous.to_string()),
                None,
            ),
            number("latest_revenue", self.latest_revenue),
            number("previous_revenue", self.previous_revenue),
            number("latest_invested_capital", self.latest_invested_capital),
            number("previous_invested_capital", self.previous_invested_capital),
        ]
    }
}
